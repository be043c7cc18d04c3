//! Molecular geometry as handed to Psi4.
//!
//! [`Geometry`] keeps element symbols alongside a flat coordinate vector
//! `[x1, y1, z1, x2, y2, z2, ...]` in Angstrom, the unit Psi4 reads by default.
//! It knows how to render itself in the two textual forms the input deck
//! needs: the Psi4 molecule block and a Python literal of
//! `(symbol, (x, y, z))` tuples.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Represents a molecular geometry with atomic elements and Cartesian coordinates.
///
/// Coordinates are stored in a `DVector<f64>` in the order
/// `[x1, y1, z1, x2, y2, z2, ...]`, in Angstrom.
///
/// # Examples
///
/// ```
/// use psi4_bridge::geometry::Geometry;
///
/// let geometry = Geometry::new(
///     vec!["H".to_string(), "H".to_string()],
///     vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.7414],
/// );
/// assert_eq!(geometry.num_atoms, 2);
/// assert_eq!(geometry.to_psi4_string(), "H 0 0 0\nH 0 0 0.7414");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    /// Chemical element symbols for each atom in order
    pub elements: Vec<String>,
    /// Flattened Cartesian coordinates [x1, y1, z1, x2, y2, z2, ...] in Angstroms
    pub coords: DVector<f64>,
    /// Number of atoms in the molecule
    pub num_atoms: usize,
}

impl Geometry {
    /// Create a new `Geometry` from element list and coordinate vector.
    ///
    /// # Panics
    ///
    /// Panics if `coords.len() != elements.len() * 3`.
    pub fn new(elements: Vec<String>, coords: Vec<f64>) -> Self {
        let num_atoms = elements.len();
        assert_eq!(coords.len(), num_atoms * 3);
        Self {
            elements,
            coords: DVector::from_vec(coords),
            num_atoms,
        }
    }

    /// Builds a geometry from `(symbol, [x, y, z])` pairs.
    pub fn from_atoms<I, S>(atoms: I) -> Self
    where
        I: IntoIterator<Item = (S, [f64; 3])>,
        S: Into<String>,
    {
        let mut elements = Vec::new();
        let mut coords = Vec::new();
        for (symbol, xyz) in atoms {
            elements.push(symbol.into());
            coords.extend_from_slice(&xyz);
        }
        Self::new(elements, coords)
    }

    /// Get the Cartesian coordinates of a specific atom.
    pub fn get_atom_coords(&self, atom_idx: usize) -> [f64; 3] {
        let i = atom_idx * 3;
        [self.coords[i], self.coords[i + 1], self.coords[i + 2]]
    }

    /// Iterates over `(symbol, [x, y, z])` pairs in atom order.
    pub fn atoms(&self) -> impl Iterator<Item = (&str, [f64; 3])> + '_ {
        self.elements
            .iter()
            .enumerate()
            .map(move |(i, element)| (element.as_str(), self.get_atom_coords(i)))
    }

    /// Renders the geometry as the body of a Psi4 `molecule` block.
    ///
    /// One atom per line, `"<symbol> <x> <y> <z>"`, joined by newlines with no
    /// trailing newline. Coordinates are not validated.
    pub fn to_psi4_string(&self) -> String {
        self.atoms()
            .map(|(symbol, [x, y, z])| format!("{} {} {} {}", symbol, x, y, z))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Renders the geometry as a Python list literal, e.g.
    /// `[('H', (0.0, 0.0, 0.0)), ('H', (0.0, 0.0, 0.7414))]`.
    pub fn to_python_literal(&self) -> String {
        let atoms: Vec<String> = self
            .atoms()
            .map(|(symbol, [x, y, z])| format!("('{}', ({:?}, {:?}, {:?}))", symbol, x, y, z))
            .collect();
        format!("[{}]", atoms.join(", "))
    }

    /// Element counts in order of first appearance, e.g. `[("H", 2), ("O", 1)]`.
    pub fn element_counts(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for element in &self.elements {
            match counts.iter_mut().find(|(symbol, _)| symbol == element) {
                Some((_, count)) => *count += 1,
                None => counts.push((element.clone(), 1)),
            }
        }
        counts
    }
}

/// Serializable form of [`Geometry`]: a list of `[symbol, [x, y, z]]` pairs.
///
/// This is the layout the bundled Psi4 template writes into the molecule
/// record, so the Rust and Python sides agree on one JSON shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerializableGeometry(pub Vec<(String, [f64; 3])>);

impl From<&Geometry> for SerializableGeometry {
    fn from(geom: &Geometry) -> Self {
        Self(
            geom.atoms()
                .map(|(symbol, xyz)| (symbol.to_string(), xyz))
                .collect(),
        )
    }
}

impl From<SerializableGeometry> for Geometry {
    fn from(ser_geom: SerializableGeometry) -> Self {
        Geometry::from_atoms(ser_geom.0)
    }
}
