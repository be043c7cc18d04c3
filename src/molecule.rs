//! Molecule records and their persistence.
//!
//! [`MolecularData`] is the caller-owned description of one calculation target:
//! geometry, basis, charge, multiplicity, a free-text description, the derived
//! name/filename, and the scalar results Psi4 fills in. Results do not come
//! back through the subprocess; the bundled template writes them into the
//! persisted record and the runner re-reads it through a [`MoleculeStore`].
//!
//! # Record format
//!
//! [`JsonMoleculeStore`] keeps one JSON document per molecule at
//! `<filename>.json`:
//!
//! ```text
//! {
//!   "geometry": [["H", [0.0, 0.0, 0.0]], ["H", [0.0, 0.0, 0.7414]]],
//!   "basis": "sto-3g",
//!   "charge": 0,
//!   "multiplicity": 1,
//!   "description": "0.7414",
//!   "hf_energy": -1.1166843870853405,
//!   "fci_energy": -1.1372701746609015
//! }
//! ```
//!
//! Missing energy fields deserialize to `None`.

use crate::config::CalculationOptions;
use crate::geometry::{Geometry, SerializableGeometry};
use crate::naming::FileNaming;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors raised while building a molecule record.
#[derive(Error, Debug)]
pub enum MoleculeError {
    /// Multiplicity has no conventional name
    #[error("Unsupported multiplicity: {0}")]
    UnsupportedMultiplicity(u32),
    /// Geometry has no atoms
    #[error("Molecule geometry is empty")]
    EmptyGeometry,
}

/// Errors raised by a [`MoleculeStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// File system error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Record exists but does not parse
    #[error("Invalid molecule record: {0}")]
    Format(#[from] serde_json::Error),
}

const MULTIPLICITY_NAMES: [&str; 12] = [
    "singlet",
    "doublet",
    "triplet",
    "quartet",
    "quintet",
    "sextet",
    "septet",
    "octet",
    "nonet",
    "dectet",
    "undectet",
    "duodectet",
];

/// Returns the conventional name of a spin multiplicity (`1` → `"singlet"`).
pub fn multiplicity_name(multiplicity: u32) -> Option<&'static str> {
    (multiplicity as usize)
        .checked_sub(1)
        .and_then(|i| MULTIPLICITY_NAMES.get(i))
        .copied()
}

/// Builds the molecule name `<formula>_<basis>_<multiplicity>[_<charge>][_<description>]`.
///
/// The formula lists elements in order of first appearance with counts above
/// one, e.g. `H2`, `LiH`, `OH2`. Charges are written `_1+` / `_2-`.
pub fn name_molecule(
    geometry: &Geometry,
    basis: &str,
    multiplicity: u32,
    charge: i32,
    description: &str,
) -> Result<String, MoleculeError> {
    if geometry.num_atoms == 0 {
        return Err(MoleculeError::EmptyGeometry);
    }
    let formula: String = geometry
        .element_counts()
        .into_iter()
        .map(|(symbol, count)| {
            if count > 1 {
                format!("{}{}", symbol, count)
            } else {
                symbol
            }
        })
        .collect();
    let multiplicity = multiplicity_name(multiplicity)
        .ok_or(MoleculeError::UnsupportedMultiplicity(multiplicity))?;

    let mut name = format!("{}_{}_{}", formula, basis, multiplicity);
    if charge > 0 {
        name.push_str(&format!("_{}+", charge));
    } else if charge < 0 {
        name.push_str(&format!("_{}-", charge.unsigned_abs()));
    }
    if !description.is_empty() {
        name.push('_');
        name.push_str(description);
    }
    Ok(name)
}

/// A molecule and the scalar results of electronic-structure runs on it.
#[derive(Debug, Clone, PartialEq)]
pub struct MolecularData {
    /// Atoms and coordinates in Angstrom
    pub geometry: Geometry,
    /// Basis set name, e.g. `sto-3g`
    pub basis: String,
    /// Net charge
    pub charge: i32,
    /// Spin multiplicity 2S+1
    pub multiplicity: u32,
    /// Free-text description appended to the name
    pub description: String,
    /// Derived name, see [`name_molecule`]
    pub name: String,
    /// Data directory joined with the name; every job file derives from it
    pub filename: String,
    /// Hartree-Fock energy
    pub hf_energy: Option<f64>,
    /// MP2 energy
    pub mp2_energy: Option<f64>,
    /// CISD energy
    pub cisd_energy: Option<f64>,
    /// CCSD energy
    pub ccsd_energy: Option<f64>,
    /// FCI energy
    pub fci_energy: Option<f64>,
    /// Nuclear repulsion energy
    pub nuclear_repulsion: Option<f64>,
    /// Number of spatial molecular orbitals
    pub n_orbitals: Option<usize>,
    /// Number of alpha electrons
    pub n_alpha_electrons: Option<usize>,
    /// Number of beta electrons
    pub n_beta_electrons: Option<usize>,
}

impl MolecularData {
    /// Creates a molecule record with no computed results.
    ///
    /// `data_directory` is prepended to the derived name to form the filename;
    /// `None` keeps files in the current directory.
    pub fn new(
        geometry: Geometry,
        basis: &str,
        multiplicity: u32,
        charge: i32,
        description: &str,
        data_directory: Option<&Path>,
    ) -> Result<Self, MoleculeError> {
        let name = name_molecule(&geometry, basis, multiplicity, charge, description)?;
        let filename = match data_directory {
            Some(dir) => dir.join(&name).to_string_lossy().into_owned(),
            None => name.clone(),
        };
        Ok(Self {
            geometry,
            basis: basis.to_string(),
            charge,
            multiplicity,
            description: description.to_string(),
            name,
            filename,
            hf_energy: None,
            mp2_energy: None,
            cisd_energy: None,
            ccsd_energy: None,
            fci_energy: None,
            nuclear_repulsion: None,
            n_orbitals: None,
            n_alpha_electrons: None,
            n_beta_electrons: None,
        })
    }

    /// File names derived from [`Self::filename`].
    pub fn naming(&self) -> FileNaming {
        FileNaming::new(self.filename.clone())
    }

    /// Number of spin orbitals, when the orbital count is known.
    pub fn n_spin_orbitals(&self) -> Option<usize> {
        self.n_orbitals.map(|n| 2 * n)
    }

    /// True when every requested method already has an energy on record.
    pub fn has_results_for(&self, options: &CalculationOptions) -> bool {
        (!options.run_scf || self.hf_energy.is_some())
            && (!options.run_mp2 || self.mp2_energy.is_some())
            && (!options.run_cisd || self.cisd_energy.is_some())
            && (!options.run_ccsd || self.ccsd_energy.is_some())
            && (!options.run_fci || self.fci_energy.is_some())
    }

    /// Copy with the results a run under `options` will recompute removed.
    ///
    /// Energies of the requested methods are cleared, as are the SCF-derived
    /// counts because SCF runs every time. Energies of other methods stay.
    pub fn without_results_for(&self, options: &CalculationOptions) -> MolecularData {
        let clear = |requested: bool, value: Option<f64>| value.filter(|_| !requested);
        MolecularData {
            hf_energy: clear(options.run_scf, self.hf_energy),
            mp2_energy: clear(options.run_mp2, self.mp2_energy),
            cisd_energy: clear(options.run_cisd, self.cisd_energy),
            ccsd_energy: clear(options.run_ccsd, self.ccsd_energy),
            fci_energy: clear(options.run_fci, self.fci_energy),
            nuclear_repulsion: None,
            n_orbitals: None,
            n_alpha_electrons: None,
            n_beta_electrons: None,
            ..self.clone()
        }
    }
}

/// Energies computed by one run, restricted to the methods that were requested.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ComputedEnergies {
    /// SCF energy
    pub hf: Option<f64>,
    /// MP2 energy
    pub mp2: Option<f64>,
    /// CISD energy
    pub cisd: Option<f64>,
    /// CCSD energy
    pub ccsd: Option<f64>,
    /// FCI energy
    pub fci: Option<f64>,
}

impl ComputedEnergies {
    /// Picks the requested energies out of a reloaded molecule.
    pub fn requested(molecule: &MolecularData, options: &CalculationOptions) -> Self {
        let pick = |requested: bool, value: Option<f64>| value.filter(|_| requested);
        Self {
            hf: pick(options.run_scf, molecule.hf_energy),
            mp2: pick(options.run_mp2, molecule.mp2_energy),
            cisd: pick(options.run_cisd, molecule.cisd_energy),
            ccsd: pick(options.run_ccsd, molecule.ccsd_energy),
            fci: pick(options.run_fci, molecule.fci_energy),
        }
    }

    /// `(label, energy)` pairs for the energies that are present.
    pub fn entries(&self) -> Vec<(&'static str, f64)> {
        [
            ("SCF", self.hf),
            ("MP2", self.mp2),
            ("CISD", self.cisd),
            ("CCSD", self.ccsd),
            ("FCI", self.fci),
        ]
        .into_iter()
        .filter_map(|(label, energy)| energy.map(|e| (label, e)))
        .collect()
    }

    /// True when no energy was produced.
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// On-disk layout of a molecule record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoleculeRecord {
    geometry: SerializableGeometry,
    basis: String,
    charge: i32,
    multiplicity: u32,
    #[serde(default)]
    description: String,
    #[serde(default)]
    hf_energy: Option<f64>,
    #[serde(default)]
    mp2_energy: Option<f64>,
    #[serde(default)]
    cisd_energy: Option<f64>,
    #[serde(default)]
    ccsd_energy: Option<f64>,
    #[serde(default)]
    fci_energy: Option<f64>,
    #[serde(default)]
    nuclear_repulsion: Option<f64>,
    #[serde(default)]
    n_orbitals: Option<usize>,
    #[serde(default)]
    n_alpha_electrons: Option<usize>,
    #[serde(default)]
    n_beta_electrons: Option<usize>,
}

impl From<&MolecularData> for MoleculeRecord {
    fn from(molecule: &MolecularData) -> Self {
        Self {
            geometry: (&molecule.geometry).into(),
            basis: molecule.basis.clone(),
            charge: molecule.charge,
            multiplicity: molecule.multiplicity,
            description: molecule.description.clone(),
            hf_energy: molecule.hf_energy,
            mp2_energy: molecule.mp2_energy,
            cisd_energy: molecule.cisd_energy,
            ccsd_energy: molecule.ccsd_energy,
            fci_energy: molecule.fci_energy,
            nuclear_repulsion: molecule.nuclear_repulsion,
            n_orbitals: molecule.n_orbitals,
            n_alpha_electrons: molecule.n_alpha_electrons,
            n_beta_electrons: molecule.n_beta_electrons,
        }
    }
}

impl MoleculeRecord {
    /// Applies the record to `molecule`, keeping its name and filename.
    pub fn apply_to(self, molecule: &MolecularData) -> MolecularData {
        MolecularData {
            geometry: self.geometry.into(),
            basis: self.basis,
            charge: self.charge,
            multiplicity: self.multiplicity,
            description: self.description,
            name: molecule.name.clone(),
            filename: molecule.filename.clone(),
            hf_energy: self.hf_energy,
            mp2_energy: self.mp2_energy,
            cisd_energy: self.cisd_energy,
            ccsd_energy: self.ccsd_energy,
            fci_energy: self.fci_energy,
            nuclear_repulsion: self.nuclear_repulsion,
            n_orbitals: self.n_orbitals,
            n_alpha_electrons: self.n_alpha_electrons,
            n_beta_electrons: self.n_beta_electrons,
        }
    }
}

/// Persistence collaborator for molecule records.
///
/// The runner only ever calls [`MoleculeStore::load`] after Psi4 exits; callers
/// use [`MoleculeStore::save`] to persist what they got back.
pub trait MoleculeStore {
    /// Re-reads the persisted state of `molecule`.
    fn load(&self, molecule: &MolecularData) -> Result<MolecularData, StoreError>;

    /// Persists `molecule`.
    fn save(&self, molecule: &MolecularData) -> Result<(), StoreError>;
}

/// Stores each molecule as pretty-printed JSON at `<filename>.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMoleculeStore;

impl MoleculeStore for JsonMoleculeStore {
    fn load(&self, molecule: &MolecularData) -> Result<MolecularData, StoreError> {
        let content = fs::read_to_string(molecule.naming().record())?;
        let record: MoleculeRecord = serde_json::from_str(&content)?;
        Ok(record.apply_to(molecule))
    }

    fn save(&self, molecule: &MolecularData) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&MoleculeRecord::from(molecule))?;
        fs::write(molecule.naming().record(), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn h2() -> Geometry {
        Geometry::from_atoms(vec![("H", [0.0, 0.0, 0.0]), ("H", [0.0, 0.0, 0.7414])])
    }

    #[test]
    fn test_name_molecule() {
        let name = name_molecule(&h2(), "sto-3g", 1, 0, "0.7414").unwrap();
        assert_eq!(name, "H2_sto-3g_singlet_0.7414");

        let lih = Geometry::from_atoms(vec![("Li", [0.0, 0.0, 0.0]), ("H", [0.0, 0.0, 1.45])]);
        assert_eq!(name_molecule(&lih, "sto-3g", 1, 0, "").unwrap(), "LiH_sto-3g_singlet");
        assert_eq!(name_molecule(&lih, "6-31g", 2, 1, "").unwrap(), "LiH_6-31g_doublet_1+");
        assert_eq!(name_molecule(&lih, "6-31g", 2, -1, "x").unwrap(), "LiH_6-31g_doublet_1-_x");
    }

    #[test]
    fn test_name_molecule_rejects_unknown_multiplicity() {
        assert!(matches!(
            name_molecule(&h2(), "sto-3g", 0, 0, ""),
            Err(MoleculeError::UnsupportedMultiplicity(0))
        ));
        assert!(matches!(
            name_molecule(&h2(), "sto-3g", 13, 0, ""),
            Err(MoleculeError::UnsupportedMultiplicity(13))
        ));
    }

    #[test]
    fn test_filename_includes_data_directory() {
        let molecule =
            MolecularData::new(h2(), "sto-3g", 1, 0, "0.7414", Some(Path::new("data"))).unwrap();
        assert_eq!(molecule.name, "H2_sto-3g_singlet_0.7414");
        assert_eq!(
            Path::new(&molecule.filename),
            Path::new("data").join("H2_sto-3g_singlet_0.7414")
        );
    }

    #[test]
    fn test_json_store_round_trip_keeps_name() {
        let temp_dir = TempDir::new().unwrap();
        let mut molecule =
            MolecularData::new(h2(), "sto-3g", 1, 0, "0.7414", Some(temp_dir.path())).unwrap();
        molecule.hf_energy = Some(-1.116684387);
        molecule.n_orbitals = Some(2);

        let store = JsonMoleculeStore;
        store.save(&molecule).unwrap();
        let loaded = store.load(&molecule).unwrap();
        assert_eq!(loaded, molecule);
        assert_eq!(loaded.n_spin_orbitals(), Some(4));
    }

    #[test]
    fn test_json_store_reads_partial_record() {
        let temp_dir = TempDir::new().unwrap();
        let molecule =
            MolecularData::new(h2(), "sto-3g", 1, 0, "", Some(temp_dir.path())).unwrap();
        fs::write(
            molecule.naming().record(),
            r#"{"geometry": [["H", [0.0, 0.0, 0.0]], ["H", [0.0, 0.0, 0.7414]]],
                "basis": "sto-3g", "charge": 0, "multiplicity": 1, "fci_energy": -1.137}"#,
        )
        .unwrap();

        let loaded = JsonMoleculeStore.load(&molecule).unwrap();
        assert_eq!(loaded.fci_energy, Some(-1.137));
        assert_eq!(loaded.hf_energy, None);
        assert_eq!(loaded.filename, molecule.filename);
    }

    #[test]
    fn test_json_store_missing_record_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let molecule =
            MolecularData::new(h2(), "sto-3g", 1, 0, "", Some(temp_dir.path())).unwrap();
        assert!(matches!(
            JsonMoleculeStore.load(&molecule),
            Err(StoreError::Io(_))
        ));
    }

    #[test]
    fn test_computed_energies_only_requested() {
        let mut molecule = MolecularData::new(h2(), "sto-3g", 1, 0, "", None).unwrap();
        molecule.hf_energy = Some(-1.11);
        molecule.fci_energy = Some(-1.13);
        let options = CalculationOptions {
            run_fci: true,
            ..CalculationOptions::default()
        };
        let energies = ComputedEnergies::requested(&molecule, &options);
        assert_eq!(energies.hf, Some(-1.11));
        assert_eq!(energies.fci, Some(-1.13));
        assert_eq!(energies.entries(), vec![("SCF", -1.11), ("FCI", -1.13)]);
        assert!(molecule.has_results_for(&options));

        let options = CalculationOptions {
            run_ccsd: true,
            ..options
        };
        assert!(!molecule.has_results_for(&options));
    }

    #[test]
    fn test_without_results_for_keeps_other_methods() {
        let mut molecule = MolecularData::new(h2(), "sto-3g", 1, 0, "", None).unwrap();
        molecule.hf_energy = Some(-1.11);
        molecule.mp2_energy = Some(-1.12);
        molecule.cisd_energy = Some(-1.13);
        molecule.n_orbitals = Some(2);
        let options = CalculationOptions {
            run_mp2: true,
            ..CalculationOptions::default()
        };

        let cleared = molecule.without_results_for(&options);
        assert_eq!(cleared.hf_energy, None);
        assert_eq!(cleared.mp2_energy, None);
        assert_eq!(cleared.cisd_energy, Some(-1.13));
        assert_eq!(cleared.n_orbitals, None);
        assert_eq!(cleared.name, molecule.name);
        assert!(ComputedEnergies::requested(&cleared, &options).is_empty());
    }
}
