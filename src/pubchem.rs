//! Geometry blocks and compound lookup by name.
//!
//! Two textual geometry layouts show up when pulling structures from outside:
//!
//! - program layout, `label x y z` per atom (Psi4 molecule strings, XYZ files),
//! - table layout, `x y z label` per atom (MDL molfile atom blocks).
//!
//! Both parsers skip exactly two header lines and then read exactly
//! `n_atoms` atom lines. Element labels are normalised to title case
//! (`CL` → `Cl`). A block that ends early is an error rather than a shorter
//! geometry.
//!
//! [`lookup_geometry`] asks a [`CompoundSource`] for a 3-D record first and
//! falls back to a 2-D record. With the `pubchem` feature, [`PubChemClient`]
//! is a source backed by the PubChem REST service.

use crate::geometry::Geometry;
use log::{info, warn};
use std::fmt;
use thiserror::Error;

/// Geometry block errors.
#[derive(Error, Debug, PartialEq)]
pub enum GeometryError {
    /// Block does not match the expected layout
    #[error("Invalid geometry block at line {line}: {message}")]
    Format {
        /// 1-based line number within the block
        line: usize,
        /// What was wrong
        message: String,
    },
}

/// Errors a [`CompoundSource`] can report.
#[derive(Error, Debug)]
pub enum LookupError {
    /// Transport or service failure
    #[error("Compound service error: {0}")]
    Http(String),
    /// Record received but not understood
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

#[cfg(feature = "pubchem")]
impl From<reqwest::Error> for LookupError {
    fn from(e: reqwest::Error) -> Self {
        LookupError::Http(e.to_string())
    }
}

const HEADER_LINES: usize = 2;

/// Column order of an atom line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryLayout {
    /// `label x y z`
    Program,
    /// `x y z label`
    Table,
}

fn title_case(label: &str) -> String {
    let lower = label.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn parse_coordinate(token: &str, line: usize) -> Result<f64, GeometryError> {
    token.parse().map_err(|_| GeometryError::Format {
        line,
        message: format!("invalid coordinate '{}'", token),
    })
}

fn parse_block(
    block: &str,
    n_atoms: usize,
    layout: GeometryLayout,
) -> Result<Geometry, GeometryError> {
    let lines: Vec<&str> = block.lines().collect();
    if lines.len() < HEADER_LINES + n_atoms {
        return Err(GeometryError::Format {
            line: lines.len() + 1,
            message: format!(
                "expected {} atom lines after {} header lines, found {}",
                n_atoms,
                HEADER_LINES,
                lines.len().saturating_sub(HEADER_LINES)
            ),
        });
    }

    let mut atoms = Vec::with_capacity(n_atoms);
    for (offset, line) in lines[HEADER_LINES..HEADER_LINES + n_atoms].iter().enumerate() {
        let line_no = HEADER_LINES + offset + 1;
        let tokens: Vec<&str> = line.split_whitespace().take(4).collect();
        if tokens.len() < 4 {
            return Err(GeometryError::Format {
                line: line_no,
                message: format!("expected 4 columns, found {}", tokens.len()),
            });
        }
        let (label, xyz) = match layout {
            GeometryLayout::Program => (tokens[0], &tokens[1..4]),
            GeometryLayout::Table => (tokens[3], &tokens[0..3]),
        };
        let coords = [
            parse_coordinate(xyz[0], line_no)?,
            parse_coordinate(xyz[1], line_no)?,
            parse_coordinate(xyz[2], line_no)?,
        ];
        atoms.push((title_case(label), coords));
    }
    Ok(Geometry::from_atoms(atoms))
}

/// Parses `label x y z` atom lines after two header lines.
pub fn parse_program_geometry(block: &str, n_atoms: usize) -> Result<Geometry, GeometryError> {
    parse_block(block, n_atoms, GeometryLayout::Program)
}

/// Parses `x y z label` atom lines after two header lines.
pub fn parse_table_geometry(block: &str, n_atoms: usize) -> Result<Geometry, GeometryError> {
    parse_block(block, n_atoms, GeometryLayout::Table)
}

/// Kind of structure record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordDimension {
    /// Computed 3-D conformer
    ThreeD,
    /// 2-D depiction
    TwoD,
}

impl RecordDimension {
    /// Value of PubChem's `record_type` parameter.
    pub fn record_type(self) -> &'static str {
        match self {
            RecordDimension::ThreeD => "3d",
            RecordDimension::TwoD => "2d",
        }
    }
}

impl fmt::Display for RecordDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordDimension::ThreeD => write!(f, "3D"),
            RecordDimension::TwoD => write!(f, "2D"),
        }
    }
}

/// A structure record with its geometry block.
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundRecord {
    /// Number of atoms
    pub n_atoms: usize,
    /// Geometry block including its two header lines
    pub block: String,
    /// Column order of the atom lines
    pub layout: GeometryLayout,
}

impl CompoundRecord {
    /// Extracts the atom block from an MDL molfile / SDF record.
    ///
    /// The atom count comes from the counts line (4th line). The block starts
    /// two lines before the atom lines so that it parses with the table layout.
    pub fn from_sdf(sdf: &str) -> Result<Self, GeometryError> {
        let lines: Vec<&str> = sdf.lines().collect();
        let counts = lines.get(3).ok_or_else(|| GeometryError::Format {
            line: lines.len() + 1,
            message: "SDF record has no counts line".to_string(),
        })?;

        let n_atoms = counts
            .get(..3)
            .and_then(|field| field.trim().parse::<usize>().ok())
            .or_else(|| counts.split_whitespace().next()?.parse().ok())
            .ok_or_else(|| GeometryError::Format {
                line: 4,
                message: format!("invalid counts line '{}'", counts),
            })?;

        Ok(Self {
            n_atoms,
            block: lines[2..].join("\n"),
            layout: GeometryLayout::Table,
        })
    }

    /// Parses the record's geometry.
    pub fn geometry(&self) -> Result<Geometry, GeometryError> {
        parse_block(&self.block, self.n_atoms, self.layout)
    }
}

/// Something that can look up a structure record by compound name.
pub trait CompoundSource {
    /// Fetches a record; `Ok(None)` when the compound has no such record.
    fn fetch(
        &self,
        name: &str,
        dimension: RecordDimension,
    ) -> Result<Option<CompoundRecord>, LookupError>;
}

/// Result of a compound lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    /// A record was found and parsed
    Found {
        /// Parsed geometry, Angstrom
        geometry: Geometry,
        /// Which record supplied it
        dimension: RecordDimension,
    },
    /// Neither a 3-D nor a 2-D record exists
    NotFound,
    /// The source failed or returned something unusable
    Unavailable(String),
}

/// Looks a compound up by name, preferring a 3-D record over a 2-D one.
pub fn lookup_geometry<C: CompoundSource + ?Sized>(source: &C, name: &str) -> LookupOutcome {
    for dimension in [RecordDimension::ThreeD, RecordDimension::TwoD] {
        match source.fetch(name, dimension) {
            Ok(Some(record)) => {
                return match record.geometry() {
                    Ok(geometry) => {
                        info!("{} compound found for '{}'.", dimension, name);
                        LookupOutcome::Found {
                            geometry,
                            dimension,
                        }
                    }
                    Err(e) => {
                        warn!("Unusable {} record for '{}': {}", dimension, name, e);
                        LookupOutcome::Unavailable(e.to_string())
                    }
                };
            }
            Ok(None) => continue,
            Err(e) => {
                warn!("Lookup of '{}' failed: {}", name, e);
                return LookupOutcome::Unavailable(e.to_string());
            }
        }
    }
    warn!("Unable to find '{}' in the compound database.", name);
    LookupOutcome::NotFound
}

/// PubChem PUG REST base address.
pub const PUBCHEM_BASE_URL: &str = "https://pubchem.ncbi.nlm.nih.gov/rest/pug";

/// Compound source backed by PubChem.
#[cfg(feature = "pubchem")]
#[derive(Debug, Clone)]
pub struct PubChemClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[cfg(feature = "pubchem")]
impl PubChemClient {
    /// Client for the public PubChem service.
    pub fn new() -> Self {
        Self::with_base_url(PUBCHEM_BASE_URL)
    }

    /// Client for another PUG REST endpoint.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::blocking::Client::new(),
        }
    }

    fn record_url(&self, name: &str, dimension: RecordDimension) -> Result<reqwest::Url, LookupError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| LookupError::Http(format!("invalid base URL {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| LookupError::Http(format!("invalid base URL {}", self.base_url)))?
            .extend(&["compound", "name", name, "SDF"]);
        url.query_pairs_mut()
            .append_pair("record_type", dimension.record_type());
        Ok(url)
    }
}

#[cfg(feature = "pubchem")]
impl Default for PubChemClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "pubchem")]
impl CompoundSource for PubChemClient {
    fn fetch(
        &self,
        name: &str,
        dimension: RecordDimension,
    ) -> Result<Option<CompoundRecord>, LookupError> {
        let url = self.record_url(name, dimension)?;
        let response = self.client.get(url).send()?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let sdf = response.error_for_status()?.text()?;
        Ok(Some(CompoundRecord::from_sdf(&sdf)?))
    }
}
