//! Job file parsing.
//!
//! A job file describes one Psi4 run: the molecule and the calculation
//! options. Geometry goes between `*geom` and `*`, everything else is
//! `key = value`:
//!
//! ```text
//! # H2 at the equilibrium bond length
//! *geom
//! H  0.0  0.0  0.0
//! H  0.0  0.0  0.7414
//! *
//!
//! basis = sto-3g
//! charge = 0
//! multiplicity = 1
//! description = 0.7414
//! run_fci = true
//! tolerate_error = true
//! ```
//!
//! The geometry block may instead reference a file, `@water.xyz` or
//! `@water.sdf`. Options not given in the job file keep the values from the
//! loaded [`Settings`].
//!
//! # Recognised keys
//!
//! | Key | Value |
//! |-----|-------|
//! | `basis` | basis set name (required) |
//! | `charge` | integer, default 0 |
//! | `multiplicity` / `mult` | integer, default 1 |
//! | `description` | free text, default empty |
//! | `run_scf`, `run_mp2`, `run_cisd`, `run_ccsd`, `run_fci` | boolean |
//! | `verbose`, `tolerate_error`, `delete_input`, `delete_output` | boolean |
//! | `memory` | MB |
//! | `template_file` | path to a custom input template |
//! | `psi4_command` | Psi4 executable |
//! | `data_directory` | directory for the molecule files |
//!
//! Booleans accept `true`/`false`, `yes`/`no` and `1`/`0`.

use crate::config::JobConfig;
use crate::geometry::Geometry;
use crate::pubchem::{parse_program_geometry, CompoundRecord};
use crate::settings::Settings;
use lazy_static::lazy_static;
use log::warn;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for parsing operations.
#[derive(Error, Debug)]
pub enum ParseError {
    /// I/O error when reading files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Parse error with descriptive message
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Type alias for parse operation results
type Result<T> = std::result::Result<T, ParseError>;

lazy_static! {
    static ref GEOM_RE: Regex = Regex::new(r"^\s*([A-Za-z]{1,3})\s+(-?\d+\.?\d*)").unwrap();
}

/// Parses a boolean option value.
pub fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(ParseError::Parse(format!(
            "Invalid boolean for {}: {}",
            key, value
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ParseError::Parse(format!("Invalid value for {}: {}", key, value)))
}

/// Parses a job file on top of `settings`.
pub fn parse_job_file(path: &Path, settings: &Settings) -> Result<JobConfig> {
    let content = fs::read_to_string(path)?;
    parse_job(&content, settings)
}

/// Parses job file text on top of `settings`.
pub fn parse_job(content: &str, settings: &Settings) -> Result<JobConfig> {
    let mut options = settings.calculation_options();
    let mut psi4_command = settings.psi4.command.clone();
    let mut data_directory = settings.storage.data_directory.clone();
    let mut basis: Option<String> = None;
    let mut charge = 0;
    let mut multiplicity = 1;
    let mut description = String::new();

    let mut elements = Vec::new();
    let mut coords = Vec::new();
    let mut external: Option<Geometry> = None;
    let mut in_geom = false;

    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with('#') || trimmed.is_empty() {
            continue;
        }

        let lowered = trimmed.to_lowercase();
        if lowered == "*geom" {
            in_geom = true;
            continue;
        } else if trimmed == "*" {
            in_geom = false;
            continue;
        }

        if in_geom {
            if let Some(filename) = trimmed.strip_prefix('@') {
                external = Some(read_external_geometry(Path::new(filename.trim()))?);
            } else if GEOM_RE.is_match(trimmed) {
                let parts: Vec<&str> = trimmed.split_whitespace().collect();
                if parts.len() < 4 {
                    return Err(ParseError::Parse(format!(
                        "Line {}: expected symbol and three coordinates",
                        index + 1
                    )));
                }
                elements.push(parts[0].to_string());
                for part in &parts[1..4] {
                    coords.push(parse_number::<f64>("coordinate", part)?);
                }
            } else {
                return Err(ParseError::Parse(format!(
                    "Line {}: invalid geometry line '{}'",
                    index + 1,
                    trimmed
                )));
            }
            continue;
        }

        let Some((key, value)) = trimmed.split_once('=') else {
            warn!("Ignoring line {} of job file: {}", index + 1, trimmed);
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = strip_inline_comment(value).trim();

        match key.as_str() {
            "basis" => basis = Some(value.to_string()),
            "charge" => charge = parse_number(&key, value)?,
            "multiplicity" | "mult" => multiplicity = parse_number(&key, value)?,
            "description" => description = value.to_string(),
            "run_scf" => options.run_scf = parse_bool(&key, value)?,
            "run_mp2" => options.run_mp2 = parse_bool(&key, value)?,
            "run_cisd" => options.run_cisd = parse_bool(&key, value)?,
            "run_ccsd" => options.run_ccsd = parse_bool(&key, value)?,
            "run_fci" => options.run_fci = parse_bool(&key, value)?,
            "verbose" => options.verbose = parse_bool(&key, value)?,
            "tolerate_error" => options.tolerate_error = parse_bool(&key, value)?,
            "delete_input" => options.delete_input = parse_bool(&key, value)?,
            "delete_output" => options.delete_output = parse_bool(&key, value)?,
            "memory" => options.memory = parse_number(&key, value)?,
            "template_file" => options.template_file = Some(PathBuf::from(value)),
            "psi4_command" => psi4_command = value.to_string(),
            "data_directory" => data_directory = Some(PathBuf::from(value)),
            _ => warn!("Unknown job file key '{}' ignored", key),
        }
    }

    let geometry = match external {
        Some(geometry) => geometry,
        None => Geometry::new(elements, coords),
    };
    if geometry.num_atoms == 0 {
        return Err(ParseError::Parse("Job file has no geometry".into()));
    }
    let basis = basis
        .filter(|b| !b.is_empty())
        .ok_or_else(|| ParseError::Parse("Job file does not set a basis".into()))?;

    Ok(JobConfig {
        geometry,
        basis,
        charge,
        multiplicity,
        description,
        options,
        psi4_command,
        data_directory,
    })
}

fn strip_inline_comment(value: &str) -> &str {
    match value.find(" #") {
        Some(pos) => &value[..pos],
        None => value,
    }
}

/// An XYZ file is a program-layout block: atom count, comment, then
/// `label x y z` lines.
fn read_geom_from_xyz(path: &Path) -> Result<Geometry> {
    let content = fs::read_to_string(path)?;
    let n_atoms: usize = content
        .lines()
        .next()
        .and_then(|line| line.trim().parse().ok())
        .ok_or_else(|| {
            ParseError::Parse(format!("{}: first line must be the atom count", path.display()))
        })?;
    parse_program_geometry(&content, n_atoms)
        .map_err(|e| ParseError::Parse(format!("{}: {}", path.display(), e)))
}

fn read_geom_from_sdf(path: &Path) -> Result<Geometry> {
    let content = fs::read_to_string(path)?;
    CompoundRecord::from_sdf(&content)
        .and_then(|record| record.geometry())
        .map_err(|e| ParseError::Parse(format!("{}: {}", path.display(), e)))
}

/// Reads a geometry from an `.xyz` or `.sdf` file.
pub fn read_external_geometry(path: &Path) -> Result<Geometry> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();
    let geometry = match extension.as_str() {
        "xyz" => read_geom_from_xyz(path)?,
        "sdf" | "mol" => read_geom_from_sdf(path)?,
        _ => {
            return Err(ParseError::Parse(format!(
                "Unsupported external geometry file format: {}",
                path.display()
            )))
        }
    };
    if geometry.num_atoms == 0 {
        return Err(ParseError::Parse(format!(
            "No atoms found in {}",
            path.display()
        )));
    }
    Ok(geometry)
}
