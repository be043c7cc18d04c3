//! Calculation options and job configuration.
//!
//! - [`CalculationOptions`]: which methods Psi4 runs and how the run is
//!   housekept. Immutable for the duration of one run.
//! - [`JobConfig`]: everything a job file describes, i.e. the molecule plus
//!   the options and where Psi4 lives.
//!
//! Both are usually produced by [`parser::parse_job_file`](crate::parser::parse_job_file)
//! on top of the defaults from [`settings`](crate::settings).

use crate::geometry::Geometry;
use crate::molecule::{MolecularData, MoleculeError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default Psi4 memory in megabytes.
pub const DEFAULT_MEMORY_MB: u64 = 8000;
/// Default Psi4 executable.
pub const DEFAULT_PSI4_COMMAND: &str = "psi4";

/// Flags controlling one Psi4 run.
///
/// # Defaults
///
/// | Option | Default |
/// |--------|---------|
/// | `run_scf` | `true` |
/// | `run_mp2`, `run_cisd`, `run_ccsd`, `run_fci` | `false` |
/// | `verbose` | `false` |
/// | `tolerate_error` | `false` |
/// | `delete_input` | `true` |
/// | `delete_output` | `false` |
/// | `memory` | 8000 MB |
/// | `template_file` | bundled template |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationOptions {
    /// Run Hartree-Fock
    pub run_scf: bool,
    /// Run MP2
    pub run_mp2: bool,
    /// Run CISD
    pub run_cisd: bool,
    /// Run CCSD
    pub run_ccsd: bool,
    /// Run FCI and write the compact RDMs
    pub run_fci: bool,
    /// Ask Psi4 to print progress
    pub verbose: bool,
    /// Log a failed Psi4 process instead of returning an error
    pub tolerate_error: bool,
    /// Remove the input deck after the run
    pub delete_input: bool,
    /// Remove the output transcript after the run
    pub delete_output: bool,
    /// Psi4 memory in MB
    pub memory: u64,
    /// Custom template; `None` uses the bundled one
    pub template_file: Option<PathBuf>,
}

impl Default for CalculationOptions {
    fn default() -> Self {
        Self {
            run_scf: true,
            run_mp2: false,
            run_cisd: false,
            run_ccsd: false,
            run_fci: false,
            verbose: false,
            tolerate_error: false,
            delete_input: true,
            delete_output: false,
            memory: DEFAULT_MEMORY_MB,
            template_file: None,
        }
    }
}

impl CalculationOptions {
    /// Names of the requested methods, in run order.
    pub fn requested_methods(&self) -> Vec<&'static str> {
        [
            ("scf", self.run_scf),
            ("mp2", self.run_mp2),
            ("cisd", self.run_cisd),
            ("ccsd", self.run_ccsd),
            ("fci", self.run_fci),
        ]
        .into_iter()
        .filter_map(|(name, on)| on.then_some(name))
        .collect()
    }
}

/// A complete job as read from a job file.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Molecular geometry in Angstrom
    pub geometry: Geometry,
    /// Basis set name
    pub basis: String,
    /// Net charge
    pub charge: i32,
    /// Spin multiplicity
    pub multiplicity: u32,
    /// Free-text description, part of the molecule name
    pub description: String,
    /// Run options
    pub options: CalculationOptions,
    /// Psi4 executable
    pub psi4_command: String,
    /// Directory for the molecule files; `None` means the working directory
    pub data_directory: Option<PathBuf>,
}

impl JobConfig {
    /// Builds the molecule record this job runs on.
    pub fn molecule(&self) -> Result<MolecularData, MoleculeError> {
        MolecularData::new(
            self.geometry.clone(),
            &self.basis,
            self.multiplicity,
            self.charge,
            &self.description,
            self.data_directory.as_deref(),
        )
    }
}
