//! Running Psi4 on a molecule.
//!
//! A run has three stages, mirrored by the [`QMInterface`] trait:
//!
//! - write the input deck from a template,
//! - execute `psi4 <input> <output>` and wait for it,
//! - reload the molecule record that the deck wrote.
//!
//! [`Psi4Interface::run_psi4`] chains them, always cleans up after the
//! process step, and reports how far it got in a [`RunOutcome`].
//!
//! # Usage Pattern
//!
//! ```no_run
//! use psi4_bridge::config::CalculationOptions;
//! use psi4_bridge::geometry::Geometry;
//! use psi4_bridge::molecule::MolecularData;
//! use psi4_bridge::qm_interface::Psi4Interface;
//!
//! let geometry = Geometry::from_atoms(vec![("H", [0.0, 0.0, 0.0]), ("H", [0.0, 0.0, 0.7414])]);
//! let molecule = MolecularData::new(geometry, "sto-3g", 1, 0, "0.7414", None)?;
//! let options = CalculationOptions { run_fci: true, ..Default::default() };
//!
//! let outcome = Psi4Interface::new("psi4").run_psi4(&molecule, &options)?;
//! println!("FCI energy: {:?}", outcome.energies.fci);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Error Handling
//!
//! - Template problems are always fatal.
//! - A Psi4 process that cannot be started, cannot be waited on, or exits
//!   non-zero is a [`QMError::Calculation`]. With `tolerate_error` it is
//!   logged and recorded as [`RunStatus::ProcessFailed`] instead.
//! - A record that cannot be reloaded is never fatal: the molecule comes back
//!   unchanged and the outcome says [`RunStatus::NoResults`].

use crate::amplitudes::{self, AmplitudeError, CcsdAmplitudes};
use crate::cleanup::{CleanupConfig, CleanupManager};
use crate::config::CalculationOptions;
use crate::molecule::{ComputedEnergies, JsonMoleculeStore, MolecularData, MoleculeStore, StoreError};
use crate::naming::FileNaming;
use crate::rdm::{self, RdmError, SpinOrbitalRdms};
use crate::template::{self, TemplateError};
use log::{debug, info, warn};
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Error type for QM interface operations.
#[derive(Error, Debug)]
pub enum QMError {
    /// File system or I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Psi4 could not be run or exited with an error
    #[error("Psi4 calculation failed: {0}")]
    Calculation(String),
    /// Input deck could not be produced
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
    /// Molecule lacks data needed to interpret the output
    #[error("Parse error: {0}")]
    Parse(String),
    /// Molecule record could not be loaded
    #[error("Record error: {0}")]
    Store(#[from] StoreError),
    /// Coupled-cluster amplitudes could not be read
    #[error(transparent)]
    Amplitudes(#[from] AmplitudeError),
    /// Density matrices could not be read
    #[error(transparent)]
    Rdm(#[from] RdmError),
}

/// Type alias for QM operation results
type Result<T> = std::result::Result<T, QMError>;

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// Psi4 exited cleanly and the record was reloaded
    Completed,
    /// Psi4 failed and `tolerate_error` was set
    ProcessFailed(String),
    /// Psi4 exited cleanly but no record could be reloaded
    NoResults(String),
}

/// Result of [`Psi4Interface::run_psi4`].
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Reloaded molecule, or the input molecule when nothing was reloaded
    pub molecule: MolecularData,
    /// Energies of the requested methods found in the reloaded record
    pub energies: ComputedEnergies,
    /// How the run ended
    pub status: RunStatus,
}

impl RunOutcome {
    /// True for [`RunStatus::Completed`].
    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// The three stages of a quantum chemistry run.
pub trait QMInterface {
    /// Writes the input deck for `molecule` and returns its path.
    fn write_input(&self, molecule: &MolecularData, options: &CalculationOptions)
        -> Result<PathBuf>;

    /// Runs the program on `input_path`, writing its transcript to `output_path`.
    ///
    /// Blocks until the process exits. There is no timeout.
    fn run_calculation(&self, input_path: &Path, output_path: &Path) -> Result<()>;

    /// Loads what the run persisted for `molecule`.
    fn read_output(&self, molecule: &MolecularData) -> Result<MolecularData>;
}

/// Psi4 driver.
///
/// Psi4 runs with `run_directory` as its working directory, which is where it
/// leaves its `*.clean` and `timer.dat` files. Two drivers targeting the same
/// molecule filename at the same time will overwrite each other's files.
#[derive(Debug, Clone)]
pub struct Psi4Interface<S = JsonMoleculeStore> {
    command: String,
    run_directory: Option<PathBuf>,
    store: S,
    cleanup_verbose: u32,
}

impl Psi4Interface<JsonMoleculeStore> {
    /// Creates a driver invoking `command`, storing records as JSON.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            run_directory: None,
            store: JsonMoleculeStore,
            cleanup_verbose: 1,
        }
    }
}

impl<S: MoleculeStore> Psi4Interface<S> {
    /// Runs Psi4 in `dir`; relative molecule filenames resolve against it.
    pub fn with_run_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.run_directory = Some(dir.into());
        self
    }

    /// Replaces the molecule store.
    pub fn with_store<T: MoleculeStore>(self, store: T) -> Psi4Interface<T> {
        Psi4Interface {
            command: self.command,
            run_directory: self.run_directory,
            store,
            cleanup_verbose: self.cleanup_verbose,
        }
    }

    /// Sets cleanup log verbosity (0 = quiet, 2 = every file).
    pub fn with_cleanup_verbosity(mut self, verbose: u32) -> Self {
        self.cleanup_verbose = verbose;
        self
    }

    /// Psi4 executable.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The molecule store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn working_directory(&self) -> PathBuf {
        self.run_directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// The molecule as the run sees it: with a run directory set, a relative
    /// filename becomes an absolute path inside that directory.
    fn resolve(&self, molecule: &MolecularData) -> Result<MolecularData> {
        let mut job = molecule.clone();
        if let Some(dir) = &self.run_directory {
            let path = absolute(&dir.join(&molecule.filename))?;
            job.filename = path.to_string_lossy().into_owned();
        }
        Ok(job)
    }

    fn clean_up(&self, naming: &FileNaming, options: &CalculationOptions) {
        let manager =
            CleanupManager::new(CleanupConfig::from_options(options, self.cleanup_verbose));
        if let Err(e) = manager.clean_up(&self.working_directory(), &naming.input(), &naming.output())
        {
            warn!("Cleanup after Psi4 run failed: {}", e);
        }
    }

    /// Removes from the stored record what the coming run recomputes, so
    /// values from an earlier run are never reported as new.
    fn clear_stale_results(&self, job: &MolecularData, options: &CalculationOptions) {
        if let Ok(previous) = self.store.load(job) {
            debug!("Clearing previous results of {} for a new run", job.name);
            if let Err(e) = self.store.save(&previous.without_results_for(options)) {
                warn!("Could not clear previous results for {}: {}", job.name, e);
            }
        }
    }

    /// Renders the deck, runs Psi4, cleans up and reloads the molecule.
    ///
    /// Cleanup runs exactly once, after the process step, whether or not
    /// Psi4 succeeded. Results the run recomputes are removed from any stored
    /// record first; a record left with none of them gives
    /// [`RunStatus::NoResults`].
    pub fn run_psi4(
        &self,
        molecule: &MolecularData,
        options: &CalculationOptions,
    ) -> Result<RunOutcome> {
        let job = self.resolve(molecule)?;
        let naming = job.naming();
        self.clear_stale_results(&job, options);
        let input_path = self.write_input(&job, options)?;

        info!(
            "Running Psi4 for {} ({})",
            molecule.name,
            options.requested_methods().join(", ")
        );
        let attempt = self.run_calculation(&input_path, &naming.output());
        self.clean_up(&naming, options);

        let status = match attempt {
            Ok(()) => RunStatus::Completed,
            Err(e) if options.tolerate_error => {
                warn!("Psi4 calculation for {} has failed: {}", molecule.name, e);
                RunStatus::ProcessFailed(e.to_string())
            }
            Err(e) => return Err(e),
        };

        match self.read_output(&job) {
            Ok(loaded) => {
                let updated = MolecularData {
                    filename: molecule.filename.clone(),
                    ..loaded
                };
                let energies = ComputedEnergies::requested(&updated, options);
                let status = match status {
                    RunStatus::Completed if energies.is_empty() && updated.n_orbitals.is_none() => {
                        warn!("Psi4 recorded no results for {}", molecule.name);
                        RunStatus::NoResults("record holds no results from this run".to_string())
                    }
                    other => other,
                };
                Ok(RunOutcome {
                    molecule: updated,
                    energies,
                    status,
                })
            }
            Err(e) => {
                warn!(
                    "No calculation saved for {}. Psi4 segmentation fault possible. ({})",
                    molecule.name, e
                );
                let status = match status {
                    RunStatus::Completed => RunStatus::NoResults(e.to_string()),
                    failed => failed,
                };
                Ok(RunOutcome {
                    molecule: molecule.clone(),
                    energies: ComputedEnergies::default(),
                    status,
                })
            }
        }
    }

    /// Parses the CCSD amplitudes from the molecule's output transcript.
    ///
    /// Needs the orbital and electron counts, which the bundled template
    /// records after the SCF step.
    pub fn read_ccsd_amplitudes(&self, molecule: &MolecularData) -> Result<CcsdAmplitudes> {
        let (n_orbitals, n_alpha, n_beta) = match (
            molecule.n_orbitals,
            molecule.n_alpha_electrons,
            molecule.n_beta_electrons,
        ) {
            (Some(n), Some(a), Some(b)) => (n, a, b),
            _ => {
                return Err(QMError::Parse(format!(
                    "{} has no orbital or electron counts; run SCF first",
                    molecule.name
                )))
            }
        };
        let job = self.resolve(molecule)?;
        let amplitudes =
            amplitudes::read_ccsd_amplitudes(&job.naming().output(), 2 * n_orbitals, n_alpha, n_beta)?;
        Ok(amplitudes)
    }

    /// Loads and unpacks the FCI density matrices written for the molecule.
    pub fn read_fci_rdms(&self, molecule: &MolecularData) -> Result<SpinOrbitalRdms> {
        let job = self.resolve(molecule)?;
        let compact = rdm::load_compact_rdms(&job.naming().fci_rdm())?;
        Ok(compact.unpack()?)
    }
}

impl<S: MoleculeStore> QMInterface for Psi4Interface<S> {
    fn write_input(
        &self,
        molecule: &MolecularData,
        options: &CalculationOptions,
    ) -> Result<PathBuf> {
        Ok(template::render_input(molecule, options)?)
    }

    fn run_calculation(&self, input_path: &Path, output_path: &Path) -> Result<()> {
        let input = absolute(input_path)?;
        let output = absolute(output_path)?;

        let mut command = Command::new(&self.command);
        command.arg(&input).arg(&output);
        if let Some(dir) = &self.run_directory {
            command.current_dir(dir);
        }
        debug!("Executing {:?}", command);

        let mut child = command
            .spawn()
            .map_err(|e| QMError::Calculation(format!("failed to start {}: {}", self.command, e)))?;

        match child.wait() {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(QMError::Calculation(format!(
                "{} exited with {}",
                self.command, status
            ))),
            Err(e) => {
                let _ = child.kill();
                Err(QMError::Calculation(format!(
                    "failed waiting for {}: {}",
                    self.command, e
                )))
            }
        }
    }

    fn read_output(&self, molecule: &MolecularData) -> Result<MolecularData> {
        Ok(self.store.load(molecule)?)
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use std::cell::RefCell;
    use tempfile::TempDir;

    struct RecordingStore {
        loads: RefCell<Vec<String>>,
    }

    impl MoleculeStore for RecordingStore {
        fn load(&self, molecule: &MolecularData) -> std::result::Result<MolecularData, StoreError> {
            self.loads.borrow_mut().push(molecule.filename.clone());
            let mut loaded = molecule.clone();
            loaded.hf_energy = Some(-1.0);
            Ok(loaded)
        }

        fn save(&self, _molecule: &MolecularData) -> std::result::Result<(), StoreError> {
            Ok(())
        }
    }

    fn h2() -> MolecularData {
        let geometry = Geometry::from_atoms(vec![("H", [0.0, 0.0, 0.0]), ("H", [0.0, 0.0, 0.7414])]);
        MolecularData::new(geometry, "sto-3g", 1, 0, "0.7414", None).unwrap()
    }

    #[test]
    fn test_relative_filename_resolves_against_run_directory() {
        let temp_dir = TempDir::new().unwrap();
        let interface = Psi4Interface::new("psi4").with_run_directory(temp_dir.path());
        let job = interface.resolve(&h2()).unwrap();
        assert_eq!(
            PathBuf::from(&job.filename),
            temp_dir.path().join("H2_sto-3g_singlet_0.7414")
        );
    }

    #[test]
    fn test_filename_untouched_without_run_directory() {
        let job = Psi4Interface::new("psi4").resolve(&h2()).unwrap();
        assert_eq!(job.filename, "H2_sto-3g_singlet_0.7414");
    }

    #[cfg(unix)]
    #[test]
    fn test_custom_store_sees_resolved_filename() {
        let temp_dir = TempDir::new().unwrap();
        let interface = Psi4Interface::new("true")
            .with_run_directory(temp_dir.path())
            .with_store(RecordingStore {
                loads: RefCell::new(Vec::new()),
            });
        let molecule = h2();
        let outcome = interface
            .run_psi4(&molecule, &CalculationOptions::default())
            .unwrap();

        assert!(outcome.is_complete());
        assert_eq!(outcome.energies.hf, Some(-1.0));
        assert_eq!(outcome.molecule.filename, molecule.filename);
        let loads = interface.store().loads.borrow();
        // once to clear stale results, once to reload
        assert_eq!(loads.len(), 2);
        assert!(loads
            .iter()
            .all(|f| f.starts_with(&*temp_dir.path().to_string_lossy())));
    }

    #[test]
    fn test_amplitudes_need_orbital_counts() {
        let result = Psi4Interface::new("psi4").read_ccsd_amplitudes(&h2());
        assert!(matches!(result, Err(QMError::Parse(_))));
    }
}
