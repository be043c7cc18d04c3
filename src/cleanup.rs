//! Cleanup of the files a Psi4 run leaves behind.
//!
//! Psi4 drops scratch bookkeeping files ending in `.clean` and a `timer.dat`
//! into its working directory. After every attempt, successful or not, the
//! runner removes those, and optionally the input deck and output transcript.
//!
//! # Configuration
//!
//! ```ini
//! [cleanup]
//! # Remove <filename>.inp after the run (default: true)
//! delete_input = true
//! # Remove <filename>.out after the run (default: false)
//! delete_output = false
//! # 0 = quiet, 1 = summary, 2 = every file
//! verbose = 1
//! ```
//!
//! Files that are already gone are not errors, so cleaning the same run twice
//! is harmless. Any other removal failure is logged and reported in the
//! [`CleanupReport`] without interrupting the run.

use crate::config::CalculationOptions;
use log::{debug, info, warn};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Suffix of Psi4 scratch bookkeeping files.
pub const HOUSEKEEPING_SUFFIX: &str = ".clean";
/// Timing file Psi4 writes into its working directory.
pub const TIMER_FILE: &str = "timer.dat";

/// Errors that can occur during cleanup operations.
#[derive(Error, Debug)]
pub enum CleanupError {
    /// I/O error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid path error
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Result type for cleanup operations
pub type Result<T> = std::result::Result<T, CleanupError>;

/// Configuration for cleanup operations.
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Remove the input deck
    pub delete_input: bool,
    /// Remove the output transcript
    pub delete_output: bool,
    /// Verbosity level for cleanup logging
    pub verbose: u32,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            delete_input: true,
            delete_output: false,
            verbose: 1,
        }
    }
}

impl CleanupConfig {
    /// Takes the delete flags from the run options.
    pub fn from_options(options: &CalculationOptions, verbose: u32) -> Self {
        Self {
            delete_input: options.delete_input,
            delete_output: options.delete_output,
            verbose,
        }
    }

    /// Checks whether a message at `min_verbose_level` should be logged.
    pub fn should_log(&self, min_verbose_level: u32) -> bool {
        self.verbose >= min_verbose_level
    }
}

/// What one cleanup pass did.
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Files removed
    pub removed: Vec<PathBuf>,
    /// Files that could not be removed, with the reason
    pub failed: Vec<(PathBuf, String)>,
}

impl CleanupReport {
    /// True when every removal succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Removes the files left behind by one Psi4 attempt.
pub struct CleanupManager {
    config: CleanupConfig,
}

impl CleanupManager {
    /// Creates a new cleanup manager.
    pub fn new(config: CleanupConfig) -> Self {
        Self { config }
    }

    /// Gets the cleanup configuration
    pub fn config(&self) -> &CleanupConfig {
        &self.config
    }

    /// Cleans up after one run.
    ///
    /// Removes every `*.clean` file and `timer.dat` in `run_directory`, then
    /// the input deck and output transcript if configured. Only an unreadable
    /// run directory is an error; individual files that cannot be removed end
    /// up in [`CleanupReport::failed`].
    pub fn clean_up(
        &self,
        run_directory: &Path,
        input_path: &Path,
        output_path: &Path,
    ) -> Result<CleanupReport> {
        if run_directory.exists() && !run_directory.is_dir() {
            return Err(CleanupError::InvalidPath(format!(
                "Path is not a directory: {}",
                run_directory.display()
            )));
        }

        let mut report = CleanupReport::default();
        let mut targets = self.housekeeping_files(run_directory)?;
        targets.push(run_directory.join(TIMER_FILE));
        if self.config.delete_input {
            targets.push(input_path.to_path_buf());
        }
        if self.config.delete_output {
            targets.push(output_path.to_path_buf());
        }

        for path in targets {
            self.remove(&path, &mut report);
        }

        if self.config.should_log(1) && !report.removed.is_empty() {
            info!(
                "Cleanup completed: {} files deleted in {}",
                report.removed.len(),
                run_directory.display()
            );
        }
        if !report.is_clean() {
            warn!("Cleanup completed with {} errors", report.failed.len());
        }
        Ok(report)
    }

    fn housekeeping_files(&self, run_directory: &Path) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(run_directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CleanupError::Io(e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    let is_housekeeping = path
                        .file_name()
                        .and_then(|s| s.to_str())
                        .map_or(false, |name| name.ends_with(HOUSEKEEPING_SUFFIX));
                    if is_housekeeping && !path.is_dir() {
                        files.push(path);
                    }
                }
                Err(e) => {
                    warn!("Error reading directory entry: {}", e);
                }
            }
        }
        files.sort();
        Ok(files)
    }

    fn remove(&self, path: &Path, report: &mut CleanupReport) {
        match fs::remove_file(path) {
            Ok(()) => {
                if self.config.should_log(2) {
                    info!("Cleaned up file: {}", path.display());
                }
                report.removed.push(path.to_path_buf());
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Nothing to remove at {}", path.display());
            }
            Err(e) => {
                warn!("Failed to remove file {}: {}", path.display(), e);
                report.failed.push((path.to_path_buf(), e.to_string()));
            }
        }
    }
}
