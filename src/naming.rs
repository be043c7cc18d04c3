//! File naming for a single Psi4 job.
//!
//! Every file a run touches is derived from the molecule's filename by
//! appending a fixed suffix. Molecule filenames routinely contain dots (a bond
//! length in the description, e.g. `H2_sto-3g_singlet_0.7414`), so suffixes are
//! appended to the string rather than swapped in with `Path::with_extension`.
//!
//! # Example
//!
//! ```
//! use psi4_bridge::naming::FileNaming;
//!
//! let naming = FileNaming::new("data/H2_sto-3g_singlet_0.7414");
//! assert_eq!(naming.input().to_str(), Some("data/H2_sto-3g_singlet_0.7414.inp"));
//! assert_eq!(naming.output().to_str(), Some("data/H2_sto-3g_singlet_0.7414.out"));
//! ```

use std::path::PathBuf;

/// Suffix of the rendered Psi4 input deck.
pub const INPUT_SUFFIX: &str = ".inp";
/// Suffix of the Psi4 output transcript.
pub const OUTPUT_SUFFIX: &str = ".out";
/// Suffix of the persisted molecule record.
pub const RECORD_SUFFIX: &str = ".json";
/// Suffix of the compact FCI density matrices written by the bundled template.
pub const FCI_RDM_SUFFIX: &str = "_fci_rdm.json";

/// Manages file naming based on a molecule filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNaming {
    basename: String,
}

impl FileNaming {
    /// Creates a new FileNaming from a molecule filename (directory plus name,
    /// without any extension).
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            basename: filename.into(),
        }
    }

    /// Returns the basename used for file naming
    pub fn basename(&self) -> &str {
        &self.basename
    }

    /// Format: `{basename}.inp`
    pub fn input(&self) -> PathBuf {
        self.with_suffix(INPUT_SUFFIX)
    }

    /// Format: `{basename}.out`
    pub fn output(&self) -> PathBuf {
        self.with_suffix(OUTPUT_SUFFIX)
    }

    /// Format: `{basename}.json`
    pub fn record(&self) -> PathBuf {
        self.with_suffix(RECORD_SUFFIX)
    }

    /// Format: `{basename}_fci_rdm.json`
    pub fn fci_rdm(&self) -> PathBuf {
        self.with_suffix(FCI_RDM_SUFFIX)
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        PathBuf::from(format!("{}{}", self.basename, suffix))
    }
}
