//! Reduced density matrices in spin-orbital form.
//!
//! Psi4 reports FCI density matrices per spin block over spatial orbitals.
//! For the two-particle blocks the compact layout is
//!
//! ```text
//! aa[p, q, r, s] = < a+(p,A) a+(r,A) a(q,A) a(s,A) >
//! ab[p, q, r, s] = < a+(p,A) a+(r,B) a(q,B) a(s,A) >
//! ```
//!
//! and `bb` like `aa` with beta spin. [`unpack_spatial_rdm`] spreads the five
//! blocks over interleaved spin orbitals (`2p` alpha, `2p + 1` beta) and
//! returns the two-particle matrix in physicist ordering.

use log::debug;
use ndarray::{Array2, Array4};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or unpacking density matrices.
#[derive(Error, Debug)]
pub enum RdmError {
    /// File system error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// File is not a valid compact RDM document
    #[error("Invalid RDM file: {0}")]
    Json(#[from] serde_json::Error),
    /// A block has the wrong shape for the number of orbitals
    #[error("{name} has shape {found:?}, expected {expected:?}")]
    Shape {
        /// Block name
        name: &'static str,
        /// Expected shape
        expected: Vec<usize>,
        /// Actual shape
        found: Vec<usize>,
    },
}

type Result<T> = std::result::Result<T, RdmError>;

/// Spin-block density matrices over spatial orbitals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactRdms {
    /// Alpha one-particle block
    pub one_rdm_a: Array2<f64>,
    /// Beta one-particle block
    pub one_rdm_b: Array2<f64>,
    /// Alpha-alpha two-particle block
    pub two_rdm_aa: Array4<f64>,
    /// Alpha-beta two-particle block
    pub two_rdm_ab: Array4<f64>,
    /// Beta-beta two-particle block
    pub two_rdm_bb: Array4<f64>,
}

impl CompactRdms {
    /// Number of spatial orbitals.
    pub fn n_orbitals(&self) -> usize {
        self.one_rdm_a.nrows()
    }

    /// Unpacks into spin-orbital form.
    pub fn unpack(&self) -> Result<SpinOrbitalRdms> {
        let (one_rdm, two_rdm) = unpack_spatial_rdm(
            &self.one_rdm_a,
            &self.one_rdm_b,
            &self.two_rdm_aa,
            &self.two_rdm_ab,
            &self.two_rdm_bb,
        )?;
        Ok(SpinOrbitalRdms { one_rdm, two_rdm })
    }
}

/// Density matrices over `2 * n_orbitals` spin orbitals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpinOrbitalRdms {
    /// One-particle density matrix
    pub one_rdm: Array2<f64>,
    /// Two-particle density matrix, physicist ordering
    pub two_rdm: Array4<f64>,
}

impl SpinOrbitalRdms {
    /// Writes the matrices as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Reads a compact RDM document such as `<filename>_fci_rdm.json`.
pub fn load_compact_rdms(path: &Path) -> Result<CompactRdms> {
    let content = fs::read_to_string(path)?;
    let rdms: CompactRdms = serde_json::from_str(&content)?;
    debug!(
        "Loaded compact RDMs over {} orbitals from {}",
        rdms.n_orbitals(),
        path.display()
    );
    Ok(rdms)
}

fn check_shape(name: &'static str, found: &[usize], expected: &[usize]) -> Result<()> {
    if found != expected {
        return Err(RdmError::Shape {
            name,
            expected: expected.to_vec(),
            found: found.to_vec(),
        });
    }
    Ok(())
}

/// Converts spin-block density matrices to spin-orbital form.
///
/// All blocks must be square over the same `n` spatial orbitals. The result
/// has `2n` spin orbitals; the two-particle matrix is returned with its last
/// two axes swapped relative to the unpacked layout.
pub fn unpack_spatial_rdm(
    one_rdm_a: &Array2<f64>,
    one_rdm_b: &Array2<f64>,
    two_rdm_aa: &Array4<f64>,
    two_rdm_ab: &Array4<f64>,
    two_rdm_bb: &Array4<f64>,
) -> Result<(Array2<f64>, Array4<f64>)> {
    let n = one_rdm_a.nrows();
    check_shape("one_rdm_a", one_rdm_a.shape(), &[n, n])?;
    check_shape("one_rdm_b", one_rdm_b.shape(), &[n, n])?;
    check_shape("two_rdm_aa", two_rdm_aa.shape(), &[n, n, n, n])?;
    check_shape("two_rdm_ab", two_rdm_ab.shape(), &[n, n, n, n])?;
    check_shape("two_rdm_bb", two_rdm_bb.shape(), &[n, n, n, n])?;

    let m = 2 * n;
    let mut one_rdm = Array2::<f64>::zeros((m, m));
    let mut two_rdm = Array4::<f64>::zeros((m, m, m, m));

    for p in 0..n {
        for q in 0..n {
            one_rdm[[2 * p, 2 * q]] = one_rdm_a[[p, q]];
            one_rdm[[2 * p + 1, 2 * q + 1]] = one_rdm_b[[p, q]];

            for r in 0..n {
                for s in 0..n {
                    // same spin
                    two_rdm[[2 * p, 2 * q, 2 * r, 2 * s]] = two_rdm_aa[[p, r, q, s]];
                    two_rdm[[2 * p + 1, 2 * q + 1, 2 * r + 1, 2 * s + 1]] =
                        two_rdm_bb[[p, r, q, s]];

                    // mixed spin
                    two_rdm[[2 * p, 2 * q + 1, 2 * r, 2 * s + 1]] = two_rdm_ab[[p, r, q, s]];
                    two_rdm[[2 * p, 2 * q + 1, 2 * r + 1, 2 * s]] = -two_rdm_ab[[p, s, q, r]];
                    two_rdm[[2 * p + 1, 2 * q, 2 * r + 1, 2 * s]] = two_rdm_ab[[q, s, p, r]];
                    two_rdm[[2 * p + 1, 2 * q, 2 * r, 2 * s + 1]] = -two_rdm_ab[[q, r, p, s]];
                }
            }
        }
    }

    let two_rdm = two_rdm
        .permuted_axes([0, 1, 3, 2])
        .as_standard_layout()
        .into_owned();
    Ok((one_rdm, two_rdm))
}
