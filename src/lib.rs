#![warn(missing_docs)]

//! psi4-bridge - Run Psi4 from Rust and read its results back
//!
//! psi4-bridge drives the [Psi4](https://psicode.org) quantum chemistry
//! package as an external program. It renders a Psithon input deck for a
//! molecule, runs `psi4`, and loads what the run produced: method energies,
//! CCSD amplitudes from the output transcript and FCI reduced density
//! matrices in spin-orbital form.
//!
//! # Workflow
//!
//! 1. Describe the molecule with [`molecule::MolecularData`] (geometry,
//!    basis, multiplicity, charge, description). Its derived name fixes the
//!    file names of every artefact of the run.
//! 2. Pick methods with [`config::CalculationOptions`].
//! 3. Call [`qm_interface::Psi4Interface::run_psi4`]. The deck is written
//!    from [`template`], Psi4 runs in a subprocess, scratch files are removed
//!    by [`cleanup`] and the molecule record is reloaded.
//! 4. Optionally read [`amplitudes`] from the kept transcript, or the
//!    unpacked [`rdm`]s after an FCI run.
//!
//! # Quick Start
//!
//! ```no_run
//! use psi4_bridge::parser::parse_job_file;
//! use psi4_bridge::qm_interface::Psi4Interface;
//! use psi4_bridge::settings::SettingsManager;
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = SettingsManager::load()?;
//!     let job = parse_job_file(Path::new("h2.inp"), settings.settings())?;
//!     let molecule = job.molecule()?;
//!
//!     let outcome = Psi4Interface::new(&job.psi4_command).run_psi4(&molecule, &job.options)?;
//!     for (method, energy) in outcome.energies.entries() {
//!         println!("{:>5} energy: {:.10}", method, energy);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Optional Features
//!
//! | Feature | Adds |
//! |---------|------|
//! | `pubchem` | [`pubchem::PubChemClient`], geometry lookup by compound name |
//!
//! # Files Produced by a Run
//!
//! | File | Content |
//! |------|---------|
//! | `<name>.inp` | Rendered input deck (removed unless `delete_input = false`) |
//! | `<name>.out` | Psi4 transcript (kept unless `delete_output = true`) |
//! | `<name>.json` | Molecule record with energies and orbital counts |
//! | `<name>_fci_rdm.json` | Compact spatial RDMs, FCI runs only |

/// CCSD amplitude tables and spin-orbital tensors
pub mod amplitudes;
/// Removal of Psi4 scratch files
pub mod cleanup;
pub mod config;
pub mod geometry;
pub mod molecule;
/// Dynamic file naming based on the molecule filename
pub mod naming;
pub mod parser;
/// PubChem compound lookup and geometry block parsing
pub mod pubchem;
pub mod qm_interface;
/// Reduced density matrix unpacking
pub mod rdm;
/// Configuration management system
pub mod settings;
pub mod template;
/// Job file templates
pub mod template_generator;

pub use config::{CalculationOptions, JobConfig};
pub use geometry::Geometry;
pub use molecule::MolecularData;
pub use qm_interface::{Psi4Interface, RunOutcome, RunStatus};
