//! End-to-end runs against a stand-in `psi4` shell script.
#![cfg(unix)]

use psi4_bridge::config::CalculationOptions;
use psi4_bridge::geometry::Geometry;
use psi4_bridge::molecule::{JsonMoleculeStore, MolecularData, MoleculeStore};
use psi4_bridge::qm_interface::{Psi4Interface, QMError, RunStatus};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const FAKE_PSI4: &str = r#"#!/bin/sh
# usage: psi4 <input> <output>
test -f "$1" || exit 3
out="$2"
base="${out%.out}"
cat > "$out" <<'TRANSCRIPT'
            Largest TIjAb Amplitudes:
      0   0   0   0        -0.0680000000

TRANSCRIPT
touch psi.4242.clean timer.dat
cat > "$base.json" <<'RECORD'
{
  "geometry": [["H", [0.0, 0.0, 0.0]], ["H", [0.0, 0.0, 0.7414]]],
  "basis": "sto-3g",
  "charge": 0,
  "multiplicity": 1,
  "description": "0.7414",
  "hf_energy": -1.1167,
  "ccsd_energy": -1.1372,
  "fci_energy": -1.1373,
  "nuclear_repulsion": 0.7137,
  "n_orbitals": 2,
  "n_alpha_electrons": 1,
  "n_beta_electrons": 1
}
RECORD
"#;

fn install_fake_psi4(dir: &Path) -> PathBuf {
    let script = dir.join("fake_psi4.sh");
    fs::write(&script, FAKE_PSI4).unwrap();
    let mut permissions = fs::metadata(&script).unwrap().permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&script, permissions).unwrap();
    script
}

fn h2() -> MolecularData {
    let geometry = Geometry::from_atoms(vec![("H", [0.0, 0.0, 0.0]), ("H", [0.0, 0.0, 0.7414])]);
    MolecularData::new(geometry, "sto-3g", 1, 0, "0.7414", None).unwrap()
}

#[test]
fn test_completed_run_reloads_record_and_cleans_up() {
    let tools = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let script = install_fake_psi4(tools.path());

    let interface = Psi4Interface::new(script.to_string_lossy()).with_run_directory(work.path());
    let options = CalculationOptions {
        run_ccsd: true,
        run_fci: true,
        ..Default::default()
    };
    let molecule = h2();
    let outcome = interface.run_psi4(&molecule, &options).unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.energies.hf, Some(-1.1167));
    assert_eq!(outcome.energies.ccsd, Some(-1.1372));
    assert_eq!(outcome.energies.fci, Some(-1.1373));
    assert_eq!(outcome.energies.mp2, None);
    assert_eq!(outcome.molecule.n_orbitals, Some(2));
    assert_eq!(outcome.molecule.filename, molecule.filename);

    let base = work.path().join(&molecule.name);
    assert!(!work.path().join("psi.4242.clean").exists());
    assert!(!work.path().join("timer.dat").exists());
    assert!(!PathBuf::from(format!("{}.inp", base.display())).exists());
    assert!(PathBuf::from(format!("{}.out", base.display())).exists());

    let amplitudes = interface.read_ccsd_amplitudes(&outcome.molecule).unwrap();
    assert_eq!(amplitudes.double_amplitudes[[2, 0, 3, 1]], -0.034);
    assert_eq!(amplitudes.double_amplitudes[[3, 1, 2, 0]], -0.034);
}

#[test]
fn test_kept_input_and_deleted_output() {
    let tools = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let script = install_fake_psi4(tools.path());

    let interface = Psi4Interface::new(script.to_string_lossy()).with_run_directory(work.path());
    let options = CalculationOptions {
        delete_input: false,
        delete_output: true,
        ..Default::default()
    };
    let molecule = h2();
    let outcome = interface.run_psi4(&molecule, &options).unwrap();
    assert!(outcome.is_complete());

    let base = work.path().join(&molecule.name);
    let input = PathBuf::from(format!("{}.inp", base.display()));
    let deck = fs::read_to_string(input).unwrap();
    assert!(deck.contains("sto-3g"));
    assert!(!deck.contains("{{"));
    assert!(!PathBuf::from(format!("{}.out", base.display())).exists());
}

#[test]
fn test_failed_process_tolerated() {
    let work = TempDir::new().unwrap();
    let interface = Psi4Interface::new("false").with_run_directory(work.path());
    let options = CalculationOptions {
        tolerate_error: true,
        ..Default::default()
    };
    let molecule = h2();
    let outcome = interface.run_psi4(&molecule, &options).unwrap();

    assert!(matches!(outcome.status, RunStatus::ProcessFailed(_)));
    assert_eq!(outcome.molecule, molecule);
    assert!(outcome.energies.is_empty());
}

#[test]
fn test_failed_process_is_an_error_by_default() {
    let work = TempDir::new().unwrap();
    fs::write(work.path().join("timer.dat"), "stale").unwrap();
    let interface = Psi4Interface::new("false").with_run_directory(work.path());

    let result = interface.run_psi4(&h2(), &CalculationOptions::default());
    assert!(matches!(result, Err(QMError::Calculation(_))));
    // cleanup still ran
    assert!(!work.path().join("timer.dat").exists());
}

#[test]
fn test_missing_executable() {
    let work = TempDir::new().unwrap();
    let interface =
        Psi4Interface::new("/nonexistent/bin/psi4").with_run_directory(work.path());
    let result = interface.run_psi4(&h2(), &CalculationOptions::default());
    assert!(matches!(result, Err(QMError::Calculation(_))));
}

#[test]
fn test_clean_exit_without_record() {
    let work = TempDir::new().unwrap();
    let interface = Psi4Interface::new("true").with_run_directory(work.path());
    let molecule = h2();
    let outcome = interface.run_psi4(&molecule, &CalculationOptions::default()).unwrap();

    assert!(matches!(outcome.status, RunStatus::NoResults(_)));
    assert!(!outcome.is_complete());
    assert_eq!(outcome.molecule, molecule);
}

fn stale_record(dir: &Path) -> MolecularData {
    let mut earlier = h2();
    earlier.filename = dir.join(&earlier.name).to_string_lossy().into_owned();
    earlier.hf_energy = Some(-1.0);
    earlier.mp2_energy = Some(-9.99);
    earlier.cisd_energy = Some(-7.5);
    earlier.n_orbitals = Some(2);
    earlier.n_alpha_electrons = Some(1);
    earlier.n_beta_electrons = Some(1);
    JsonMoleculeStore.save(&earlier).unwrap();
    earlier
}

#[test]
fn test_stale_record_is_not_reported_as_new() {
    let work = TempDir::new().unwrap();
    let earlier = stale_record(work.path());
    let interface = Psi4Interface::new("true").with_run_directory(work.path());
    let options = CalculationOptions {
        run_mp2: true,
        ..Default::default()
    };
    let outcome = interface.run_psi4(&h2(), &options).unwrap();

    assert!(matches!(outcome.status, RunStatus::NoResults(_)));
    assert!(outcome.energies.is_empty());
    assert_eq!(outcome.molecule.mp2_energy, None);
    assert_eq!(outcome.molecule.hf_energy, None);

    let on_disk = JsonMoleculeStore.load(&earlier).unwrap();
    assert_eq!(on_disk.mp2_energy, None);
    assert_eq!(on_disk.n_orbitals, None);
    // not requested, so kept
    assert_eq!(on_disk.cisd_energy, Some(-7.5));
}

#[test]
fn test_new_run_replaces_stale_record() {
    let tools = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    stale_record(work.path());
    let script = install_fake_psi4(tools.path());

    let interface = Psi4Interface::new(script.to_string_lossy()).with_run_directory(work.path());
    let options = CalculationOptions {
        run_mp2: true,
        run_ccsd: true,
        ..Default::default()
    };
    let outcome = interface.run_psi4(&h2(), &options).unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.energies.hf, Some(-1.1167));
    assert_eq!(outcome.energies.ccsd, Some(-1.1372));
    assert_eq!(outcome.energies.mp2, None);
}
