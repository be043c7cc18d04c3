//! psi4-bridge Command-Line Interface
//!
//! # Usage
//!
//! 1. **Run a job** (`psi4-bridge <job_file>`): runs Psi4 on the molecule
//!    described by the job file and prints the energies.
//! 2. **Input creation** (`psi4-bridge ci <geometry_file> [output_file]`):
//!    creates a job file template from a geometry file.
//! 3. **Settings creation** (`psi4-bridge ci psi4_bridge.cfg`).
//! 4. **Amplitudes** (`psi4-bridge amplitudes <psi4.out> <n_spin_orbitals> <n_alpha> <n_beta>`):
//!    prints the non-zero CCSD amplitudes of a kept transcript.
//! 5. **RDMs** (`psi4-bridge rdm <compact.json> [output.json]`): unpacks the
//!    compact FCI density matrices into spin-orbital form.
//! 6. **Lookup** (`psi4-bridge lookup <name>`): fetches a geometry from
//!    PubChem, with the `pubchem` feature.
//!
//! # Examples
//!
//! ```bash
//! psi4-bridge ci water.xyz
//! psi4-bridge water.inp
//! psi4-bridge amplitudes OH2_sto-3g_singlet.out 14 5 5
//! ```

use log::{info, warn};
use psi4_bridge::molecule::{JsonMoleculeStore, MoleculeStore};
use psi4_bridge::qm_interface::{Psi4Interface, RunStatus};
use psi4_bridge::settings::{SettingsManager, SETTINGS_FILE_NAME};
use psi4_bridge::{amplitudes, parser, rdm};
use std::env;
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;

fn main() {
    let settings = match SettingsManager::load() {
        Ok(settings) => Some(settings),
        Err(e) => {
            eprintln!("Warning: failed to load settings, using defaults: {}", e);
            None
        }
    };
    let level = settings
        .as_ref()
        .and_then(|s| log::LevelFilter::from_str(&s.logging().level).ok())
        .unwrap_or(log::LevelFilter::Info);

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .target(env_logger::Target::Stdout)
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage(&args[0]);
        process::exit(1);
    }
    if args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(0);
    }

    let result = match args[1].as_str() {
        "ci" => run_ci(&args, settings.as_ref()),
        "amplitudes" => run_amplitudes(&args),
        "rdm" => run_rdm(&args),
        "lookup" => run_lookup(&args),
        command if !command.starts_with('-') => run_job(Path::new(command), settings.as_ref()),
        command => {
            eprintln!("Error: Unknown command: {}", command);
            print_usage(&args[0]);
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Prints usage information to stderr.
fn print_usage(program_name: &str) {
    eprintln!("psi4-bridge - run Psi4 and read energies, CCSD amplitudes and RDMs");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {} <job_file>", program_name);
    eprintln!("                    Run Psi4 on the molecule described by the job file");
    eprintln!();
    eprintln!("  {} ci <geometry_file> [output_file]", program_name);
    eprintln!("                    Create a job file template from a geometry file");
    eprintln!();
    eprintln!("  {} ci {}", program_name, SETTINGS_FILE_NAME);
    eprintln!("                    Create a settings template file");
    eprintln!();
    eprintln!(
        "  {} amplitudes <psi4.out> <n_spin_orbitals> <n_alpha> <n_beta>",
        program_name
    );
    eprintln!("                    Print the non-zero CCSD amplitudes of a transcript");
    eprintln!();
    eprintln!("  {} rdm <compact.json> [output.json]", program_name);
    eprintln!("                    Unpack FCI density matrices into spin-orbital form");
    eprintln!();
    eprintln!("  {} lookup <compound_name>", program_name);
    eprintln!("                    Fetch a geometry from PubChem (feature 'pubchem')");
    eprintln!();
    eprintln!("Supported geometry formats:");
    eprintln!("  .xyz  - XYZ coordinate file");
    eprintln!("  .sdf  - MDL structure data file");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  {} ci water.xyz", program_name);
    eprintln!("  {} water.inp", program_name);
    eprintln!("  {} rdm H2_sto-3g_singlet_fci_rdm.json", program_name);
}

fn run_ci(
    args: &[String],
    settings: Option<&SettingsManager>,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(file_arg) = args.get(2) else {
        eprintln!("Usage:");
        eprintln!(
            "  {} ci <geometry_file> [output_file]  - Create job template",
            args[0]
        );
        eprintln!(
            "  {} ci {}               - Create settings template",
            args[0], SETTINGS_FILE_NAME
        );
        return Err("Missing file argument".into());
    };

    if file_arg == SETTINGS_FILE_NAME {
        let settings_path = Path::new(SETTINGS_FILE_NAME);
        if settings_path.exists() {
            return Err(format!(
                "{} already exists. Please remove it first or choose a different location.",
                SETTINGS_FILE_NAME
            )
            .into());
        }
        SettingsManager::create_template(settings_path)?;
        println!("✓ Settings template created successfully!");
        println!("  Output file: {}", SETTINGS_FILE_NAME);
        return Ok(());
    }

    let output_file = run_create_input(
        Path::new(file_arg),
        args.get(3).map(PathBuf::from),
        settings,
    )?;
    println!("✓ Job template created successfully!");
    println!("  Output file: {}", output_file.display());
    println!("\nNext steps:");
    println!("  1. Review the basis, charge and multiplicity");
    println!("  2. Select the methods to run");
    println!("  3. Run: {} {}", args[0], output_file.display());
    Ok(())
}

fn run_create_input(
    geometry_file: &Path,
    output_path: Option<PathBuf>,
    settings: Option<&SettingsManager>,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    use psi4_bridge::template_generator::*;

    let defaults = psi4_bridge::settings::Settings::default();
    let settings = settings.map(|s| s.settings()).unwrap_or(&defaults);

    println!("Reading geometry from: {}", geometry_file.display());
    let template_content = generate_template_from_file(geometry_file, settings)?;

    let output_path = output_path.unwrap_or_else(|| get_default_output_path(geometry_file));
    if output_path.exists() {
        let answer = prompt_user(&format!(
            "{} already exists. Overwrite? [y/N]",
            output_path.display()
        ))?;
        if !answer.eq_ignore_ascii_case("y") {
            return Err("Template not written".into());
        }
    }
    write_template_to_file(&template_content, &output_path)?;
    Ok(output_path)
}

fn run_job(
    input_path: &Path,
    settings: Option<&SettingsManager>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("**** psi4-bridge {} ****\n", env!("CARGO_PKG_VERSION"));

    let defaults = psi4_bridge::settings::Settings::default();
    let (base, cleanup_verbose) = match settings {
        Some(manager) => {
            info!("Settings from {}", manager.config_source());
            (manager.settings(), manager.cleanup().verbose)
        }
        None => (&defaults, defaults.cleanup.verbose),
    };

    let job = parser::parse_job_file(input_path, base)?;
    let molecule = job.molecule()?;
    println!("Molecule:  {}", molecule.name);
    println!("Atoms:     {}", molecule.geometry.num_atoms);
    println!("Methods:   {}", job.options.requested_methods().join(", "));
    println!("Psi4:      {}", job.psi4_command);
    println!();

    if let Some(dir) = &job.data_directory {
        std::fs::create_dir_all(dir)?;
    }

    let interface =
        Psi4Interface::new(&job.psi4_command).with_cleanup_verbosity(cleanup_verbose);
    let outcome = interface.run_psi4(&molecule, &job.options)?;

    match &outcome.status {
        RunStatus::Completed => {}
        RunStatus::ProcessFailed(reason) => warn!("Psi4 failed: {}", reason),
        RunStatus::NoResults(reason) => warn!("No results reloaded: {}", reason),
    }
    if !outcome.is_complete() {
        return Err(format!("Psi4 run for {} did not complete", molecule.name).into());
    }

    JsonMoleculeStore.save(&outcome.molecule)?;
    println!("Energies (Hartree):");
    for (method, energy) in outcome.energies.entries() {
        println!("  {:>5}  {:>18.10}", method, energy);
    }
    if outcome.energies.is_empty() {
        println!("  none recorded");
    }
    println!("Record:    {}", outcome.molecule.naming().record().display());

    if job.options.run_ccsd && !job.options.delete_output {
        match interface.read_ccsd_amplitudes(&outcome.molecule) {
            Ok(amplitudes) => println!(
                "CCSD:      {} singles, {} doubles above print threshold",
                amplitudes.nonzero_singles().len(),
                amplitudes.nonzero_doubles().len()
            ),
            Err(e) => warn!("Could not read CCSD amplitudes: {}", e),
        }
    }
    if job.options.run_fci {
        match interface.read_fci_rdms(&outcome.molecule) {
            Ok(rdms) => {
                let trace: f64 = rdms.one_rdm.diag().sum();
                println!("FCI RDM:   trace of one-RDM = {:.6}", trace);
            }
            Err(e) => warn!("Could not read FCI density matrices: {}", e),
        }
    }
    Ok(())
}

fn parse_count(args: &[String], index: usize, what: &str) -> Result<usize, String> {
    let raw = args
        .get(index)
        .ok_or_else(|| format!("Missing argument: {}", what))?;
    raw.parse()
        .map_err(|_| format!("Invalid {}: {}", what, raw))
}

fn run_amplitudes(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let output = args
        .get(2)
        .ok_or("Usage: amplitudes <psi4.out> <n_spin_orbitals> <n_alpha> <n_beta>")?;
    let n_spin_orbitals = parse_count(args, 3, "n_spin_orbitals")?;
    let n_alpha = parse_count(args, 4, "n_alpha")?;
    let n_beta = parse_count(args, 5, "n_beta")?;

    let amplitudes =
        amplitudes::read_ccsd_amplitudes(Path::new(output), n_spin_orbitals, n_alpha, n_beta)?;

    print!("{}", amplitudes);
    Ok(())
}

fn run_rdm(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let input = args
        .get(2)
        .map(PathBuf::from)
        .ok_or("Usage: rdm <compact.json> [output.json]")?;
    let output = match args.get(3) {
        Some(path) => PathBuf::from(path),
        None => {
            let stem = input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("rdm");
            input.with_file_name(format!("{}_spin_orbital.json", stem))
        }
    };

    let compact = rdm::load_compact_rdms(&input)?;
    let rdms = compact.unpack()?;
    rdms.save(&output)?;
    println!(
        "Unpacked {} spatial orbitals into {} spin orbitals: {}",
        compact.n_orbitals(),
        rdms.one_rdm.nrows(),
        output.display()
    );
    Ok(())
}

#[cfg(feature = "pubchem")]
fn run_lookup(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    use psi4_bridge::pubchem::{lookup_geometry, LookupOutcome, PubChemClient};

    let name = args.get(2).ok_or("Usage: lookup <compound_name>")?;
    match lookup_geometry(&PubChemClient::new(), name) {
        LookupOutcome::Found {
            geometry,
            dimension,
        } => {
            println!("{} geometry for '{}':", dimension, name);
            println!("{}", geometry.to_psi4_string());
            Ok(())
        }
        LookupOutcome::NotFound => Err(format!("'{}' not found on PubChem", name).into()),
        LookupOutcome::Unavailable(reason) => Err(reason.into()),
    }
}

#[cfg(not(feature = "pubchem"))]
fn run_lookup(_args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    Err("psi4-bridge was built without the 'pubchem' feature".into())
}
