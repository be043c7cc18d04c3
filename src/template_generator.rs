use crate::parser;
use crate::settings::Settings;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Template generator for creating job files from geometry files
///
/// Generate a job file template from a geometry file.
/// Supports .xyz and .sdf formats; the geometry is referenced with `@path`
/// rather than copied, so the file is read again at run time.
pub fn generate_template_from_file<P: AsRef<Path>>(
    geometry_file: P,
    settings: &Settings,
) -> Result<String, Box<dyn std::error::Error>> {
    let geometry_file = geometry_file.as_ref();

    if !geometry_file.exists() {
        return Err(format!("File not found: {}", geometry_file.display()).into());
    }
    if !is_supported_format(geometry_file) {
        return Err(format!("Unsupported file format: {}", geometry_file.display()).into());
    }

    let geometry = parser::read_external_geometry(geometry_file)?;
    let geom_path = geometry_file.canonicalize()?;
    let formula: String = geometry
        .element_counts()
        .into_iter()
        .map(|(symbol, count)| {
            if count > 1 {
                format!("{}{}", symbol, count)
            } else {
                symbol
            }
        })
        .collect();

    Ok(generate_template(&formula, geometry.num_atoms, &geom_path, settings))
}

/// Generate the job file content
fn generate_template(formula: &str, num_atoms: usize, geometry_path: &Path, settings: &Settings) -> String {
    let options = settings.calculation_options();
    format!(
        r#"# psi4-bridge job for {formula} ({num_atoms} atoms)

#This subset is required. It describes the molecule.
basis = sto-3g
charge = 0
multiplicity = 1 # 1 = singlet, 2 = doublet, ...
description = # appended to the molecule name, e.g. a bond length

#This subset picks the methods. Energies of the selected methods are stored in the molecule record.
run_scf = {run_scf}
run_mp2 = {run_mp2}
run_cisd = {run_cisd}
run_ccsd = {run_ccsd} # keep delete_output = false to read CCSD amplitudes afterwards
run_fci = {run_fci} # also writes the FCI reduced density matrices

#This subset controls how Psi4 is run. Shown here are the values from your settings.
memory = {memory} # MB
verbose = {verbose}
tolerate_error = {tolerate_error}
delete_input = {delete_input}
delete_output = {delete_output}
psi4_command = {command}
#template_file = my_template # custom Psi4 input template
#data_directory = molecules

#Between *geom and *, write the cartesian coordinates of the molecule (in angstrom)
*geom
@{geom_path}
*
"#,
        formula = formula,
        num_atoms = num_atoms,
        run_scf = options.run_scf,
        run_mp2 = options.run_mp2,
        run_cisd = options.run_cisd,
        run_ccsd = options.run_ccsd,
        run_fci = options.run_fci,
        memory = options.memory,
        verbose = options.verbose,
        tolerate_error = options.tolerate_error,
        delete_input = options.delete_input,
        delete_output = options.delete_output,
        command = settings.psi4.command,
        geom_path = geometry_path.display(),
    )
}

/// Write template to file
pub fn write_template_to_file<P: AsRef<Path>>(
    template: &str,
    output_path: P,
) -> Result<(), Box<dyn std::error::Error>> {
    let output_path = output_path.as_ref();

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(output_path, template)?;
    Ok(())
}

/// Get default output filename based on input geometry file
pub fn get_default_output_path<P: AsRef<Path>>(geometry_file: P) -> PathBuf {
    let geometry_file = geometry_file.as_ref();
    let stem = geometry_file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("template");

    PathBuf::from(format!("{}.inp", stem))
}

/// Interactive prompt for user input
pub fn prompt_user(prompt: &str) -> Result<String, Box<dyn std::error::Error>> {
    print!("{} ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Validate file extension
pub fn is_supported_format(path: &Path) -> bool {
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) => matches!(ext.to_lowercase().as_str(), "xyz" | "sdf"),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_supported_format() {
        assert!(is_supported_format(Path::new("test.xyz")));
        assert!(is_supported_format(Path::new("test.SDF")));
        assert!(!is_supported_format(Path::new("test.log")));
        assert!(!is_supported_format(Path::new("test")));
    }

    #[test]
    fn test_get_default_output_path() {
        let path = get_default_output_path(Path::new("molecule.xyz"));
        assert_eq!(path.to_str().unwrap(), "molecule.inp");

        let path = get_default_output_path(Path::new("/path/to/molecule.sdf"));
        assert_eq!(path.to_str().unwrap(), "molecule.inp");
    }

    #[test]
    fn test_generated_template_parses() {
        let dir = TempDir::new().unwrap();
        let xyz = dir.path().join("water.xyz");
        fs::write(
            &xyz,
            "3\nwater\nO 0.0 0.0 0.1173\nH 0.0 0.7572 -0.4692\nH 0.0 -0.7572 -0.4692\n",
        )
        .unwrap();

        let settings = Settings::default();
        let template = generate_template_from_file(&xyz, &settings).unwrap();
        assert!(template.starts_with("# psi4-bridge job for OH2 (3 atoms)"));

        let job = parser::parse_job(&template, &settings).unwrap();
        assert_eq!(job.geometry.num_atoms, 3);
        assert_eq!(job.basis, "sto-3g");
        assert_eq!(job.description, "");
        assert_eq!(job.options, settings.calculation_options());
    }

    #[test]
    fn test_missing_file() {
        assert!(generate_template_from_file("no_such_file.xyz", &Settings::default()).is_err());
    }
}
