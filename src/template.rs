//! Psi4 input deck rendering.
//!
//! A template is plain Psi4 input (Psithon) with `{{name}}` markers. Every
//! marker must name a [`Placeholder`]; every required placeholder must occur
//! at least once. Rendering replaces all markers in a single pass over the
//! document, so substituted values are never scanned for markers again.
//!
//! The deck is Python, so booleans render as `True`/`False` and the
//! `geometry` placeholder renders as a Python list of `(symbol, (x, y, z))`
//! tuples.
//!
//! ```
//! use psi4_bridge::template::InputTemplate;
//!
//! let template = InputTemplate::bundled();
//! assert!(template.validate().is_ok());
//! ```

use crate::config::CalculationOptions;
use crate::molecule::MolecularData;
use lazy_static::lazy_static;
use log::debug;
use regex::{Captures, Regex};
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The template shipped with the crate.
pub const BUNDLED_TEMPLATE: &str = include_str!("../templates/psi4_template");

lazy_static! {
    static ref MARKER_RE: Regex = Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap();
}

/// Errors raised while loading, validating or rendering a template.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// Template unreadable or deck unwritable
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Marker naming no known placeholder
    #[error("Unknown placeholder '{name}' on line {line}")]
    UnknownPlaceholder {
        /// Name inside the marker
        name: String,
        /// 1-based line number
        line: usize,
    },
    /// Required placeholders absent from the template
    #[error("Template is missing required placeholder(s): {0}")]
    MissingPlaceholder(String),
}

type Result<T> = std::result::Result<T, TemplateError>;

/// Every value an input template can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// Directory holding the template
    ThisDirectory,
    /// Geometry as a Python literal
    Geometry,
    /// Basis set name
    Basis,
    /// Net charge
    Charge,
    /// Spin multiplicity
    Multiplicity,
    /// Molecule description
    Description,
    /// Molecule filename without suffix
    MolFilename,
    /// Geometry as a Psi4 molecule block body
    GeoString,
    /// `run_scf` flag
    RunScf,
    /// `run_mp2` flag
    RunMp2,
    /// `run_cisd` flag
    RunCisd,
    /// `run_ccsd` flag
    RunCcsd,
    /// `run_fci` flag
    RunFci,
    /// `tolerate_error` flag
    TolerateError,
    /// Negated `tolerate_error` flag
    NotTolerateError,
    /// `verbose` flag
    Verbose,
    /// Memory in MB
    Memory,
}

impl Placeholder {
    /// All placeholders.
    pub const ALL: [Placeholder; 17] = [
        Placeholder::ThisDirectory,
        Placeholder::Geometry,
        Placeholder::Basis,
        Placeholder::Charge,
        Placeholder::Multiplicity,
        Placeholder::Description,
        Placeholder::MolFilename,
        Placeholder::GeoString,
        Placeholder::RunScf,
        Placeholder::RunMp2,
        Placeholder::RunCisd,
        Placeholder::RunCcsd,
        Placeholder::RunFci,
        Placeholder::TolerateError,
        Placeholder::NotTolerateError,
        Placeholder::Verbose,
        Placeholder::Memory,
    ];

    /// Name used inside the `{{...}}` marker.
    pub fn name(self) -> &'static str {
        match self {
            Placeholder::ThisDirectory => "this_directory",
            Placeholder::Geometry => "geometry",
            Placeholder::Basis => "basis",
            Placeholder::Charge => "charge",
            Placeholder::Multiplicity => "multiplicity",
            Placeholder::Description => "description",
            Placeholder::MolFilename => "mol_filename",
            Placeholder::GeoString => "geo_string",
            Placeholder::RunScf => "run_scf",
            Placeholder::RunMp2 => "run_mp2",
            Placeholder::RunCisd => "run_cisd",
            Placeholder::RunCcsd => "run_ccsd",
            Placeholder::RunFci => "run_fci",
            Placeholder::TolerateError => "tolerate_error",
            Placeholder::NotTolerateError => "not_tolerate_error",
            Placeholder::Verbose => "verbose",
            Placeholder::Memory => "memory",
        }
    }

    /// Looks a placeholder up by marker name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Whether a usable deck cannot be produced without this placeholder.
    pub fn is_required(self) -> bool {
        matches!(
            self,
            Placeholder::GeoString
                | Placeholder::Basis
                | Placeholder::Charge
                | Placeholder::Multiplicity
                | Placeholder::MolFilename
                | Placeholder::Memory
        )
    }
}

fn python_bool(value: bool) -> String {
    if value { "True" } else { "False" }.to_string()
}

/// Resolved values for one rendering.
#[derive(Debug, Clone)]
pub struct PlaceholderValues<'a> {
    molecule: &'a MolecularData,
    options: &'a CalculationOptions,
    this_directory: PathBuf,
}

impl<'a> PlaceholderValues<'a> {
    /// Binds a molecule and options; `this_directory` is the template's directory.
    pub fn new(
        molecule: &'a MolecularData,
        options: &'a CalculationOptions,
        this_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            molecule,
            options,
            this_directory: this_directory.into(),
        }
    }

    /// Text substituted for `placeholder`.
    pub fn value(&self, placeholder: Placeholder) -> String {
        let m = self.molecule;
        let o = self.options;
        match placeholder {
            Placeholder::ThisDirectory => self.this_directory.display().to_string(),
            Placeholder::Geometry => m.geometry.to_python_literal(),
            Placeholder::Basis => m.basis.clone(),
            Placeholder::Charge => m.charge.to_string(),
            Placeholder::Multiplicity => m.multiplicity.to_string(),
            Placeholder::Description => m.description.clone(),
            Placeholder::MolFilename => m.filename.clone(),
            Placeholder::GeoString => m.geometry.to_psi4_string(),
            Placeholder::RunScf => python_bool(o.run_scf),
            Placeholder::RunMp2 => python_bool(o.run_mp2),
            Placeholder::RunCisd => python_bool(o.run_cisd),
            Placeholder::RunCcsd => python_bool(o.run_ccsd),
            Placeholder::RunFci => python_bool(o.run_fci),
            Placeholder::TolerateError => python_bool(o.tolerate_error),
            Placeholder::NotTolerateError => python_bool(!o.tolerate_error),
            Placeholder::Verbose => python_bool(o.verbose),
            Placeholder::Memory => o.memory.to_string(),
        }
    }
}

/// A loaded input template.
#[derive(Debug, Clone)]
pub struct InputTemplate {
    source: String,
    directory: Option<PathBuf>,
}

impl InputTemplate {
    /// The template embedded in the crate.
    pub fn bundled() -> Self {
        Self {
            source: BUNDLED_TEMPLATE.to_string(),
            directory: None,
        }
    }

    /// Reads a template from disk.
    pub fn from_file(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path)?;
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let directory = fs::canonicalize(&parent).unwrap_or(parent);
        Ok(Self {
            source,
            directory: Some(directory),
        })
    }

    /// Uses the template given in `options`, or the bundled one.
    pub fn for_options(options: &CalculationOptions) -> Result<Self> {
        match &options.template_file {
            Some(path) => Self::from_file(path),
            None => Ok(Self::bundled()),
        }
    }

    /// Wraps template text that did not come from a file.
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            directory: None,
        }
    }

    /// Raw template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Value of `this_directory`: the template's directory, or the working
    /// directory for templates not read from disk.
    pub fn this_directory(&self) -> Result<PathBuf> {
        match &self.directory {
            Some(dir) => Ok(dir.clone()),
            None => Ok(env::current_dir()?),
        }
    }

    /// Placeholders used by the template.
    ///
    /// Fails on the first marker that names no placeholder.
    pub fn placeholders(&self) -> Result<HashSet<Placeholder>> {
        let mut seen = HashSet::new();
        for (index, line) in self.source.lines().enumerate() {
            for caps in MARKER_RE.captures_iter(line) {
                let name = &caps[1];
                let placeholder =
                    Placeholder::from_name(name).ok_or_else(|| TemplateError::UnknownPlaceholder {
                        name: name.to_string(),
                        line: index + 1,
                    })?;
                seen.insert(placeholder);
            }
        }
        Ok(seen)
    }

    /// Checks markers and required placeholders without rendering.
    pub fn validate(&self) -> Result<()> {
        let seen = self.placeholders()?;
        let missing: Vec<&str> = Placeholder::ALL
            .into_iter()
            .filter(|p| p.is_required() && !seen.contains(p))
            .map(Placeholder::name)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(TemplateError::MissingPlaceholder(missing.join(", ")))
        }
    }

    /// Renders the deck.
    pub fn render(&self, values: &PlaceholderValues<'_>) -> Result<String> {
        self.validate()?;
        let rendered = MARKER_RE.replace_all(&self.source, |caps: &Captures| {
            Placeholder::from_name(&caps[1])
                .map(|p| values.value(p))
                .unwrap_or_default()
        });
        Ok(rendered.into_owned())
    }
}

/// Writes the Psi4 input deck for `molecule` to `<filename>.inp`.
///
/// Returns the path written.
pub fn render_input(molecule: &MolecularData, options: &CalculationOptions) -> Result<PathBuf> {
    let template = InputTemplate::for_options(options)?;
    let values = PlaceholderValues::new(molecule, options, template.this_directory()?);
    let deck = template.render(&values)?;

    let path = molecule.naming().input();
    fs::write(&path, deck)?;
    debug!("Wrote Psi4 input deck {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use tempfile::TempDir;

    const MINIMAL: &str = "memory {{memory}} mb\n\
molecule {\n{{charge}} {{multiplicity}}\n{{geo_string}}\n}\n\
set basis {{basis}}\n\
if {{run_fci}} and {{ not_tolerate_error }}:\n    pass\n\
json_path = '{{mol_filename}}.json'\n";

    fn lih(dir: &Path) -> MolecularData {
        let geometry = Geometry::from_atoms(vec![("Li", [0.0, 0.0, 0.0]), ("H", [0.0, 0.0, 1.45])]);
        MolecularData::new(geometry, "sto-3g", 1, 0, "1.45", Some(dir)).unwrap()
    }

    #[test]
    fn test_placeholder_names_round_trip() {
        for placeholder in Placeholder::ALL {
            assert_eq!(Placeholder::from_name(placeholder.name()), Some(placeholder));
        }
        assert_eq!(Placeholder::from_name("geometry_string"), None);
    }

    #[test]
    fn test_bundled_template_uses_every_placeholder() {
        let used = InputTemplate::bundled().placeholders().unwrap();
        for placeholder in Placeholder::ALL {
            assert!(used.contains(&placeholder), "{} unused", placeholder.name());
        }
    }

    #[test]
    fn test_render_replaces_every_marker() {
        let temp_dir = TempDir::new().unwrap();
        let molecule = lih(temp_dir.path());
        let options = CalculationOptions {
            run_fci: true,
            ..Default::default()
        };
        let template = InputTemplate::from_source(MINIMAL);
        let deck = template
            .render(&PlaceholderValues::new(&molecule, &options, temp_dir.path()))
            .unwrap();

        assert!(!deck.contains("{{"));
        assert!(deck.contains("memory 8000 mb"));
        assert!(deck.contains("0 1\nLi 0 0 0\nH 0 0 1.45\n}"));
        assert!(deck.contains("set basis sto-3g"));
        assert!(deck.contains("if True and True:"));
        assert!(deck.contains(&format!("json_path = '{}.json'", molecule.filename)));
    }

    #[test]
    fn test_render_bundled_template() {
        let temp_dir = TempDir::new().unwrap();
        let molecule = lih(temp_dir.path());
        let options = CalculationOptions {
            tolerate_error: true,
            ..Default::default()
        };
        let deck = InputTemplate::bundled()
            .render(&PlaceholderValues::new(&molecule, &options, temp_dir.path()))
            .unwrap();

        assert!(!MARKER_RE.is_match(&deck));
        assert!(deck.contains("[('Li', (0.0, 0.0, 0.0)), ('H', (0.0, 0.0, 1.45))]"));
        assert!(deck.contains("if False:\n            raise"));
        assert!(deck.contains(&format!("Template directory: {}", temp_dir.path().display())));
    }

    #[test]
    fn test_bundled_template_quotes_free_text() {
        let temp_dir = TempDir::new().unwrap();
        let geometry = Geometry::from_atoms(vec![("H", [0.0, 0.0, 0.0]), ("H", [0.0, 0.0, 0.74])]);
        let molecule =
            MolecularData::new(geometry, "6-31g*", 1, 0, "O'Brien's", Some(temp_dir.path())).unwrap();
        let deck = InputTemplate::bundled()
            .render(&PlaceholderValues::new(&molecule, &CalculationOptions::default(), temp_dir.path()))
            .unwrap();

        assert!(deck.contains("'description': r'''O'Brien's''',"));
        assert!(deck.contains("'basis': r'''6-31g*''',"));
        assert!(deck.contains(&format!("record_path = r'''{}.json'''", molecule.filename)));
        assert!(!deck.contains("'O'Brien's'"));
    }

    #[test]
    fn test_bundled_template_drops_stale_results() {
        let temp_dir = TempDir::new().unwrap();
        let molecule = lih(temp_dir.path());
        let options = CalculationOptions {
            run_mp2: true,
            ..Default::default()
        };
        let deck = InputTemplate::bundled()
            .render(&PlaceholderValues::new(&molecule, &options, temp_dir.path()))
            .unwrap();

        assert!(deck.contains("('mp2_energy', True)"));
        assert!(deck.contains("('cisd_energy', False)"));
        assert!(deck.contains("previous.pop(key, None)"));
        let pop = deck.find("previous.pop(key, None)").unwrap();
        let merge = deck.find("previous.update(record)").unwrap();
        assert!(pop < merge);
    }

    #[test]
    fn test_value_on_every_line_of_placeholder() {
        let temp_dir = TempDir::new().unwrap();
        let molecule = lih(temp_dir.path());
        let options = CalculationOptions::default();
        let source = format!("{}# basis again: {{{{basis}}}}\n", MINIMAL);
        let deck = InputTemplate::from_source(source)
            .render(&PlaceholderValues::new(&molecule, &options, "."))
            .unwrap();
        let basis_lines: Vec<&str> = deck.lines().filter(|l| l.contains("basis")).collect();
        assert_eq!(basis_lines, vec!["set basis sto-3g", "# basis again: sto-3g"]);
    }

    #[test]
    fn test_unknown_placeholder_reports_line() {
        let template = InputTemplate::from_source(format!("{}\n{{{{nprocs}}}}\n", MINIMAL));
        match template.validate() {
            Err(TemplateError::UnknownPlaceholder { name, line }) => {
                assert_eq!(name, "nprocs");
                assert_eq!(line, MINIMAL.lines().count() + 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_placeholder() {
        let template = InputTemplate::from_source("molecule {\n{{geo_string}}\n}\n");
        match template.validate() {
            Err(TemplateError::MissingPlaceholder(names)) => {
                assert!(names.contains("basis"));
                assert!(names.contains("memory"));
                assert!(!names.contains("geo_string"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_render_input_writes_deck_and_template_directory() {
        let temp_dir = TempDir::new().unwrap();
        let template_path = temp_dir.path().join("custom_template");
        fs::write(&template_path, format!("# {{{{this_directory}}}}\n{}", MINIMAL)).unwrap();

        let molecule = lih(temp_dir.path());
        let options = CalculationOptions {
            template_file: Some(template_path),
            ..Default::default()
        };
        let path = render_input(&molecule, &options).unwrap();
        assert_eq!(path, molecule.naming().input());

        let deck = fs::read_to_string(&path).unwrap();
        let directory = fs::canonicalize(temp_dir.path()).unwrap();
        assert!(deck.starts_with(&format!("# {}\n", directory.display())));
    }

    #[test]
    fn test_render_input_missing_template_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let molecule = lih(temp_dir.path());
        let options = CalculationOptions {
            template_file: Some(temp_dir.path().join("absent")),
            ..Default::default()
        };
        assert!(matches!(
            render_input(&molecule, &options),
            Err(TemplateError::Io(_))
        ));
    }
}
