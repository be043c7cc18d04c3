//! Program settings for psi4-bridge.
//!
//! Settings are read from INI files and supply the defaults a job file can
//! override. Files are layered with the following precedence:
//!
//! 1. Local configuration (`./psi4_bridge.cfg`)
//! 2. User configuration (`~/.config/psi4_bridge/psi4_bridge.cfg`)
//! 3. System configuration (`/etc/psi4_bridge/psi4_bridge.cfg`)
//! 4. Built-in defaults
//!
//! Each file only overrides the keys it sets, so a local file with a single
//! `[psi4] memory = 2000` line keeps everything else from the layers below.
//!
//! # Configuration File Format
//!
//! ```ini
//! [psi4]
//! command = psi4
//! memory = 8000
//!
//! [run]
//! run_scf = true
//! run_fci = false
//! tolerate_error = false
//!
//! [cleanup]
//! delete_input = true
//! delete_output = false
//! verbose = 1
//!
//! [storage]
//! data_directory = /scratch/molecules
//!
//! [logging]
//! level = info
//! ```

use crate::config::{CalculationOptions, DEFAULT_MEMORY_MB, DEFAULT_PSI4_COMMAND};
use crate::parser;
use configparser::ini::Ini;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the settings file at every level.
pub const SETTINGS_FILE_NAME: &str = "psi4_bridge.cfg";

/// Errors that can occur during configuration loading and processing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error when reading configuration files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// INI parsing error
    #[error("INI parsing error: {0}")]
    IniParse(String),
    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

type Section = HashMap<String, Option<String>>;

/// All program settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    /// Psi4 executable and resources
    pub psi4: Psi4Settings,
    /// Default methods and error handling
    pub run: RunSettings,
    /// Post-run file removal
    pub cleanup: CleanupSettings,
    /// Where molecule files live
    pub storage: StorageSettings,
    /// Logging configuration
    pub logging: LoggingSettings,
}

/// `[psi4]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Psi4Settings {
    /// Psi4 executable (default: "psi4")
    pub command: String,
    /// Memory in MB (default: 8000)
    pub memory: u64,
    /// Custom input template (default: bundled)
    pub template_file: Option<PathBuf>,
}

impl Default for Psi4Settings {
    fn default() -> Self {
        Self {
            command: DEFAULT_PSI4_COMMAND.to_string(),
            memory: DEFAULT_MEMORY_MB,
            template_file: None,
        }
    }
}

/// `[run]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSettings {
    /// Run Hartree-Fock (default: true)
    pub run_scf: bool,
    /// Run MP2 (default: false)
    pub run_mp2: bool,
    /// Run CISD (default: false)
    pub run_cisd: bool,
    /// Run CCSD (default: false)
    pub run_ccsd: bool,
    /// Run FCI (default: false)
    pub run_fci: bool,
    /// Psi4 progress printing (default: false)
    pub verbose: bool,
    /// Keep going after a failed Psi4 process (default: false)
    pub tolerate_error: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        let options = CalculationOptions::default();
        Self {
            run_scf: options.run_scf,
            run_mp2: options.run_mp2,
            run_cisd: options.run_cisd,
            run_ccsd: options.run_ccsd,
            run_fci: options.run_fci,
            verbose: options.verbose,
            tolerate_error: options.tolerate_error,
        }
    }
}

/// `[cleanup]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CleanupSettings {
    /// Remove the input deck after a run (default: true)
    pub delete_input: bool,
    /// Remove the output transcript after a run (default: false)
    pub delete_output: bool,
    /// Verbosity level for cleanup operations (default: 1)
    /// 0 = quiet, 1 = normal, 2 = verbose
    pub verbose: u32,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            delete_input: true,
            delete_output: false,
            verbose: 1,
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StorageSettings {
    /// Directory for molecule files (default: working directory)
    pub data_directory: Option<PathBuf>,
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level (default: "info")
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Calculation options seeded from these settings.
    pub fn calculation_options(&self) -> CalculationOptions {
        CalculationOptions {
            run_scf: self.run.run_scf,
            run_mp2: self.run.run_mp2,
            run_cisd: self.run.run_cisd,
            run_ccsd: self.run.run_ccsd,
            run_fci: self.run.run_fci,
            verbose: self.run.verbose,
            tolerate_error: self.run.tolerate_error,
            delete_input: self.cleanup.delete_input,
            delete_output: self.cleanup.delete_output,
            memory: self.psi4.memory,
            template_file: self.psi4.template_file.clone(),
        }
    }

    /// Overrides the keys set in `content` (INI text).
    pub fn merge_ini(&mut self, content: &str) -> Result<(), ConfigError> {
        let mut ini = Ini::new();
        let map = ini
            .read(content.to_string())
            .map_err(|e| ConfigError::IniParse(format!("Failed to parse INI: {}", e)))?;

        if let Some(section) = map.get("psi4") {
            self.merge_psi4(section)?;
        }
        if let Some(section) = map.get("run") {
            self.merge_run(section)?;
        }
        if let Some(section) = map.get("cleanup") {
            self.merge_cleanup(section)?;
        }
        if let Some(section) = map.get("storage") {
            if let Some(dir) = value(section, "data_directory") {
                self.storage.data_directory = Some(PathBuf::from(dir));
            }
        }
        if let Some(section) = map.get("logging") {
            if let Some(level) = value(section, "level") {
                self.logging.level = level.to_string();
            }
        }
        Ok(())
    }

    fn merge_psi4(&mut self, section: &Section) -> Result<(), ConfigError> {
        if let Some(command) = value(section, "command") {
            self.psi4.command = command.to_string();
        }
        if let Some(memory) = value(section, "memory") {
            self.psi4.memory = memory
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("Invalid memory: {}", memory)))?;
        }
        if let Some(template) = value(section, "template_file") {
            self.psi4.template_file = Some(PathBuf::from(template));
        }
        Ok(())
    }

    fn merge_run(&mut self, section: &Section) -> Result<(), ConfigError> {
        let run = &mut self.run;
        for (key, slot) in [
            ("run_scf", &mut run.run_scf),
            ("run_mp2", &mut run.run_mp2),
            ("run_cisd", &mut run.run_cisd),
            ("run_ccsd", &mut run.run_ccsd),
            ("run_fci", &mut run.run_fci),
            ("verbose", &mut run.verbose),
            ("tolerate_error", &mut run.tolerate_error),
        ] {
            if let Some(raw) = value(section, key) {
                *slot = parse_flag(key, raw)?;
            }
        }
        Ok(())
    }

    fn merge_cleanup(&mut self, section: &Section) -> Result<(), ConfigError> {
        if let Some(raw) = value(section, "delete_input") {
            self.cleanup.delete_input = parse_flag("delete_input", raw)?;
        }
        if let Some(raw) = value(section, "delete_output") {
            self.cleanup.delete_output = parse_flag("delete_output", raw)?;
        }
        if let Some(verbose) = value(section, "verbose") {
            self.cleanup.verbose = verbose.parse().map_err(|_| {
                ConfigError::InvalidValue(format!("Invalid verbose value: {}", verbose))
            })?;
        }
        Ok(())
    }
}

fn value<'a>(section: &'a Section, key: &str) -> Option<&'a str> {
    section
        .get(key)
        .and_then(|v| v.as_deref())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    parser::parse_bool(key, raw).map_err(|e| ConfigError::InvalidValue(e.to_string()))
}

/// Configuration manager that handles loading and accessing program settings.
pub struct SettingsManager {
    settings: Settings,
    config_source: String,
}

impl SettingsManager {
    /// Loads configuration from the available configuration files.
    ///
    /// A file that fails to parse is skipped with a warning; the remaining
    /// layers still apply.
    pub fn load() -> Result<Self, ConfigError> {
        let mut candidates = Vec::new();
        if let Some(system_path) = Self::get_system_config_path() {
            candidates.push(("system", system_path));
        }
        if let Some(user_path) = Self::get_user_config_path() {
            candidates.push(("user", user_path));
        }
        candidates.push(("local", PathBuf::from(SETTINGS_FILE_NAME)));

        let manager = Self::load_layers(&candidates);
        info!("Configuration loaded from: {}", manager.config_source);
        Ok(manager)
    }

    /// Applies each existing file in order, later files overriding earlier ones.
    pub fn load_layers(candidates: &[(&str, PathBuf)]) -> Self {
        let mut settings = Settings::default();
        let mut config_source = "built-in defaults".to_string();

        for (label, path) in candidates {
            if !path.exists() {
                continue;
            }
            let mut layered = settings.clone();
            match fs::read_to_string(path)
                .map_err(ConfigError::from)
                .and_then(|content| layered.merge_ini(&content))
            {
                Ok(()) => {
                    settings = layered;
                    config_source = format!("{} config ({})", label, path.display());
                    debug!("Loaded {} configuration from: {}", label, path.display());
                }
                Err(e) => warn!(
                    "Failed to load {} config from {}: {}",
                    label,
                    path.display(),
                    e
                ),
            }
        }

        Self {
            settings,
            config_source,
        }
    }

    /// Returns the source of the loaded configuration.
    pub fn config_source(&self) -> &str {
        &self.config_source
    }

    /// Gets a reference to the settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Gets the logging settings.
    pub fn logging(&self) -> &LoggingSettings {
        &self.settings.logging
    }

    /// Gets the cleanup settings.
    pub fn cleanup(&self) -> &CleanupSettings {
        &self.settings.cleanup
    }

    /// Gets the system configuration file path.
    fn get_system_config_path() -> Option<PathBuf> {
        #[cfg(unix)]
        {
            Some(PathBuf::from("/etc/psi4_bridge").join(SETTINGS_FILE_NAME))
        }
        #[cfg(windows)]
        {
            std::env::var("PROGRAMDATA")
                .ok()
                .map(|pd| PathBuf::from(pd).join("psi4_bridge").join(SETTINGS_FILE_NAME))
        }
    }

    /// Gets the user configuration file path.
    fn get_user_config_path() -> Option<PathBuf> {
        #[cfg(unix)]
        {
            std::env::var("HOME").ok().map(|home| {
                PathBuf::from(home)
                    .join(".config")
                    .join("psi4_bridge")
                    .join(SETTINGS_FILE_NAME)
            })
        }
        #[cfg(windows)]
        {
            std::env::var("APPDATA").ok().map(|appdata| {
                PathBuf::from(appdata)
                    .join("psi4_bridge")
                    .join(SETTINGS_FILE_NAME)
            })
        }
    }
}

impl SettingsManager {
    /// Writes a commented settings file with every option at its default.
    pub fn create_template(path: &Path) -> Result<(), ConfigError> {
        fs::write(path, Self::generate_template_content())?;
        info!("Created settings template at: {}", path.display());
        Ok(())
    }

    /// Generates the content for a psi4_bridge.cfg template file.
    pub fn generate_template_content() -> String {
        let defaults = Settings::default();
        format!(
            r#"# psi4-bridge configuration file
#
# Files are loaded in hierarchical order with local settings taking precedence:
#
# 1. Current working directory (./psi4_bridge.cfg) - highest priority
# 2. User config directory (~/.config/psi4_bridge/psi4_bridge.cfg)
# 3. System config directory (/etc/psi4_bridge/psi4_bridge.cfg)
# 4. Built-in defaults
#
# Keys left out keep the value from the layer below. Job files override
# everything here.

[psi4]
# Psi4 executable, either on PATH or an absolute path (default: {command})
command = {command}

# Memory handed to Psi4 in MB (default: {memory})
memory = {memory}

# Custom input template; leave commented out for the bundled one
# template_file = /path/to/psi4_template

[run]
# Methods run when a job file does not say otherwise
run_scf = {run_scf}
run_mp2 = {run_mp2}
run_cisd = {run_cisd}
run_ccsd = {run_ccsd}
run_fci = {run_fci}

# Ask Psi4 to print progress (default: {verbose})
verbose = {verbose}

# Keep going when Psi4 exits with an error (default: {tolerate_error})
tolerate_error = {tolerate_error}

[cleanup]
# Remove the generated .inp file after the run (default: {delete_input})
delete_input = {delete_input}

# Remove the Psi4 .out transcript after the run (default: {delete_output})
# Keep it if you want to read CCSD amplitudes later.
delete_output = {delete_output}

# 0 = quiet, 1 = summary, 2 = every removed file (default: {cleanup_verbose})
verbose = {cleanup_verbose}

[storage]
# Directory for molecule files; defaults to the working directory
# data_directory = /scratch/molecules

[logging]
# Log level: debug, info, warn, error (default: {level})
level = {level}
"#,
            command = defaults.psi4.command,
            memory = defaults.psi4.memory,
            run_scf = defaults.run.run_scf,
            run_mp2 = defaults.run.run_mp2,
            run_cisd = defaults.run.run_cisd,
            run_ccsd = defaults.run.run_ccsd,
            run_fci = defaults.run.run_fci,
            verbose = defaults.run.verbose,
            tolerate_error = defaults.run.tolerate_error,
            delete_input = defaults.cleanup.delete_input,
            delete_output = defaults.cleanup.delete_output,
            cleanup_verbose = defaults.cleanup.verbose,
            level = defaults.logging.level,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_calculation_options() {
        assert_eq!(
            Settings::default().calculation_options(),
            CalculationOptions::default()
        );
    }

    #[test]
    fn test_merge_overrides_only_given_keys() {
        let mut settings = Settings::default();
        settings
            .merge_ini("[psi4]\nmemory = 2000\n\n[run]\nrun_fci = yes\n")
            .unwrap();
        assert_eq!(settings.psi4.memory, 2000);
        assert_eq!(settings.psi4.command, "psi4");
        assert!(settings.run.run_fci);
        assert!(settings.run.run_scf);
        assert!(settings.cleanup.delete_input);
    }

    #[test]
    fn test_merge_rejects_bad_values() {
        let mut settings = Settings::default();
        assert!(matches!(
            settings.merge_ini("[run]\nrun_fci = perhaps\n"),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(
            settings.merge_ini("[psi4]\nmemory = lots\n"),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_later_layers_win() {
        let dir = TempDir::new().unwrap();
        let system = dir.path().join("system.cfg");
        let local = dir.path().join("local.cfg");
        fs::write(&system, "[psi4]\ncommand = /opt/psi4/bin/psi4\nmemory = 4000\n").unwrap();
        fs::write(&local, "[psi4]\nmemory = 1000\n[logging]\nlevel = debug\n").unwrap();

        let manager = SettingsManager::load_layers(&[
            ("system", system),
            ("user", dir.path().join("missing.cfg")),
            ("local", local),
        ]);
        let settings = manager.settings();
        assert_eq!(settings.psi4.command, "/opt/psi4/bin/psi4");
        assert_eq!(settings.psi4.memory, 1000);
        assert_eq!(manager.logging().level, "debug");
        assert!(manager.config_source().starts_with("local config"));
    }

    #[test]
    fn test_broken_layer_is_skipped() {
        let dir = TempDir::new().unwrap();
        let user = dir.path().join("user.cfg");
        fs::write(&user, "[cleanup]\ndelete_output = true\nverbose = loud\n").unwrap();

        let manager = SettingsManager::load_layers(&[("user", user)]);
        assert!(!manager.cleanup().delete_output);
        assert_eq!(manager.config_source(), "built-in defaults");
    }

    #[test]
    fn test_template_round_trips_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        SettingsManager::create_template(&path).unwrap();

        let mut settings = Settings::default();
        settings
            .merge_ini(&fs::read_to_string(&path).unwrap())
            .unwrap();
        assert_eq!(settings, Settings::default());
    }
}
