//! Server configuration: TOML file with `NIGHTWATCH_` environment overrides.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

use nightwatch_core::{CalibrationConfig, SchedulerConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory scanned for newly ingested exposures, laid out as
    /// `<spool>/<night>/<file>`.
    pub spool_dir: PathBuf,

    /// Directory holding the persisted scheduler and calibration state.
    pub state_dir: PathBuf,

    pub recipes: RecipesConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub calibration: CalibrationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecipesConfig {
    /// Directory containing the reduction recipe executables.
    pub directory: PathBuf,

    /// Optional interpreter the recipes are run through.
    #[serde(default)]
    pub interpreter: Option<PathBuf>,

    /// Programs whose failures are logged but never escalated.
    #[serde(default)]
    pub ignored_programs: Vec<String>,

    /// Log the commands without running anything.
    #[serde(default)]
    pub trace: bool,
}

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("NIGHTWATCH_").split("_"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_load_config_from_str_minimal() {
        let toml = r#"
spool_dir = "/data/spool"
state_dir = "/data/state"

[recipes]
directory = "/opt/recipes"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.spool_dir, PathBuf::from("/data/spool"));
        assert_eq!(config.scheduler.num_workers, 4);
        assert!(config.recipes.interpreter.is_none());
        assert!(!config.recipes.trace);
    }

    #[test]
    fn test_load_config_from_str_missing_recipes() {
        let toml = r#"
spool_dir = "/data/spool"
state_dir = "/data/state"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
spool_dir = "/data/spool"
state_dir = "/data/state"

[recipes]
directory = "/opt/recipes"
interpreter = "/usr/bin/python3"
ignored_programs = ["cal_preprocess"]

[scheduler]
num_workers = 8

[calibration]
preseeded_steps = []
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.scheduler.num_workers, 8);
        assert_eq!(
            config.recipes.interpreter,
            Some(PathBuf::from("/usr/bin/python3"))
        );
        assert_eq!(config.recipes.ignored_programs, vec!["cal_preprocess"]);
        assert!(config.calibration.preseeded_steps.is_empty());
    }
}
