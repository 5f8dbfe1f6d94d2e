//! Process settings.
//!
//! Only one setting exists: `DebugOutput`, which echoes status and debug
//! events to the console. It is read from an optional YAML file and may be
//! overridden from the environment. Anything missing or unparsable means
//! "disabled".

use pcm_common::{ConfigError, ConfigResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Settings file looked up in the working directory.
pub const DEFAULT_SETTINGS_FILE: &str = "connection-monitor.yaml";

/// Overrides the settings file location.
pub const SETTINGS_PATH_ENV: &str = "PCM_CONFIG";

/// Overrides `DebugOutput`.
pub const DEBUG_OUTPUT_ENV: &str = "PCM_DEBUG_OUTPUT";

const DEBUG_OUTPUT_KEY: &str = "DebugOutput";

/// Raw file layout. Values are kept loose so that a bad value degrades to
/// "disabled" instead of failing the whole file.
#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(rename = "DebugOutput", alias = "debug_output", default)]
    debug_output: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorSettings {
    pub debug_output: bool,
}

impl MonitorSettings {
    /// Load from the settings file and environment.
    ///
    /// Returns the settings together with every problem encountered, so the
    /// caller can report them once logging is up.
    pub fn load() -> (Self, Vec<ConfigError>) {
        let path = std::env::var_os(SETTINGS_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
        let env_override = std::env::var(DEBUG_OUTPUT_ENV).ok();
        Self::load_from(&path, env_override.as_deref())
    }

    /// Load from an explicit file and optional override value.
    pub fn load_from(path: &Path, env_override: Option<&str>) -> (Self, Vec<ConfigError>) {
        let mut problems = Vec::new();

        let mut settings = match std::fs::read_to_string(path) {
            Ok(content) => match Self::load_from_str(&content) {
                Ok(settings) => settings,
                Err(e) => {
                    problems.push(e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        };

        if let Some(value) = env_override {
            match parse_flag(DEBUG_OUTPUT_ENV, value) {
                Ok(flag) => settings.debug_output = flag,
                Err(e) => {
                    problems.push(e);
                    settings.debug_output = false;
                }
            }
        }

        (settings, problems)
    }

    /// Parse settings YAML.
    pub fn load_from_str(content: &str) -> ConfigResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let file: SettingsFile = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::invalid_setting("settings file", e.to_string()))?;

        let debug_output = match file.debug_output {
            None | Some(serde_yaml::Value::Null) => false,
            Some(serde_yaml::Value::Bool(flag)) => flag,
            Some(serde_yaml::Value::String(text)) => parse_flag(DEBUG_OUTPUT_KEY, &text)?,
            Some(other) => {
                return Err(ConfigError::invalid_setting(
                    DEBUG_OUTPUT_KEY,
                    format!("expected true or false, got {:?}", other),
                ))
            }
        };

        Ok(Self { debug_output })
    }
}

/// Lenient boolean: `true`/`false` in any case, surrounding space ignored.
fn parse_flag(key: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConfigError::invalid_setting(
            key,
            format!("expected true or false, got {:?}", value),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_disabled() {
        assert_eq!(MonitorSettings::load_from_str("").unwrap(), MonitorSettings::default());
        assert!(!MonitorSettings::load_from_str("{}").unwrap().debug_output);
    }

    #[test]
    fn test_parses_debug_output() {
        assert!(MonitorSettings::load_from_str("DebugOutput: true").unwrap().debug_output);
        assert!(MonitorSettings::load_from_str("DebugOutput: \"True\"").unwrap().debug_output);
        assert!(MonitorSettings::load_from_str("debug_output: true").unwrap().debug_output);
        assert!(!MonitorSettings::load_from_str("DebugOutput: false").unwrap().debug_output);
    }

    #[test]
    fn test_unparsable_value_is_an_error() {
        let err = MonitorSettings::load_from_str("DebugOutput: sometimes").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting { .. }));
        assert!(MonitorSettings::load_from_str("DebugOutput: 1").is_err());
    }

    #[test]
    fn test_missing_file_is_disabled_without_problems() {
        let dir = tempfile::tempdir().unwrap();
        let (settings, problems) = MonitorSettings::load_from(&dir.path().join("absent.yaml"), None);
        assert!(!settings.debug_output);
        assert!(problems.is_empty());
    }

    #[test]
    fn test_bad_file_degrades_to_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        std::fs::write(&path, "DebugOutput: [not, a, flag]").unwrap();

        let (settings, problems) = MonitorSettings::load_from(&path, None);
        assert!(!settings.debug_output);
        assert_eq!(problems.len(), 1);
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        std::fs::write(&path, "DebugOutput: false").unwrap();

        let (settings, _) = MonitorSettings::load_from(&path, Some("TRUE"));
        assert!(settings.debug_output);

        let (settings, problems) = MonitorSettings::load_from(&path, Some("yes please"));
        assert!(!settings.debug_output);
        assert_eq!(problems.len(), 1);
    }
}
