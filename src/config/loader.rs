use crate::config::schema::{EditPlan, ValidationError};
use crate::config::settings::Settings;
use serde::de::DeserializeOwned;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Settings file picked up from the working directory when `--config` is absent.
pub const DEFAULT_SETTINGS_FILE: &str = "surgical-edit.toml";

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(f, "failed to parse TOML ({}): {}", path.display(), source),
                None => write!(f, "failed to parse TOML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid configuration ({}): {}", path.display(), source),
                None => write!(f, "invalid configuration: {}", source),
            },
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

/// Documents that check themselves after deserialisation.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

impl Validate for EditPlan {
    fn validate(&self) -> Result<(), ValidationError> {
        EditPlan::validate(self)
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<(), ValidationError> {
        Settings::validate(self)
    }
}

pub fn load_from_str<T: DeserializeOwned + Validate>(input: &str) -> Result<T, ConfigError> {
    let value: T = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    value
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(value)
}

pub fn load_from_path<T: DeserializeOwned + Validate>(
    path: impl AsRef<Path>,
) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

pub fn load_plan(path: impl AsRef<Path>) -> Result<EditPlan, ConfigError> {
    load_from_path(path)
}

/// Settings from `explicit`, else `surgical-edit.toml` in `dir` if present,
/// else defaults.
pub fn load_settings(explicit: Option<&Path>, dir: &Path) -> Result<Settings, ConfigError> {
    if let Some(path) = explicit {
        return load_from_path(path);
    }
    let candidate = dir.join(DEFAULT_SETTINGS_FILE);
    if candidate.is_file() {
        tracing::debug!(path = %candidate.display(), "using settings file");
        return load_from_path(candidate);
    }
    Ok(Settings::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_carry_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.toml");
        fs::write(&path, "[meta]\ndescription = \"nothing\"\n").unwrap();

        let err = load_plan(&path).unwrap_err();
        assert!(matches!(&err, ConfigError::Validation { path: Some(p), .. } if *p == path));
        assert!(err.to_string().contains("edit plan contains no edits"));
    }

    #[test]
    fn toml_errors_carry_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("surgical-edit.toml");
        fs::write(&path, "[layout\n").unwrap();

        let err = load_settings(None, dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { path: Some(_), .. }));
    }

    #[test]
    fn missing_settings_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_settings(None, dir.path()).unwrap(), Settings::default());
    }

    #[test]
    fn explicit_missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_settings(Some(&dir.path().join("nope.toml")), dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
