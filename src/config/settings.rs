use crate::config::schema::{ValidationError, ValidationIssue};
use crate::index::LayoutOptions;
use serde::Deserialize;
use std::fmt;

/// Tool settings, read from `surgical-edit.toml`.
///
/// ```toml
/// [layout]
/// default_blank_lines = 1
/// indent_width = 4
///
/// [logging]
/// filter = "surgical_edit=debug"
/// format = "json"
///
/// [approval]
/// auto_approve = false
/// ```
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub layout: LayoutSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub approval: ApprovalSettings,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LayoutSettings {
    /// Overrides the per-language default when the file gives no sample.
    #[serde(default)]
    pub default_blank_lines: Option<usize>,
    #[serde(default = "default_indent_width")]
    pub indent_width: usize,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            default_blank_lines: None,
            indent_width: default_indent_width(),
        }
    }
}

fn default_indent_width() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            format: LogFormat::default(),
        }
    }
}

fn default_filter() -> String {
    "warn".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Compact => f.write_str("compact"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (expected compact or json)")),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ApprovalSettings {
    #[serde(default)]
    pub auto_approve: bool,
}

impl Settings {
    pub fn layout_options(&self) -> LayoutOptions {
        LayoutOptions {
            blank_lines: self.layout.default_blank_lines,
            indent_width: self.layout.indent_width,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.layout.indent_width == 0 || self.layout.indent_width > 16 {
            issues.push(ValidationIssue::InvalidSetting {
                key: "layout.indent_width",
                message: format!("{} is outside 1..=16", self.layout.indent_width),
            });
        }
        if let Some(blanks) = self.layout.default_blank_lines {
            if blanks > 8 {
                issues.push(ValidationIssue::InvalidSetting {
                    key: "layout.default_blank_lines",
                    message: format!("{blanks} is more than 8"),
                });
            }
        }
        if let Err(err) = tracing_subscriber::EnvFilter::try_new(&self.logging.filter) {
            issues.push(ValidationIssue::InvalidSetting {
                key: "logging.filter",
                message: err.to_string(),
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_tables() {
        let settings: Settings = toml_edit::de::from_str("[approval]\nauto_approve = true\n").unwrap();
        assert!(settings.approval.auto_approve);
        assert_eq!(settings.layout, LayoutSettings::default());
        assert_eq!(settings.logging.format, LogFormat::Compact);
        settings.validate().unwrap();
    }

    #[test]
    fn layout_maps_to_engine_options() {
        let settings: Settings =
            toml_edit::de::from_str("[layout]\ndefault_blank_lines = 3\nindent_width = 2\n")
                .unwrap();
        let options = settings.layout_options();
        assert_eq!(options.blank_lines, Some(3));
        assert_eq!(options.indent_width, 2);
    }

    #[test]
    fn rejects_unknown_keys() {
        let result: Result<Settings, _> = toml_edit::de::from_str("[layout]\nindent = 2\n");
        assert!(result.is_err());
    }

    #[test]
    fn reports_out_of_range_values() {
        let mut settings = Settings::default();
        settings.layout.indent_width = 0;
        settings.layout.default_blank_lines = Some(20);
        let err = settings.validate().unwrap_err();
        assert_eq!(err.issues.len(), 2);
    }

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert!("pretty".parse::<LogFormat>().is_err());
    }
}
