use crate::diagnostic::{Diagnostic, DiagnosticCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// One structural change to a single source unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditOperation {
    /// Add a function; into `class` when given, otherwise at top level.
    AddFunction {
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        class: Option<String>,
    },
    RemoveFunction {
        name: String,
    },
    ModifyFunction {
        name: String,
        code: String,
    },
    AddImport {
        statement: String,
    },
    RemoveImport {
        module: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    AddFunction,
    RemoveFunction,
    ModifyFunction,
    AddImport,
    RemoveImport,
}

impl OperationKind {
    pub const ALL: [OperationKind; 5] = [
        OperationKind::AddFunction,
        OperationKind::RemoveFunction,
        OperationKind::ModifyFunction,
        OperationKind::AddImport,
        OperationKind::RemoveImport,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            OperationKind::AddFunction => "add_function",
            OperationKind::RemoveFunction => "remove_function",
            OperationKind::ModifyFunction => "modify_function",
            OperationKind::AddImport => "add_import",
            OperationKind::RemoveImport => "remove_import",
        }
    }

    /// Comma-separated names of every operation kind.
    pub fn valid_names() -> String {
        Self::ALL
            .iter()
            .map(|kind| kind.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = Diagnostic;

    /// Accepts `add_function`, `add-function` and `AddFunction` spellings.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalised: String = input
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().replace('_', "") == normalised)
            .ok_or_else(|| {
                Diagnostic::new(
                    DiagnosticCode::InvalidOperation,
                    format!("unknown operation '{input}'"),
                    format!("Use one of: {}.", Self::valid_names()),
                )
            })
    }
}

impl EditOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            EditOperation::AddFunction { .. } => OperationKind::AddFunction,
            EditOperation::RemoveFunction { .. } => OperationKind::RemoveFunction,
            EditOperation::ModifyFunction { .. } => OperationKind::ModifyFunction,
            EditOperation::AddImport { .. } => OperationKind::AddImport,
            EditOperation::RemoveImport { .. } => OperationKind::RemoveImport,
        }
    }

    /// Build an operation from loosely-typed request fields.
    pub fn from_parts(
        kind: &str,
        target_name: Option<&str>,
        payload: Option<&str>,
        class: Option<&str>,
    ) -> Result<Self, Diagnostic> {
        let kind: OperationKind = kind.parse()?;
        let required = |value: Option<&str>, field: &str| {
            value
                .filter(|v| !v.trim().is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    Diagnostic::new(
                        DiagnosticCode::InvalidOperation,
                        format!("{kind} requires a {field}"),
                        format!("Provide a non-empty {field} for {kind}."),
                    )
                })
        };

        Ok(match kind {
            OperationKind::AddFunction => EditOperation::AddFunction {
                code: required(payload, "payload")?,
                class: class.map(str::to_string),
            },
            OperationKind::RemoveFunction => EditOperation::RemoveFunction {
                name: required(target_name, "target name")?,
            },
            OperationKind::ModifyFunction => EditOperation::ModifyFunction {
                name: required(target_name, "target name")?,
                code: required(payload, "payload")?,
            },
            OperationKind::AddImport => EditOperation::AddImport {
                statement: required(payload, "payload")?,
            },
            OperationKind::RemoveImport => EditOperation::RemoveImport {
                module: required(target_name, "target name")?,
            },
        })
    }

    /// Short human description, e.g. `remove_function 'main'`.
    pub fn describe(&self) -> String {
        let subject = match self {
            EditOperation::AddFunction { code, .. } => first_line(code),
            EditOperation::ModifyFunction { name, .. } | EditOperation::RemoveFunction { name } => {
                name
            }
            EditOperation::AddImport { statement } => first_line(statement),
            EditOperation::RemoveImport { module } => module,
        };
        format!("{} '{subject}'", self.kind())
    }
}

fn first_line(text: &str) -> &str {
    text.lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .trim()
}

/// A caller's request as it arrives over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub path: PathBuf,
    #[serde(default)]
    pub language: Option<String>,
    pub operation_kind: String,
    #[serde(default)]
    pub target_name: Option<String>,
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
}

impl OperationRequest {
    pub fn operation(&self) -> Result<EditOperation, Diagnostic> {
        EditOperation::from_parts(
            &self.operation_kind,
            self.target_name.as_deref(),
            self.payload.as_deref(),
            self.class.as_deref(),
        )
    }
}

impl TryFrom<&OperationRequest> for EditOperation {
    type Error = Diagnostic;

    fn try_from(request: &OperationRequest) -> Result<Self, Self::Error> {
        request.operation()
    }
}
