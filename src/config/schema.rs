use crate::mutation::EditOperation;
use crate::transaction::FileOp;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// A batch of file operations applied as one transaction.
///
/// ```toml
/// [meta]
/// description = "split helpers out of app.py"
/// workspace_relative = true
///
/// [[edits]]
/// file = "app.py"
/// [edits.operation]
/// type = "remove_function"
/// name = "helper"
/// ```
#[derive(Debug, Deserialize, Default, Clone)]
pub struct EditPlan {
    #[serde(default)]
    pub meta: PlanMeta,
    #[serde(default)]
    pub edits: Vec<PlannedEdit>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PlanMeta {
    #[serde(default)]
    pub description: Option<String>,
    /// Resolve `file` against the workspace root instead of the plan's directory.
    #[serde(default)]
    pub workspace_relative: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlannedEdit {
    #[serde(default)]
    pub id: Option<String>,
    pub file: String,
    #[serde(default)]
    pub language: Option<String>,
    pub operation: PlanOperation,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanOperation {
    AddFunction {
        code: String,
        #[serde(default)]
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
    Write {
        contents: String,
    },
    Move {
        to: String,
    },
    Delete,
}

impl PlanOperation {
    fn is_structural(&self) -> bool {
        !matches!(
            self,
            PlanOperation::Write { .. } | PlanOperation::Move { .. } | PlanOperation::Delete
        )
    }

    fn edit_operation(&self) -> Option<EditOperation> {
        let op = match self {
            PlanOperation::AddFunction { code, class } => EditOperation::AddFunction {
                code: code.clone(),
                class: class.clone(),
            },
            PlanOperation::RemoveFunction { name } => {
                EditOperation::RemoveFunction { name: name.clone() }
            }
            PlanOperation::ModifyFunction { name, code } => EditOperation::ModifyFunction {
                name: name.clone(),
                code: code.clone(),
            },
            PlanOperation::AddImport { statement } => EditOperation::AddImport {
                statement: statement.clone(),
            },
            PlanOperation::RemoveImport { module } => EditOperation::RemoveImport {
                module: module.clone(),
            },
            PlanOperation::Write { .. } | PlanOperation::Move { .. } | PlanOperation::Delete => {
                return None
            }
        };
        Some(op)
    }

    /// Required text fields, as `(name, value)`.
    fn required_fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            PlanOperation::AddFunction { code, .. } => vec![("operation.code", code)],
            PlanOperation::RemoveFunction { name } => vec![("operation.name", name)],
            PlanOperation::ModifyFunction { name, code } => {
                vec![("operation.name", name), ("operation.code", code)]
            }
            PlanOperation::AddImport { statement } => vec![("operation.statement", statement)],
            PlanOperation::RemoveImport { module } => vec![("operation.module", module)],
            PlanOperation::Move { to } => vec![("operation.to", to)],
            PlanOperation::Write { .. } | PlanOperation::Delete => Vec::new(),
        }
    }
}

impl PlannedEdit {
    fn label(&self, position: usize) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("#{}", position + 1))
    }

    /// Paths this edit touches, relative to the plan's base directory.
    fn touched(&self) -> Vec<&str> {
        match &self.operation {
            PlanOperation::Move { to } => vec![self.file.as_str(), to.as_str()],
            _ => vec![self.file.as_str()],
        }
    }

    pub fn to_file_op(&self, base: &Path) -> FileOp {
        let path = resolve(base, &self.file);
        if let Some(operation) = self.operation.edit_operation() {
            return FileOp::Edit {
                path,
                language: self.language.clone(),
                operation,
            };
        }
        match &self.operation {
            PlanOperation::Write { contents } => FileOp::Write {
                path,
                contents: contents.clone(),
            },
            PlanOperation::Move { to } => FileOp::Move {
                from: path,
                to: resolve(base, to),
            },
            _ => FileOp::Delete { path },
        }
    }
}

fn resolve(base: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl EditPlan {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.edits.is_empty() {
            issues.push(ValidationIssue::EmptyPlan);
        }

        let mut seen = HashSet::new();
        for (position, edit) in self.edits.iter().enumerate() {
            let label = edit.label(position);

            if edit.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    edit: label.clone(),
                    field: "file",
                });
            }
            for (field, value) in edit.operation.required_fields() {
                if value.trim().is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        edit: label.clone(),
                        field,
                    });
                }
            }

            if edit.language.is_some() && !edit.operation.is_structural() {
                issues.push(ValidationIssue::InvalidCombo {
                    edit: label.clone(),
                    message: "language only applies to structural operations".to_string(),
                });
            }
            if let PlanOperation::Move { to } = &edit.operation {
                if *to == edit.file {
                    issues.push(ValidationIssue::InvalidCombo {
                        edit: label.clone(),
                        message: "move source and destination are the same file".to_string(),
                    });
                }
            }

            for file in edit.touched() {
                if !file.trim().is_empty() && !seen.insert(file) {
                    issues.push(ValidationIssue::DuplicateFile {
                        edit: label.clone(),
                        file: file.to_string(),
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// File operations in plan order.
    pub fn file_ops(&self, base: &Path) -> Vec<FileOp> {
        self.edits.iter().map(|edit| edit.to_file_op(base)).collect()
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyPlan,
    MissingField {
        edit: String,
        field: &'static str,
    },
    InvalidCombo {
        edit: String,
        message: String,
    },
    /// One transaction may touch each file once.
    DuplicateFile {
        edit: String,
        file: String,
    },
    InvalidSetting {
        key: &'static str,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPlan => write!(f, "edit plan contains no edits"),
            ValidationIssue::MissingField { edit, field } => {
                write!(f, "edit '{edit}' missing required field '{field}'")
            }
            ValidationIssue::InvalidCombo { edit, message } => {
                write!(f, "edit '{edit}' has invalid configuration: {message}")
            }
            ValidationIssue::DuplicateFile { edit, file } => {
                write!(f, "edit '{edit}' touches '{file}', which an earlier edit already touches")
            }
            ValidationIssue::InvalidSetting { key, message } => {
                write!(f, "setting '{key}' is invalid: {message}")
            }
        }
    }
}
