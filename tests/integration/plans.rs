//! Edit plans loaded from TOML and applied as one transaction.

use std::fs;
use surgical_edit::approval::{AutoApprove, AutoReject};
use surgical_edit::config::{self, ApplyOptions, ConfigError, EditPlan, ValidationIssue};
use surgical_edit::CommitOutcome;

fn setup() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(
        dir.path().join("src/lib.rs"),
        "use std::fs;\nuse std::io;\n\npub fn read() -> io::Result<String> {\n    fs::read_to_string(\"x\")\n}\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("tool.py"),
        "import os\n\n\ndef main():\n    print(os.getcwd())\n",
    )
    .unwrap();
    dir
}

const PLAN: &str = r#"
[meta]
description = "tidy up"
workspace_relative = true

[[edits]]
id = "drop-fs"
file = "src/lib.rs"
[edits.operation]
type = "modify_function"
name = "read"
code = """
pub fn read() -> io::Result<String> {
    Ok(String::new())
}"""

[[edits]]
id = "add-helper"
file = "tool.py"
[edits.operation]
type = "add_function"
code = """
def helper():
    return os.sep"""

[[edits]]
id = "notes"
file = "NOTES.md"
[edits.operation]
type = "write"
contents = "tidied\n"
"#;

#[test]
fn plan_applies_every_edit() {
    let dir = setup();
    let plan: EditPlan = config::load_from_str(PLAN).unwrap();

    let outcome = config::apply_plan(
        &plan,
        dir.path(),
        dir.path(),
        &ApplyOptions::default(),
        &mut AutoApprove,
    )
    .unwrap();
    assert!(matches!(outcome, CommitOutcome::Committed(ref report) if report.changes.len() == 3));

    let lib = fs::read_to_string(dir.path().join("src/lib.rs")).unwrap();
    assert!(lib.contains("    Ok(String::new())\n"));
    assert!(lib.starts_with("use std::fs;\nuse std::io;\n\n"));

    let tool = fs::read_to_string(dir.path().join("tool.py")).unwrap();
    assert!(tool.ends_with("\n\n\ndef helper():\n    return os.sep\n"));
    assert_eq!(
        fs::read_to_string(dir.path().join("NOTES.md")).unwrap(),
        "tidied\n"
    );
}

#[test]
fn dry_run_plan_writes_nothing() {
    let dir = setup();
    let plan: EditPlan = config::load_from_str(PLAN).unwrap();
    let before = fs::read(dir.path().join("tool.py")).unwrap();

    let outcome = config::apply_plan(
        &plan,
        dir.path(),
        dir.path(),
        &ApplyOptions {
            dry_run: true,
            ..ApplyOptions::default()
        },
        &mut AutoApprove,
    )
    .unwrap();

    let CommitOutcome::Committed(report) = outcome else {
        panic!("dry run should report changes");
    };
    assert!(!report.applied);
    assert_eq!(fs::read(dir.path().join("tool.py")).unwrap(), before);
    assert!(!dir.path().join("NOTES.md").exists());
}

#[test]
fn rejected_plan_is_rolled_back() {
    let dir = setup();
    let plan: EditPlan = config::load_from_str(PLAN).unwrap();

    let outcome = config::apply_plan(
        &plan,
        dir.path(),
        dir.path(),
        &ApplyOptions::default(),
        &mut AutoReject,
    )
    .unwrap();

    assert!(matches!(outcome, CommitOutcome::Rejected { .. }));
    assert!(!dir.path().join("NOTES.md").exists());
}

#[test]
fn invalid_plan_lists_each_issue() {
    let err = config::load_from_str::<EditPlan>(
        r#"
[[edits]]
file = "a.py"
[edits.operation]
type = "move"
to = "a.py"
"#,
    )
    .unwrap_err();

    let ConfigError::Validation { source, .. } = err else {
        panic!("expected validation error");
    };
    assert_eq!(source.issues.len(), 2);
    assert!(matches!(
        source.issues[0],
        ValidationIssue::InvalidCombo { .. }
    ));
    assert!(matches!(
        source.issues[1],
        ValidationIssue::DuplicateFile { .. }
    ));
}

#[test]
fn unknown_operation_type_is_a_toml_error() {
    let err = config::load_from_str::<EditPlan>(
        r#"
[[edits]]
file = "a.py"
[edits.operation]
type = "rename_function"
"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Toml { .. }));
}
