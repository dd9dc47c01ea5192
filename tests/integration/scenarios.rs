//! Whole-file edit scenarios through the public API.

use std::fs;
use surgical_edit::approval::AutoApprove;
use surgical_edit::mutation::apply;
use surgical_edit::{
    index, validate, DiagnosticCode, EditOperation, EditState, FileOp, Language, Pipeline,
    SourceUnit, Transaction, TransactionError,
};

fn run(text: &str, language: &str, op: EditOperation) -> Result<String, surgical_edit::Diagnostic> {
    let unit = SourceUnit::new(text, language);
    let structure = index(&unit)?;
    apply(&unit, &structure, &op).map(|mutation| mutation.new_text)
}

#[test]
fn add_function_after_foo() {
    let out = run(
        "def foo():\n    return 1\n",
        "python",
        EditOperation::AddFunction {
            code: "def bar():\n    return 2".into(),
            class: None,
        },
    )
    .unwrap();

    assert_eq!(out, "def foo():\n    return 1\n\n\ndef bar():\n    return 2\n");
    assert!(validate(&out, Language::Python).is_ok());
}

#[test]
fn removed_function_is_gone_from_the_index() {
    let source = "def keep():\n    pass\n\n\ndef drop():\n    pass\n";
    let remove = EditOperation::RemoveFunction {
        name: "drop".into(),
    };

    let out = run(source, "python", remove.clone()).unwrap();
    let structure = index(&SourceUnit::new(out.as_str(), "python")).unwrap();
    assert!(structure.find_callables("drop").is_empty());
    assert_eq!(structure.find_callables("keep").len(), 1);

    let again = run(&out, "python", remove).unwrap_err();
    assert_eq!(again.code, DiagnosticCode::TargetNotFound);
}

#[test]
fn duplicate_add_is_rejected() {
    let err = run(
        "fn helper() {}\n",
        "rust",
        EditOperation::AddFunction {
            code: "fn helper() -> u8 { 1 }".into(),
            class: None,
        },
    )
    .unwrap_err();

    assert_eq!(err.code, DiagnosticCode::DuplicateTarget);
    assert!(err.suggestion.contains("modify_function"));
}

#[test]
fn method_added_to_typescript_class() {
    let source = "export class Store {\n  load(): void {}\n}\n";
    let out = run(
        source,
        "typescript",
        EditOperation::AddFunction {
            code: "save(): void {}".into(),
            class: Some("Store".into()),
        },
    )
    .unwrap();

    assert_eq!(
        out,
        "export class Store {\n  load(): void {}\n\n  save(): void {}\n}\n"
    );
}

#[test]
fn modify_rust_method_in_place() {
    let source = "struct S;\n\nimpl S {\n    /// Doubles.\n    fn twice(&self, x: u8) -> u8 {\n        x * 2\n    }\n}\n";
    let out = run(
        source,
        "rust",
        EditOperation::ModifyFunction {
            name: "S.twice".into(),
            code: "fn twice(&self, x: u8) -> u8 {\n    x + x\n}".into(),
        },
    )
    .unwrap();

    assert_eq!(
        out,
        "struct S;\n\nimpl S {\n    /// Doubles.\n    fn twice(&self, x: u8) -> u8 {\n        x + x\n    }\n}\n"
    );
}

#[test]
fn indentation_error_is_explained() {
    let err = validate(
        "def foo():\n    x = 1\n            return x\n",
        Language::Python,
    )
    .unwrap_err();
    let diagnostic = err.to_diagnostic();

    assert_eq!(diagnostic.code, DiagnosticCode::SyntaxError);
    assert!(diagnostic
        .message
        .contains("Expected: 4 spaces... Got: 12 spaces... remove 8 spaces"));
    assert_eq!(diagnostic.line_number, Some(3));
    let context = diagnostic.context.unwrap();
    assert_eq!(context.lines().count(), 3);
}

#[test]
fn missing_target_leaves_file_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.py");
    let original = "def present():\n    pass\n";
    fs::write(&path, original).unwrap();

    let mut txn = Transaction::on_disk();
    txn.stage(FileOp::Edit {
        path: path.clone(),
        language: None,
        operation: EditOperation::RemoveFunction {
            name: "absent".into(),
        },
    })
    .unwrap();

    let err = txn.commit().unwrap_err();
    let TransactionError::Operation { diagnostic, .. } = err else {
        panic!("expected an operation failure");
    };
    assert_eq!(diagnostic.code, DiagnosticCode::TargetNotFound);
    assert_eq!(diagnostic.nearest_match.as_deref(), Some("present"));
    assert_eq!(fs::read_to_string(&path).unwrap(), original);
}

#[test]
fn pipeline_reports_every_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main.js");
    fs::write(&path, "import fs from \"fs\";\n\nfunction main() {}\n").unwrap();

    let report = Pipeline::on_disk().run(
        &surgical_edit::OperationRequest {
            path: path.clone(),
            language: None,
            operation_kind: "remove_import".into(),
            target_name: Some("fs".into()),
            payload: None,
            class: None,
        },
        &mut AutoApprove,
    );

    assert_eq!(report.state(), Some(EditState::Committed), "{report:?}");
    assert!(!fs::read_to_string(&path).unwrap().contains("import fs"));
}
