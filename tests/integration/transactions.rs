//! Multi-file atomicity against the real filesystem.

use std::fs;
use std::path::PathBuf;
use surgical_edit::approval::{ApprovalDecision, ChannelGate};
use surgical_edit::transaction::{ChangeKind, Stage};
use surgical_edit::{
    CommitOutcome, DiagnosticCode, EditOperation, FileOp, Transaction, TransactionError,
    WorkspaceGuard,
};

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new(files: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn read(&self, name: &str) -> Vec<u8> {
        fs::read(self.path(name)).unwrap()
    }
}

const A: &str = "def a():\n    return 1\n";
const B: &str = "fn b() -> u8 {\n    1\n}\n";
const C: &str = "export function c(): number {\n  return 1;\n}\n";

#[test]
fn third_invalid_write_rolls_back_all_three() {
    let ws = Workspace::new(&[("a.py", A), ("b.rs", B), ("c.ts", C)]);

    let mut txn = Transaction::on_disk();
    txn.stage(FileOp::Edit {
        path: ws.path("a.py"),
        language: None,
        operation: EditOperation::AddFunction {
            code: "def a2():\n    return 2".into(),
            class: None,
        },
    })
    .unwrap();
    txn.stage(FileOp::Write {
        path: ws.path("b.rs"),
        contents: "fn b() -> u8 {\n    2\n}\n".into(),
    })
    .unwrap();
    txn.stage(FileOp::Write {
        path: ws.path("c.ts"),
        contents: "export function c(: number {\n  return 1;\n}\n".into(),
    })
    .unwrap();

    let err = txn.commit().unwrap_err();
    assert!(matches!(
        err,
        TransactionError::Operation {
            stage: Stage::Validate,
            ..
        }
    ));
    assert_eq!(err.to_diagnostic().code, DiagnosticCode::SyntaxError);

    assert_eq!(ws.read("a.py"), A.as_bytes());
    assert_eq!(ws.read("b.rs"), B.as_bytes());
    assert_eq!(ws.read("c.ts"), C.as_bytes());
}

#[test]
fn multi_file_commit_lands_together() {
    let ws = Workspace::new(&[("pkg/app.py", A), ("pkg/old.py", "x = 1\n")]);

    let mut txn = Transaction::on_disk()
        .with_guard(WorkspaceGuard::new(ws.dir.path()).unwrap());
    txn.stage(FileOp::Edit {
        path: PathBuf::from("pkg/app.py"),
        language: None,
        operation: EditOperation::AddImport {
            statement: "import json".into(),
        },
    })
    .unwrap();
    txn.stage(FileOp::Move {
        from: PathBuf::from("pkg/old.py"),
        to: PathBuf::from("pkg/new/renamed.py"),
    })
    .unwrap();

    let report = txn.commit().unwrap();
    let kinds: Vec<ChangeKind> = report.changes.iter().map(|c| c.kind()).collect();
    assert_eq!(
        kinds,
        vec![ChangeKind::Modify, ChangeKind::Create, ChangeKind::Delete]
    );
    assert!(String::from_utf8(ws.read("pkg/app.py"))
        .unwrap()
        .starts_with("import json\n"));
    assert_eq!(ws.read("pkg/new/renamed.py"), b"x = 1\n");
    assert!(!ws.path("pkg/old.py").exists());
}

#[test]
fn conflicting_stage_is_reported_with_code() {
    let ws = Workspace::new(&[("a.py", A)]);

    let mut txn = Transaction::on_disk();
    txn.stage(FileOp::Delete {
        path: ws.path("a.py"),
    })
    .unwrap();
    let err = txn
        .stage(FileOp::Move {
            from: ws.path("b.py"),
            to: ws.path("a.py"),
        })
        .unwrap_err();

    assert_eq!(
        err.to_diagnostic().code,
        DiagnosticCode::ConflictingOperation
    );
    assert_eq!(ws.read("a.py"), A.as_bytes());
}

#[test]
fn gate_on_another_thread_can_reject() {
    let ws = Workspace::new(&[("a.py", A)]);
    let (mut gate, handle) = ChannelGate::pair();

    let decider = std::thread::spawn(move || {
        let request = handle.requests.recv().unwrap();
        assert_eq!(request.stats.lines_removed, 2);
        handle.decisions.send(ApprovalDecision::reject()).unwrap();
    });

    let mut txn = Transaction::on_disk();
    txn.stage(FileOp::Edit {
        path: ws.path("a.py"),
        language: None,
        operation: EditOperation::RemoveFunction { name: "a".into() },
    })
    .unwrap();
    let outcome = txn.commit_with(&mut gate).unwrap();
    decider.join().unwrap();

    assert!(matches!(outcome, CommitOutcome::Rejected { .. }));
    assert_eq!(ws.read("a.py"), A.as_bytes());
}

#[test]
fn dropped_decider_cancels_the_commit() {
    let ws = Workspace::new(&[("a.py", A)]);
    let (mut gate, handle) = ChannelGate::pair();
    drop(handle);

    let mut txn = Transaction::on_disk();
    txn.stage(FileOp::Write {
        path: ws.path("a.py"),
        contents: "a = 1\n".into(),
    })
    .unwrap();

    let outcome = txn.commit_with(&mut gate).unwrap();
    assert!(matches!(outcome, CommitOutcome::Rejected { .. }));
    assert_eq!(ws.read("a.py"), A.as_bytes());
}
