//! Multi-file transactions.
//!
//! A [`Transaction`] stages file operations without touching disk, then
//! commits them in two phases:
//!
//! 1. **Prepare**: every operation runs in memory, in order (index, mutate,
//!    validate for structural edits). Nothing is written if any step fails.
//! 2. **Apply**: changes are written one by one. Before each write the path
//!    is checked against its snapshot; if anything fails, every applied
//!    change is restored from the backup store before the error surfaces.
//!
//! After a failed commit the disk is byte-identical to its state when the
//! paths were staged.

pub mod backup;
pub mod fs;

pub use backup::{BackupStore, Snapshot};
pub use fs::{FileSystem, OsFileSystem};

use crate::approval::{self, ApprovalGate, ApprovalRequest};
use crate::diagnostic::{Diagnostic, DiagnosticCode};
use crate::index;
use crate::language::Language;
use crate::mutation::{EditOperation, MutationEngine};
use crate::safety::{SafetyError, WorkspaceGuard};
use crate::source::SourceUnit;
use crate::validate;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One staged file operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileOp {
    /// Structural edit; language defaults to the path's extension.
    Edit {
        path: PathBuf,
        language: Option<String>,
        operation: EditOperation,
    },
    /// Replace (or create) the whole file.
    Write { path: PathBuf, contents: String },
    /// Write `to`, then delete `from`.
    Move { from: PathBuf, to: PathBuf },
    Delete { path: PathBuf },
}

impl FileOp {
    /// Paths touched, in the order they are written.
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            FileOp::Edit { path, .. } | FileOp::Write { path, .. } | FileOp::Delete { path } => {
                vec![path.as_path()]
            }
            FileOp::Move { from, to } => vec![to.as_path(), from.as_path()],
        }
    }

    fn paths_mut(&mut self) -> Vec<&mut PathBuf> {
        match self {
            FileOp::Edit { path, .. } | FileOp::Write { path, .. } | FileOp::Delete { path } => {
                vec![path]
            }
            FileOp::Move { from, to } => vec![to, from],
        }
    }
}

impl fmt::Display for FileOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOp::Edit {
                path, operation, ..
            } => write!(f, "{} in {}", operation.describe(), path.display()),
            FileOp::Write { path, .. } => write!(f, "write {}", path.display()),
            FileOp::Move { from, to } => write!(f, "move {} -> {}", from.display(), to.display()),
            FileOp::Delete { path } => write!(f, "delete {}", path.display()),
        }
    }
}

/// Where in the pipeline an operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Read,
    Index,
    Mutate,
    Validate,
}

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("{}: {diagnostic}", path.display())]
    Operation {
        path: PathBuf,
        stage: Stage,
        diagnostic: Diagnostic,
    },

    #[error("{} is already staged in this transaction", path.display())]
    Conflicting { path: PathBuf },

    #[error("{} changed on disk after it was staged", path.display())]
    ModifiedExternally { path: PathBuf },

    #[error("unsafe path: {0}")]
    Safety(#[from] SafetyError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{cause}; restoring {} path(s) also failed", failures.len())]
    RollbackFailed {
        cause: Box<TransactionError>,
        failures: Vec<(PathBuf, io::Error)>,
    },

    #[error("could not restore {} path(s)", failures.len())]
    RestoreFailed { failures: Vec<(PathBuf, io::Error)> },
}

impl TransactionError {
    fn io(path: &Path, source: io::Error) -> Self {
        TransactionError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn operation(path: &Path, stage: Stage, diagnostic: Diagnostic) -> Self {
        TransactionError::Operation {
            path: path.to_path_buf(),
            stage,
            diagnostic,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            TransactionError::Operation { diagnostic, .. } => diagnostic.clone(),
            TransactionError::Conflicting { path } => Diagnostic::conflicting_operation(format!(
                "{} is already staged in this transaction",
                path.display()
            )),
            TransactionError::ModifiedExternally { path } => Diagnostic::new(
                DiagnosticCode::ConflictingOperation,
                format!("{} changed on disk after it was staged", path.display()),
                "Another writer touched the file; start a new transaction from the current contents.",
            ),
            TransactionError::Safety(err) => Diagnostic::new(
                DiagnosticCode::InvalidOperation,
                err.to_string(),
                "Use a path inside the workspace that is not under .git, target or a toolchain directory.",
            ),
            TransactionError::Io { path, source } => Diagnostic::io_failure(path, source),
            TransactionError::RollbackFailed { failures, .. }
            | TransactionError::RestoreFailed { failures } => Diagnostic::new(
                DiagnosticCode::IoFailure,
                self.to_string(),
                format!("Restore {} by hand.", failed_paths(failures)),
            ),
        }
    }
}

fn failed_paths(failures: &[(PathBuf, io::Error)]) -> String {
    failures
        .iter()
        .map(|(path, _)| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<TransactionError> for Diagnostic {
    fn from(err: TransactionError) -> Self {
        err.to_diagnostic()
    }
}

/// The effect one commit has on one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedChange {
    pub path: PathBuf,
    /// `None` when the path did not exist.
    pub before: Option<Vec<u8>>,
    /// `None` when the path is deleted.
    pub after: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Create,
    Modify,
    Delete,
    Unchanged,
}

impl PlannedChange {
    pub fn kind(&self) -> ChangeKind {
        match (&self.before, &self.after) {
            (None, Some(_)) => ChangeKind::Create,
            (Some(_), None) => ChangeKind::Delete,
            (Some(before), Some(after)) if before != after => ChangeKind::Modify,
            _ => ChangeKind::Unchanged,
        }
    }

    pub fn before_text(&self) -> Cow<'_, str> {
        text_of(self.before.as_deref())
    }

    pub fn after_text(&self) -> Cow<'_, str> {
        text_of(self.after.as_deref())
    }

    pub fn approval_request(&self) -> ApprovalRequest {
        ApprovalRequest::new(
            self.path.clone(),
            self.before_text().into_owned(),
            self.after_text().into_owned(),
        )
    }
}

fn text_of(bytes: Option<&[u8]>) -> Cow<'_, str> {
    bytes.map_or(Cow::Borrowed(""), String::from_utf8_lossy)
}

/// Result of a commit (or a dry run).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    pub changes: Vec<PlannedChange>,
    /// False for dry runs.
    pub applied: bool,
}

/// Result of a commit that went through an approval gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(CommitReport),
    /// The gate rejected the change to `path`; the transaction was rolled back.
    Rejected { path: PathBuf },
}

/// An atomic group of file operations.
pub struct Transaction<F: FileSystem> {
    fs: F,
    ops: Vec<FileOp>,
    backups: BackupStore,
    guard: Option<WorkspaceGuard>,
    engine: MutationEngine,
    dry_run: bool,
}

impl Transaction<OsFileSystem> {
    /// Transaction against the real filesystem.
    pub fn on_disk() -> Self {
        Self::begin(OsFileSystem)
    }
}

impl<F: FileSystem> Transaction<F> {
    pub fn begin(fs: F) -> Self {
        Self {
            fs,
            ops: Vec::new(),
            backups: BackupStore::default(),
            guard: None,
            engine: MutationEngine::default(),
            dry_run: false,
        }
    }

    /// Resolve and confine every staged path with `guard`.
    pub fn with_guard(mut self, guard: WorkspaceGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with_engine(mut self, engine: MutationEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Do everything except the final writes.
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn staged(&self) -> &[FileOp] {
        &self.ops
    }

    pub fn snapshot(&self, path: &Path) -> Option<&Snapshot> {
        self.backups.get(path)
    }

    /// Record `op` and snapshot the paths it touches. Nothing is written.
    pub fn stage(&mut self, mut op: FileOp) -> Result<(), TransactionError> {
        if let Some(guard) = &self.guard {
            for path in op.paths_mut() {
                *path = guard.resolve(&*path)?;
            }
        }

        let paths: Vec<PathBuf> = op.paths().into_iter().map(Path::to_path_buf).collect();
        if let [to, from] = paths.as_slice() {
            if to == from {
                return Err(TransactionError::Conflicting { path: to.clone() });
            }
        }
        if let Some(path) = paths.iter().find(|p| self.backups.contains(p)) {
            return Err(TransactionError::Conflicting { path: path.clone() });
        }

        let mut snapshots = Vec::with_capacity(paths.len());
        for path in &paths {
            let snapshot =
                Snapshot::capture(&self.fs, path).map_err(|err| TransactionError::io(path, err))?;
            snapshots.push(snapshot);
        }
        for (path, snapshot) in paths.into_iter().zip(snapshots) {
            self.backups.record(path, snapshot);
        }

        tracing::debug!(operation = %op, "staged");
        self.ops.push(op);
        Ok(())
    }

    /// Phase one: compute every change in memory.
    pub fn prepare(&self) -> Result<Vec<PlannedChange>, TransactionError> {
        let mut changes = Vec::new();
        for op in &self.ops {
            match op {
                FileOp::Edit {
                    path,
                    language,
                    operation,
                } => {
                    let text = self.original_text(path, Stage::Read)?;
                    let unit = match language {
                        Some(language) => SourceUnit::new(text, language.as_str()),
                        None => SourceUnit::for_path(path, text),
                    };
                    let new_text = self.edit(path, &unit, operation)?;
                    changes.push(self.change(path, Some(new_text.into_bytes())));
                }
                FileOp::Write { path, contents } => {
                    validate_contents(path, contents.as_bytes())?;
                    changes.push(self.change(path, Some(contents.clone().into_bytes())));
                }
                FileOp::Move { from, to } => {
                    let bytes = self.original_bytes(from)?;
                    validate_contents(to, &bytes)?;
                    changes.push(self.change(to, Some(bytes)));
                    changes.push(self.change(from, None));
                }
                FileOp::Delete { path } => {
                    self.original_bytes(path)?;
                    changes.push(self.change(path, None));
                }
            }
        }
        Ok(changes)
    }

    /// Commit every staged operation, or none of them.
    pub fn commit(self) -> Result<CommitReport, TransactionError> {
        let changes = self.prepare()?;
        self.apply(changes)
    }

    /// Commit after `gate` approves each change.
    ///
    /// A rejection (or a gate that cannot decide) rolls the transaction back.
    /// An edited payload replaces the proposed text once it validates.
    pub fn commit_with(
        self,
        gate: &mut dyn ApprovalGate,
    ) -> Result<CommitOutcome, TransactionError> {
        let changes = self.prepare()?;
        self.commit_prepared(changes, gate)
    }

    /// Second half of [`Transaction::commit_with`], for callers that inspect
    /// the output of [`Transaction::prepare`] first.
    pub fn commit_prepared(
        self,
        mut changes: Vec<PlannedChange>,
        gate: &mut dyn ApprovalGate,
    ) -> Result<CommitOutcome, TransactionError> {
        for change in &mut changes {
            if change.kind() == ChangeKind::Unchanged {
                continue;
            }
            let decision = approval::decide(gate, &change.approval_request());
            if !decision.approved {
                let path = change.path.clone();
                self.rollback()?;
                return Ok(CommitOutcome::Rejected { path });
            }
            if let Some(edited) = decision
                .edited_payload
                .filter(|_| change.after.is_some())
            {
                validate_contents(&change.path, edited.as_bytes())?;
                change.after = Some(edited.into_bytes());
            }
        }

        self.apply(changes).map(CommitOutcome::Committed)
    }

    /// Phase two: write `changes` in order, restoring everything on failure.
    fn apply(self, changes: Vec<PlannedChange>) -> Result<CommitReport, TransactionError> {
        if self.dry_run {
            tracing::info!(changes = changes.len(), "dry run, nothing written");
            return Ok(CommitReport {
                changes,
                applied: false,
            });
        }

        let mut applied: Vec<&Path> = Vec::new();
        for change in &changes {
            let result = self.check_unmodified(&change.path).and_then(|current| {
                // From here on the path may be half written, so it is restored too.
                applied.push(&change.path);
                self.write_change(change, &current)
            });
            if let Err(cause) = result {
                tracing::warn!(path = %change.path.display(), error = %cause, "commit failed, restoring");
                return Err(self.restore(&applied, cause));
            }
        }

        tracing::info!(files = changes.len(), "transaction committed");
        Ok(CommitReport {
            changes,
            applied: true,
        })
    }

    /// Discard staged operations and make sure every touched path matches
    /// its snapshot again.
    pub fn rollback(self) -> Result<Vec<PathBuf>, TransactionError> {
        let mut restored = Vec::new();
        let mut failures = Vec::new();
        for (path, snapshot) in self.backups.iter() {
            match snapshot.is_current(&self.fs, path) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(err) => {
                    failures.push((path.to_path_buf(), err));
                    continue;
                }
            }
            match snapshot.restore(&self.fs, path) {
                Ok(()) => restored.push(path.to_path_buf()),
                Err(err) => failures.push((path.to_path_buf(), err)),
            }
        }

        tracing::info!(restored = restored.len(), "transaction rolled back");
        if failures.is_empty() {
            Ok(restored)
        } else {
            Err(TransactionError::RestoreFailed { failures })
        }
    }

    /// Read `path` and make sure it still matches its snapshot.
    fn check_unmodified(&self, path: &Path) -> Result<Snapshot, TransactionError> {
        let snapshot = self
            .backups
            .get(path)
            .ok_or_else(|| TransactionError::Conflicting {
                path: path.to_path_buf(),
            })?;
        let current =
            Snapshot::capture(&self.fs, path).map_err(|err| TransactionError::io(path, err))?;
        if !snapshot.matches(current.bytes()) {
            return Err(TransactionError::ModifiedExternally {
                path: path.to_path_buf(),
            });
        }
        Ok(current)
    }

    fn write_change(&self, change: &PlannedChange, current: &Snapshot) -> Result<(), TransactionError> {
        let path = &change.path;
        match &change.after {
            Some(bytes) if current.bytes() == Some(bytes.as_slice()) => Ok(()),
            Some(bytes) => self
                .fs
                .write(path, bytes)
                .map_err(|err| TransactionError::io(path, err)),
            None if current.is_absent() => Ok(()),
            None => self
                .fs
                .delete(path)
                .map_err(|err| TransactionError::io(path, err)),
        }
    }

    /// Restore `applied` paths newest first.
    fn restore(&self, applied: &[&Path], cause: TransactionError) -> TransactionError {
        let mut failures = Vec::new();
        for path in applied.iter().rev() {
            let Some(snapshot) = self.backups.get(path) else {
                continue;
            };
            if snapshot.is_current(&self.fs, path).unwrap_or(false) {
                continue;
            }
            if let Err(err) = snapshot.restore(&self.fs, path) {
                tracing::error!(path = %path.display(), error = %err, "restore failed");
                failures.push((path.to_path_buf(), err));
            }
        }

        if failures.is_empty() {
            cause
        } else {
            TransactionError::RollbackFailed {
                cause: Box::new(cause),
                failures,
            }
        }
    }

    fn change(&self, path: &Path, after: Option<Vec<u8>>) -> PlannedChange {
        PlannedChange {
            path: path.to_path_buf(),
            before: self
                .backups
                .get(path)
                .and_then(|snapshot| snapshot.bytes().map(<[u8]>::to_vec)),
            after,
        }
    }

    fn original_bytes(&self, path: &Path) -> Result<Vec<u8>, TransactionError> {
        match self.backups.get(path).and_then(Snapshot::bytes) {
            Some(bytes) => Ok(bytes.to_vec()),
            None => Err(TransactionError::operation(
                path,
                Stage::Read,
                Diagnostic::io_failure(path, &io::Error::from(io::ErrorKind::NotFound)),
            )),
        }
    }

    fn original_text(&self, path: &Path, stage: Stage) -> Result<String, TransactionError> {
        let bytes = self.original_bytes(path)?;
        String::from_utf8(bytes).map_err(|_| {
            TransactionError::operation(
                path,
                stage,
                Diagnostic::new(
                    DiagnosticCode::InvalidOperation,
                    format!("{} is not valid UTF-8", path.display()),
                    "Structural edits only apply to UTF-8 source files.",
                ),
            )
        })
    }

    fn edit(
        &self,
        path: &Path,
        unit: &SourceUnit,
        operation: &EditOperation,
    ) -> Result<String, TransactionError> {
        let structure = index::index(unit)
            .map_err(|err| TransactionError::operation(path, Stage::Index, err.into()))?;
        let mutation = self
            .engine
            .apply(unit, &structure, operation)
            .map_err(|diagnostic| TransactionError::operation(path, Stage::Mutate, diagnostic))?;
        let language = unit
            .language()
            .map_err(|diagnostic| TransactionError::operation(path, Stage::Index, diagnostic))?;
        validate::validate(&mutation.new_text, language).map_err(|err| {
            let diagnostic = err.to_diagnostic();
            diagnostic.record();
            TransactionError::operation(path, Stage::Validate, diagnostic)
        })?;
        Ok(mutation.new_text)
    }
}

/// Validate contents destined for `path` when its extension has a grammar.
fn validate_contents(path: &Path, bytes: &[u8]) -> Result<(), TransactionError> {
    let Some(language) = Language::from_path(path) else {
        return Ok(());
    };
    let text = std::str::from_utf8(bytes).map_err(|_| {
        TransactionError::operation(
            path,
            Stage::Validate,
            Diagnostic::new(
                DiagnosticCode::SyntaxError,
                format!("{} would not be valid UTF-8 {language}", path.display()),
                "Write text content for source files.",
            ),
        )
    })?;
    validate::validate(text, language).map_err(|err| {
        let diagnostic = err.to_diagnostic();
        diagnostic.record();
        TransactionError::operation(path, Stage::Validate, diagnostic)
    })
}

/// Count changes per kind, for the end-of-run summary.
pub fn summarize(changes: &[PlannedChange]) -> HashMap<ChangeKind, usize> {
    let mut counts = HashMap::new();
    for change in changes {
        *counts.entry(change.kind()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{ApprovalDecision, ApprovalError, AutoApprove, AutoReject, FnGate};
    use std::fs as stdfs;

    fn workspace() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn stage_never_writes() {
        let dir = workspace();
        let path = dir.path().join("a.py");
        stdfs::write(&path, "x = 1\n").unwrap();

        let mut txn = Transaction::on_disk();
        txn.stage(FileOp::Write {
            path: path.clone(),
            contents: "x = 2\n".into(),
        })
        .unwrap();

        assert_eq!(stdfs::read_to_string(&path).unwrap(), "x = 1\n");
        drop(txn);
        assert_eq!(stdfs::read_to_string(&path).unwrap(), "x = 1\n");
    }

    #[test]
    fn staging_a_path_twice_conflicts() {
        let dir = workspace();
        let path = dir.path().join("a.py");

        let mut txn = Transaction::on_disk();
        txn.stage(FileOp::Write {
            path: path.clone(),
            contents: "x = 1\n".into(),
        })
        .unwrap();
        let err = txn.stage(FileOp::Delete { path }).unwrap_err();

        assert!(matches!(err, TransactionError::Conflicting { .. }));
        assert_eq!(
            err.to_diagnostic().code,
            DiagnosticCode::ConflictingOperation
        );
    }

    #[test]
    fn edit_commit_writes_mutated_text() {
        let dir = workspace();
        let path = dir.path().join("app.py");
        stdfs::write(&path, "def foo():\n    return 1\n").unwrap();

        let mut txn = Transaction::on_disk();
        txn.stage(FileOp::Edit {
            path: path.clone(),
            language: None,
            operation: EditOperation::AddFunction {
                code: "def bar():\n    return 2".into(),
                class: None,
            },
        })
        .unwrap();
        let report = txn.commit().unwrap();

        assert!(report.applied);
        assert_eq!(report.changes[0].kind(), ChangeKind::Modify);
        assert_eq!(
            stdfs::read_to_string(&path).unwrap(),
            "def foo():\n    return 1\n\n\ndef bar():\n    return 2\n"
        );
    }

    #[test]
    fn dry_run_reports_without_writing() {
        let dir = workspace();
        let path = dir.path().join("lib.rs");
        stdfs::write(&path, "fn a() {}\n").unwrap();

        let mut txn = Transaction::on_disk().dry_run(true);
        txn.stage(FileOp::Edit {
            path: path.clone(),
            language: None,
            operation: EditOperation::RemoveFunction { name: "a".into() },
        })
        .unwrap();
        let report = txn.commit().unwrap();

        assert!(!report.applied);
        assert_eq!(report.changes[0].after_text(), "");
        assert_eq!(stdfs::read_to_string(&path).unwrap(), "fn a() {}\n");
    }

    #[test]
    fn invalid_write_aborts_before_anything_is_written() {
        let dir = workspace();
        let first = dir.path().join("first.py");
        let second = dir.path().join("second.py");

        let mut txn = Transaction::on_disk();
        txn.stage(FileOp::Write {
            path: first.clone(),
            contents: "ok = True\n".into(),
        })
        .unwrap();
        txn.stage(FileOp::Write {
            path: second.clone(),
            contents: "def broken(:\n".into(),
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
        assert!(!first.exists());
        assert!(!second.exists());
    }

    #[test]
    fn move_with_invalid_destination_leaves_source() {
        let dir = workspace();
        let from = dir.path().join("notes.txt");
        let to = dir.path().join("notes.py");
        stdfs::write(&from, "this is not python (\n").unwrap();

        let mut txn = Transaction::on_disk();
        txn.stage(FileOp::Move {
            from: from.clone(),
            to: to.clone(),
        })
        .unwrap();
        assert!(txn.commit().is_err());
        assert!(from.exists());
        assert!(!to.exists());
    }

    #[test]
    fn move_and_delete_commit() {
        let dir = workspace();
        let from = dir.path().join("old.py");
        let to = dir.path().join("pkg/new.py");
        let doomed = dir.path().join("doomed.py");
        stdfs::write(&from, "x = 1\n").unwrap();
        stdfs::write(&doomed, "y = 2\n").unwrap();

        let mut txn = Transaction::on_disk();
        txn.stage(FileOp::Move {
            from: from.clone(),
            to: to.clone(),
        })
        .unwrap();
        txn.stage(FileOp::Delete {
            path: doomed.clone(),
        })
        .unwrap();
        txn.commit().unwrap();

        assert!(!from.exists());
        assert!(!doomed.exists());
        assert_eq!(stdfs::read_to_string(&to).unwrap(), "x = 1\n");
    }

    #[test]
    fn external_modification_is_detected_and_restored() {
        let dir = workspace();
        let first = dir.path().join("a.py");
        let second = dir.path().join("b.py");
        stdfs::write(&first, "a = 1\n").unwrap();
        stdfs::write(&second, "b = 1\n").unwrap();

        let mut txn = Transaction::on_disk();
        for path in [&first, &second] {
            txn.stage(FileOp::Write {
                path: path.clone(),
                contents: "changed = True\n".into(),
            })
            .unwrap();
        }
        stdfs::write(&second, "b = 99\n").unwrap();

        let err = txn.commit().unwrap_err();
        assert!(matches!(err, TransactionError::ModifiedExternally { .. }));
        assert_eq!(stdfs::read_to_string(&first).unwrap(), "a = 1\n");
        assert_eq!(stdfs::read_to_string(&second).unwrap(), "b = 99\n");
    }

    /// Fails every write to one path.
    struct FailingWrites {
        poisoned: PathBuf,
    }

    impl FileSystem for FailingWrites {
        fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
            OsFileSystem.read(path)
        }

        fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
            if path == self.poisoned {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
            }
            OsFileSystem.write(path, contents)
        }

        fn delete(&self, path: &Path) -> io::Result<()> {
            OsFileSystem.delete(path)
        }

        fn exists(&self, path: &Path) -> bool {
            OsFileSystem.exists(path)
        }

        fn remove_empty_dir(&self, path: &Path) -> io::Result<bool> {
            OsFileSystem.remove_empty_dir(path)
        }
    }

    #[test]
    fn write_failure_restores_earlier_writes() {
        let dir = workspace();
        let paths: Vec<PathBuf> = ["a.py", "b.py", "c.py"]
            .iter()
            .map(|name| dir.path().join(name))
            .collect();
        stdfs::write(&paths[0], "a = 1\n").unwrap();
        stdfs::write(&paths[1], "b = 1\n").unwrap();

        let fs = FailingWrites {
            poisoned: paths[2].clone(),
        };
        let mut txn = Transaction::begin(&fs);
        for path in &paths {
            txn.stage(FileOp::Write {
                path: path.clone(),
                contents: "changed = 2\n".into(),
            })
            .unwrap();
        }

        let err = txn.commit().unwrap_err();
        assert!(matches!(err, TransactionError::Io { .. }));
        assert_eq!(err.to_diagnostic().code, DiagnosticCode::IoFailure);
        assert_eq!(stdfs::read(&paths[0]).unwrap(), b"a = 1\n");
        assert_eq!(stdfs::read(&paths[1]).unwrap(), b"b = 1\n");
        assert!(!paths[2].exists());
    }

    #[test]
    fn write_failure_removes_directories_it_created() {
        let dir = workspace();
        let nested = dir.path().join("new/deep/a.py");
        let poisoned = dir.path().join("b.py");

        let fs = FailingWrites {
            poisoned: poisoned.clone(),
        };
        let mut txn = Transaction::begin(&fs);
        txn.stage(FileOp::Write {
            path: nested.clone(),
            contents: "a = 1\n".into(),
        })
        .unwrap();
        txn.stage(FileOp::Write {
            path: poisoned.clone(),
            contents: "b = 1\n".into(),
        })
        .unwrap();

        let err = txn.commit().unwrap_err();
        assert!(matches!(err, TransactionError::Io { .. }));
        assert!(!nested.exists());
        assert!(!dir.path().join("new").exists());
        assert!(!poisoned.exists());
    }

    #[test]
    fn rollback_undoes_out_of_band_changes() {
        let dir = workspace();
        let path = dir.path().join("a.py");
        stdfs::write(&path, "x = 1\n").unwrap();

        let mut txn = Transaction::on_disk();
        txn.stage(FileOp::Delete { path: path.clone() }).unwrap();
        stdfs::write(&path, "x = 2\n").unwrap();

        let restored = txn.rollback().unwrap();
        assert_eq!(restored, vec![path.clone()]);
        assert_eq!(stdfs::read_to_string(&path).unwrap(), "x = 1\n");
    }

    #[test]
    fn rejection_rolls_back() {
        let dir = workspace();
        let path = dir.path().join("a.py");
        stdfs::write(&path, "x = 1\n").unwrap();

        let mut txn = Transaction::on_disk();
        txn.stage(FileOp::Write {
            path: path.clone(),
            contents: "x = 2\n".into(),
        })
        .unwrap();
        let outcome = txn.commit_with(&mut AutoReject).unwrap();

        assert_eq!(outcome, CommitOutcome::Rejected { path: path.clone() });
        assert_eq!(stdfs::read_to_string(&path).unwrap(), "x = 1\n");
    }

    #[test]
    fn edited_payload_is_validated_then_written() {
        let dir = workspace();
        let path = dir.path().join("a.py");
        stdfs::write(&path, "x = 1\n").unwrap();

        let mut txn = Transaction::on_disk();
        txn.stage(FileOp::Write {
            path: path.clone(),
            contents: "x = 2\n".into(),
        })
        .unwrap();
        let mut gate = FnGate(|_: &ApprovalRequest| {
            Ok::<_, ApprovalError>(ApprovalDecision::approve_edited("x = 3\n"))
        });
        let outcome = txn.commit_with(&mut gate).unwrap();

        assert!(matches!(outcome, CommitOutcome::Committed(_)));
        assert_eq!(stdfs::read_to_string(&path).unwrap(), "x = 3\n");

        let mut txn = Transaction::on_disk();
        txn.stage(FileOp::Write {
            path: path.clone(),
            contents: "x = 4\n".into(),
        })
        .unwrap();
        let mut gate = FnGate(|_: &ApprovalRequest| {
            Ok::<_, ApprovalError>(ApprovalDecision::approve_edited("x = (\n"))
        });
        assert!(txn.commit_with(&mut gate).is_err());
        assert_eq!(stdfs::read_to_string(&path).unwrap(), "x = 3\n");
    }

    #[test]
    fn approved_commit_writes() {
        let dir = workspace();
        let path = dir.path().join("new.ts");

        let mut txn = Transaction::on_disk();
        txn.stage(FileOp::Write {
            path: path.clone(),
            contents: "export const x = 1;\n".into(),
        })
        .unwrap();
        let outcome = txn.commit_with(&mut AutoApprove).unwrap();
        let CommitOutcome::Committed(report) = outcome else {
            panic!("expected commit");
        };
        assert_eq!(report.changes[0].kind(), ChangeKind::Create);
        assert!(path.exists());
    }

    #[test]
    fn guard_rejects_paths_outside_workspace() {
        let dir = workspace();
        let inner = dir.path().join("ws");
        stdfs::create_dir_all(&inner).unwrap();
        let guard = WorkspaceGuard::new(&inner).unwrap();

        let mut txn = Transaction::on_disk().with_guard(guard);
        let err = txn
            .stage(FileOp::Write {
                path: PathBuf::from("../outside.py"),
                contents: String::new(),
            })
            .unwrap_err();
        assert!(matches!(err, TransactionError::Safety(_)));
    }

    #[test]
    fn summary_counts_change_kinds() {
        let changes = vec![
            PlannedChange {
                path: "a".into(),
                before: None,
                after: Some(vec![]),
            },
            PlannedChange {
                path: "b".into(),
                before: Some(b"x".to_vec()),
                after: None,
            },
        ];
        let counts = summarize(&changes);
        assert_eq!(counts.get(&ChangeKind::Create), Some(&1));
        assert_eq!(counts.get(&ChangeKind::Delete), Some(&1));
    }
}
