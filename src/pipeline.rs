//! One edit request, end to end.
//!
//! ```text
//! INDEXED -> MUTATED -> VALIDATED -> APPROVED -> COMMITTED
//!                                 \-> REJECTED -> ROLLED_BACK
//!                    \-> INVALID  -> ROLLED_BACK
//! ```
//!
//! Index and mutation failures end the run before anything is staged for
//! approval; the report then carries the diagnostic and the last state
//! reached.

use crate::approval::ApprovalGate;
use crate::diagnostic::Diagnostic;
use crate::mutation::{MutationEngine, OperationRequest};
use crate::safety::WorkspaceGuard;
use crate::transaction::{
    CommitOutcome, FileOp, FileSystem, OsFileSystem, PlannedChange, Stage, Transaction,
    TransactionError,
};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EditState {
    Indexed,
    Mutated,
    Validated,
    Approved,
    Committed,
    Rejected,
    Invalid,
    RolledBack,
}

impl EditState {
    /// Legal successors of `self`.
    pub fn successors(self) -> &'static [EditState] {
        use EditState::*;
        match self {
            Indexed => &[Mutated],
            Mutated => &[Validated, Invalid],
            Validated => &[Approved, Rejected],
            Approved => &[Committed, Invalid, RolledBack],
            Rejected | Invalid => &[RolledBack],
            Committed | RolledBack => &[],
        }
    }

    pub fn allows(self, next: EditState) -> bool {
        self.successors().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EditState::Indexed => "INDEXED",
            EditState::Mutated => "MUTATED",
            EditState::Validated => "VALIDATED",
            EditState::Approved => "APPROVED",
            EditState::Committed => "COMMITTED",
            EditState::Rejected => "REJECTED",
            EditState::Invalid => "INVALID",
            EditState::RolledBack => "ROLLED_BACK",
        }
    }
}

impl fmt::Display for EditState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub path: PathBuf,
    /// Every state entered, in order.
    pub states: Vec<EditState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<PlannedChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,
}

impl PipelineReport {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            states: Vec::new(),
            change: None,
            diagnostic: None,
        }
    }

    pub fn state(&self) -> Option<EditState> {
        self.states.last().copied()
    }

    /// Committed, or validated in a dry run.
    pub fn succeeded(&self) -> bool {
        self.diagnostic.is_none()
            && matches!(
                self.state(),
                Some(EditState::Committed | EditState::Validated)
            )
    }

    fn enter(&mut self, state: EditState) {
        debug_assert!(
            self.state().map_or(state == EditState::Indexed, |s| s.allows(state)),
            "illegal transition {:?} -> {state}",
            self.state()
        );
        tracing::debug!(path = %self.path.display(), %state, "edit state");
        self.states.push(state);
    }

    fn fail(mut self, diagnostic: Diagnostic) -> Self {
        diagnostic.record();
        self.diagnostic = Some(diagnostic);
        self
    }
}

/// Runs single edit requests through index, mutate, validate, approve and
/// commit.
pub struct Pipeline<F: FileSystem> {
    fs: F,
    engine: MutationEngine,
    guard: Option<WorkspaceGuard>,
    dry_run: bool,
}

impl Pipeline<OsFileSystem> {
    pub fn on_disk() -> Self {
        Self::new(OsFileSystem)
    }
}

impl<F: FileSystem> Pipeline<F> {
    pub fn new(fs: F) -> Self {
        Self {
            fs,
            engine: MutationEngine::default(),
            guard: None,
            dry_run: false,
        }
    }

    pub fn with_engine(mut self, engine: MutationEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_guard(mut self, guard: WorkspaceGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Stop after validation; the gate is never consulted.
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    pub fn run(&self, request: &OperationRequest, gate: &mut dyn ApprovalGate) -> PipelineReport {
        let mut report = PipelineReport::new(request.path.clone());

        let operation = match request.operation() {
            Ok(operation) => operation,
            Err(diagnostic) => return report.fail(diagnostic),
        };

        let mut txn = Transaction::begin(&self.fs).with_engine(self.engine.clone());
        if let Some(guard) = &self.guard {
            txn = txn.with_guard(guard.clone());
        }
        if let Err(err) = txn.stage(FileOp::Edit {
            path: request.path.clone(),
            language: request.language.clone(),
            operation,
        }) {
            return report.fail(err.into());
        }

        let changes = match txn.prepare() {
            Ok(changes) => changes,
            Err(TransactionError::Operation {
                stage, diagnostic, ..
            }) => {
                match stage {
                    Stage::Read | Stage::Index => {}
                    Stage::Mutate => report.enter(EditState::Indexed),
                    Stage::Validate => {
                        report.enter(EditState::Indexed);
                        report.enter(EditState::Mutated);
                        report.enter(EditState::Invalid);
                        roll_back(txn, &mut report);
                    }
                }
                return report.fail(diagnostic);
            }
            Err(err) => return report.fail(err.into()),
        };

        report.enter(EditState::Indexed);
        report.enter(EditState::Mutated);
        report.enter(EditState::Validated);
        report.change = changes.first().cloned();
        if self.dry_run {
            return report;
        }

        match txn.commit_prepared(changes, gate) {
            Ok(CommitOutcome::Committed(commit)) => {
                report.enter(EditState::Approved);
                report.enter(EditState::Committed);
                report.change = commit.changes.into_iter().next();
                report
            }
            Ok(CommitOutcome::Rejected { .. }) => {
                report.enter(EditState::Rejected);
                report.enter(EditState::RolledBack);
                report
            }
            Err(TransactionError::Operation {
                stage: Stage::Validate,
                diagnostic,
                ..
            }) => {
                // The gate approved an edited payload that does not parse.
                report.enter(EditState::Approved);
                report.enter(EditState::Invalid);
                report.enter(EditState::RolledBack);
                report.fail(diagnostic)
            }
            Err(err @ TransactionError::RestoreFailed { .. }) => {
                // Only a rejection rolls back without applying anything.
                report.enter(EditState::Rejected);
                report.fail(err.into())
            }
            Err(err) => {
                report.enter(EditState::Approved);
                report.enter(EditState::RolledBack);
                report.fail(err.into())
            }
        }
    }
}

fn roll_back<F: FileSystem>(txn: Transaction<F>, report: &mut PipelineReport) {
    match txn.rollback() {
        Ok(_) => report.enter(EditState::RolledBack),
        Err(err) => err.to_diagnostic().record(),
    }
}
