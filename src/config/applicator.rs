//! Applies an [`EditPlan`] as a single transaction.

use crate::approval::ApprovalGate;
use crate::config::schema::EditPlan;
use crate::mutation::MutationEngine;
use crate::safety::WorkspaceGuard;
use crate::transaction::{CommitOutcome, OsFileSystem, Transaction, TransactionError};
use std::path::Path;

/// How a plan is applied.
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    pub engine: MutationEngine,
    pub dry_run: bool,
}

/// Stage every edit in `plan`, then commit through `gate`.
///
/// Paths resolve against `workspace_root` when the plan says
/// `workspace_relative`, otherwise against `plan_dir`. Every path must stay
/// inside `workspace_root`. Either all edits land or none do.
pub fn apply_plan(
    plan: &EditPlan,
    workspace_root: &Path,
    plan_dir: &Path,
    options: &ApplyOptions,
    gate: &mut dyn ApprovalGate,
) -> Result<CommitOutcome, TransactionError> {
    let guard = WorkspaceGuard::new(workspace_root)?;
    let base = if plan.meta.workspace_relative {
        workspace_root
    } else {
        plan_dir
    };

    let mut txn = Transaction::begin(OsFileSystem)
        .with_guard(guard)
        .with_engine(options.engine.clone())
        .dry_run(options.dry_run);
    for op in plan.file_ops(base) {
        txn.stage(op)?;
    }

    if let Some(description) = &plan.meta.description {
        tracing::info!(%description, edits = plan.edits.len(), "applying edit plan");
    }
    txn.commit_with(gate)
}
