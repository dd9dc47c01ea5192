//! Surgical Edit: structure-aware source edits for automated agents
//!
//! Agents name *what* to change (add this function, remove that import) and
//! the crate works out *where*, using tree-sitter concrete syntax trees so
//! comments and formatting outside the edited span survive byte for byte.
//!
//! # Architecture
//!
//! Every request flows through the same stages:
//!
//! 1. [`index`] builds a [`StructuralIndex`] of functions, methods, classes
//!    and imports with exact byte spans.
//! 2. [`mutation`] turns an [`EditOperation`] into byte-span [`Edit`]s and
//!    candidate text. Nothing is written.
//! 3. [`validate`] re-parses the candidate and explains failures, with a
//!    dedicated indentation diagnosis for Python.
//! 4. [`transaction`] stages file operations across many files and commits
//!    them atomically, restoring every file on failure.
//! 5. [`approval`] lets a human (or policy) accept, edit or reject each
//!    change before it lands.
//!
//! Failures at every stage surface as a [`Diagnostic`] with a stable code
//! and a corrective suggestion.
//!
//! # Example
//!
//! ```no_run
//! use surgical_edit::{approval::AutoApprove, EditOperation, FileOp, Transaction};
//!
//! let mut txn = Transaction::on_disk();
//! txn.stage(FileOp::Edit {
//!     path: "app.py".into(),
//!     language: None,
//!     operation: EditOperation::AddImport {
//!         statement: "import json".into(),
//!     },
//! })?;
//! txn.commit_with(&mut AutoApprove)?;
//! # Ok::<(), surgical_edit::transaction::TransactionError>(())
//! ```

pub mod approval;
pub mod config;
pub mod diagnostic;
pub mod edit;
pub mod index;
pub mod language;
pub mod layout;
pub mod mutation;
pub mod pipeline;
pub mod pool;
pub mod safety;
pub mod source;
pub mod telemetry;
pub mod transaction;
pub mod ts;
pub mod validate;

// Re-exports
pub use approval::{ApprovalDecision, ApprovalGate, ApprovalRequest};
pub use diagnostic::{Diagnostic, DiagnosticCode};
pub use edit::{Edit, EditError};
pub use index::{index, index_text, Entity, EntityKind, IndexError, StructuralIndex};
pub use language::Language;
pub use mutation::{EditOperation, MutationEngine, MutationResult, OperationRequest};
pub use pipeline::{EditState, Pipeline, PipelineReport};
pub use safety::{SafetyError, WorkspaceGuard};
pub use source::SourceUnit;
pub use transaction::{CommitOutcome, CommitReport, FileOp, Transaction, TransactionError};
pub use ts::TreeSitterError;
pub use validate::{validate, ValidationError};
