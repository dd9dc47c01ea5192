//! The approval boundary.
//!
//! A gate sees the text before and after a change plus line counts and
//! answers approve or reject, optionally with an edited payload. Rendering
//! is the gate's business. Any failure to decide, cancellation included,
//! counts as a rejection.

use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};
use std::path::PathBuf;
use std::sync::mpsc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub lines_added: usize,
    pub lines_removed: usize,
}

impl DiffStats {
    pub fn between(before: &str, after: &str) -> Self {
        let diff = TextDiff::from_lines(before, after);
        diff.iter_all_changes()
            .fold(DiffStats::default(), |mut stats, change| {
                match change.tag() {
                    ChangeTag::Insert => stats.lines_added += 1,
                    ChangeTag::Delete => stats.lines_removed += 1,
                    ChangeTag::Equal => {}
                }
                stats
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub path: PathBuf,
    pub before: String,
    pub after: String,
    pub stats: DiffStats,
}

impl ApprovalRequest {
    pub fn new(path: impl Into<PathBuf>, before: impl Into<String>, after: impl Into<String>) -> Self {
        let before = before.into();
        let after = after.into();
        let stats = DiffStats::between(&before, &after);
        Self {
            path: path.into(),
            before,
            after,
            stats,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub approved: bool,
    /// Replacement for the proposed text; re-validated before use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_payload: Option<String>,
}

impl ApprovalDecision {
    pub fn approve() -> Self {
        Self {
            approved: true,
            edited_payload: None,
        }
    }

    pub fn reject() -> Self {
        Self {
            approved: false,
            edited_payload: None,
        }
    }

    pub fn approve_edited(payload: impl Into<String>) -> Self {
        Self {
            approved: true,
            edited_payload: Some(payload.into()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("approval was cancelled")]
    Cancelled,

    #[error("approval gate failed: {0}")]
    Gate(String),
}

/// Blocks until a decision about `request` is available.
pub trait ApprovalGate {
    fn request_approval(&mut self, request: &ApprovalRequest)
        -> Result<ApprovalDecision, ApprovalError>;
}

impl<G: ApprovalGate + ?Sized> ApprovalGate for &mut G {
    fn request_approval(
        &mut self,
        request: &ApprovalRequest,
    ) -> Result<ApprovalDecision, ApprovalError> {
        (**self).request_approval(request)
    }
}

impl<G: ApprovalGate + ?Sized> ApprovalGate for Box<G> {
    fn request_approval(
        &mut self,
        request: &ApprovalRequest,
    ) -> Result<ApprovalDecision, ApprovalError> {
        (**self).request_approval(request)
    }
}

/// Ask `gate`, folding every failure into a rejection.
pub fn decide(gate: &mut dyn ApprovalGate, request: &ApprovalRequest) -> ApprovalDecision {
    match gate.request_approval(request) {
        Ok(decision) => {
            tracing::debug!(
                path = %request.path.display(),
                approved = decision.approved,
                edited = decision.edited_payload.is_some(),
                "approval decision"
            );
            decision
        }
        Err(err) => {
            tracing::warn!(path = %request.path.display(), error = %err, "approval not granted");
            ApprovalDecision::reject()
        }
    }
}

/// Approves everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

impl ApprovalGate for AutoApprove {
    fn request_approval(&mut self, _: &ApprovalRequest) -> Result<ApprovalDecision, ApprovalError> {
        Ok(ApprovalDecision::approve())
    }
}

/// Rejects everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoReject;

impl ApprovalGate for AutoReject {
    fn request_approval(&mut self, _: &ApprovalRequest) -> Result<ApprovalDecision, ApprovalError> {
        Ok(ApprovalDecision::reject())
    }
}

/// Adapts a closure into a gate.
pub struct FnGate<F>(pub F);

impl<F> ApprovalGate for FnGate<F>
where
    F: FnMut(&ApprovalRequest) -> Result<ApprovalDecision, ApprovalError>,
{
    fn request_approval(
        &mut self,
        request: &ApprovalRequest,
    ) -> Result<ApprovalDecision, ApprovalError> {
        (self.0)(request)
    }
}

/// Gate whose decisions come from another thread.
///
/// Dropping the [`ApprovalHandle`] cancels every pending and future request.
pub struct ChannelGate {
    requests: mpsc::Sender<ApprovalRequest>,
    decisions: mpsc::Receiver<ApprovalDecision>,
}

/// The deciding side of a [`ChannelGate`].
pub struct ApprovalHandle {
    pub requests: mpsc::Receiver<ApprovalRequest>,
    pub decisions: mpsc::Sender<ApprovalDecision>,
}

impl ChannelGate {
    pub fn pair() -> (ChannelGate, ApprovalHandle) {
        let (request_tx, request_rx) = mpsc::channel();
        let (decision_tx, decision_rx) = mpsc::channel();
        (
            ChannelGate {
                requests: request_tx,
                decisions: decision_rx,
            },
            ApprovalHandle {
                requests: request_rx,
                decisions: decision_tx,
            },
        )
    }
}

impl ApprovalGate for ChannelGate {
    fn request_approval(
        &mut self,
        request: &ApprovalRequest,
    ) -> Result<ApprovalDecision, ApprovalError> {
        self.requests
            .send(request.clone())
            .map_err(|_| ApprovalError::Cancelled)?;
        self.decisions.recv().map_err(|_| ApprovalError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn stats_count_changed_lines() {
        let stats = DiffStats::between("a\nb\nc\n", "a\nB\nc\nd\n");
        assert_eq!(
            stats,
            DiffStats {
                lines_added: 2,
                lines_removed: 1
            }
        );
    }

    #[test]
    fn request_computes_stats() {
        let request = ApprovalRequest::new("a.py", "", "def f():\n    pass\n");
        assert_eq!(request.stats.lines_added, 2);
        assert_eq!(request.stats.lines_removed, 0);
    }

    #[test]
    fn channel_gate_round_trip() {
        let (mut gate, handle) = ChannelGate::pair();
        let decider = thread::spawn(move || {
            let request = handle.requests.recv().unwrap();
            assert_eq!(request.path, PathBuf::from("a.py"));
            handle
                .decisions
                .send(ApprovalDecision::approve_edited("x = 2\n"))
                .unwrap();
        });

        let decision = decide(&mut gate, &ApprovalRequest::new("a.py", "x = 0\n", "x = 1\n"));
        decider.join().unwrap();
        assert!(decision.approved);
        assert_eq!(decision.edited_payload.as_deref(), Some("x = 2\n"));
    }

    #[test]
    fn dropped_handle_is_a_rejection() {
        let (mut gate, handle) = ChannelGate::pair();
        drop(handle);

        let request = ApprovalRequest::new("a.py", "", "x = 1\n");
        assert_eq!(gate.request_approval(&request), Err(ApprovalError::Cancelled));
        assert!(!decide(&mut gate, &request).approved);
    }

    #[test]
    fn closure_gate_sees_request() {
        let mut seen = Vec::new();
        let mut gate = FnGate(|request: &ApprovalRequest| {
            seen.push(request.stats);
            Err::<ApprovalDecision, _>(ApprovalError::Gate("ui crashed".into()))
        });
        let decision = decide(&mut gate, &ApprovalRequest::new("a.py", "a\n", "b\n"));
        assert!(!decision.approved);
        assert_eq!(seen.len(), 1);
    }
}
