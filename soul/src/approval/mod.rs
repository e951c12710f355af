//! Approval Gate: async request/response protocol between tools and UI.

use dashmap::{DashMap, DashSet};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::wire::{ApprovalVerdict, WireEvent, WireSoulSide};

/// A tool's request for user confirmation before a side-effectful action.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub tool_call_id: String,
    pub sender: String,
    pub action: String,
    pub description: String,
    pub display: Option<serde_json::Value>,
}

/// Raised by a tool to signal the user declined an approval request.
/// The dispatcher maps this uniformly to `ReturnValue::Rejected`.
#[derive(Debug, thiserror::Error)]
#[error("tool call rejected by user")]
pub struct ToolRejected;

/// Gates side-effectful tool actions behind a request/response protocol.
///
/// YOLO mode and the per-session auto-approve set (keyed by `action`, per
/// the open question in the design notes) both bypass the UI round trip.
pub struct ApprovalGate {
    wire: WireSoulSide,
    yolo: bool,
    auto_approved_actions: DashSet<String>,
    pending: DashMap<Uuid, oneshot::Sender<ApprovalVerdict>>,
}

impl ApprovalGate {
    pub fn new(wire: WireSoulSide, yolo: bool) -> Self {
        Self {
            wire,
            yolo,
            auto_approved_actions: DashSet::new(),
            pending: DashMap::new(),
        }
    }

    /// Requests approval, blocking until a verdict arrives (or YOLO/auto-approve
    /// short-circuits immediately).
    pub async fn request(
        &self,
        sender: impl Into<String>,
        tool_call_id: impl Into<String>,
        action: impl Into<String>,
        description: impl Into<String>,
        display: Option<serde_json::Value>,
    ) -> ApprovalVerdict {
        let action = action.into();
        if self.yolo {
            debug!(%action, "approval bypassed: yolo mode");
            return ApprovalVerdict::Approve;
        }
        if self.auto_approved_actions.contains(&action) {
            debug!(%action, "approval bypassed: auto-approved for session");
            return ApprovalVerdict::Approve;
        }

        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        let request = ApprovalRequest {
            id,
            tool_call_id: tool_call_id.into(),
            sender: sender.into(),
            action: action.clone(),
            description: description.into(),
            display,
        };
        self.wire.send(WireEvent::ApprovalRequest(request));

        let verdict = rx.await.unwrap_or(ApprovalVerdict::Reject);
        if verdict == ApprovalVerdict::ApproveForSession {
            self.auto_approved_actions.insert(action);
        }
        self.wire
            .send(WireEvent::ApprovalRequestResolved { id, verdict });

        // Normalize to a plain approve once the action is recorded — callers
        // only ever need to know whether to proceed, not why.
        if verdict == ApprovalVerdict::ApproveForSession {
            ApprovalVerdict::Approve
        } else {
            verdict
        }
    }

    /// Called by the UI side to resolve a pending request. Returns `false`
    /// if `id` was not (or is no longer) pending.
    pub fn resolve(&self, id: Uuid, verdict: ApprovalVerdict) -> bool {
        match self.pending.remove(&id) {
            Some((_, tx)) => {
                let _ = tx.send(verdict);
                true
            }
            None => false,
        }
    }

    /// Resolves every unresolved request with `Reject`. Called on turn
    /// cancellation, per the concurrency model's "unresolved requests at
    /// turn-cancel are completed with reject" rule.
    pub fn reject_all_pending(&self) {
        let ids: Vec<Uuid> = self.pending.iter().map(|e| *e.key()).collect();
        if !ids.is_empty() {
            warn!(count = ids.len(), "rejecting pending approvals on cancel");
        }
        for id in ids {
            self.resolve(id, ApprovalVerdict::Reject);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
