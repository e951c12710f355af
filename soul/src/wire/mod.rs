//! Wire: one-way, in-process typed event channel from core to UI.
//!
//! Mirrors loom's `StreamWriter`/receiver split (see `loom::stream`): a
//! producer-only handle for the [`Soul`](crate::soul::Soul) and a
//! consumer-only handle for the UI, with merge/coalescing as a
//! consumer-side transform.

mod event;
mod merge;

pub use event::{ApprovalVerdict, WireEvent};

use tokio::sync::mpsc;

/// Producer-only handle. Synchronous, non-blocking (bounded channel with
/// `try_send`, matching the "send is synchronous, non-blocking" contract).
#[derive(Clone)]
pub struct WireSoulSide {
    tx: mpsc::UnboundedSender<WireEvent>,
    record_tx: Option<mpsc::UnboundedSender<WireEvent>>,
}

impl WireSoulSide {
    /// Sends an event. Never blocks; drops silently if the UI side has
    /// disconnected (there is nothing useful to do about a full receiver
    /// that has been dropped).
    pub fn send(&self, event: WireEvent) {
        let _ = self.tx.send(event.clone());
        if let Some(record_tx) = &self.record_tx {
            let _ = record_tx.send(event);
        }
    }
}

/// Consumer-only handle.
pub struct WireUiSide {
    rx: mpsc::UnboundedReceiver<WireEvent>,
    /// An event pulled ahead while draining a merge run that did not belong
    /// to that run; returned by the next `receive` call.
    pending: Option<WireEvent>,
}

impl WireUiSide {
    /// Receives the next event, or (when `merge` is true) a short run of
    /// same-kind events coalesced into one composite (see
    /// [`merge::merge_next`]).
    pub async fn receive(&mut self, merge: bool) -> Option<WireEvent> {
        let first = match self.pending.take() {
            Some(e) => e,
            None => self.rx.recv().await?,
        };
        if !merge {
            return Some(first);
        }
        Some(merge::merge_next(first, &mut self.rx, &mut self.pending))
    }
}

/// The event bus: `split()` into a soul-side sender and a ui-side receiver.
pub struct Wire;

impl Wire {
    /// Creates a new unmerged channel pair, with an optional debug record
    /// sink receiving a copy of every raw event.
    pub fn split_with_record(
        record_tx: Option<mpsc::UnboundedSender<WireEvent>>,
    ) -> (WireSoulSide, WireUiSide) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            WireSoulSide { tx, record_tx },
            WireUiSide { rx, pending: None },
        )
    }

    pub fn split() -> (WireSoulSide, WireUiSide) {
        Self::split_with_record(None)
    }
}

/// A resolver the UI side uses to answer an [`ApprovalRequest`] event.
/// Kept here (rather than on the event itself) so `WireEvent` stays
/// `Clone`; the approval gate correlates responses by request id.
pub type ApprovalResponder = tokio::sync::oneshot::Sender<ApprovalVerdict>;
