//! Consumer-side coalescing transform for [`WireUiSide::receive`](super::WireUiSide::receive).

use tokio::sync::mpsc;

use crate::message::ContentPart;

use super::event::WireEvent;

/// Greedily drains same-kind events following `first` (without blocking)
/// and folds them into one composite event. An event that does not belong
/// to the run is stashed in `pending` for the caller's next `receive`.
pub(super) fn merge_next(
    first: WireEvent,
    rx: &mut mpsc::UnboundedReceiver<WireEvent>,
    pending: &mut Option<WireEvent>,
) -> WireEvent {
    let Some(key) = first.merge_key() else {
        return first;
    };
    let mut run = vec![first];
    loop {
        match rx.try_recv() {
            Ok(next) if next.merge_key() == Some(key) => run.push(next),
            Ok(next) => {
                *pending = Some(next);
                break;
            }
            Err(_) => break,
        }
    }
    fold(run)
}

fn fold(mut run: Vec<WireEvent>) -> WireEvent {
    if run.len() == 1 {
        return run.pop().unwrap();
    }
    match &run[0] {
        WireEvent::Content(ContentPart::Text { .. }) => {
            let text: String = run
                .iter()
                .filter_map(|e| match e {
                    WireEvent::Content(ContentPart::Text { text }) => Some(text.as_str()),
                    _ => None,
                })
                .collect();
            WireEvent::Content(ContentPart::Text { text })
        }
        WireEvent::Content(ContentPart::Think { .. }) => {
            let text: String = run
                .iter()
                .filter_map(|e| match e {
                    WireEvent::Content(ContentPart::Think { text }) => Some(text.as_str()),
                    _ => None,
                })
                .collect();
            WireEvent::Content(ContentPart::Think { text })
        }
        WireEvent::ToolCall(_) | WireEvent::ToolCallPart { .. } => {
            // The canonical final call (if present) wins; otherwise fold the
            // streamed argument fragments into one.
            if let Some(call) = run.iter().rev().find_map(|e| match e {
                WireEvent::ToolCall(tc) => Some(tc.clone()),
                _ => None,
            }) {
                return WireEvent::ToolCall(call);
            }
            let id = match &run[0] {
                WireEvent::ToolCallPart { id, .. } => id.clone(),
                _ => unreachable!(),
            };
            let arguments_delta: String = run
                .iter()
                .filter_map(|e| match e {
                    WireEvent::ToolCallPart { arguments_delta, .. } => {
                        Some(arguments_delta.as_str())
                    }
                    _ => None,
                })
                .collect();
            WireEvent::ToolCallPart { id, arguments_delta }
        }
        _ => run.into_iter().next().unwrap(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCall;

    #[tokio::test]
    async fn merges_consecutive_text_parts() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(WireEvent::Content(ContentPart::text("llo")))
            .unwrap();
        tx.send(WireEvent::StepBegin { n: 1 }).unwrap();
        let mut pending = None;
        let merged = merge_next(
            WireEvent::Content(ContentPart::text("he")),
            &mut rx,
            &mut pending,
        );
        match merged {
            WireEvent::Content(ContentPart::Text { text }) => assert_eq!(text, "hello"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(pending, Some(WireEvent::StepBegin { n: 1 })));
    }

    #[tokio::test]
    async fn non_mergeable_event_passes_through_unchanged() {
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let mut pending = None;
        let merged = merge_next(WireEvent::StepBegin { n: 2 }, &mut rx, &mut pending);
        assert!(matches!(merged, WireEvent::StepBegin { n: 2 }));
    }

    #[tokio::test]
    async fn tool_call_part_run_folds_into_final_tool_call() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(WireEvent::ToolCallPart {
            id: "1".into(),
            arguments_delta: "{\"path\":".into(),
        })
        .unwrap();
        tx.send(WireEvent::ToolCall(ToolCall {
            id: "1".into(),
            name: "read_file".into(),
            arguments: serde_json::json!({"path": "a"}),
        }))
        .unwrap();
        let mut pending = None;
        let merged = merge_next(
            WireEvent::ToolCallPart {
                id: "1".into(),
                arguments_delta: "\"a\"}".into(),
            },
            &mut rx,
            &mut pending,
        );
        assert!(matches!(merged, WireEvent::ToolCall(tc) if tc.name == "read_file"));
    }
}
