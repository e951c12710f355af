//! Loop-control knobs for the step loop, retry policy, and compaction.
//!
//! `Config` is a plain `Deserialize`-able struct; loading it from a file
//! (TOML, YAML, ...) is the embedding application's concern, matching
//! spec.md §1's note that the configuration file format is out of scope.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Loop-control knobs, retry tuning, and compaction defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hard cap on steps within one turn. `0` means the turn fails
    /// immediately with `MaxStepsReached` before any step runs.
    pub max_steps_per_turn: u32,
    /// Chat-provider retries per step on transient errors. `0` means the
    /// first transient error is terminal.
    pub max_retries_per_step: u32,
    /// Non-`_*` messages preserved verbatim by compaction.
    pub max_preserved_messages_on_compact: usize,
    /// Tokens reserved for generation; overflow triggers compaction.
    pub reserved_tokens: u64,
    /// Maximum context window size in tokens.
    pub max_context_size: u64,
    /// Auto-approve every approval request, bypassing the UI.
    pub yolo: bool,
    /// Initial backoff before the first retry.
    pub retry_initial_backoff: Duration,
    /// Backoff cap.
    pub retry_max_backoff: Duration,
    /// Jitter fraction applied to each backoff (0.0..=1.0).
    pub retry_jitter: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_steps_per_turn: 100,
            max_retries_per_step: 3,
            max_preserved_messages_on_compact: 2,
            reserved_tokens: 50_000,
            max_context_size: 128_000,
            yolo: false,
            retry_initial_backoff: Duration::from_millis(300),
            retry_max_backoff: Duration::from_secs(5),
            retry_jitter: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_values() {
        let c = Config::default();
        assert_eq!(c.max_steps_per_turn, 100);
        assert_eq!(c.max_retries_per_step, 3);
        assert_eq!(c.max_preserved_messages_on_compact, 2);
        assert_eq!(c.reserved_tokens, 50_000);
        assert!(!c.yolo);
        assert_eq!(c.retry_initial_backoff, Duration::from_millis(300));
        assert_eq!(c.retry_max_backoff, Duration::from_secs(5));
    }

    #[test]
    fn deserializes_with_partial_overrides() {
        let cfg: Config = serde_json::from_str(r#"{"yolo": true}"#).unwrap();
        assert!(cfg.yolo);
        assert_eq!(cfg.max_steps_per_turn, 100);
    }
}
