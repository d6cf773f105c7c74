//! Typed failure surface for the engine.
//!
//! Every public entry point returns `Result<_, EngineError>`.
//! [`EngineError::is_recoverable`] exposes the recoverability class without
//! forcing callers to match every variant by hand.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A distribution sampler received a non-positive shape/scale parameter.
    /// Caller bug — never retried.
    #[error("invalid distribution parameter `{name}` = {value} (must be > 0)")]
    InvalidParameter { name: &'static str, value: f64 },

    /// Metrics violate monotonicity (negative delta, conversions > impressions,
    /// a non-positive order value, or a negative count). The tick is rejected
    /// and state is not mutated.
    #[error("invalid metrics: {reason}")]
    InvalidMetrics { reason: String },

    /// Load returned nothing for an active optimization. The engine
    /// re-initializes with defaults and the tick proceeds; this variant is
    /// surfaced to the caller purely so it can be logged.
    #[error("no persisted state found for test `{test_id}`; re-initialized with defaults")]
    StateMissing { test_id: String },

    /// Optimistic-concurrency mismatch on state write. The caller must retry
    /// the whole tick (reload + recompute) against the new version.
    #[error("stale update for test `{test_id}`: expected version {expected}, found {found}")]
    StaleUpdate { test_id: String, expected: u64, found: u64 },

    /// Visitor assignment was requested for a test that is not `active`.
    /// No side effects occur; the caller falls back to control.
    #[error("test `{test_id}` is not active (status: {status})")]
    TestNotActive { test_id: String, status: String },
}

impl EngineError {
    /// Whether the caller can retry the same logical operation and expect it
    /// to succeed without further intervention (reload + recompute for
    /// `StaleUpdate`, re-init for `StateMissing`).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EngineError::StaleUpdate { .. } | EngineError::StateMissing { .. })
    }

    /// Whether the failure aborts only this tick, leaving the process (and
    /// any other in-flight tick) unaffected.
    pub fn is_fatal_to_tick_only(&self) -> bool {
        matches!(self, EngineError::InvalidParameter { .. } | EngineError::InvalidMetrics { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_update_and_state_missing_are_recoverable() {
        assert!(EngineError::StaleUpdate { test_id: "t".into(), expected: 1, found: 2 }.is_recoverable());
        assert!(EngineError::StateMissing { test_id: "t".into() }.is_recoverable());
    }

    #[test]
    fn invalid_inputs_are_not_recoverable_but_are_tick_scoped() {
        let e = EngineError::InvalidMetrics { reason: "conversions > impressions".into() };
        assert!(!e.is_recoverable());
        assert!(e.is_fatal_to_tick_only());
    }

    #[test]
    fn test_not_active_is_neither_recoverable_nor_tick_fatal() {
        let e = EngineError::TestNotActive { test_id: "t".into(), status: "draft".into() };
        assert!(!e.is_recoverable());
        assert!(!e.is_fatal_to_tick_only());
    }
}
