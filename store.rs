//! Persistence seam. The engine itself is pure and does no I/O;
//! `StateStore`/`CounterStore` are the traits a host application implements
//! over whatever it uses for storage (a database row, a key-value entry).
//! `MemoryStore` is a reference implementation used by tests and the CLI.

use crate::engine::initialize_bayesian_state;
use std::collections::HashMap;

use crate::errors::EngineError;
use crate::state::{BayesianState, InitOptions};

/// Optimistic-concurrency state storage: load the current state and its
/// version, and attempt to write a new one gated on the version unchanged
/// since load.
pub trait StateStore {
    fn load(&self, test_id: &str) -> Result<Option<BayesianState>, EngineError>;

    /// Persist `state` only if the currently stored version equals
    /// `expected_version`. On mismatch, returns `EngineError::StaleUpdate`
    /// and leaves the stored state untouched.
    fn compare_and_set(
        &mut self,
        test_id: &str,
        expected_version: u64,
        state: BayesianState,
    ) -> Result<(), EngineError>;
}

/// Load a test's persisted state. On a miss, logs `EngineError::StateMissing`
/// at `warn!` and returns a freshly initialized state from `options` instead
/// of failing the tick — the miss is surfaced alongside it so the caller can
/// still act on it (e.g. include it in a response body) without having to
/// treat it as fatal.
pub fn load_or_initialize<S: StateStore>(
    store: &S,
    test_id: &str,
    options: InitOptions,
) -> Result<(BayesianState, Option<EngineError>), EngineError> {
    match store.load(test_id)? {
        Some(state) => Ok((state, None)),
        None => {
            let miss = EngineError::StateMissing { test_id: test_id.to_string() };
            tracing::warn!(test_id, "{}", miss);
            Ok((initialize_bayesian_state(options), Some(miss)))
        }
    }
}

/// Running per-arm counters a host keeps between ticks to build up the next
/// `Metrics` batch. Kept separate from `StateStore` since a host may
/// aggregate counters in a different system (e.g. an events table) than
/// where it persists the Bayesian state itself.
pub trait CounterStore {
    fn increment_impression(&mut self, test_id: &str, variant: crate::assignment::Variant);
    fn increment_conversion(
        &mut self,
        test_id: &str,
        variant: crate::assignment::Variant,
        order_value: f64,
    );
}

/// In-process reference implementation of both traits, backed by `HashMap`s.
/// Not durable past process exit; exists for tests, the CLI, and the
/// synthetic simulator.
#[derive(Default)]
pub struct MemoryStore {
    states: HashMap<String, BayesianState>,
    control_impressions: HashMap<String, u64>,
    variant_impressions: HashMap<String, u64>,
    control_conversions: HashMap<String, (u64, f64)>,
    variant_conversions: HashMap<String, (u64, f64)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain_counters(&mut self, test_id: &str) -> crate::state::Metrics {
        let control_impressions = self.control_impressions.remove(test_id).unwrap_or(0);
        let variant_impressions = self.variant_impressions.remove(test_id).unwrap_or(0);
        let (control_conversions, control_revenue) =
            self.control_conversions.remove(test_id).unwrap_or((0, 0.0));
        let (variant_conversions, variant_revenue) =
            self.variant_conversions.remove(test_id).unwrap_or((0, 0.0));

        crate::state::Metrics {
            control: crate::state::ArmMetrics {
                impressions: control_impressions,
                conversions: control_conversions,
                revenue: control_revenue,
            },
            variant: crate::state::ArmMetrics {
                impressions: variant_impressions,
                conversions: variant_conversions,
                revenue: variant_revenue,
            },
        }
    }
}

impl StateStore for MemoryStore {
    fn load(&self, test_id: &str) -> Result<Option<BayesianState>, EngineError> {
        Ok(self.states.get(test_id).cloned())
    }

    fn compare_and_set(
        &mut self,
        test_id: &str,
        expected_version: u64,
        mut state: BayesianState,
    ) -> Result<(), EngineError> {
        let current_version = self.states.get(test_id).map(|s| s.version).unwrap_or(0);
        if current_version != expected_version {
            tracing::debug!(test_id, expected_version, current_version, "stale compare-and-set");
            return Err(EngineError::StaleUpdate {
                test_id: test_id.to_string(),
                expected: expected_version,
                found: current_version,
            });
        }
        state.version = current_version + 1;
        self.states.insert(test_id.to_string(), state);
        Ok(())
    }
}

impl CounterStore for MemoryStore {
    fn increment_impression(&mut self, test_id: &str, variant: crate::assignment::Variant) {
        let map = match variant {
            crate::assignment::Variant::Control => &mut self.control_impressions,
            crate::assignment::Variant::Variant => &mut self.variant_impressions,
        };
        *map.entry(test_id.to_string()).or_insert(0) += 1;
    }

    fn increment_conversion(
        &mut self,
        test_id: &str,
        variant: crate::assignment::Variant,
        order_value: f64,
    ) {
        let map = match variant {
            crate::assignment::Variant::Control => &mut self.control_conversions,
            crate::assignment::Variant::Variant => &mut self.variant_conversions,
        };
        let entry = map.entry(test_id.to_string()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += order_value;
    }
}
