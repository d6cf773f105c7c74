//! Visitor-to-variant assignment and the counter-update contract.
//!
//! Assignment is a thin wrapper over whatever `Allocation` the last
//! `compute_allocation_update` tick produced: given a seed, draw a uniform
//! value and bucket it against `allocation.control`. Two modes share the
//! same function, differing only in where the seed comes from:
//! - *Live*: the boundary draws a fresh seed from true entropy once per new
//!   visitor session, then persists the resulting `Variant` for that visitor
//!   for the life of the test — assignment is never recomputed for a repeat
//!   visit.
//! - *Deterministic/test*: the caller passes an explicit fixed seed, used by
//!   the simulator and property tests.

use crate::errors::EngineError;
use crate::rng::Xorshift32;
use crate::state::Allocation;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Variant {
    Control,
    Variant,
}

/// Where a test sits in its lifecycle: created as `Draft`, mutated per tick
/// while `Active`, then either `Cancelled` (destroyed) or `Completed`
/// (frozen, having promoted or stopped).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TestStatus {
    Draft,
    Active,
    Cancelled,
    Completed,
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TestStatus::Draft => "draft",
            TestStatus::Active => "active",
            TestStatus::Cancelled => "cancelled",
            TestStatus::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// Draw one visitor's bucket from `allocation`, seeded by `seed`. Same seed,
/// same allocation, same result — always. Callers in live mode pass a fresh
/// per-session seed and persist the result themselves; callers in
/// deterministic/test mode pass a fixed seed to reproduce a prior draw.
///
/// Does not know about test lifecycle: a caller that tracks `TestStatus`
/// should go through `assign_visitor_for_test` instead, which rejects
/// assignment on a test that isn't active.
pub fn assign_visitor(allocation: Allocation, seed: u64) -> Result<Variant, EngineError> {
    if !allocation.sums_to_one(1e-6) {
        return Err(EngineError::InvalidMetrics {
            reason: format!(
                "allocation does not sum to 1: control={} variant={}",
                allocation.control, allocation.variant
            ),
        });
    }

    let mut rng = Xorshift32::new(seed);
    let draw = rng.next_f64();
    Ok(if draw < allocation.control { Variant::Control } else { Variant::Variant })
}

/// Assign a visitor for a specific, identified test, honoring its lifecycle
/// status. Returns `EngineError::TestNotActive` without touching the RNG
/// when `status` isn't `Active` — no side effects occur, and the caller is
/// expected to fall back to control.
pub fn assign_visitor_for_test(
    test_id: &str,
    status: TestStatus,
    allocation: Allocation,
    seed: u64,
) -> Result<Variant, EngineError> {
    let _span = tracing::info_span!("assign_visitor", test_id, seed).entered();
    if status != TestStatus::Active {
        return Err(EngineError::TestNotActive {
            test_id: test_id.to_string(),
            status: status.to_string(),
        });
    }
    assign_visitor(allocation, seed)
}

/// Record one impression for the assigned variant. Pure: callers apply the
/// returned delta to whatever `Metrics` they are accumulating for the next
/// `compute_allocation_update` tick.
pub fn record_impression(variant: Variant) -> (u64, u64) {
    match variant {
        Variant::Control => (1, 0),
        Variant::Variant => (0, 1),
    }
}

/// Record one conversion (with its order value) for the assigned variant.
pub fn record_conversion(variant: Variant, order_value: f64) -> Result<(Variant, f64), EngineError> {
    if !(order_value.is_finite() && order_value > 0.0) {
        return Err(EngineError::InvalidMetrics {
            reason: format!("order value must be > 0, got {order_value}"),
        });
    }
    Ok((variant, order_value))
}
