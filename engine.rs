//! Engine lifecycle entry points: initializing a fresh optimization and
//! wrapping the per-tick orchestration in `risk.rs`.

use crate::errors::EngineError;
use crate::posterior::{initial_posterior, update_arm};
use crate::state::{ArmPosterior, BayesianState, InitOptions, Metrics};

const DEFAULT_CONVERSION_RATE: f64 = 0.02;
const DEFAULT_AVG_ORDER_VALUE: f64 = 50.0;
const DEFAULT_SAFETY_BUDGET: f64 = 50.0;
const DEFAULT_CONTROL_FLOOR_BASE: f64 = 0.75;
const DEFAULT_VARIANT_FLOOR_START: f64 = 0.05;

/// Build a fresh `BayesianState` with matching priors on both arms. The
/// first allocation update is left to the caller's first tick; a freshly
/// initialized state has not yet run any ticks.
pub fn initialize_bayesian_state(options: InitOptions) -> BayesianState {
    let conversion_rate = options.conversion_rate.unwrap_or(DEFAULT_CONVERSION_RATE);
    let avg_order_value = options.avg_order_value.unwrap_or(DEFAULT_AVG_ORDER_VALUE);
    let prior: ArmPosterior = initial_posterior(conversion_rate, avg_order_value);

    BayesianState {
        control: prior.clone(),
        variant: prior,
        risk_mode: options.risk_mode.unwrap_or_default(),
        safety_budget_total: options.safety_budget.unwrap_or(DEFAULT_SAFETY_BUDGET),
        safety_budget_remaining: options.safety_budget.unwrap_or(DEFAULT_SAFETY_BUDGET),
        control_floor_base: DEFAULT_CONTROL_FLOOR_BASE,
        variant_floor_start: DEFAULT_VARIANT_FLOOR_START,
        last_allocation_update: 0,
        promotion_check_count: 0,
        last_total_impressions: 0,
        version: 0,
    }
}

/// Apply one tick's posterior updates without running the risk/decision
/// layer. Used when a caller needs the updated posteriors alone — e.g. a
/// snapshot-only reconciliation pass — without recomputing allocation or
/// evaluating the promotion gate. `compute_allocation_update` does not call
/// this: it updates both arms inline as its first step so the whole tick
/// stays one atomic computation.
pub fn update_bayesian_state(
    state: &BayesianState,
    metrics: &Metrics,
    new_control_order_values: Option<&[f64]>,
    new_variant_order_values: Option<&[f64]>,
) -> Result<BayesianState, EngineError> {
    let mut control = state.control.clone();
    let mut variant = state.variant.clone();
    update_arm(
        &mut control,
        metrics.control.impressions,
        metrics.control.conversions,
        new_control_order_values.unwrap_or(&[]),
    )?;
    update_arm(
        &mut variant,
        metrics.variant.impressions,
        metrics.variant.conversions,
        new_variant_order_values.unwrap_or(&[]),
    )?;

    Ok(BayesianState { control, variant, ..state.clone() })
}

/// Validate a proposed `InitOptions` before constructing state from it.
/// Parameters out of range are rejected, never silently clamped.
pub fn validate_init_options(options: &InitOptions) -> Result<(), EngineError> {
    if let Some(rate) = options.conversion_rate {
        if !(0.0..=1.0).contains(&rate) {
            return Err(EngineError::InvalidParameter { name: "conversion_rate", value: rate });
        }
    }
    if let Some(value) = options.avg_order_value {
        if !(value.is_finite() && value > 0.0) {
            return Err(EngineError::InvalidParameter { name: "avg_order_value", value });
        }
    }
    if let Some(budget) = options.safety_budget {
        if !(budget.is_finite() && budget >= 0.0) {
            return Err(EngineError::InvalidParameter { name: "safety_budget", value: budget });
        }
    }
    Ok(())
}
