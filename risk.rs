//! CVaR throttle, dynamic floors, EOC, safety-budget accounting, the
//! promotion gate, and the top-level `compute_allocation_update` orchestrator.
//! This is the largest component — it is the only place that touches every
//! other component in the engine.

use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::policy::{apply_constraints, ttts_allocation};
use crate::posterior::{
    analytical_mean_arpu, arpu_sample, probability_meaningful_lift, probability_variant_wins,
    total_impressions, update_arm,
};
use crate::rng::Xorshift32;
use crate::state::{
    Allocation, AllocationUpdateResult, ArmPosterior, BayesianState, Metrics, PromotionCheck,
};

/// Hard ceiling the CVaR throttle pins the variant floor to for the tick it
/// engages on — emergency downside protection when the variant's tail risk
/// is worse than control's.
const CVAR_EMERGENCY_FLOOR_CAP: f64 = 0.02;

/// Mean of the lowest `ceil(quantile * n_samples)` ARPU draws for one arm.
pub fn cvar(
    arm: &ArmPosterior,
    quantile: f64,
    n_samples: usize,
    rng: &mut Xorshift32,
) -> Result<f64, EngineError> {
    let mut samples = Vec::with_capacity(n_samples);
    for _ in 0..n_samples {
        samples.push(arpu_sample(arm, rng)?);
    }
    samples.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let tail_count = ((quantile * n_samples as f64).ceil() as usize).max(1).min(n_samples);
    let tail_sum: f64 = samples[..tail_count].iter().sum();
    Ok(tail_sum / tail_count as f64)
}

/// Dynamic control floor schedule: the *minimum* over every threshold `pi`
/// meets, so a regression in `pi` raises the floor again.
pub fn dynamic_control_floor(pi: f64, base: f64) -> f64 {
    let mut floor = base;
    if pi >= 0.60 {
        floor = floor.min(0.65);
    }
    if pi >= 0.80 {
        floor = floor.min(0.60);
    }
    if pi >= 0.90 {
        floor = floor.min(0.55);
    }
    if pi >= 0.95 {
        floor = floor.min(0.50);
    }
    floor
}

/// Variant ramp floor schedule: the *maximum* over every threshold `pi`
/// meets.
pub fn variant_ramp_floor(pi: f64, start: f64) -> f64 {
    let mut floor = start;
    if pi >= 0.60 {
        floor = floor.max(0.10);
    }
    if pi >= 0.80 {
        floor = floor.max(0.20);
    }
    if pi >= 0.90 {
        floor = floor.max(0.35);
    }
    if pi >= 0.95 {
        floor = floor.max(0.50);
    }
    floor
}

/// Expected Opportunity Cost per 1,000 sessions.
///
/// Fixes the "current winner" once per tick by the *point estimate*
/// (analytical mean ARPU), rather than re-deriving it per Monte-Carlo pair —
/// see `DESIGN.md` for why. Per pair, regret is the gap between the best
/// sampled outcome and what the declared winner's own sample would have
/// paid out.
pub fn eoc_per_1000_sessions(
    control: &ArmPosterior,
    variant: &ArmPosterior,
    n_samples: usize,
    rng: &mut Xorshift32,
) -> Result<f64, EngineError> {
    let variant_is_point_estimate_winner =
        analytical_mean_arpu(variant) >= analytical_mean_arpu(control);

    let mut total_regret = 0.0;
    for _ in 0..n_samples {
        let c = arpu_sample(control, rng)?;
        let v = arpu_sample(variant, rng)?;
        let winner_payout = if variant_is_point_estimate_winner { v } else { c };
        total_regret += c.max(v) - winner_payout;
    }
    Ok(total_regret / n_samples as f64 * 1000.0)
}

/// Cost of waiting per session under a candidate allocation:
/// `regret = max(c,v) - (p_c·c + p_v·v)`, averaged over paired samples.
pub fn cost_of_waiting_per_session(
    control: &ArmPosterior,
    variant: &ArmPosterior,
    allocation: Allocation,
    n_samples: usize,
    rng: &mut Xorshift32,
) -> Result<f64, EngineError> {
    let mut total_regret = 0.0;
    for _ in 0..n_samples {
        let c = arpu_sample(control, rng)?;
        let v = arpu_sample(variant, rng)?;
        let expected_under_allocation = allocation.control * c + allocation.variant * v;
        total_regret += c.max(v) - expected_under_allocation;
    }
    Ok(total_regret / n_samples as f64)
}

/// Evaluate the three promotion gates. All three must hold for
/// `should_promote`, and promotion only ever targets the variant.
pub fn evaluate_promotion(
    control: &ArmPosterior,
    variant: &ArmPosterior,
    probability_meaningful_lift: f64,
    eoc_per_1000_sessions: f64,
    config: &EngineConfig,
) -> PromotionCheck {
    let meets_min_samples = total_impressions(control) >= config.min_samples_per_arm as f64
        && total_impressions(variant) >= config.min_samples_per_arm as f64;
    let meets_lift_probability =
        probability_meaningful_lift >= config.min_probability_meaningful_lift;
    let meets_eoc = eoc_per_1000_sessions <= config.max_eoc_per_1000_sessions;

    PromotionCheck {
        meets_min_samples,
        probability_meaningful_lift,
        eoc_per_1000_sessions,
        should_promote: meets_min_samples && meets_lift_probability && meets_eoc,
    }
}

/// The engine's single entry point. Pure and deterministic given
/// `(state, metrics, seed)`; performs no I/O.
///
/// `new_control_order_values`/`new_variant_order_values` are the new orders
/// observed this tick (may be empty). `metrics` carries *new* (not
/// cumulative) counts since the previous tick — see `DESIGN.md`.
pub fn compute_allocation_update(
    state: &BayesianState,
    metrics: &Metrics,
    new_control_order_values: &[f64],
    new_variant_order_values: &[f64],
    seed: u64,
    config: &EngineConfig,
) -> Result<AllocationUpdateResult, EngineError> {
    let _span = tracing::info_span!("compute_allocation_update", seed).entered();

    // (i) update posteriors
    let mut control = state.control.clone();
    let mut variant = state.variant.clone();
    update_arm(
        &mut control,
        metrics.control.impressions,
        metrics.control.conversions,
        new_control_order_values,
    )?;
    update_arm(
        &mut variant,
        metrics.variant.impressions,
        metrics.variant.conversions,
        new_variant_order_values,
    )?;

    // (ii) pi and mean ARPUs
    let mut rng_pi = Xorshift32::from_seed_offset(seed, 0);
    let prob_variant_wins = probability_variant_wins(&control, &variant, &mut rng_pi, config.mc_samples)?;
    let mean_control_arpu = analytical_mean_arpu(&control);
    let mean_variant_arpu = analytical_mean_arpu(&variant);

    // (iii) CVaR decision
    let mut rng_cvar_c = Xorshift32::from_seed_offset(seed, 1);
    let mut rng_cvar_v = Xorshift32::from_seed_offset(seed, 2);
    let control_cvar = cvar(&control, config.cvar_quantile, config.mc_samples, &mut rng_cvar_c)?;
    let variant_cvar = cvar(&variant, config.cvar_quantile, config.mc_samples, &mut rng_cvar_v)?;
    let cvar_throttle_engaged = variant_cvar < control_cvar;
    if cvar_throttle_engaged {
        tracing::warn!(control_cvar, variant_cvar, "downside-risk throttle engaged, capping variant floor");
    }

    // (iv) floors, CVaR override
    let control_floor = dynamic_control_floor(prob_variant_wins, state.control_floor_base);
    let mut variant_floor = variant_ramp_floor(prob_variant_wins, state.variant_floor_start);
    if cvar_throttle_engaged {
        variant_floor = variant_floor.min(CVAR_EMERGENCY_FLOOR_CAP);
    }

    // (v) raw TTTS allocation
    let mut rng_ttts = Xorshift32::from_seed_offset(seed, 3);
    let raw_allocation =
        ttts_allocation(&control, &variant, state.risk_mode, config.exploration_cap, &mut rng_ttts)?;

    // (vi) apply constraints
    let allocation = apply_constraints(raw_allocation, control_floor, variant_floor);

    // (vii) cost of waiting under the final allocation
    let mut rng_cow = Xorshift32::from_seed_offset(seed, 4);
    let cost_of_waiting_per_session_value =
        cost_of_waiting_per_session(&control, &variant, allocation, config.mc_samples, &mut rng_cow)?;

    // (viii) charge safety budget, skipping the first tick
    let is_first_tick = state.promotion_check_count == 0;
    let new_total_impressions = state.last_total_impressions
        + metrics.control.impressions
        + metrics.variant.impressions;
    let mut safety_budget_remaining = state.safety_budget_remaining;
    if !is_first_tick {
        let new_impressions = new_total_impressions - state.last_total_impressions;
        safety_budget_remaining -=
            cost_of_waiting_per_session_value * new_impressions as f64;
    }

    // (ix) evaluate promotion
    let mut rng_lift = Xorshift32::from_seed_offset(seed, 5);
    let probability_lift = probability_meaningful_lift(
        &control,
        &variant,
        &mut rng_lift,
        config.mc_samples_promotion,
        config.min_lift_percent,
    )?;
    let mut rng_eoc = Xorshift32::from_seed_offset(seed, 6);
    let eoc = eoc_per_1000_sessions(&control, &variant, config.mc_samples_promotion, &mut rng_eoc)?;

    let leaning_toward_variant = prob_variant_wins > 0.5;
    let promotion_check = if leaning_toward_variant {
        evaluate_promotion(&control, &variant, probability_lift, eoc, config)
    } else {
        PromotionCheck {
            meets_min_samples: total_impressions(&control) >= config.min_samples_per_arm as f64
                && total_impressions(&variant) >= config.min_samples_per_arm as f64,
            probability_meaningful_lift: probability_lift,
            eoc_per_1000_sessions: eoc,
            should_promote: false,
        }
    };

    let should_stop = safety_budget_remaining < 0.0 && !promotion_check.should_promote;
    if should_stop {
        tracing::warn!(safety_budget_remaining, "safety budget exhausted, recommending stop");
    }
    if promotion_check.should_promote {
        tracing::info!(
            probability_meaningful_lift = promotion_check.probability_meaningful_lift,
            eoc_per_1000_sessions = promotion_check.eoc_per_1000_sessions,
            "all promotion gates passed"
        );
    }

    let human_reasoning = describe_tick(
        prob_variant_wins,
        control_floor,
        variant_floor,
        cvar_throttle_engaged,
        safety_budget_remaining,
        &promotion_check,
        should_stop,
    );

    let new_state = BayesianState {
        control,
        variant,
        risk_mode: state.risk_mode,
        safety_budget_total: state.safety_budget_total,
        safety_budget_remaining,
        control_floor_base: state.control_floor_base,
        variant_floor_start: state.variant_floor_start,
        last_allocation_update: state.last_allocation_update,
        promotion_check_count: state.promotion_check_count + 1,
        last_total_impressions: new_total_impressions,
        version: state.version,
    };

    tracing::info!(
        prob_variant_wins,
        control_floor,
        variant_floor,
        safety_budget_remaining,
        "allocation tick computed"
    );

    Ok(AllocationUpdateResult {
        state: new_state,
        allocation,
        prob_variant_wins,
        mean_control_arpu,
        mean_variant_arpu,
        eoc_per_1000_sessions: eoc,
        cost_of_waiting_per_session: cost_of_waiting_per_session_value,
        promotion_check,
        should_stop,
        human_reasoning,
    })
}

fn describe_tick(
    pi: f64,
    control_floor: f64,
    variant_floor: f64,
    cvar_throttle_engaged: bool,
    safety_budget_remaining: f64,
    promotion_check: &PromotionCheck,
    should_stop: bool,
) -> String {
    let mut parts = vec![format!(
        "P(variant beats control) = {:.1}%; floors: control >= {:.0}%, variant >= {:.0}%.",
        pi * 100.0,
        control_floor * 100.0,
        variant_floor * 100.0
    )];
    if cvar_throttle_engaged {
        parts.push("Downside-risk throttle engaged: variant floor capped for this tick.".into());
    }
    if promotion_check.should_promote {
        parts.push("All promotion gates passed; variant is ready to promote.".into());
    } else if should_stop {
        parts.push(format!(
            "Safety budget exhausted (remaining {:.2}); recommending stop.",
            safety_budget_remaining
        ));
    } else {
        parts.push(format!("Safety budget remaining: {:.2}.", safety_budget_remaining));
    }
    parts.join(" ")
}
