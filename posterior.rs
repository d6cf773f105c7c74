//! Conjugate updates and Monte-Carlo summaries of the Beta × Log-Normal RPV
//! model for one arm.
//!
//! `Metrics` passed to [`update_arm`] carries the *new* counts observed since
//! the previous tick (not cumulative totals) — see `DESIGN.md` for why this
//! reading was chosen over the cumulative-totals alternative.

use crate::dist;
use crate::errors::EngineError;
use crate::rng::Xorshift32;
use crate::state::{ArmPosterior, IncidencePosterior, ValuePosterior};

/// Beta prior equivalent sample size: the configured conversion rate is
/// treated as if it had already been observed over this many impressions,
/// setting how quickly early data can move the incidence posterior.
const PRIOR_EQUIVALENT_SAMPLE_SIZE: f64 = 10.0;

/// Weak NIG prior hyperparameters not otherwise pinned by a caller-supplied
/// value. Chosen so the prior is weakly informative (κ=1 means the prior
/// mean carries the weight of one observation; α_v=3, β_v=2 gives a finite
/// prior mean variance of 1.0 in log-order-value space). See `DESIGN.md`.
const DEFAULT_KAPPA: f64 = 1.0;
const DEFAULT_ALPHA_V: f64 = 3.0;
const DEFAULT_BETA_V: f64 = 2.0;

/// Build the initial (control, variant) priors for a new optimization, given
/// a baseline conversion rate and average order value.
pub fn initial_posterior(conversion_rate: f64, avg_order_value: f64) -> ArmPosterior {
    let alpha = conversion_rate * PRIOR_EQUIVALENT_SAMPLE_SIZE;
    let beta = (1.0 - conversion_rate) * PRIOR_EQUIVALENT_SAMPLE_SIZE;
    let mu0 = avg_order_value.ln() - 0.25;

    ArmPosterior::new(
        IncidencePosterior::with_prior(alpha, beta),
        ValuePosterior::new(mu0, DEFAULT_KAPPA, DEFAULT_ALPHA_V, DEFAULT_BETA_V),
    )
}

/// Apply new impressions/conversions and (optionally) new order values to one
/// arm's posterior. Rejects invalid metrics without mutating the posterior.
pub fn update_arm(
    arm: &mut ArmPosterior,
    new_impressions: u64,
    new_conversions: u64,
    new_order_values: &[f64],
) -> Result<(), EngineError> {
    if new_conversions > new_impressions {
        return Err(EngineError::InvalidMetrics {
            reason: format!(
                "conversions ({new_conversions}) exceed impressions ({new_impressions})"
            ),
        });
    }
    if let Some(bad) = new_order_values.iter().find(|v| !v.is_finite() || **v <= 0.0) {
        return Err(EngineError::InvalidMetrics {
            reason: format!("order value must be > 0, got {bad}"),
        });
    }

    update_incidence(&mut arm.incidence, new_impressions, new_conversions);
    if !new_order_values.is_empty() {
        update_value(&mut arm.value, new_order_values);
        arm.push_order_values(new_order_values);
    }
    Ok(())
}

/// α ← α + new_conversions; β ← β + (new_impressions − new_conversions).
/// Zero impressions leaves the posterior unchanged; zero conversions with
/// nonzero impressions still increments β.
fn update_incidence(posterior: &mut IncidencePosterior, new_impressions: u64, new_conversions: u64) {
    if new_impressions == 0 {
        return;
    }
    posterior.alpha += new_conversions as f64;
    posterior.beta += (new_impressions - new_conversions) as f64;
}

/// Standard Normal-Inverse-Gamma conjugate recursion, applied to the log of
/// each new order value.
fn update_value(posterior: &mut ValuePosterior, new_order_values: &[f64]) {
    let n = new_order_values.len() as f64;
    if n == 0.0 {
        return;
    }
    let log_values: Vec<f64> = new_order_values.iter().map(|v| v.ln()).collect();
    let m = log_values.iter().sum::<f64>() / n;
    let s2 = log_values.iter().map(|l| (l - m).powi(2)).sum::<f64>() / n;

    let kappa = posterior.kappa;
    let mu0 = posterior.mu0;

    let kappa_prime = kappa + n;
    let mu_prime = (kappa * mu0 + n * m) / kappa_prime;
    let alpha_v_prime = posterior.alpha_v + n / 2.0;
    let beta_v_prime =
        posterior.beta_v + 0.5 * n * s2 + 0.5 * (kappa * n / kappa_prime) * (m - mu0).powi(2);

    posterior.kappa = kappa_prime;
    posterior.mu0 = mu_prime;
    posterior.alpha_v = alpha_v_prime;
    posterior.beta_v = beta_v_prime;
}

/// One Monte-Carlo ARPU draw for this arm:
/// `p ~ Beta(α, β)`, `σ² ~ InverseGamma(α_v, β_v)`, `μ ~ Normal(μ0, σ²/κ)`,
/// `E[V|μ,σ²] = exp(μ + σ²/2)`, return `p · E[V]`.
pub fn arpu_sample(arm: &ArmPosterior, rng: &mut Xorshift32) -> Result<f64, EngineError> {
    let p = dist::beta(rng, arm.incidence.alpha, arm.incidence.beta)?;
    let sigma_sq = dist::inverse_gamma(rng, arm.value.alpha_v, arm.value.beta_v)?;
    let mu = dist::normal(rng, arm.value.mu0, sigma_sq / arm.value.kappa)?;
    let expected_value = (mu + 0.5 * sigma_sq).exp();
    Ok(p * expected_value)
}

/// Analytical mean ARPU, used for display/logging rather than the
/// Monte-Carlo estimators that drive decisions.
pub fn analytical_mean_arpu(arm: &ArmPosterior) -> f64 {
    arm.incidence.mean() * arm.value.expected_value_analytical()
}

/// Total impressions actually observed for this arm, recovered from the
/// incidence posterior (`alpha + beta` always starts at
/// `PRIOR_EQUIVALENT_SAMPLE_SIZE` regardless of the chosen prior mean, so
/// subtracting it back out recovers the true observation count without a
/// separate running counter).
pub fn total_impressions(arm: &ArmPosterior) -> f64 {
    arm.incidence.alpha + arm.incidence.beta - PRIOR_EQUIVALENT_SAMPLE_SIZE
}

/// P(variant ARPU sample > control ARPU sample) over `n_samples` paired
/// draws from one sequential RNG stream.
pub fn probability_variant_wins(
    control: &ArmPosterior,
    variant: &ArmPosterior,
    rng: &mut Xorshift32,
    n_samples: usize,
) -> Result<f64, EngineError> {
    let mut wins = 0usize;
    for _ in 0..n_samples {
        let c = arpu_sample(control, rng)?;
        let v = arpu_sample(variant, rng)?;
        if v > c {
            wins += 1;
        }
    }
    Ok(wins as f64 / n_samples as f64)
}

/// P((variant − control)/control · 100 >= `min_lift_percent`) over
/// `n_samples` paired draws.
pub fn probability_meaningful_lift(
    control: &ArmPosterior,
    variant: &ArmPosterior,
    rng: &mut Xorshift32,
    n_samples: usize,
    min_lift_percent: f64,
) -> Result<f64, EngineError> {
    let mut hits = 0usize;
    for _ in 0..n_samples {
        let c = arpu_sample(control, rng)?;
        let v = arpu_sample(variant, rng)?;
        if c > 0.0 && (v - c) / c * 100.0 >= min_lift_percent {
            hits += 1;
        }
    }
    Ok(hits as f64 / n_samples as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_arm() -> ArmPosterior {
        initial_posterior(0.02, 50.0)
    }

    #[test]
    fn initial_prior_matches_configured_defaults() {
        let arm = fresh_arm();
        assert_eq!(arm.incidence.alpha, 0.2);
        assert_eq!(arm.incidence.beta, 9.8);
        assert!((arm.value.mu0 - (50.0_f64.ln() - 0.25)).abs() < 1e-12);
    }

    #[test]
    fn zero_impressions_leaves_incidence_unchanged() {
        let mut arm = fresh_arm();
        let before = arm.incidence;
        update_arm(&mut arm, 0, 0, &[]).unwrap();
        assert_eq!(arm.incidence, before);
    }

    #[test]
    fn zero_conversions_still_increments_beta() {
        let mut arm = fresh_arm();
        let beta_before = arm.incidence.beta;
        update_arm(&mut arm, 100, 0, &[]).unwrap();
        assert_eq!(arm.incidence.beta, beta_before + 100.0);
        assert_eq!(arm.incidence.alpha, 0.2);
    }

    #[test]
    fn conversions_exceeding_impressions_is_rejected() {
        let mut arm = fresh_arm();
        let before = arm.clone();
        let err = update_arm(&mut arm, 10, 11, &[]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidMetrics { .. }));
        assert_eq!(arm, before, "state must not mutate on rejection");
    }

    #[test]
    fn non_positive_order_value_is_rejected() {
        let mut arm = fresh_arm();
        let err = update_arm(&mut arm, 10, 2, &[25.0, -1.0]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidMetrics { .. }));
    }

    #[test]
    fn batching_commutes_for_incidence_posterior() {
        // Two sequential updates must equal one combined update, for the
        // incidence posterior.
        let mut sequential = fresh_arm();
        update_arm(&mut sequential, 100, 5, &[]).unwrap();
        update_arm(&mut sequential, 200, 9, &[]).unwrap();

        let mut batched = fresh_arm();
        update_arm(&mut batched, 300, 14, &[]).unwrap();

        assert_eq!(sequential.incidence, batched.incidence);
    }

    #[test]
    fn batching_commutes_for_value_posterior_given_same_concatenation() {
        let values_a = [20.0, 30.0, 45.0];
        let values_b = [15.0, 60.0];

        let mut sequential = fresh_arm();
        update_arm(&mut sequential, 3, 3, &values_a).unwrap();
        update_arm(&mut sequential, 2, 2, &values_b).unwrap();

        let mut batched = fresh_arm();
        let all: Vec<f64> = values_a.iter().chain(values_b.iter()).copied().collect();
        update_arm(&mut batched, 5, 5, &all).unwrap();

        assert!((sequential.value.mu0 - batched.value.mu0).abs() < 1e-9);
        assert!((sequential.value.kappa - batched.value.kappa).abs() < 1e-9);
        assert!((sequential.value.alpha_v - batched.value.alpha_v).abs() < 1e-9);
        assert!((sequential.value.beta_v - batched.value.beta_v).abs() < 1e-9);
    }

    #[test]
    fn equal_arms_probability_converges_near_half() {
        let control = fresh_arm();
        let variant = fresh_arm();
        let mut rng = Xorshift32::new(2048);
        let pi = probability_variant_wins(&control, &variant, &mut rng, 2048).unwrap();
        assert!((pi - 0.5).abs() <= 0.1, "pi={pi}");
    }

    #[test]
    fn clearly_winning_variant_has_high_probability() {
        let mut control = fresh_arm();
        let mut variant = fresh_arm();
        update_arm(&mut control, 5000, 100, &[]).unwrap();
        update_arm(&mut variant, 5000, 175, &[]).unwrap();

        let mut rng = Xorshift32::new(7);
        let pi = probability_variant_wins(&control, &variant, &mut rng, 4096).unwrap();
        assert!(pi > 0.6, "pi={pi}");
    }

    #[test]
    fn total_impressions_recovers_observation_count() {
        let mut arm = fresh_arm();
        assert_eq!(total_impressions(&arm), 0.0);
        update_arm(&mut arm, 5000, 100, &[]).unwrap();
        assert_eq!(total_impressions(&arm), 5000.0);
    }

    #[test]
    fn same_seed_gives_identical_mc_estimate() {
        let control = fresh_arm();
        let variant = fresh_arm();
        let mut rng_a = Xorshift32::new(55);
        let mut rng_b = Xorshift32::new(55);
        let pi_a = probability_variant_wins(&control, &variant, &mut rng_a, 512).unwrap();
        let pi_b = probability_variant_wins(&control, &variant, &mut rng_b, 512).unwrap();
        assert_eq!(pi_a, pi_b);
    }
}
