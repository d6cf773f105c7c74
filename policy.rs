//! Top-Two Thompson Sampling policy and floor/cap constraint application.

use crate::errors::EngineError;
use crate::posterior::arpu_sample;
use crate::rng::Xorshift32;
use crate::state::{Allocation, ArmPosterior, RiskMode};

/// Draw one ARPU sample per arm, hand the larger one's arm the bulk of
/// traffic, and give the other arm `epsilon` (capped at `exploration_cap`
/// and renormalized). Returns the *raw* allocation, before floor/cap
/// constraints are applied.
pub fn ttts_allocation(
    control: &ArmPosterior,
    variant: &ArmPosterior,
    risk_mode: RiskMode,
    exploration_cap: f64,
    rng: &mut Xorshift32,
) -> Result<Allocation, EngineError> {
    let control_sample = arpu_sample(control, rng)?;
    let variant_sample = arpu_sample(variant, rng)?;

    let epsilon = risk_mode.epsilon().min(exploration_cap);

    let (raw_control, raw_variant) = if variant_sample >= control_sample {
        (epsilon, 1.0 - epsilon)
    } else {
        (1.0 - epsilon, epsilon)
    };

    let total = raw_control + raw_variant;
    Ok(Allocation::new(raw_control / total, raw_variant / total))
}

/// Apply control/variant floors to a raw allocation:
/// - if the floors conflict (`control_floor + variant_floor > 1`), control
///   wins and variant gets the remainder;
/// - else if control is under its floor, pin control to its floor;
/// - else if variant is under its floor, pin variant to its floor;
/// - else pass the raw allocation through, renormalized to sum to 1 within
///   `1e-10`.
pub fn apply_constraints(raw: Allocation, control_floor: f64, variant_floor: f64) -> Allocation {
    if control_floor + variant_floor > 1.0 {
        return Allocation::new(control_floor, 1.0 - control_floor);
    }
    if raw.control < control_floor {
        return Allocation::new(control_floor, 1.0 - control_floor);
    }
    if raw.variant < variant_floor {
        return Allocation::new(1.0 - variant_floor, variant_floor);
    }

    let total = raw.control + raw.variant;
    Allocation::new(raw.control / total, raw.variant / total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posterior::initial_posterior;

    #[test]
    fn conflicting_floors_give_control_the_win() {
        let a = apply_constraints(Allocation::new(0.5, 0.5), 0.75, 0.30);
        assert_eq!(a.control, 0.75);
        assert!((a.control + a.variant - 1.0).abs() < 1e-10);
    }

    #[test]
    fn control_floor_is_enforced() {
        let a = apply_constraints(Allocation::new(0.1, 0.9), 0.6, 0.05);
        assert_eq!(a.control, 0.6);
        assert_eq!(a.variant, 0.4);
    }

    #[test]
    fn variant_floor_is_enforced() {
        let a = apply_constraints(Allocation::new(0.95, 0.05), 0.10, 0.20);
        assert_eq!(a.variant, 0.20);
        assert_eq!(a.control, 0.80);
    }

    #[test]
    fn unconstrained_allocation_passes_through_normalized() {
        let a = apply_constraints(Allocation::new(0.6, 0.4), 0.1, 0.05);
        assert!((a.control - 0.6).abs() < 1e-12);
        assert!((a.control + a.variant - 1.0).abs() < 1e-10);
    }

    #[test]
    fn ttts_sums_to_one_for_every_risk_mode() {
        let control = initial_posterior(0.02, 50.0);
        let variant = initial_posterior(0.02, 50.0);
        let mut rng = Xorshift32::new(3);
        for mode in [RiskMode::Cautious, RiskMode::Balanced, RiskMode::Aggressive] {
            let a = ttts_allocation(&control, &variant, mode, 0.50, &mut rng).unwrap();
            assert!(a.sums_to_one(1e-10));
            assert!(a.control >= 0.0 && a.variant >= 0.0);
        }
    }

    #[test]
    fn exploration_cap_bounds_challenger_share() {
        let control = initial_posterior(0.02, 50.0);
        let variant = initial_posterior(0.02, 50.0);
        let mut rng = Xorshift32::new(4);
        // Aggressive epsilon (0.20) capped down to 0.05 by a tight exploration_cap.
        let a = ttts_allocation(&control, &variant, RiskMode::Aggressive, 0.05, &mut rng).unwrap();
        let challenger_share = a.control.min(a.variant);
        assert!(challenger_share <= 0.05 + 1e-9);
    }
}
