//! Evolution snapshots: a point-in-time record of a test's posteriors and
//! allocation, kept for charting and audit trails separate from the live
//! `BayesianState`.

use serde::{Deserialize, Serialize};

use crate::state::{Allocation, ArmPosterior, PromotionCheck, RiskMode};

/// One point-in-time record of a test's evolution. Distinct from
/// `BayesianState`: a snapshot is write-once and immutable, while the state
/// is overwritten every tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvolutionSnapshot {
    pub test_id: String,
    pub total_impressions: u64,
    pub control: ArmPosterior,
    pub variant: ArmPosterior,
    pub risk_mode: RiskMode,
    pub allocation: Allocation,
    pub prob_variant_wins: f64,
    pub promotion_check: PromotionCheck,
}

impl EvolutionSnapshot {
    /// Build a snapshot from the pieces of an `AllocationUpdateResult` plus
    /// the test identity and running impression count a host tracks
    /// alongside it. Pure: performs no I/O, does not decide whether to
    /// persist the record it builds.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        test_id: impl Into<String>,
        total_impressions: u64,
        control: ArmPosterior,
        variant: ArmPosterior,
        risk_mode: RiskMode,
        allocation: Allocation,
        prob_variant_wins: f64,
        promotion_check: PromotionCheck,
    ) -> Self {
        Self {
            test_id: test_id.into(),
            total_impressions,
            control,
            variant,
            risk_mode,
            allocation,
            prob_variant_wins,
            promotion_check,
        }
    }
}

/// Cadence at which snapshots are worth recording: roughly every 100
/// impressions since the last one, plus any tick where the promotion gate
/// passes or the engine recommends a stop, since both are the moments an
/// audit trail most needs to capture.
const SNAPSHOT_IMPRESSION_INTERVAL: u64 = 100;

pub fn should_snapshot(
    total_impressions: u64,
    last_snapshot_impressions: u64,
    promotion_check: &PromotionCheck,
    should_stop: bool,
) -> bool {
    total_impressions - last_snapshot_impressions >= SNAPSHOT_IMPRESSION_INTERVAL
        || promotion_check.should_promote
        || should_stop
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(should_promote: bool) -> PromotionCheck {
        PromotionCheck {
            meets_min_samples: true,
            probability_meaningful_lift: 0.99,
            eoc_per_1000_sessions: 0.1,
            should_promote,
        }
    }

    #[test]
    fn snapshots_roughly_every_hundred_impressions() {
        assert!(should_snapshot(100, 0, &check(false), false));
        assert!(should_snapshot(250, 100, &check(false), false));
        assert!(!should_snapshot(150, 100, &check(false), false));
    }

    #[test]
    fn promotion_and_stop_always_trigger_a_snapshot_regardless_of_cadence() {
        assert!(should_snapshot(30, 0, &check(true), false));
        assert!(should_snapshot(70, 0, &check(false), true));
    }

    #[test]
    fn constructor_carries_through_every_field() {
        use crate::posterior::initial_posterior;

        let arm = initial_posterior(0.02, 50.0);
        let snapshot = EvolutionSnapshot::new(
            "test-42",
            500,
            arm.clone(),
            arm.clone(),
            RiskMode::Balanced,
            Allocation::new(0.7, 0.3),
            0.62,
            check(false),
        );
        assert_eq!(snapshot.test_id, "test-42");
        assert_eq!(snapshot.total_impressions, 500);
        assert_eq!(snapshot.risk_mode, RiskMode::Balanced);
        assert_eq!(snapshot.allocation.control, 0.7);
    }
}
