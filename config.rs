//! Engine-tunable knobs. Everything here has a sensible default and is
//! optional for callers, mirroring how `SimConfig` carried tunables with a
//! `Default` impl in the original single-strategy simulator this crate grew
//! out of.

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineConfig {
    /// Promotion gate: minimum per-arm impressions before a test may promote.
    pub min_samples_per_arm: u64,
    /// Promotion gate: minimum meaningful-lift threshold, in percent.
    pub min_lift_percent: f64,
    /// Promotion gate: minimum P(lift >= min_lift_percent).
    pub min_probability_meaningful_lift: f64,
    /// Promotion gate: maximum tolerated EOC per 1,000 sessions.
    pub max_eoc_per_1000_sessions: f64,
    /// CVaR tail quantile.
    pub cvar_quantile: f64,
    /// Monte-Carlo sample count used for routine estimators.
    pub mc_samples: usize,
    /// Monte-Carlo sample count used specifically for promotion checks.
    pub mc_samples_promotion: usize,
    /// TTTS challenger-share cap.
    pub exploration_cap: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_samples_per_arm: 2_000,
            min_lift_percent: 5.0,
            min_probability_meaningful_lift: 0.95,
            max_eoc_per_1000_sessions: 1.00,
            cvar_quantile: 0.05,
            mc_samples: 2_048,
            mc_samples_promotion: 4_096,
            exploration_cap: 0.50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_configured_values() {
        let c = EngineConfig::default();
        assert_eq!(c.min_samples_per_arm, 2_000);
        assert_eq!(c.min_lift_percent, 5.0);
        assert_eq!(c.min_probability_meaningful_lift, 0.95);
        assert_eq!(c.max_eoc_per_1000_sessions, 1.00);
        assert_eq!(c.cvar_quantile, 0.05);
        assert_eq!(c.mc_samples, 2_048);
        assert_eq!(c.mc_samples_promotion, 4_096);
        assert_eq!(c.exploration_cap, 0.50);
    }
}
