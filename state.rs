//! Data model: arm posteriors, the persisted Bayesian state, the metrics the
//! engine consumes, and the result shape it returns.

use serde::{Deserialize, Serialize};

/// Observed order values are kept so updates can be replayed or truncated;
/// the tail beyond this many most-recent values is dropped, since only the
/// NIG sufficient statistics are required going forward.
pub const MAX_RETAINED_ORDER_VALUES: usize = 2_000;

/// Risk posture, driving the TTTS exploration fraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskMode {
    Cautious,
    Balanced,
    Aggressive,
}

impl Default for RiskMode {
    fn default() -> Self {
        RiskMode::Cautious
    }
}

impl RiskMode {
    /// TTTS exploration share ε for the challenger arm.
    pub fn epsilon(self) -> f64 {
        match self {
            RiskMode::Cautious => 0.05,
            RiskMode::Balanced => 0.10,
            RiskMode::Aggressive => 0.20,
        }
    }
}

/// Beta(α, β) posterior over conversion probability for one arm.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IncidencePosterior {
    pub alpha: f64,
    pub beta: f64,
}

impl IncidencePosterior {
    pub fn with_prior(alpha: f64, beta: f64) -> Self {
        Self { alpha, beta }
    }

    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }
}

/// Normal-Inverse-Gamma posterior over `(μ, σ²)` of `log(order_value)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValuePosterior {
    pub mu0: f64,
    pub kappa: f64,
    pub alpha_v: f64,
    pub beta_v: f64,
}

impl ValuePosterior {
    pub fn new(mu0: f64, kappa: f64, alpha_v: f64, beta_v: f64) -> Self {
        Self { mu0, kappa, alpha_v, beta_v }
    }

    /// `E[exp(μ + σ²/2)]` used by the analytical mean ARPU estimator.
    /// Substitutes `σ² = 1` when `α_v <= 1`, where the posterior mean of the
    /// variance is undefined.
    pub fn expected_value_analytical(&self) -> f64 {
        let sigma_sq = if self.alpha_v > 1.0 {
            self.beta_v / (self.alpha_v - 1.0)
        } else {
            1.0
        };
        (self.mu0 + 0.5 * sigma_sq).exp()
    }
}

/// Full posterior for one arm: incidence (Beta) × value (NIG), plus the
/// bounded history of observed order values backing it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArmPosterior {
    pub incidence: IncidencePosterior,
    pub value: ValuePosterior,
    pub observed_order_values: Vec<f64>,
}

impl ArmPosterior {
    pub fn new(incidence: IncidencePosterior, value: ValuePosterior) -> Self {
        Self { incidence, value, observed_order_values: Vec::new() }
    }

    /// Push new order values onto the bounded history, dropping the oldest
    /// once the cap is exceeded.
    pub(crate) fn push_order_values(&mut self, values: &[f64]) {
        self.observed_order_values.extend_from_slice(values);
        let len = self.observed_order_values.len();
        if len > MAX_RETAINED_ORDER_VALUES {
            self.observed_order_values.drain(0..len - MAX_RETAINED_ORDER_VALUES);
        }
    }
}

/// Raw per-arm counters for one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ArmMetrics {
    pub impressions: u64,
    pub conversions: u64,
    pub revenue: f64,
}

/// Aggregated metrics input to the engine for both arms on one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub control: ArmMetrics,
    pub variant: ArmMetrics,
}

/// Traffic split between control and variant. Always sums to 1 within
/// `1e-10`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub control: f64,
    pub variant: f64,
}

impl Allocation {
    pub fn new(control: f64, variant: f64) -> Self {
        Self { control, variant }
    }

    pub fn sums_to_one(&self, tolerance: f64) -> bool {
        (self.control + self.variant - 1.0).abs() <= tolerance
    }
}

/// Promotion gate evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromotionCheck {
    pub meets_min_samples: bool,
    pub probability_meaningful_lift: f64,
    pub eoc_per_1000_sessions: f64,
    pub should_promote: bool,
}

/// Full persisted Bayesian state for one optimization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BayesianState {
    pub control: ArmPosterior,
    pub variant: ArmPosterior,
    pub risk_mode: RiskMode,
    pub safety_budget_total: f64,
    pub safety_budget_remaining: f64,
    pub control_floor_base: f64,
    pub variant_floor_start: f64,
    /// Informational timestamp. `compute_allocation_update` never
    /// reads or writes this field, to stay a pure function of its
    /// arguments — a host sets it from wall-clock time when persisting.
    pub last_allocation_update: u64,
    pub promotion_check_count: u64,
    pub last_total_impressions: u64,
    /// Optimistic-concurrency version; bumped by the store on every
    /// successful write. The engine itself never reads or writes this
    /// field — it is store bookkeeping carried on the same struct for
    /// convenience.
    pub version: u64,
}

/// Options accepted by `initialize_bayesian_state`.
#[derive(Clone, Copy, Debug)]
pub struct InitOptions {
    pub conversion_rate: Option<f64>,
    pub avg_order_value: Option<f64>,
    pub risk_mode: Option<RiskMode>,
    pub safety_budget: Option<f64>,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            conversion_rate: None,
            avg_order_value: None,
            risk_mode: None,
            safety_budget: None,
        }
    }
}

/// Result of one `compute_allocation_update` call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AllocationUpdateResult {
    pub state: BayesianState,
    pub allocation: Allocation,
    pub prob_variant_wins: f64,
    pub mean_control_arpu: f64,
    pub mean_variant_arpu: f64,
    pub eoc_per_1000_sessions: f64,
    pub cost_of_waiting_per_session: f64,
    pub promotion_check: PromotionCheck,
    pub should_stop: bool,
    pub human_reasoning: String,
}
