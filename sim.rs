//! Synthetic-traffic simulator harness.
//!
//! This module is explicitly *not* part of the core engine: it exists to
//! exercise `compute_allocation_update` against many ticks of generated
//! traffic for demos, convergence checks, and the CLI's `simulate`
//! subcommand. It is the only place in the crate that uses non-deterministic
//! or external-crate randomness (`rand_chacha`) — to stand in for the
//! "ground truth" conversion/order-value process a real merchant's traffic
//! would have. `compute_allocation_update` itself is never passed anything
//! from this RNG; it only ever sees the resulting counts, and remains driven
//! entirely by its own seeded `Xorshift32` streams.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Binomial, Distribution, LogNormal};

use crate::config::EngineConfig;
use crate::engine::initialize_bayesian_state;
use crate::risk::compute_allocation_update;
use crate::state::{ArmMetrics, BayesianState, InitOptions, Metrics, RiskMode};

/// Ground-truth parameters for one simulated arm, used only to generate
/// synthetic traffic — never seen directly by the engine.
#[derive(Clone, Copy, Debug)]
pub struct ArmTruth {
    pub conversion_rate: f64,
    pub avg_order_value: f64,
    pub order_value_sigma: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct SimConfig {
    pub ticks: usize,
    pub sessions_per_tick: u64,
    pub control_truth: ArmTruth,
    pub variant_truth: ArmTruth,
    pub risk_mode: RiskMode,
    pub safety_budget: f64,
    pub engine_seed: u64,
    pub traffic_seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            ticks: 50,
            sessions_per_tick: 1_000,
            control_truth: ArmTruth { conversion_rate: 0.02, avg_order_value: 50.0, order_value_sigma: 0.5 },
            variant_truth: ArmTruth { conversion_rate: 0.02, avg_order_value: 50.0, order_value_sigma: 0.5 },
            risk_mode: RiskMode::Cautious,
            safety_budget: 50.0,
            engine_seed: 0,
            traffic_seed: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TickLog {
    pub tick: usize,
    pub control_share: f64,
    pub variant_share: f64,
    pub prob_variant_wins: f64,
    pub safety_budget_remaining: f64,
    pub should_promote: bool,
    pub should_stop: bool,
}

#[derive(Clone, Debug)]
pub struct SimResult {
    pub ticks_run: usize,
    pub final_state: BayesianState,
    pub log: Vec<TickLog>,
    pub stopped_early: bool,
    pub promoted: bool,
}

/// Draw one tick's worth of synthetic impressions/conversions/order values
/// for one arm, splitting `sessions` between control and variant according
/// to `allocation` upstream.
fn generate_tick_metrics(
    truth: &ArmTruth,
    sessions: u64,
    rng: &mut ChaCha8Rng,
) -> (ArmMetrics, Vec<f64>) {
    if sessions == 0 {
        return (ArmMetrics::default(), Vec::new());
    }
    let binomial = Binomial::new(sessions, truth.conversion_rate).expect("valid binomial params");
    let conversions = binomial.sample(rng);

    let mu = truth.avg_order_value.ln() - 0.5 * truth.order_value_sigma.powi(2);
    let log_normal = LogNormal::new(mu, truth.order_value_sigma).expect("valid log-normal params");
    let order_values: Vec<f64> = (0..conversions).map(|_| log_normal.sample(rng)).collect();
    let revenue: f64 = order_values.iter().sum();

    (ArmMetrics { impressions: sessions, conversions, revenue }, order_values)
}

/// Run one complete simulation: initialize state, then tick forward until
/// `config.ticks` is exhausted or the engine recommends a stop/promotion.
pub fn run_simulation(config: &SimConfig) -> SimResult {
    let mut traffic_rng = ChaCha8Rng::seed_from_u64(config.traffic_seed);
    let engine_config = EngineConfig::default();

    let mut state = initialize_bayesian_state(InitOptions {
        conversion_rate: Some(config.control_truth.conversion_rate),
        avg_order_value: Some(config.control_truth.avg_order_value),
        risk_mode: Some(config.risk_mode),
        safety_budget: Some(config.safety_budget),
    });

    let mut log = Vec::with_capacity(config.ticks);
    let mut stopped_early = false;
    let mut promoted = false;

    for tick in 0..config.ticks {
        // Split sessions 50/50 for traffic generation purposes; the engine's
        // own allocation only takes effect starting the following tick in a
        // real deployment, so using a fixed split here keeps the simulator
        // simple and avoids feeding the engine its own output as ground
        // truth.
        let control_sessions = config.sessions_per_tick / 2;
        let variant_sessions = config.sessions_per_tick - control_sessions;

        let (control_metrics, control_values) =
            generate_tick_metrics(&config.control_truth, control_sessions, &mut traffic_rng);
        let (variant_metrics, variant_values) =
            generate_tick_metrics(&config.variant_truth, variant_sessions, &mut traffic_rng);

        let metrics = Metrics { control: control_metrics, variant: variant_metrics };
        let seed = config.engine_seed.wrapping_add((tick as u64).wrapping_mul(1_000_003));

        let result = compute_allocation_update(
            &state,
            &metrics,
            &control_values,
            &variant_values,
            seed,
            &engine_config,
        )
        .expect("synthetic traffic never produces invalid metrics");

        log.push(TickLog {
            tick,
            control_share: result.allocation.control,
            variant_share: result.allocation.variant,
            prob_variant_wins: result.prob_variant_wins,
            safety_budget_remaining: result.state.safety_budget_remaining,
            should_promote: result.promotion_check.should_promote,
            should_stop: result.should_stop,
        });

        let should_promote = result.promotion_check.should_promote;
        let should_stop = result.should_stop;
        state = result.state;

        if should_promote {
            promoted = true;
            break;
        }
        if should_stop {
            stopped_early = true;
            break;
        }
    }

    SimResult { ticks_run: log.len(), final_state: state, log, stopped_early, promoted }
}

/// Convergence summary across many independent simulation runs — equal-arm
/// tests should converge π toward 0.5. Aggregates final `π` and whether
/// each run promoted or stopped.
#[derive(Clone, Debug)]
pub struct AggregatedSimResult {
    pub mean_final_prob_variant_wins: f64,
    pub std_final_prob_variant_wins: f64,
    pub promotion_rate: f64,
    pub stop_rate: f64,
}

use rayon::prelude::*;

/// Run `n_runs` independent simulations in parallel, one per traffic seed
/// starting at `traffic_seed_start`, and aggregate their outcomes.
pub fn run_parallel(base_config: &SimConfig, n_runs: usize, traffic_seed_start: u64) -> AggregatedSimResult {
    let results: Vec<SimResult> = (0..n_runs)
        .into_par_iter()
        .map(|i| {
            let mut config = *base_config;
            config.traffic_seed = traffic_seed_start + i as u64;
            run_simulation(&config)
        })
        .collect();

    aggregate_results(&results)
}

fn aggregate_results(results: &[SimResult]) -> AggregatedSimResult {
    let n = results.len() as f64;
    let finals: Vec<f64> = results
        .iter()
        .map(|r| r.log.last().map(|l| l.prob_variant_wins).unwrap_or(0.5))
        .collect();

    let mean = finals.iter().sum::<f64>() / n;
    let variance = finals.iter().map(|f| (f - mean).powi(2)).sum::<f64>() / n;

    AggregatedSimResult {
        mean_final_prob_variant_wins: mean,
        std_final_prob_variant_wins: variance.sqrt(),
        promotion_rate: results.iter().filter(|r| r.promoted).count() as f64 / n,
        stop_rate: results.iter().filter(|r| r.stopped_early).count() as f64 / n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_arms_converge_pi_near_half() {
        let config = SimConfig { ticks: 40, sessions_per_tick: 2_000, ..SimConfig::default() };
        let result = run_simulation(&config);
        let last = result.log.last().expect("at least one tick ran");
        assert!((last.prob_variant_wins - 0.5).abs() < 0.25, "pi={}", last.prob_variant_wins);
    }

    #[test]
    fn clearly_winning_variant_trends_toward_promotion() {
        let config = SimConfig {
            ticks: 60,
            sessions_per_tick: 4_000,
            variant_truth: ArmTruth {
                conversion_rate: 0.035,
                avg_order_value: 55.0,
                order_value_sigma: 0.5,
            },
            ..SimConfig::default()
        };
        let result = run_simulation(&config);
        let last = result.log.last().expect("at least one tick ran");
        assert!(last.prob_variant_wins > 0.5, "pi={}", last.prob_variant_wins);
    }

    #[test]
    fn same_traffic_and_engine_seed_reproduce_identical_logs() {
        let config = SimConfig { ticks: 10, ..SimConfig::default() };
        let a = run_simulation(&config);
        let b = run_simulation(&config);
        assert_eq!(a.final_state, b.final_state);
        for (la, lb) in a.log.iter().zip(b.log.iter()) {
            assert_eq!(la.control_share, lb.control_share);
            assert_eq!(la.prob_variant_wins, lb.prob_variant_wins);
        }
    }

    #[test]
    fn parallel_runs_aggregate_without_panicking() {
        let config = SimConfig { ticks: 10, sessions_per_tick: 500, ..SimConfig::default() };
        let aggregated = run_parallel(&config, 8, 100);
        assert!(aggregated.mean_final_prob_variant_wins >= 0.0);
        assert!(aggregated.mean_final_prob_variant_wins <= 1.0);
    }
}
