use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Result};
use bayes_alloc_engine::sim::{run_parallel, run_simulation, ArmTruth, SimConfig};
use bayes_alloc_engine::state::RiskMode;
use clap::{Parser, Subcommand};
use serde_json::json;

#[derive(Parser)]
#[command(name = "bayes-alloc", about = "CLI for the adaptive Bayesian allocation engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one simulated optimization tick-by-tick and print its trajectory.
    Simulate {
        #[arg(long, default_value_t = 50)]
        ticks: usize,
        #[arg(long, default_value_t = 1_000)]
        sessions_per_tick: u64,
        #[arg(long, default_value_t = 0.02)]
        control_cr: f64,
        #[arg(long, default_value_t = 50.0)]
        control_aov: f64,
        #[arg(long, default_value_t = 0.02)]
        variant_cr: f64,
        #[arg(long, default_value_t = 50.0)]
        variant_aov: f64,
        #[arg(long, default_value = "cautious")]
        risk_mode: String,
        #[arg(long, default_value_t = 50.0)]
        safety_budget: f64,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Write a JSON receipt of the run alongside the printed table.
        #[arg(long)]
        receipt: bool,
    },
    /// Run many independent simulated optimizations in parallel and report
    /// convergence statistics across seeds.
    Aggregate {
        #[arg(long, default_value_t = 50)]
        ticks: usize,
        #[arg(long, default_value_t = 1_000)]
        sessions_per_tick: u64,
        #[arg(long, default_value_t = 0.02)]
        control_cr: f64,
        #[arg(long, default_value_t = 50.0)]
        control_aov: f64,
        #[arg(long, default_value_t = 0.02)]
        variant_cr: f64,
        #[arg(long, default_value_t = 50.0)]
        variant_aov: f64,
        #[arg(long, default_value = "cautious")]
        risk_mode: String,
        #[arg(long, default_value_t = 50.0)]
        safety_budget: f64,
        #[arg(long, default_value_t = 200)]
        runs: usize,
        #[arg(long, default_value_t = 0)]
        seed_start: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match cli.command {
        Commands::Simulate {
            ticks,
            sessions_per_tick,
            control_cr,
            control_aov,
            variant_cr,
            variant_aov,
            risk_mode,
            safety_budget,
            seed,
            receipt,
        } => simulate_cmd(
            ticks,
            sessions_per_tick,
            control_cr,
            control_aov,
            variant_cr,
            variant_aov,
            &risk_mode,
            safety_budget,
            seed,
            receipt,
        ),
        Commands::Aggregate {
            ticks,
            sessions_per_tick,
            control_cr,
            control_aov,
            variant_cr,
            variant_aov,
            risk_mode,
            safety_budget,
            runs,
            seed_start,
        } => aggregate_cmd(
            ticks,
            sessions_per_tick,
            control_cr,
            control_aov,
            variant_cr,
            variant_aov,
            &risk_mode,
            safety_budget,
            runs,
            seed_start,
        ),
    }
}

fn parse_risk_mode(s: &str) -> Result<RiskMode> {
    match s {
        "cautious" => Ok(RiskMode::Cautious),
        "balanced" => Ok(RiskMode::Balanced),
        "aggressive" => Ok(RiskMode::Aggressive),
        other => bail!("unknown risk mode `{other}` (expected cautious, balanced, or aggressive)"),
    }
}

#[allow(clippy::too_many_arguments)]
fn simulate_cmd(
    ticks: usize,
    sessions_per_tick: u64,
    control_cr: f64,
    control_aov: f64,
    variant_cr: f64,
    variant_aov: f64,
    risk_mode: &str,
    safety_budget: f64,
    seed: u64,
    receipt: bool,
) -> Result<()> {
    let config = SimConfig {
        ticks,
        sessions_per_tick,
        control_truth: ArmTruth { conversion_rate: control_cr, avg_order_value: control_aov, order_value_sigma: 0.5 },
        variant_truth: ArmTruth { conversion_rate: variant_cr, avg_order_value: variant_aov, order_value_sigma: 0.5 },
        risk_mode: parse_risk_mode(risk_mode)?,
        safety_budget,
        engine_seed: seed,
        traffic_seed: seed,
    };

    let result = run_simulation(&config);

    println!("\nTick   Control%   Variant%   P(variant wins)   Budget left   Promote   Stop");
    println!("------------------------------------------------------------------------------");
    for entry in &result.log {
        println!(
            "{:>4}   {:>8.2}   {:>8.2}   {:>15.3}   {:>11.2}   {:>7}   {:>4}",
            entry.tick,
            entry.control_share * 100.0,
            entry.variant_share * 100.0,
            entry.prob_variant_wins,
            entry.safety_budget_remaining,
            entry.should_promote,
            entry.should_stop,
        );
    }

    if result.promoted {
        println!("\nVariant promoted after {} ticks.", result.ticks_run);
    } else if result.stopped_early {
        println!("\nSafety budget exhausted after {} ticks; stopped.", result.ticks_run);
    } else {
        println!("\nCompleted all {} ticks without promotion or stop.", result.ticks_run);
    }

    if receipt {
        let path = write_simulation_receipt(&config, &result)?;
        println!("Receipt: {}", path.display());
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn aggregate_cmd(
    ticks: usize,
    sessions_per_tick: u64,
    control_cr: f64,
    control_aov: f64,
    variant_cr: f64,
    variant_aov: f64,
    risk_mode: &str,
    safety_budget: f64,
    runs: usize,
    seed_start: u64,
) -> Result<()> {
    let config = SimConfig {
        ticks,
        sessions_per_tick,
        control_truth: ArmTruth { conversion_rate: control_cr, avg_order_value: control_aov, order_value_sigma: 0.5 },
        variant_truth: ArmTruth { conversion_rate: variant_cr, avg_order_value: variant_aov, order_value_sigma: 0.5 },
        risk_mode: parse_risk_mode(risk_mode)?,
        safety_budget,
        engine_seed: seed_start,
        traffic_seed: seed_start,
    };

    let aggregated = run_parallel(&config, runs, seed_start);

    println!("\nRuns: {runs}");
    println!("Mean final P(variant wins): {:.4}", aggregated.mean_final_prob_variant_wins);
    println!("Std final P(variant wins):  {:.4}", aggregated.std_final_prob_variant_wins);
    println!("Promotion rate:             {:.2}%", aggregated.promotion_rate * 100.0);
    println!("Stop rate:                  {:.2}%", aggregated.stop_rate * 100.0);

    Ok(())
}

fn write_simulation_receipt(
    config: &SimConfig,
    result: &bayes_alloc_engine::sim::SimResult,
) -> Result<PathBuf> {
    let ts = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let out_dir = PathBuf::from("receipts");
    fs::create_dir_all(&out_dir)?;

    let payload = json!({
        "timestamp": ts,
        "ticks_run": result.ticks_run,
        "promoted": result.promoted,
        "stopped_early": result.stopped_early,
        "control_truth_conversion_rate": config.control_truth.conversion_rate,
        "variant_truth_conversion_rate": config.variant_truth.conversion_rate,
        "final_safety_budget_remaining": result.final_state.safety_budget_remaining,
        "log": result.log.iter().map(|entry| json!({
            "tick": entry.tick,
            "control_share": entry.control_share,
            "variant_share": entry.variant_share,
            "prob_variant_wins": entry.prob_variant_wins,
            "safety_budget_remaining": entry.safety_budget_remaining,
            "should_promote": entry.should_promote,
            "should_stop": entry.should_stop,
        })).collect::<Vec<_>>(),
    });

    let receipt = out_dir.join(format!("simulation_{ts}.json"));
    fs::write(&receipt, serde_json::to_vec_pretty(&payload)?)?;
    Ok(receipt)
}
