//! Property-based tests for the engine's quantified invariants. Kept as a
//! separate test module since these draw from `proptest` strategies rather
//! than hand-picked example-based scenarios.

#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use bayes_alloc_engine::config::EngineConfig;
    use bayes_alloc_engine::engine::initialize_bayesian_state;
    use bayes_alloc_engine::policy::apply_constraints;
    use bayes_alloc_engine::risk::{compute_allocation_update, dynamic_control_floor, variant_ramp_floor};
    use bayes_alloc_engine::state::{Allocation, ArmMetrics, InitOptions, Metrics};

    proptest! {
        // Allocation always sums to 1 within tolerance, for any raw split and
        // any pair of floors in [0, 1].
        #[test]
        fn constrained_allocation_always_sums_to_one(
            raw_control in 0.0f64..=1.0,
            control_floor in 0.0f64..=1.0,
            variant_floor in 0.0f64..=1.0,
        ) {
            let raw = Allocation::new(raw_control, 1.0 - raw_control);
            let allocation = apply_constraints(raw, control_floor, variant_floor);
            prop_assert!(allocation.sums_to_one(1e-9));
            prop_assert!(allocation.control >= -1e-9 && allocation.variant >= -1e-9);
        }

        // Floors are always respected unless they conflict, in which case
        // control wins and the allocation still sums to one.
        #[test]
        fn floors_are_respected_or_control_wins_on_conflict(
            raw_control in 0.0f64..=1.0,
            control_floor in 0.0f64..=1.0,
            variant_floor in 0.0f64..=1.0,
        ) {
            let raw = Allocation::new(raw_control, 1.0 - raw_control);
            let allocation = apply_constraints(raw, control_floor, variant_floor);

            if control_floor + variant_floor > 1.0 {
                prop_assert!((allocation.control - control_floor).abs() < 1e-9);
            } else {
                prop_assert!(allocation.control >= control_floor - 1e-9);
                prop_assert!(allocation.variant >= variant_floor - 1e-9);
            }
        }

        // The whole engine is reproducible — same state, metrics, and seed
        // always produce bit-identical results.
        #[test]
        fn same_seed_reproduces_identical_result(
            control_impressions in 0u64..20_000,
            control_conversions_frac in 0.0f64..1.0,
            variant_impressions in 0u64..20_000,
            variant_conversions_frac in 0.0f64..1.0,
            seed in any::<u64>(),
        ) {
            let state = initialize_bayesian_state(InitOptions::default());
            let config = EngineConfig::default();
            let metrics = Metrics {
                control: ArmMetrics {
                    impressions: control_impressions,
                    conversions: (control_impressions as f64 * control_conversions_frac) as u64,
                    revenue: 0.0,
                },
                variant: ArmMetrics {
                    impressions: variant_impressions,
                    conversions: (variant_impressions as f64 * variant_conversions_frac) as u64,
                    revenue: 0.0,
                },
            };

            let a = compute_allocation_update(&state, &metrics, &[], &[], seed, &config).unwrap();
            let b = compute_allocation_update(&state, &metrics, &[], &[], seed, &config).unwrap();
            prop_assert_eq!(a.allocation, b.allocation);
            prop_assert_eq!(a.prob_variant_wins, b.prob_variant_wins);
            prop_assert_eq!(a.should_stop, b.should_stop);
        }

        // The control-floor schedule is non-increasing in pi and the variant
        // ramp-floor schedule is non-decreasing in pi.
        #[test]
        fn floor_schedules_are_monotone_in_pi(
            pi_low in 0.0f64..=1.0,
            pi_delta in 0.0f64..=1.0,
            base in 0.0f64..=1.0,
        ) {
            let pi_high = (pi_low + pi_delta).min(1.0);
            prop_assert!(dynamic_control_floor(pi_high, base) <= dynamic_control_floor(pi_low, base) + 1e-12);
            prop_assert!(variant_ramp_floor(pi_high, base) >= variant_ramp_floor(pi_low, base) - 1e-12);
        }

        // The safety budget never decreases on the bootstrap tick, and is
        // non-increasing on every subsequent tick (cost of waiting is never
        // negative, so each charge only ever subtracts).
        #[test]
        fn safety_budget_is_non_increasing_after_bootstrap(
            impressions in 1u64..5_000,
            conversions_frac in 0.0f64..1.0,
            seed in any::<u64>(),
        ) {
            let state = initialize_bayesian_state(InitOptions {
                safety_budget: Some(100.0),
                ..InitOptions::default()
            });
            let config = EngineConfig::default();
            let metrics = Metrics {
                control: ArmMetrics {
                    impressions,
                    conversions: (impressions as f64 * conversions_frac) as u64,
                    revenue: 0.0,
                },
                variant: ArmMetrics {
                    impressions,
                    conversions: (impressions as f64 * conversions_frac) as u64,
                    revenue: 0.0,
                },
            };

            let first = compute_allocation_update(&state, &metrics, &[], &[], seed, &config).unwrap();
            prop_assert_eq!(first.state.safety_budget_remaining, state.safety_budget_remaining);

            let second = compute_allocation_update(&first.state, &metrics, &[], &[], seed.wrapping_add(1), &config).unwrap();
            prop_assert!(second.state.safety_budget_remaining <= first.state.safety_budget_remaining + 1e-9);
        }
    }
}
