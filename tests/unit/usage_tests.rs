//! Unit tests for usage accounting.

use agent_conduit::models::{UsageInfo, UsageTotals};

fn usage(input: u64, output: u64, cost: f64) -> UsageInfo {
    UsageInfo {
        input_tokens: input,
        output_tokens: output,
        cache_read_tokens: 0,
        cache_creation_tokens: 0,
        cost_usd: cost,
    }
}

/// Accumulation adds every counter and the cost.
#[test]
fn accumulate_adds_counts_and_cost() {
    let mut total = usage(10, 5, 0.25);
    total.accumulate(&usage(3, 2, 0.75));

    assert_eq!(total.input_tokens, 13);
    assert_eq!(total.output_tokens, 7);
    assert!((total.cost_usd - 1.0).abs() < f64::EPSILON);
}

/// Counter accumulation saturates instead of wrapping.
#[test]
fn accumulate_saturates_on_overflow() {
    let mut total = usage(u64::MAX - 1, 0, 0.0);
    total.accumulate(&usage(10, 0, 0.0));

    assert_eq!(
        total.input_tokens,
        u64::MAX,
        "overflow must saturate, not wrap"
    );
}

/// A negative reported cost is clamped to zero on accumulation.
#[test]
fn negative_cost_is_clamped_to_zero() {
    let mut total = usage(0, 0, 1.0);
    total.accumulate(&usage(0, 0, -0.5));

    assert!(
        (total.cost_usd - 1.0).abs() < f64::EPSILON,
        "negative cost must not reduce the total"
    );
}

/// Recording folds the report into both the aggregate and the per-model
/// entry.
#[test]
fn record_updates_aggregate_and_per_model_totals() {
    let mut totals = UsageTotals::default();

    totals.record("m1", &usage(10, 4, 0.1));
    totals.record("m2", &usage(5, 1, 0.2));
    totals.record("m1", &usage(2, 2, 0.1));

    assert_eq!(totals.total.input_tokens, 17);
    assert_eq!(totals.total.output_tokens, 7);
    assert_eq!(totals.per_model["m1"].input_tokens, 12);
    assert_eq!(totals.per_model["m2"].input_tokens, 5);
}

/// The breakdown lists models in stable (sorted) order.
#[test]
fn breakdown_iterates_in_stable_order() {
    let mut totals = UsageTotals::default();
    totals.record("zephyr", &usage(1, 0, 0.0));
    totals.record("aria", &usage(2, 0, 0.0));

    let breakdown = totals.breakdown();

    let models: Vec<&str> = breakdown.iter().map(|m| m.model.as_str()).collect();
    assert_eq!(models, ["aria", "zephyr"], "breakdown must be sorted by model");
}
