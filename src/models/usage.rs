//! Token usage accounting.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Token counts and cost reported by one `usage` frame.
///
/// All counts are non-negative by construction (`u64`); cost is clamped to
/// zero on accumulation if a frame reports a negative value.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct UsageInfo {
    /// Input tokens consumed.
    #[serde(default)]
    pub input_tokens: u64,
    /// Output tokens produced.
    #[serde(default)]
    pub output_tokens: u64,
    /// Tokens served from cache.
    #[serde(default)]
    pub cache_read_tokens: u64,
    /// Tokens written to cache.
    #[serde(default)]
    pub cache_creation_tokens: u64,
    /// Monetary cost in USD.
    #[serde(default)]
    pub cost_usd: f64,
}

impl UsageInfo {
    /// Add `other` into `self`, saturating on overflow.
    pub fn accumulate(&mut self, other: &Self) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(other.cache_read_tokens);
        self.cache_creation_tokens = self
            .cache_creation_tokens
            .saturating_add(other.cache_creation_tokens);
        self.cost_usd += other.cost_usd.max(0.0);
    }
}

/// Accumulated usage for one model name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ModelUsage {
    /// Model name as reported on the wire.
    pub model: String,
    /// Running totals for this model.
    pub usage: UsageInfo,
}

/// Session-wide usage totals with a per-model breakdown.
///
/// The per-model entries sum to the aggregate under normal operation; the
/// breakdown is keyed by model name in a `BTreeMap` so iteration order is
/// stable for display.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct UsageTotals {
    /// Aggregate across all models.
    pub total: UsageInfo,
    /// Per-model running totals.
    pub per_model: BTreeMap<String, UsageInfo>,
}

impl UsageTotals {
    /// Fold one usage report for `model` into the totals.
    pub fn record(&mut self, model: &str, usage: &UsageInfo) {
        self.total.accumulate(usage);
        self.per_model
            .entry(model.to_owned())
            .or_default()
            .accumulate(usage);
    }

    /// Per-model breakdown as a vector of [`ModelUsage`] entries.
    #[must_use]
    pub fn breakdown(&self) -> Vec<ModelUsage> {
        self.per_model
            .iter()
            .map(|(model, usage)| ModelUsage {
                model: model.clone(),
                usage: *usage,
            })
            .collect()
    }
}
