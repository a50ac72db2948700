use std::sync::Arc;

use tracing::warn;

use chainpulse_store::{CostRecord, CostSummary, Store};

/// Per-million-token pricing (input, output) by model name.
const PRICING: &[(&str, f64, f64)] = &[
    ("claude-3-5-haiku-20241022", 0.25, 1.25),
    ("claude-sonnet-4-20250514", 3.0, 15.0),
    ("claude-3-5-sonnet-20241022", 3.0, 15.0),
];

/// Unknown models bill at the cheap tier.
const DEFAULT_PRICING: (f64, f64) = (0.25, 1.25);

pub fn cost_usd(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    let (input_rate, output_rate) = PRICING
        .iter()
        .find(|(name, _, _)| *name == model)
        .map(|(_, i, o)| (*i, *o))
        .unwrap_or(DEFAULT_PRICING);

    input_tokens as f64 / 1_000_000.0 * input_rate
        + output_tokens as f64 / 1_000_000.0 * output_rate
}

/// Records every LLM call with token counts and computed cost. Writes are
/// best-effort and never fail the call that produced them.
#[derive(Clone)]
pub struct CostTracker {
    store: Arc<Store>,
}

impl CostTracker {
    pub fn new(store: Store) -> Self {
        Self { store: Arc::new(store) }
    }

    pub async fn track(
        &self,
        operation: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        cached: bool,
        cache_key: Option<&str>,
    ) {
        let cost = if cached {
            0.0
        } else {
            cost_usd(model, input_tokens, output_tokens)
        };

        let record = CostRecord {
            operation: operation.to_string(),
            model: model.to_string(),
            input_tokens: input_tokens as i64,
            output_tokens: output_tokens as i64,
            cost_usd: cost,
            cached,
            cache_key: cache_key.map(str::to_string),
        };

        if let Err(e) = self.store.record_cost(&record).await {
            warn!(operation, model, error = %e, "cost tracking write failed");
        }
    }

    pub async fn monthly_summary(&self) -> anyhow::Result<CostSummary> {
        self.store.monthly_cost_summary().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_pricing() {
        // 1M input + 1M output on Haiku = 0.25 + 1.25
        let cost = cost_usd("claude-3-5-haiku-20241022", 1_000_000, 1_000_000);
        assert!((cost - 1.5).abs() < 1e-9);
    }

    #[test]
    fn capable_tier_pricing() {
        let cost = cost_usd("claude-sonnet-4-20250514", 2_000_000, 500_000);
        // 2 * 3.0 + 0.5 * 15.0 = 13.5
        assert!((cost - 13.5).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_falls_back_to_cheap_tier() {
        let unknown = cost_usd("claude-experimental-x", 1_000_000, 1_000_000);
        let cheap = cost_usd("claude-3-5-haiku-20241022", 1_000_000, 1_000_000);
        assert!((unknown - cheap).abs() < 1e-9);
    }

    #[test]
    fn zero_tokens_cost_nothing() {
        assert_eq!(cost_usd("claude-3-5-haiku-20241022", 0, 0), 0.0);
    }
}
