//! Rough USD estimates from a per-model price table.

use relay_llm::Provider;
use serde::{Deserialize, Serialize};

/// USD per one million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub prompt: f64,
    pub completion: f64,
}

impl ModelPrice {
    pub const fn new(prompt: f64, completion: f64) -> Self {
        Self { prompt, completion }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEstimate {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub prompt_cost: f64,
    pub completion_cost: f64,
    pub total_cost: f64,
    pub currency: &'static str,
    pub model: String,
    pub provider: &'static str,
}

const DEFAULT_PRICES: &[(&str, ModelPrice)] = &[
    ("gemini-pro", ModelPrice::new(0.5, 1.5)),
    ("gemini-1.0-pro", ModelPrice::new(0.5, 1.5)),
    ("gemini-1.5-pro", ModelPrice::new(1.25, 5.0)),
    ("gemini-1.5-flash", ModelPrice::new(0.075, 0.3)),
    ("gemini-1.5-flash-8b", ModelPrice::new(0.0375, 0.15)),
    ("gemini-2.0-flash", ModelPrice::new(0.1, 0.4)),
    ("gemini-2.0-flash-lite", ModelPrice::new(0.075, 0.3)),
    ("gemini-2.5-pro", ModelPrice::new(1.25, 10.0)),
    ("gemini-2.5-flash", ModelPrice::new(0.3, 2.5)),
];

const FALLBACK_PRICE: ModelPrice = ModelPrice::new(0.5, 1.5);

#[derive(Debug, Clone)]
pub struct CostEstimator {
    prices: Vec<(String, ModelPrice)>,
    fallback: ModelPrice,
}

impl Default for CostEstimator {
    fn default() -> Self {
        Self {
            prices: DEFAULT_PRICES
                .iter()
                .map(|(pattern, price)| (pattern.to_string(), *price))
                .collect(),
            fallback: FALLBACK_PRICE,
        }
    }
}

impl CostEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the price for models containing `pattern`.
    pub fn with_price(mut self, pattern: impl Into<String>, price: ModelPrice) -> Self {
        let pattern = pattern.into();
        match self.prices.iter_mut().find(|(p, _)| *p == pattern) {
            Some(entry) => entry.1 = price,
            None => self.prices.push((pattern, price)),
        }
        self
    }

    /// The longest pattern contained in `model` wins, so
    /// `gemini-1.5-flash-8b-001` is not priced as `gemini-1.5-flash`.
    pub fn price_for(&self, model: &str) -> ModelPrice {
        let model = model.to_lowercase();
        self.prices
            .iter()
            .filter(|(pattern, _)| model.contains(pattern.as_str()))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, price)| *price)
            .unwrap_or(self.fallback)
    }

    pub fn estimate(
        &self,
        model: &str,
        prompt_tokens: u64,
        completion_tokens: u64,
        provider: &Provider,
    ) -> CostEstimate {
        let price = self.price_for(model);
        let prompt_cost = prompt_tokens as f64 / 1_000_000.0 * price.prompt;
        let completion_cost = completion_tokens as f64 / 1_000_000.0 * price.completion;

        let estimate = CostEstimate {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            prompt_cost,
            completion_cost,
            total_cost: prompt_cost + completion_cost,
            currency: "USD",
            model: model.to_string(),
            provider: provider.name(),
        };
        log::debug!("[CostEstimator] {:?}", estimate);
        estimate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn longest_pattern_wins() {
        let estimator = CostEstimator::new();
        assert_eq!(estimator.price_for("gemini-1.5-flash-8b-001"), ModelPrice::new(0.0375, 0.15));
        assert_eq!(estimator.price_for("gemini-1.5-flash-002"), ModelPrice::new(0.075, 0.3));
        assert_eq!(estimator.price_for("Gemini-2.5-Pro"), ModelPrice::new(1.25, 10.0));
        assert_eq!(estimator.price_for("chat-bison"), FALLBACK_PRICE);
    }

    #[test]
    fn estimate_is_priced_per_million_tokens() {
        let estimate = CostEstimator::new().estimate(
            "gemini-1.5-pro",
            2_000_000,
            100_000,
            &Provider::Cloud {
                project_id: "acme".to_string(),
                location: "us-central1".to_string(),
            },
        );

        assert!(approx(estimate.prompt_cost, 2.5));
        assert!(approx(estimate.completion_cost, 0.5));
        assert!(approx(estimate.total_cost, 3.0));
        assert_eq!(estimate.total_tokens, 2_100_000);
        assert_eq!(estimate.provider, "Vertex AI");
        assert_eq!(estimate.currency, "USD");
    }

    #[test]
    fn custom_prices_override_the_table() {
        let estimator = CostEstimator::new().with_price("gemini-1.5-pro", ModelPrice::new(2.0, 8.0));
        let estimate = estimator.estimate("gemini-1.5-pro", 1_000_000, 0, &Provider::Direct);
        assert!(approx(estimate.total_cost, 2.0));
        assert_eq!(estimate.provider, "Gemini API");
    }
}
