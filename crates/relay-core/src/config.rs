//! Immutable configuration handed to the windower, retry scheduler,
//! completion driver and quota ledger.
//!
//! These structs are plain data. Loading them from files or the environment
//! is the binary's job; nothing in the library crates reads process state.

use serde::{Deserialize, Serialize};

use crate::budget::limits::DEFAULT_MAX_OUTPUT_TOKENS;

/// Token limits used when building a conversation window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Context window of the model (prompt + response).
    pub max_context_tokens: u32,
    /// Tokens reserved for the response (the provider's max output tokens).
    pub max_response_tokens: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 32_768,
            max_response_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }
}

/// Retry classification and backoff parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_fraction: f64,
    pub min_delay_ms: u64,
    pub retryable_status_codes: Vec<u16>,
    pub retryable_statuses: Vec<String>,
    pub retryable_network_codes: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_fraction: 0.2,
            min_delay_ms: 100,
            retryable_status_codes: vec![429, 500, 502, 503, 504],
            retryable_statuses: vec![
                "RESOURCE_EXHAUSTED".to_string(),
                "UNAVAILABLE".to_string(),
                "DEADLINE_EXCEEDED".to_string(),
            ],
            retryable_network_codes: vec![
                "ECONNRESET".to_string(),
                "ETIMEDOUT".to_string(),
                "ENOTFOUND".to_string(),
                "EAI_AGAIN".to_string(),
            ],
        }
    }
}

/// Streaming cadence settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Fixed delay between forwarded chunks. `None` picks a model-tier default.
    pub chunk_delay_ms: Option<u64>,
    /// Timeout for non-streamed title generation.
    pub title_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_delay_ms: None,
            title_timeout_ms: 7_000,
        }
    }
}

/// Advisory quota limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub rpm_limit: u64,
    pub tpm_limit: u64,
    pub warn_threshold_fraction: f64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            rpm_limit: 1_000,
            tpm_limit: 4_000_000,
            warn_threshold_fraction: 0.8,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub window: WindowConfig,
    pub retry: RetryConfig,
    pub stream: StreamConfig,
    pub quota: QuotaConfig,
}
