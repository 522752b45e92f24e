//! Decides whether a provider failure is transient.

use regex::Regex;
use relay_core::RetryConfig;
use serde_json::Value;

use crate::error::{nested_error, ProviderError};

/// Lowercase phrases that mark a failure as transient when found in the message.
const RETRYABLE_PHRASES: &[&str] = &[
    "rate limit",
    "too many requests",
    "service unavailable",
    "timeout",
    "temporarily unavailable",
    "network error",
    "connection reset",
    "resource exhausted",
    "deadline exceeded",
    "unavailable",
];

const EMBEDDED_ERROR_PATTERN: &str = r#"\[?\{[\s\S]*"error"[\s\S]*\}?\]?"#;

/// Checks run in order, first match wins:
/// 1. a JSON error object embedded in the message (bare or array-wrapped)
/// 2. the numeric code and symbolic status fields
/// 3. the network error code
/// 4. the message text: known phrases, or a retryable status number as a
///    standalone word
#[derive(Debug, Clone)]
pub struct RetryClassifier {
    status_codes: Vec<u16>,
    statuses: Vec<String>,
    network_codes: Vec<String>,
    embedded_error: Option<Regex>,
    status_in_text: Option<Regex>,
}

impl RetryClassifier {
    pub fn new(config: &RetryConfig) -> Self {
        let status_in_text = if config.retryable_status_codes.is_empty() {
            None
        } else {
            let alternatives = config
                .retryable_status_codes
                .iter()
                .map(u16::to_string)
                .collect::<Vec<_>>()
                .join("|");
            compile(&format!(r"\b({})\b", alternatives))
        };

        Self {
            status_codes: config.retryable_status_codes.clone(),
            statuses: config.retryable_statuses.clone(),
            network_codes: config.retryable_network_codes.clone(),
            embedded_error: compile(EMBEDDED_ERROR_PATTERN),
            status_in_text,
        }
    }

    pub fn is_retryable(&self, error: &ProviderError) -> bool {
        if self.embedded_error_is_retryable(&error.message) {
            return true;
        }

        if let Some(code) = error.code.filter(|c| self.status_codes.contains(c)) {
            log::debug!("[RetryClassifier] Retryable error code {} in error.code", code);
            return true;
        }

        if let Some(status) = error.status.as_deref().filter(|s| self.is_retryable_status(s)) {
            log::debug!("[RetryClassifier] Retryable status '{}' in error.status", status);
            return true;
        }

        if let Some(network_code) = error
            .network_code
            .as_deref()
            .filter(|c| self.network_codes.iter().any(|n| n == c))
        {
            log::debug!("[RetryClassifier] Retryable network error code: {}", network_code);
            return true;
        }

        self.text_is_retryable(&error.message)
    }

    fn is_retryable_status(&self, status: &str) -> bool {
        self.statuses.iter().any(|s| s == status)
    }

    fn embedded_error_is_retryable(&self, message: &str) -> bool {
        let Some(found) = self.embedded_error.as_ref().and_then(|re| re.find(message)) else {
            return false;
        };
        // Unparseable fragments fall through to the remaining checks.
        let Ok(parsed) = serde_json::from_str::<Value>(found.as_str()) else {
            return false;
        };
        let Some(nested) = nested_error(&parsed) else {
            return false;
        };

        if let Some(code) = nested
            .get("code")
            .and_then(Value::as_u64)
            .and_then(|c| u16::try_from(c).ok())
            .filter(|c| self.status_codes.contains(c))
        {
            log::debug!("[RetryClassifier] Retryable error code {} in nested error", code);
            return true;
        }

        if let Some(status) = nested
            .get("status")
            .and_then(Value::as_str)
            .filter(|s| self.is_retryable_status(s))
        {
            log::debug!("[RetryClassifier] Retryable status '{}' in nested error", status);
            return true;
        }

        false
    }

    fn text_is_retryable(&self, message: &str) -> bool {
        if let Some(found) = self.status_in_text.as_ref().and_then(|re| re.find(message)) {
            log::debug!(
                "[RetryClassifier] Retryable error code {} in message string",
                found.as_str()
            );
            return true;
        }

        let lower = message.to_lowercase();
        let retryable = RETRYABLE_PHRASES.iter().any(|phrase| lower.contains(phrase));
        if retryable {
            log::debug!("[RetryClassifier] Retryable error message pattern in error text");
        }
        retryable
    }
}

impl Default for RetryClassifier {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            log::warn!("[RetryClassifier] Invalid pattern {}: {}", pattern, e);
            None
        }
    }
}
