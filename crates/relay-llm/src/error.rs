use serde_json::Value;
use thiserror::Error;

use crate::protocol::ProtocolError;

/// A single failure reported by a provider transport.
///
/// Carries whatever structure the transport exposed: an HTTP-style numeric
/// `code`, a symbolic `status` such as `RESOURCE_EXHAUSTED`, or a low-level
/// `network_code` such as `ECONNRESET`. The message is kept verbatim since
/// some transports embed a JSON error object in it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
    pub code: Option<u16>,
    pub status: Option<String>,
    pub network_code: Option<String>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            status: None,
            network_code: None,
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_network_code(mut self, network_code: impl Into<String>) -> Self {
        self.network_code = Some(network_code.into());
        self
    }

    /// Build from a non-success HTTP response.
    ///
    /// Picks up `error.status` from a Google-style error body (either a bare
    /// object or wrapped in an array); the raw body stays in the message.
    pub fn from_http(status: u16, body: &str) -> Self {
        let mut error = Self::new(format!("HTTP {}: {}", status, body.trim())).with_code(status);

        if let Ok(value) = serde_json::from_str::<Value>(body) {
            if let Some(nested) = nested_error(&value) {
                if let Some(symbolic) = nested.get("status").and_then(Value::as_str) {
                    error.status = Some(symbolic.to_string());
                }
            }
        }
        error
    }

    /// Build from an `{"error": {...}}` object found in a stream payload.
    pub fn from_error_object(error: &Value) -> Self {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown provider error");

        let mut provider_error = Self::new(format!("{} {}", message, error));
        if let Some(code) = error.get("code").and_then(Value::as_u64) {
            provider_error.code = u16::try_from(code).ok();
        }
        if let Some(status) = error.get("status").and_then(Value::as_str) {
            provider_error.status = Some(status.to_string());
        }
        provider_error
    }
}

/// Locate the `error` member of `{"error": ...}` or `[{"error": ...}]`.
pub(crate) fn nested_error(value: &Value) -> Option<&Value> {
    value
        .get("error")
        .or_else(|| value.get(0).and_then(|first| first.get("error")))
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        let mut error = Self::new(err.to_string());
        if let Some(status) = err.status() {
            error.code = Some(status.as_u16());
        }
        if err.is_timeout() {
            error.network_code = Some("ETIMEDOUT".to_string());
        } else if err.is_connect() {
            error.network_code = Some("ECONNRESET".to_string());
        }
        error
    }
}

impl From<eventsource_stream::EventStreamError<reqwest::Error>> for ProviderError {
    fn from(err: eventsource_stream::EventStreamError<reqwest::Error>) -> Self {
        match err {
            eventsource_stream::EventStreamError::Transport(e) => e.into(),
            other => Self::new(format!("stream error: {}", other)),
        }
    }
}

/// Diagnostic and provider context attached to a failed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    /// Which backend was in use, e.g. `Vertex AI (project: p, location: us-central1)`.
    pub provider: String,
    pub last_error: ProviderError,
    pub hints: Vec<String>,
    pub attempts: u32,
}

impl FailureReport {
    /// `"<provider> failed: <message> | <hint>"`
    pub fn info(&self) -> String {
        let mut info = format!("{} failed: {}", self.provider, self.last_error.message);
        for hint in &self.hints {
            info.push_str(" | ");
            info.push_str(hint);
        }
        info
    }
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion cancelled")]
    Cancelled,

    #[error("{}", .0.info())]
    Terminal(FailureReport),

    #[error("{} (after {} attempts)", .0.info(), .0.attempts)]
    ExhaustedRetries(FailureReport),

    #[error("failed to build request: {0}")]
    Request(#[from] ProtocolError),
}

impl CompletionError {
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Terminal(_) => "provider_error",
            Self::ExhaustedRetries(_) => "exhausted_retries",
            Self::Request(_) => "invalid_request",
        }
    }

    pub fn report(&self) -> Option<&FailureReport> {
        match self {
            Self::Terminal(report) | Self::ExhaustedRetries(report) => Some(report),
            _ => None,
        }
    }

    /// Single structured line for display: `{ "type": "<kind>", "info": "<details>" }`.
    pub fn to_user_message(&self) -> String {
        let info = match self.report() {
            Some(report) => report.info(),
            None => self.to_string(),
        };
        let info = serde_json::to_string(&info).unwrap_or_else(|_| format!("\"{}\"", info));
        format!("{{ \"type\": \"{}\", \"info\": {} }}", self.error_type(), info)
    }
}

/// Troubleshooting hint derived from the error text. At most one category applies.
pub fn diagnose(message: &str) -> Vec<String> {
    let lower = message.to_lowercase();
    let hint = if lower.contains("403") || lower.contains("permission") {
        Some("Permission denied - check IAM roles")
    } else if lower.contains("401") || lower.contains("unauthorized") {
        Some("Authentication failed - verify API key/service account")
    } else if lower.contains("quota") || lower.contains("429") {
        Some("Quota exceeded - check API limits")
    } else if lower.contains("not found") || lower.contains("404") {
        Some("Model not found - verify model is enabled")
    } else {
        None
    };
    hint.map(|h| vec![h.to_string()]).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_http_extracts_symbolic_status() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        let error = ProviderError::from_http(429, body);

        assert_eq!(error.code, Some(429));
        assert_eq!(error.status.as_deref(), Some("RESOURCE_EXHAUSTED"));
        assert!(error.message.contains("Quota exceeded"));
    }

    #[test]
    fn from_http_reads_array_wrapped_errors() {
        let body = r#"[{"error":{"code":503,"status":"UNAVAILABLE"}}]"#;
        let error = ProviderError::from_http(503, body);
        assert_eq!(error.status.as_deref(), Some("UNAVAILABLE"));
    }

    #[test]
    fn diagnose_picks_first_matching_category() {
        assert_eq!(diagnose("403 permission denied on quota"), vec!["Permission denied - check IAM roles"]);
        assert_eq!(
            diagnose("HTTP 401: Unauthorized"),
            vec!["Authentication failed - verify API key/service account"]
        );
        assert_eq!(diagnose("429 Too Many Requests"), vec!["Quota exceeded - check API limits"]);
        assert_eq!(diagnose("model not found"), vec!["Model not found - verify model is enabled"]);
        assert!(diagnose("socket hang up").is_empty());
    }

    #[test]
    fn user_message_is_a_single_structured_line() {
        let error = CompletionError::Terminal(FailureReport {
            provider: "Gemini API".to_string(),
            last_error: ProviderError::new("HTTP 401: \"bad key\""),
            hints: diagnose("HTTP 401"),
            attempts: 1,
        });

        let rendered = error.to_user_message();
        assert!(rendered.starts_with("{ \"type\": \"provider_error\", \"info\": "));
        assert!(rendered.contains("Gemini API failed: HTTP 401: \\\"bad key\\\""));
        assert!(rendered.contains(" | Authentication failed"));
        assert!(!rendered.contains('\n'));
    }
}
