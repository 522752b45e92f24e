//! Core types for conversation windowing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::WindowConfig;
use crate::message::Message;

pub const DEFAULT_USER_LABEL: &str = "User";
pub const DEFAULT_MODEL_LABEL: &str = "Assistant";

/// Tokens reserved for response metadata once every turn has been counted.
pub const RESPONSE_METADATA_TOKENS: u32 = 2;

/// Optional names injected ahead of the system text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Rendered as `"\nHuman's name: <name>"`.
    pub user_name: Option<String>,
    /// Rendered as `"\nYou are <name>"`.
    pub model_name: Option<String>,
}

impl Identity {
    pub fn preamble(&self) -> String {
        let mut preamble = String::new();
        if let Some(name) = self.user_name.as_deref().filter(|n| !n.is_empty()) {
            preamble.push_str("\nHuman's name: ");
            preamble.push_str(name);
        }
        if let Some(name) = self.model_name.as_deref().filter(|n| !n.is_empty()) {
            preamble.push_str("\nYou are ");
            preamble.push_str(name);
        }
        preamble
    }
}

/// Budget and labelling inputs for one windowing call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowRequest {
    pub max_context_tokens: u32,
    pub max_response_tokens: u32,
    pub system_message: Option<String>,
    pub user_label: String,
    pub model_label: String,
    pub identity: Option<Identity>,
}

impl WindowRequest {
    pub fn new(max_context_tokens: u32, max_response_tokens: u32) -> Self {
        Self {
            max_context_tokens,
            max_response_tokens,
            system_message: None,
            user_label: DEFAULT_USER_LABEL.to_string(),
            model_label: DEFAULT_MODEL_LABEL.to_string(),
            identity: None,
        }
    }

    pub fn from_config(config: &WindowConfig) -> Self {
        Self::new(config.max_context_tokens, config.max_response_tokens)
    }

    pub fn with_system_message(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = Some(system_message.into());
        self
    }

    pub fn with_labels(mut self, user_label: impl Into<String>, model_label: impl Into<String>) -> Self {
        self.user_label = user_label.into();
        self.model_label = model_label.into();
        self
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// System text with surrounding whitespace removed.
    pub fn system_text(&self) -> &str {
        self.system_message.as_deref().map(str::trim).unwrap_or("")
    }
}

/// Result of windowing a conversation history.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationWindow {
    /// Full prompt text: accepted turns followed by the reply invitation, trimmed.
    pub prompt: String,
    /// Accepted turns only, oldest first, exactly as counted.
    pub prompt_body: String,
    /// Messages of the accepted turns, in chronological order.
    pub context: Vec<Message>,
    /// Number of history messages left out of the window.
    pub dropped_count: usize,
    /// Effective output-token cap for this request.
    pub reserved_response_tokens: u32,
    /// Prompt tokens counted by the walk, including metadata overhead.
    pub prompt_tokens: u32,
}

impl ConversationWindow {
    pub fn empty(reserved_response_tokens: u32) -> Self {
        Self {
            prompt: String::new(),
            prompt_body: String::new(),
            context: Vec::new(),
            dropped_count: 0,
            reserved_response_tokens,
            prompt_tokens: 0,
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.dropped_count > 0
    }
}

/// Errors that can occur while building a window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BudgetError {
    /// System prompt leaves no room for the conversation
    #[error("System prompt ({system_tokens} tokens) exceeds available budget (max context {max_context_tokens}, max response {max_response_tokens})")]
    SystemPromptTooLarge {
        system_tokens: u32,
        max_context_tokens: u32,
        max_response_tokens: u32,
    },

    /// The most recent turn alone does not fit
    #[error("Prompt is too long. Max token count is {available_tokens}, but prompt is {message_tokens} tokens long (context window {max_context_tokens})")]
    SingleMessageTooLarge {
        message_tokens: u32,
        available_tokens: u32,
        max_context_tokens: u32,
    },

    /// Response reservation is larger than the whole context window
    #[error("max response tokens ({max_response_tokens}) must be less than or equal to max context tokens ({max_context_tokens})")]
    InvalidBudget {
        max_context_tokens: u32,
        max_response_tokens: u32,
    },

    #[error("windowing cancelled")]
    Cancelled,
}

impl BudgetError {
    /// True for every variant that reports the input as too long.
    pub fn is_length_exceeded(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    /// How many tokens the input is over budget, when known.
    pub fn overflow(&self) -> Option<u32> {
        match self {
            Self::SingleMessageTooLarge {
                message_tokens,
                available_tokens,
                ..
            } => Some(message_tokens.saturating_sub(*available_tokens)),
            Self::SystemPromptTooLarge {
                system_tokens,
                max_context_tokens,
                max_response_tokens,
            } => Some(
                (system_tokens + max_response_tokens).saturating_sub(*max_context_tokens),
            ),
            Self::InvalidBudget {
                max_context_tokens,
                max_response_tokens,
            } => Some(max_response_tokens.saturating_sub(*max_context_tokens)),
            Self::Cancelled => None,
        }
    }

    /// Short `"<used> / <limit>"` figure pair for user-facing messages.
    pub fn info(&self) -> String {
        match self {
            Self::SystemPromptTooLarge {
                system_tokens,
                max_context_tokens,
                ..
            } => format!("{} / {}", system_tokens, max_context_tokens),
            Self::SingleMessageTooLarge {
                message_tokens,
                available_tokens,
                ..
            } => format!("{} / {}", message_tokens, available_tokens),
            Self::InvalidBudget {
                max_context_tokens,
                max_response_tokens,
            } => format!("{} / {}", max_response_tokens, max_context_tokens),
            Self::Cancelled => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_preamble_formats_both_names() {
        let identity = Identity {
            user_name: Some("Ada".to_string()),
            model_name: Some("Gemini".to_string()),
        };
        assert_eq!(identity.preamble(), "\nHuman's name: Ada\nYou are Gemini");
        assert_eq!(Identity::default().preamble(), "");
    }

    #[test]
    fn system_text_is_trimmed() {
        let request = WindowRequest::new(100, 10).with_system_message("  be brief \n");
        assert_eq!(request.system_text(), "be brief");
        assert_eq!(WindowRequest::new(100, 10).system_text(), "");
    }

    #[test]
    fn overflow_reports_excess_tokens() {
        let error = BudgetError::SingleMessageTooLarge {
            message_tokens: 5000,
            available_tokens: 4000,
            max_context_tokens: 4000,
        };
        assert!(error.is_length_exceeded());
        assert_eq!(error.overflow(), Some(1000));
        assert_eq!(error.info(), "5000 / 4000");
        assert!(!BudgetError::Cancelled.is_length_exceeded());
    }
}
