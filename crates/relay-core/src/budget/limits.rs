//! Model context window limits registry.
//!
//! Provides known context window sizes for the supported model families,
//! with user overrides loaded from `~/.relay/model_limits.json`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::WindowConfig;

/// Known model context window sizes.
pub const KNOWN_MODEL_LIMITS: &[(&str, u32)] = &[
    // Generative models
    ("gemini-2.5-pro", 1_048_576),
    ("gemini-2.5-flash", 1_048_576),
    ("gemini-2.0-flash", 1_048_576),
    ("gemini-1.5-pro", 2_097_152),
    ("gemini-1.5-flash", 1_048_576),
    ("gemini-1.0-pro", 32_760),
    ("gemini-pro", 32_760),
    ("gemini-pro-vision", 12_288),
    // Legacy text/chat models
    ("text-bison", 8_192),
    ("chat-bison", 4_096),
    ("code-bison", 6_144),
    ("codechat-bison", 6_144),
    // Model garden publishers
    ("claude", 200_000),
    ("mistral", 32_000),
    ("llama", 128_000),
    // Default fallback
    ("default", 32_768),
];

/// Default maximum output tokens.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8_192;

/// Model limit configuration (user-overridable).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelLimit {
    /// Model identifier (partial match supported, e.g., "gemini-1.5-pro" matches "gemini-1.5-pro-002")
    pub model_pattern: String,
    pub max_context_tokens: u32,
    /// Maximum output tokens (defaults to min(8192, max_context / 4))
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
}

impl ModelLimit {
    pub fn new(model_pattern: impl Into<String>, max_context_tokens: u32) -> Self {
        Self {
            model_pattern: model_pattern.into(),
            max_context_tokens,
            max_output_tokens: None,
        }
    }

    pub fn get_max_output_tokens(&self) -> u32 {
        self.max_output_tokens
            .unwrap_or_else(|| (self.max_context_tokens / 4).min(DEFAULT_MAX_OUTPUT_TOKENS))
    }

    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            max_context_tokens: self.max_context_tokens,
            max_response_tokens: self.get_max_output_tokens(),
        }
    }
}

/// Registry for model limits with built-in defaults and user overrides.
#[derive(Debug, Clone, Default)]
pub struct ModelLimitsRegistry {
    /// User-provided overrides (higher priority than built-in)
    user_limits: HashMap<String, ModelLimit>,
    config_path: Option<PathBuf>,
}

impl ModelLimitsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_path(path: impl Into<PathBuf>) -> Self {
        Self {
            user_limits: HashMap::new(),
            config_path: Some(path.into()),
        }
    }

    /// Load user overrides from the configured path, or `~/.relay/model_limits.json`.
    ///
    /// A missing file is not an error.
    pub async fn load_user_config(&mut self) -> std::io::Result<()> {
        let path = self
            .config_path
            .clone()
            .unwrap_or_else(get_default_config_path);

        if !path.exists() {
            return Ok(());
        }

        let content = tokio::fs::read_to_string(&path).await?;
        let limits: Vec<ModelLimit> = serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

        for limit in limits {
            self.user_limits.insert(limit.model_pattern.clone(), limit);
        }

        tracing::info!("Loaded {} user model limits from {:?}", self.user_limits.len(), path);
        Ok(())
    }

    pub fn add_limit(&mut self, limit: ModelLimit) {
        self.user_limits.insert(limit.model_pattern.clone(), limit);
    }

    /// Get limit for a model, with user overrides taking priority.
    ///
    /// Exact matches win; otherwise the longest pattern contained in the
    /// model name is used.
    pub fn get(&self, model: &str) -> Option<ModelLimit> {
        if let Some(limit) = self.user_limits.get(model) {
            return Some(limit.clone());
        }

        if let Some((_, tokens)) = KNOWN_MODEL_LIMITS.iter().find(|(pattern, _)| *pattern == model) {
            return Some(ModelLimit::new(model, *tokens));
        }

        let best_user_match = self
            .user_limits
            .iter()
            .filter(|(pattern, _)| model.contains(pattern.as_str()))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, limit)| limit.clone());

        if best_user_match.is_some() {
            return best_user_match;
        }

        KNOWN_MODEL_LIMITS
            .iter()
            .filter(|(pattern, _)| *pattern != "default" && model.contains(pattern))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(pattern, tokens)| ModelLimit::new(*pattern, *tokens))
    }

    pub fn get_or_default(&self, model: &str) -> ModelLimit {
        self.get(model).unwrap_or_else(|| {
            let default = KNOWN_MODEL_LIMITS
                .iter()
                .find(|(k, _)| *k == "default")
                .map(|(_, v)| *v)
                .unwrap_or(32_768);
            ModelLimit::new("default", default)
        })
    }
}

/// Returns `~/.relay/model_limits.json`, or a relative path when no home
/// directory is known.
pub fn get_default_config_path() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".relay").join("model_limits.json")
}
