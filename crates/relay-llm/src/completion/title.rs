//! Conversation titles from a single non-streamed generation.

use std::time::Duration;

use relay_core::Message;

use crate::provider::ProviderBackend;
use crate::types::{CompletionRequest, GenerationParams, UsageRecord};

pub const DEFAULT_TITLE: &str = "New Chat";

const TITLE_INSTRUCTION: &str = "a concise, 5-word-or-less title for the conversation, using its same language, with no punctuation. Apply title case conventions appropriate for the language. Never directly mention the language name or the word \"title\"";

const MAX_EXCERPT_CHARS: usize = 255;

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedTitle {
    pub title: String,
    /// Present only when the backend reported usage.
    pub usage: Option<UsageRecord>,
}

impl GeneratedTitle {
    fn fallback() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            usage: None,
        }
    }
}

fn truncate_excerpt(text: &str) -> String {
    if text.chars().count() <= MAX_EXCERPT_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(MAX_EXCERPT_CHARS).collect();
    format!("{}... [text truncated for brevity]", head)
}

/// Request asking the model to title an exchange.
pub fn title_request(text: &str, response_text: &str) -> CompletionRequest {
    let convo = format!(
        "||>User:\n\"{}\"\n||>Response:\n\"{}\"",
        truncate_excerpt(text),
        truncate_excerpt(response_text)
    );
    let prompt = format!("Please generate {}\n\n{}\n\n||>Title:", TITLE_INSTRUCTION, convo);

    CompletionRequest::new(vec![Message::user(prompt)]).with_generation(GenerationParams {
        temperature: Some(0.5),
        ..GenerationParams::default()
    })
}

fn clean_title(raw: &str) -> Option<String> {
    let title = raw
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())?
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '*')
        .trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// Generate a title for an exchange.
///
/// Never fails: timeouts, provider errors and empty replies all yield
/// [`DEFAULT_TITLE`].
pub async fn generate_title(
    backend: &dyn ProviderBackend,
    text: &str,
    response_text: &str,
    timeout: Duration,
) -> GeneratedTitle {
    let request = title_request(text, response_text);

    let title = match tokio::time::timeout(timeout, backend.generate(&request)).await {
        Ok(Ok(output)) => match clean_title(&output.text) {
            Some(title) => GeneratedTitle {
                title,
                usage: output.usage,
            },
            None => GeneratedTitle {
                usage: output.usage,
                ..GeneratedTitle::fallback()
            },
        },
        Ok(Err(e)) => {
            log::error!("[TitleGenerator] There was an issue generating the title: {}", e);
            GeneratedTitle::fallback()
        }
        Err(_) => {
            log::error!(
                "[TitleGenerator] Title generation timed out after {}ms",
                timeout.as_millis()
            );
            GeneratedTitle::fallback()
        }
    };

    log::debug!("[TitleGenerator] Title response: {}", title.title);
    title
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_excerpts_are_truncated() {
        let long = "x".repeat(400);
        let excerpt = truncate_excerpt(&long);
        assert!(excerpt.starts_with(&"x".repeat(255)));
        assert!(excerpt.ends_with("[text truncated for brevity]"));
        assert_eq!(truncate_excerpt("short"), "short");
    }

    #[test]
    fn request_embeds_both_sides() {
        let request = title_request("How do tides work?", "The moon pulls...");
        let prompt = request.messages[0].text();
        assert!(prompt.contains("||>User:\n\"How do tides work?\""));
        assert!(prompt.contains("||>Response:\n\"The moon pulls...\""));
        assert!(prompt.ends_with("||>Title:"));
        assert_eq!(request.generation.temperature, Some(0.5));
    }

    #[test]
    fn titles_are_cleaned() {
        assert_eq!(clean_title("  \"Ocean Tides Explained\"\n"), Some("Ocean Tides Explained".to_string()));
        assert_eq!(clean_title("\n\n**Bold Title**"), Some("Bold Title".to_string()));
        assert_eq!(clean_title("  \n \"\" "), None);
    }
}
