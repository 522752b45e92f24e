use std::collections::BTreeMap;

use relay_core::{ConversationWindow, Message};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One increment of a streamed generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamChunk {
    pub text: String,
    /// Partial usage fields reported with this chunk, if any.
    pub usage: Option<Map<String, Value>>,
}

impl StreamChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: Map<String, Value>) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Token usage of one completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl UsageRecord {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

const INPUT_KEYS: &[&str] = &["promptTokenCount", "input_tokens"];
const OUTPUT_KEYS: &[&str] = &["candidatesTokenCount", "output_tokens"];

/// Sums partial usage fragments field by field.
///
/// Only finite numbers are kept; strings, objects, nulls and non-finite
/// values are dropped without affecting the running totals.
#[derive(Debug, Clone, Default)]
pub struct UsageAccumulator {
    fields: BTreeMap<String, f64>,
}

impl UsageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, fragment: &Map<String, Value>) {
        for (key, value) in fragment {
            let Some(number) = value.as_f64().filter(|n| n.is_finite()) else {
                continue;
            };
            *self.fields.entry(key.clone()).or_insert(0.0) += number;
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.fields.get(key).copied()
    }

    fn first_of(&self, keys: &[&str]) -> Option<u64> {
        keys.iter()
            .find_map(|key| self.get(key))
            .map(|n| n.max(0.0) as u64)
    }

    /// Final record, or `None` when no input or output count was reported.
    pub fn record(&self) -> Option<UsageRecord> {
        let input = self.first_of(INPUT_KEYS);
        let output = self.first_of(OUTPUT_KEYS);
        if input.is_none() && output.is_none() {
            return None;
        }
        Some(UsageRecord {
            input_tokens: input.unwrap_or(0),
            output_tokens: output.unwrap_or(0),
        })
    }
}

/// Result of a non-streamed generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOutput {
    pub text: String,
    pub usage: Option<UsageRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
}

/// Provider-neutral request for one completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub system_instruction: Option<String>,
    pub generation: GenerationParams,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            system_instruction: None,
            generation: GenerationParams::default(),
        }
    }

    /// Request for the window's messages, capped at the window's output reservation.
    pub fn from_window(window: &ConversationWindow, system_instruction: Option<String>) -> Self {
        Self {
            messages: window.context.clone(),
            system_instruction: system_instruction.filter(|s| !s.trim().is_empty()),
            generation: GenerationParams {
                max_output_tokens: Some(window.reserved_response_tokens),
                ..GenerationParams::default()
            },
        }
    }

    pub fn with_system_instruction(mut self, system_instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(system_instruction.into());
        self
    }

    pub fn with_generation(mut self, generation: GenerationParams) -> Self {
        self.generation = generation;
        self
    }
}

/// Successful result of a streamed completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<UsageRecord>,
    /// Attempts made, including the successful one.
    pub attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fragment(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn accumulator_sums_numeric_fields() {
        let mut acc = UsageAccumulator::new();
        acc.merge(&fragment(json!({"input_tokens": 10, "output_tokens": 3})));
        acc.merge(&fragment(json!({"output_tokens": 4})));

        assert_eq!(
            acc.record(),
            Some(UsageRecord {
                input_tokens: 10,
                output_tokens: 7
            })
        );
    }

    #[test]
    fn accumulator_drops_non_numeric_fields() {
        let mut acc = UsageAccumulator::new();
        acc.merge(&fragment(json!({
            "input_tokens": "12",
            "output_tokens": null,
            "promptTokensDetails": [{"modality": "TEXT"}],
            "candidatesTokenCount": 5
        })));

        assert_eq!(acc.get("input_tokens"), None);
        assert_eq!(acc.get("promptTokensDetails"), None);
        assert_eq!(
            acc.record(),
            Some(UsageRecord {
                input_tokens: 0,
                output_tokens: 5
            })
        );
    }

    #[test]
    fn accumulator_reads_gemini_field_names() {
        let mut acc = UsageAccumulator::new();
        acc.merge(&fragment(json!({
            "promptTokenCount": 21,
            "candidatesTokenCount": 8,
            "totalTokenCount": 29
        })));

        let record = acc.record().unwrap();
        assert_eq!(record.input_tokens, 21);
        assert_eq!(record.output_tokens, 8);
        assert_eq!(record.total(), 29);
    }

    #[test]
    fn empty_accumulator_has_no_record() {
        assert_eq!(UsageAccumulator::new().record(), None);
    }

    #[test]
    fn request_from_window_uses_reserved_tokens() {
        let mut window = ConversationWindow::empty(640);
        window.context = vec![Message::user("hi")];

        let request = CompletionRequest::from_window(&window, Some("  ".to_string()));
        assert_eq!(request.generation.max_output_tokens, Some(640));
        assert_eq!(request.messages.len(), 1);
        assert!(request.system_instruction.is_none());
    }
}
