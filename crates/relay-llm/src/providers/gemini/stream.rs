//! Gemini SSE stream parser.
//!
//! Each event is a JSON object shaped like a non-streamed response:
//! ```text
//! data: {"candidates":[{"content":{"parts":[{"text":"Hello"}],"role":"model"}}]}
//!
//! data: {"candidates":[{"content":{"parts":[{"text":"!"}],"role":"model"},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":4,"candidatesTokenCount":2}}
//! ```
//!
//! Some deployments repeat a running `usageMetadata` on every event. Usage is
//! only reported on the finishing event (or a candidate-less trailer) so that
//! summing fragments counts it once.

use serde_json::Value;

use crate::error::{nested_error, ProviderError};
use crate::protocol::gemini::GeminiResponse;
use crate::types::StreamChunk;

/// Parse a single SSE data payload.
///
/// Returns:
/// - `Ok(Some(chunk))` for events carrying text or final usage
/// - `Ok(None)` for empty payloads, `[DONE]`, and events with nothing to report
/// - `Err(_)` for malformed JSON or an embedded error object
pub fn parse_gemini_sse_event(data: &str) -> Result<Option<StreamChunk>, ProviderError> {
    let data = data.trim();

    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(data).map_err(|e| {
        ProviderError::new(format!("Failed to parse Gemini SSE data: {}: {}", e, data))
    })?;

    if let Some(error) = nested_error(&value) {
        return Err(ProviderError::from_error_object(error));
    }

    let response: GeminiResponse = serde_json::from_value(value).map_err(|e| {
        ProviderError::new(format!("Unexpected Gemini SSE payload: {}: {}", e, data))
    })?;

    let finished = response
        .candidates
        .first()
        .map(|candidate| candidate.finish_reason.is_some())
        .unwrap_or(true);

    let text = response.text();
    let usage = response.usage_metadata.filter(|_| finished);

    if text.is_empty() && usage.is_none() {
        return Ok(None);
    }

    let chunk = StreamChunk::text(text);
    Ok(Some(match usage {
        Some(usage) => chunk.with_usage(usage),
        None => chunk,
    }))
}
