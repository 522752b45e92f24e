//! Shared helpers for provider implementations.

pub mod sse;

use reqwest::{RequestBuilder, Response};

use crate::error::ProviderError;
use crate::protocol::gemini::GeminiResponse;
use crate::types::{GenerationOutput, UsageAccumulator};

/// Send a prepared request; non-success responses become a [`ProviderError`]
/// carrying the status code and the raw body.
pub(crate) async fn send_checked(
    builder: RequestBuilder,
    tag: &str,
) -> Result<Response, ProviderError> {
    let response = builder.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    log::debug!("[{}] HTTP {}: {}", tag, status.as_u16(), body);
    Err(ProviderError::from_http(status.as_u16(), &body))
}

/// Decode a non-streamed generation body.
pub(crate) async fn read_generation(response: Response) -> Result<GenerationOutput, ProviderError> {
    let body: GeminiResponse = response.json().await?;

    let usage = body.usage_metadata.as_ref().and_then(|fragment| {
        let mut accumulator = UsageAccumulator::new();
        accumulator.merge(fragment);
        accumulator.record()
    });

    Ok(GenerationOutput {
        text: body.text(),
        usage,
    })
}
