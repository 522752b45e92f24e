//! Server-sent events to [`ChunkStream`].

use eventsource_stream::Eventsource;
use futures_util::{future, StreamExt};
use reqwest::Response;

use crate::error::{nested_error, ProviderError};
use crate::provider::ChunkStream;
use crate::types::StreamChunk;

/// Decode an SSE body with `parse`, which sees each event's data payload.
///
/// Events named `error` never reach `parse`; their payload becomes a
/// [`ProviderError`] so a proxy can abort a stream mid-flight. Payloads that
/// parse to `None` are dropped.
pub fn chunk_stream_from_sse<P>(response: Response, mut parse: P) -> ChunkStream
where
    P: FnMut(&str) -> Result<Option<StreamChunk>, ProviderError> + Send + 'static,
{
    let stream = response.bytes_stream().eventsource().filter_map(move |event| {
        let item = match event {
            Err(e) => Some(Err(ProviderError::from(e))),
            Ok(event) if event.event == "error" => Some(Err(error_event(&event.data))),
            Ok(event) => parse(&event.data).transpose(),
        };
        future::ready(item)
    });

    Box::pin(stream)
}

fn error_event(data: &str) -> ProviderError {
    match serde_json::from_str::<serde_json::Value>(data) {
        Ok(value) => match nested_error(&value) {
            Some(error) => ProviderError::from_error_object(error),
            None => ProviderError::new(format!("stream error: {}", data)),
        },
        Err(_) => ProviderError::new(format!("stream error: {}", data)),
    }
}
