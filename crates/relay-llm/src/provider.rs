use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ProviderError;
use crate::models;
use crate::protocol::gemini::{self, GeminiRequest};
use crate::protocol::ProtocolResult;
use crate::retry::RetryClassifier;
use crate::types::{CompletionRequest, GenerationOutput, StreamChunk};

/// Which backend a client talks to, resolved once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// Direct generative API authenticated with an API key.
    Direct,
    /// Enterprise cloud variant scoped to a project and location.
    Cloud { project_id: String, location: String },
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Direct => "Gemini API",
            Self::Cloud { .. } => "Vertex AI",
        }
    }

    pub fn is_cloud(&self) -> bool {
        matches!(self, Self::Cloud { .. })
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str(self.name()),
            Self::Cloud {
                project_id,
                location,
            } => write!(
                f,
                "{} (project: {}, location: {})",
                self.name(),
                project_id,
                location
            ),
        }
    }
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

/// Per-variant behaviour behind one seam.
#[async_trait]
pub trait ProviderBackend: Send + Sync {
    fn provider(&self) -> &Provider;

    fn model(&self) -> &str;

    /// Wire payload for a request.
    fn build_request(&self, request: &CompletionRequest) -> ProtocolResult<GeminiRequest>;

    /// Reject requests that cannot be sent, without building the payload.
    fn validate_request(&self, request: &CompletionRequest) -> ProtocolResult<()> {
        gemini::validate_request(request)
    }

    /// Start a streamed generation. Chunks arrive in order; the stream ends on completion.
    async fn start_stream(&self, request: &CompletionRequest) -> Result<ChunkStream, ProviderError>;

    /// Single-shot generation without streaming.
    async fn generate(&self, request: &CompletionRequest) -> Result<GenerationOutput, ProviderError>;

    /// Whether a failure is transient for this backend.
    fn classify_error(&self, error: &ProviderError, classifier: &RetryClassifier) -> bool {
        classifier.is_retryable(error)
    }

    fn chunk_delay_ms(&self, override_ms: Option<u64>) -> u64 {
        models::chunk_delay_ms(self.provider(), self.model(), override_ms)
    }
}
