//! Direct generative API backend.

mod stream;

pub use stream::parse_gemini_sse_event;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};

use crate::error::ProviderError;
use crate::protocol::gemini::GeminiRequest;
use crate::protocol::{ProtocolResult, ToProvider};
use crate::provider::{ChunkStream, Provider, ProviderBackend};
use crate::providers::common::{self, sse::chunk_stream_from_sse};
use crate::types::{CompletionRequest, GenerationOutput};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Direct generative API, authenticated with an API key.
pub struct GeminiBackend {
    client: Client,
    provider: Provider,
    api_key: String,
    base_url: String,
    model: String,
    /// Send the key as a bearer header instead of the `key` query parameter.
    /// Only honoured when the base URL points at a reverse proxy.
    auth_header: bool,
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            provider: Provider::Direct,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            auth_header: false,
        }
    }

    /// Set a custom base URL (e.g., for reverse proxies).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_auth_header(mut self, enabled: bool) -> Self {
        self.auth_header = enabled;
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn uses_bearer_header(&self) -> bool {
        self.auth_header && self.base_url != DEFAULT_BASE_URL
    }

    fn endpoint_url(&self, streaming: bool) -> String {
        let method = if streaming {
            "streamGenerateContent?alt=sse"
        } else {
            "generateContent"
        };
        let mut url = format!("{}/models/{}:{}", self.base_url, self.model, method);

        if !self.uses_bearer_header() {
            url.push(if streaming { '&' } else { '?' });
            url.push_str("key=");
            url.push_str(&self.api_key);
        }
        url
    }

    fn post(&self, url: &str, payload: &GeminiRequest) -> RequestBuilder {
        let builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(payload);

        if self.uses_bearer_header() {
            builder.bearer_auth(&self.api_key)
        } else {
            builder
        }
    }
}

#[async_trait]
impl ProviderBackend for GeminiBackend {
    fn provider(&self) -> &Provider {
        &self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, request: &CompletionRequest) -> ProtocolResult<GeminiRequest> {
        request.to_provider()
    }

    async fn start_stream(&self, request: &CompletionRequest) -> Result<ChunkStream, ProviderError> {
        let payload = self
            .build_request(request)
            .map_err(|e| ProviderError::new(e.to_string()))?;

        log::debug!("[GeminiBackend] streaming with model '{}'", self.model);

        let response =
            common::send_checked(self.post(&self.endpoint_url(true), &payload), "GeminiBackend")
                .await?;

        Ok(chunk_stream_from_sse(response, parse_gemini_sse_event))
    }

    async fn generate(&self, request: &CompletionRequest) -> Result<GenerationOutput, ProviderError> {
        let payload = self
            .build_request(request)
            .map_err(|e| ProviderError::new(e.to_string()))?;

        let response =
            common::send_checked(self.post(&self.endpoint_url(false), &payload), "GeminiBackend")
                .await?;
        common::read_generation(response).await
    }
}
