//! Enterprise cloud backend scoped to a project and location.
//!
//! Authenticates with a short-lived bearer token. Tokens come from an
//! [`AccessTokenSource`] and are memoized in the shared key-value cache
//! under `project:client_email` until shortly before they expire.

use std::sync::Arc;

use async_trait::async_trait;
use relay_core::SharedCache;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::models;
use crate::protocol::gemini::GeminiRequest;
use crate::protocol::{ProtocolResult, ToProvider};
use crate::provider::{ChunkStream, Provider, ProviderBackend};
use crate::providers::common::{self, sse::chunk_stream_from_sse};
use crate::providers::gemini::parse_gemini_sse_event;
use crate::types::{CompletionRequest, GenerationOutput};

pub const DEFAULT_MODEL: &str = "gemini-1.5-pro";

/// Seconds before expiry at which a cached token is no longer used.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    /// Unix timestamp (seconds).
    pub expires_at: i64,
}

impl AccessToken {
    pub fn is_fresh(&self) -> bool {
        self.expires_at.saturating_sub(TOKEN_REFRESH_MARGIN_SECS) > chrono::Utc::now().timestamp()
    }
}

/// Produces bearer tokens for the cloud API.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn fetch(&self) -> Result<AccessToken, ProviderError>;
}

/// A pre-issued token, e.g. from `GOOGLE_ACCESS_TOKEN`.
pub struct StaticTokenSource {
    token: String,
    lifetime_secs: i64,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            lifetime_secs: 3600,
        }
    }

    pub fn with_lifetime_secs(mut self, lifetime_secs: i64) -> Self {
        self.lifetime_secs = lifetime_secs;
        self
    }
}

#[async_trait]
impl AccessTokenSource for StaticTokenSource {
    async fn fetch(&self) -> Result<AccessToken, ProviderError> {
        if self.token.trim().is_empty() {
            return Err(ProviderError::new("No access token configured (401 unauthorized)").with_code(401));
        }
        Ok(AccessToken {
            token: self.token.clone(),
            expires_at: chrono::Utc::now().timestamp() + self.lifetime_secs,
        })
    }
}

pub struct VertexBackend {
    client: Client,
    provider: Provider,
    project_id: String,
    location: String,
    client_email: String,
    model: String,
    base_url: String,
    token_source: Arc<dyn AccessTokenSource>,
    cache: Option<SharedCache>,
}

impl VertexBackend {
    /// Unsupported or missing locations fall back to the default region.
    pub fn new(
        project_id: impl Into<String>,
        location: Option<&str>,
        token_source: Arc<dyn AccessTokenSource>,
    ) -> Self {
        let project_id = project_id.into();
        let location = models::resolve_location(location);
        let base_url = format!("https://{}", models::cloud_endpoint_host(&location));

        Self {
            client: Client::new(),
            provider: Provider::Cloud {
                project_id: project_id.clone(),
                location: location.clone(),
            },
            project_id,
            location,
            client_email: String::new(),
            model: DEFAULT_MODEL.to_string(),
            base_url,
            token_source,
            cache: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Service account identity; part of the token cache key.
    pub fn with_client_email(mut self, client_email: impl Into<String>) -> Self {
        self.client_email = client_email.into();
        self
    }

    pub fn with_cache(mut self, cache: SharedCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Override the regional endpoint (proxies, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    fn token_cache_key(&self) -> String {
        format!("{}:{}", self.project_id, self.client_email)
    }

    fn endpoint_url(&self, streaming: bool) -> String {
        let method = if streaming {
            "streamGenerateContent?alt=sse"
        } else {
            "generateContent"
        };
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/{}/models/{}:{}",
            self.base_url,
            self.project_id,
            self.location,
            models::model_publisher(&self.model),
            models::bare_model_id(&self.model),
            method
        )
    }

    async fn cached_token(&self, cache: &SharedCache, key: &str) -> Option<AccessToken> {
        let value = match cache.get(key).await {
            Ok(value) => value?,
            Err(e) => {
                log::warn!("[VertexBackend] Failed to read cached access token: {}", e);
                return None;
            }
        };
        serde_json::from_value::<AccessToken>(value)
            .ok()
            .filter(AccessToken::is_fresh)
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let key = self.token_cache_key();

        if let Some(cache) = &self.cache {
            if let Some(token) = self.cached_token(cache, &key).await {
                return Ok(token.token);
            }
        }

        let token = self.token_source.fetch().await?;

        if let Some(cache) = &self.cache {
            let stored = match serde_json::to_value(&token) {
                Ok(value) => cache.set(&key, value).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            if let Err(e) = stored {
                log::warn!("[VertexBackend] Failed to cache access token: {}", e);
            }
        }

        Ok(token.token)
    }

    async fn post(&self, url: &str, payload: &GeminiRequest) -> Result<RequestBuilder, ProviderError> {
        let token = self.access_token().await?;
        Ok(self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .bearer_auth(token)
            .json(payload))
    }
}

#[async_trait]
impl ProviderBackend for VertexBackend {
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

        log::debug!("[VertexBackend] streaming with {} model '{}'", self.provider, self.model);

        let builder = self.post(&self.endpoint_url(true), &payload).await?;
        let response = common::send_checked(builder, "VertexBackend").await?;

        Ok(chunk_stream_from_sse(response, parse_gemini_sse_event))
    }

    async fn generate(&self, request: &CompletionRequest) -> Result<GenerationOutput, ProviderError> {
        let payload = self
            .build_request(request)
            .map_err(|e| ProviderError::new(e.to_string()))?;

        let builder = self.post(&self.endpoint_url(false), &payload).await?;
        let response = common::send_checked(builder, "VertexBackend").await?;
        common::read_generation(response).await
    }
}
