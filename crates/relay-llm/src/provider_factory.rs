//! Provider Factory
//!
//! Picks and builds a backend from settings. A project id selects the cloud
//! variant; otherwise an API key selects the direct one.

use std::sync::Arc;

use relay_core::SharedCache;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::ProviderBackend;
use crate::providers::{GeminiBackend, StaticTokenSource, VertexBackend};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FactoryError {
    #[error("No credentials configured: set an API key or a project id")]
    MissingCredentials,

    #[error("Cloud project '{0}' requires an access token")]
    MissingAccessToken(String),
}

/// Connection settings for one backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    /// Reverse proxy for the direct API.
    pub base_url: Option<String>,
    /// Send the API key as a bearer header to the reverse proxy.
    pub auth_header: bool,
    pub project_id: Option<String>,
    pub location: Option<String>,
    pub client_email: Option<String>,
    pub access_token: Option<String>,
    pub model: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ProviderSettings {
    pub fn is_cloud(&self) -> bool {
        non_empty(&self.project_id).is_some()
    }

    /// Check that enough settings are present to build a backend.
    pub fn validate(&self) -> Result<(), FactoryError> {
        if let Some(project_id) = non_empty(&self.project_id) {
            if non_empty(&self.access_token).is_none() {
                return Err(FactoryError::MissingAccessToken(project_id.to_string()));
            }
            return Ok(());
        }
        if non_empty(&self.api_key).is_none() {
            return Err(FactoryError::MissingCredentials);
        }
        Ok(())
    }
}

/// Build the backend described by `settings`. `cache` memoizes cloud access tokens.
pub fn create_backend(
    settings: &ProviderSettings,
    cache: Option<SharedCache>,
) -> Result<Arc<dyn ProviderBackend>, FactoryError> {
    settings.validate()?;

    if let Some(project_id) = non_empty(&settings.project_id) {
        let token = non_empty(&settings.access_token).unwrap_or_default();
        let mut backend = VertexBackend::new(
            project_id,
            non_empty(&settings.location),
            Arc::new(StaticTokenSource::new(token)),
        );
        if let Some(email) = non_empty(&settings.client_email) {
            backend = backend.with_client_email(email);
        }
        if let Some(model) = non_empty(&settings.model) {
            backend = backend.with_model(model);
        }
        if let Some(cache) = cache {
            backend = backend.with_cache(cache);
        }

        log::info!("[ProviderFactory] Using {}", backend.provider());
        return Ok(Arc::new(backend));
    }

    let api_key = non_empty(&settings.api_key).unwrap_or_default();
    let mut backend = GeminiBackend::new(api_key).with_auth_header(settings.auth_header);
    if let Some(base_url) = non_empty(&settings.base_url) {
        backend = backend.with_base_url(base_url);
    }
    if let Some(model) = non_empty(&settings.model) {
        backend = backend.with_model(model);
    }

    log::info!("[ProviderFactory] Using Gemini API");
    Ok(Arc::new(backend))
}
