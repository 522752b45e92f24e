//! Temporary resources (uploaded attachments) owned by one completion call.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to release {resource}: {reason}")]
pub struct ReleaseError {
    pub resource: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedResource {
    pub id: String,
    pub uri: Option<String>,
}

impl StagedResource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uri: None,
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }
}

/// Deletes a staged resource from wherever it was uploaded.
#[async_trait]
pub trait ResourceReleaser: Send + Sync {
    async fn release(&self, resource: &StagedResource) -> Result<(), ReleaseError>;
}

/// Resources to release once the completion finishes, whatever the outcome.
#[derive(Default)]
pub struct StagedResources {
    resources: Vec<StagedResource>,
    releaser: Option<Arc<dyn ResourceReleaser>>,
}

impl StagedResources {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(releaser: Arc<dyn ResourceReleaser>) -> Self {
        Self {
            resources: Vec::new(),
            releaser: Some(releaser),
        }
    }

    pub fn push(&mut self, resource: StagedResource) {
        self.resources.push(resource);
    }

    pub fn with(mut self, resource: StagedResource) -> Self {
        self.push(resource);
        self
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Release everything. Failures are logged and counted, never raised.
    pub async fn release_all(self) -> usize {
        let Some(releaser) = self.releaser else {
            return 0;
        };

        let mut failures = 0;
        for resource in &self.resources {
            if let Err(e) = releaser.release(resource).await {
                failures += 1;
                log::warn!("[StagedResources] {}", e);
            }
        }
        failures
    }
}
