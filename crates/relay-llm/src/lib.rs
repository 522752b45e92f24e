//! Provider backends, retry policy and the streaming completion driver.

pub mod completion;
pub mod error;
pub mod models;
pub mod protocol;
pub mod provider;
pub mod provider_factory;
pub mod providers;
pub mod retry;
pub mod types;

pub use completion::{
    generate_title, ChannelProgressSink, CompletionDriver, GeneratedTitle, NoopProgressSink,
    ProgressEvent, ProgressSink, ResourceReleaser, StagedResource, StagedResources,
};
pub use error::{diagnose, CompletionError, FailureReport, ProviderError};
pub use provider::{ChunkStream, Provider, ProviderBackend};
pub use provider_factory::{create_backend, FactoryError, ProviderSettings};
pub use providers::{AccessToken, AccessTokenSource, GeminiBackend, StaticTokenSource, VertexBackend};
pub use retry::{BackoffScheduler, RetryClassifier};
pub use types::{
    Completion, CompletionRequest, GenerationOutput, GenerationParams, StreamChunk,
    UsageAccumulator, UsageRecord,
};
