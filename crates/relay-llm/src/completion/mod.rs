//! Streaming completion driver and its collaborators.

mod driver;
mod progress;
mod staged;
mod title;

pub use driver::CompletionDriver;
pub use progress::{ChannelProgressSink, NoopProgressSink, ProgressEvent, ProgressSink};
pub use staged::{ReleaseError, ResourceReleaser, StagedResource, StagedResources};
pub use title::{generate_title, title_request, GeneratedTitle, DEFAULT_TITLE};
