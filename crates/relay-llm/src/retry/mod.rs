mod backoff;
mod classifier;

pub use backoff::BackoffScheduler;
pub use classifier::RetryClassifier;
