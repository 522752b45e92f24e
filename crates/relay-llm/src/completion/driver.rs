use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use relay_core::{RetryConfig, StreamConfig};
use tokio_util::sync::CancellationToken;

use crate::completion::progress::ProgressSink;
use crate::completion::staged::StagedResources;
use crate::error::{diagnose, CompletionError, FailureReport, ProviderError};
use crate::provider::ProviderBackend;
use crate::retry::{BackoffScheduler, RetryClassifier};
use crate::types::{Completion, CompletionRequest, UsageAccumulator, UsageRecord};

/// Why a single attempt ended early.
enum AttemptError {
    Cancelled,
    Provider(ProviderError),
}

/// Runs a streamed completion against one backend, retrying transient
/// failures with jittered backoff.
///
/// Each attempt starts from an empty reply, so text from an abandoned
/// attempt never reaches the returned [`Completion`].
pub struct CompletionDriver {
    backend: Arc<dyn ProviderBackend>,
    retry: RetryConfig,
    stream: StreamConfig,
    classifier: RetryClassifier,
    backoff: BackoffScheduler,
}

impl CompletionDriver {
    pub fn new(backend: Arc<dyn ProviderBackend>, retry: RetryConfig, stream: StreamConfig) -> Self {
        Self {
            classifier: RetryClassifier::new(&retry),
            backoff: BackoffScheduler::new(&retry),
            backend,
            retry,
            stream,
        }
    }

    pub fn backend(&self) -> &Arc<dyn ProviderBackend> {
        &self.backend
    }

    fn max_attempts(&self) -> u32 {
        self.retry.max_retries.saturating_add(1)
    }

    /// Stream a completion, forwarding text to `sink` as it arrives.
    ///
    /// `staged` is released before this returns, on success, failure and
    /// cancellation alike.
    pub async fn get_completion(
        &self,
        request: &CompletionRequest,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
        staged: StagedResources,
    ) -> Result<Completion, CompletionError> {
        let result = self.run(request, sink, cancel).await;

        let failures = staged.release_all().await;
        if failures > 0 {
            log::warn!(
                "[CompletionDriver] {} staged resource(s) could not be released",
                failures
            );
        }

        result
    }

    async fn run(
        &self,
        request: &CompletionRequest,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Completion, CompletionError> {
        self.backend.validate_request(request)?;

        let provider = self.backend.provider().to_string();
        let max_attempts = self.max_attempts();
        let chunk_delay =
            Duration::from_millis(self.backend.chunk_delay_ms(self.stream.chunk_delay_ms));

        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(CompletionError::Cancelled);
            }
            if attempt > 0 {
                log::info!(
                    "[CompletionDriver] Retry attempt {}/{} for {}",
                    attempt,
                    self.retry.max_retries,
                    provider
                );
                sink.on_retry(attempt).await;
            }

            let error = match self.attempt(request, sink, cancel, chunk_delay).await {
                Ok((text, usage)) => {
                    return Ok(Completion {
                        text,
                        usage,
                        attempts: attempt + 1,
                    })
                }
                Err(AttemptError::Cancelled) => {
                    log::debug!("[CompletionDriver] {} request cancelled", provider);
                    return Err(CompletionError::Cancelled);
                }
                Err(AttemptError::Provider(error)) => error,
            };

            log::error!(
                "[CompletionDriver] {} error (attempt {}/{}): {}",
                provider,
                attempt + 1,
                max_attempts,
                error
            );

            let retryable = self.backend.classify_error(&error, &self.classifier);
            if retryable && attempt < self.retry.max_retries {
                let delay_ms = self.backoff.next_delay_ms(attempt);
                log::warn!(
                    "[CompletionDriver] Retryable error detected. Waiting {}ms before retry {}/{}",
                    delay_ms,
                    attempt + 2,
                    max_attempts
                );

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(CompletionError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                }
                attempt += 1;
                continue;
            }

            let report = FailureReport {
                provider,
                hints: diagnose(&error.message),
                last_error: error,
                attempts: attempt + 1,
            };
            return Err(if retryable {
                CompletionError::ExhaustedRetries(report)
            } else {
                CompletionError::Terminal(report)
            });
        }
    }

    async fn attempt(
        &self,
        request: &CompletionRequest,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
        chunk_delay: Duration,
    ) -> Result<(String, Option<UsageRecord>), AttemptError> {
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AttemptError::Cancelled),
            stream = self.backend.start_stream(request) => stream.map_err(AttemptError::Provider)?,
        };

        let mut reply = String::new();
        let mut usage = UsageAccumulator::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AttemptError::Cancelled),
                next = stream.next() => next,
            };
            let Some(item) = next else {
                break;
            };
            let chunk = item.map_err(AttemptError::Provider)?;

            if let Some(fragment) = &chunk.usage {
                usage.merge(fragment);
            }
            if chunk.text.is_empty() {
                continue;
            }

            reply.push_str(&chunk.text);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AttemptError::Cancelled),
                _ = sink.on_progress(&chunk.text) => {}
            }

            if !chunk_delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AttemptError::Cancelled),
                    _ = tokio::time::sleep(chunk_delay) => {}
                }
            }
        }

        Ok((reply, usage.record()))
    }
}
