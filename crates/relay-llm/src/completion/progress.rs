use async_trait::async_trait;
use tokio::sync::mpsc;

/// Receives streamed text as it arrives.
///
/// `on_progress` is awaited before the next chunk is pulled, so a slow
/// consumer applies backpressure to the stream.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn on_progress(&self, text: &str);

    /// A failed attempt is about to be retried; text already delivered
    /// belongs to the abandoned attempt.
    async fn on_retry(&self, _attempt: u32) {}
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressSink;

#[async_trait]
impl ProgressSink for NoopProgressSink {
    async fn on_progress(&self, _text: &str) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Text(String),
    Retry { attempt: u32 },
}

/// Forwards progress into a bounded channel.
///
/// A dropped receiver is not an error for the completion; further events are discarded.
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    async fn send(&self, event: ProgressEvent) {
        if self.tx.send(event).await.is_err() {
            log::debug!("[ProgressSink] receiver dropped, discarding progress");
        }
    }
}

#[async_trait]
impl ProgressSink for ChannelProgressSink {
    async fn on_progress(&self, text: &str) {
        self.send(ProgressEvent::Text(text.to_string())).await;
    }

    async fn on_retry(&self, attempt: u32) {
        self.send(ProgressEvent::Retry { attempt }).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_forwards_in_order() {
        let (sink, mut rx) = ChannelProgressSink::channel(4);
        sink.on_progress("a").await;
        sink.on_retry(1).await;
        sink.on_progress("b").await;
        drop(sink);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                ProgressEvent::Text("a".to_string()),
                ProgressEvent::Retry { attempt: 1 },
                ProgressEvent::Text("b".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn dropped_receiver_is_ignored() {
        let (sink, rx) = ChannelProgressSink::channel(1);
        drop(rx);
        sink.on_progress("lost").await;
    }
}
