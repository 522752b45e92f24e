//! Token counting for budget management.
//!
//! Provides heuristic token estimation (chars/4 + 10% margin) and BPE-based
//! counting with the cl100k encoding. Counts are deterministic for a given
//! input; per-message counts are cached on the message itself.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tiktoken_rs::CoreBPE;

use crate::message::Message;

/// Trait for token counting implementations.
pub trait TokenCounter: Send + Sync {
    /// Count tokens in a plain text string.
    fn count_text(&self, text: &str) -> u32;

    /// Count tokens in a single message.
    ///
    /// The message is rendered as `"<role>: <text>"` and the result is stored
    /// on the message, so repeated calls never re-tokenize.
    fn count_message(&self, message: &Message) -> u32 {
        message.token_count_with(|m| self.count_text(&m.rendered()))
    }

    /// Count tokens in multiple messages.
    fn count_messages(&self, messages: &[Message]) -> u32 {
        messages
            .iter()
            .map(|m| self.count_message(m))
            .fold(0u32, |acc, x| acc.saturating_add(x))
    }
}

/// Heuristic token counter using character-based estimation.
///
/// Uses the approximation: tokens ≈ characters / 4, with a 10% safety margin.
/// This is intentionally conservative to avoid underestimating token usage.
#[derive(Debug, Clone)]
pub struct HeuristicTokenCounter {
    /// Characters per token ratio (default: 4)
    chars_per_token: f64,
    /// Safety margin multiplier (default: 1.1 = 10% extra)
    safety_margin: f64,
}

impl HeuristicTokenCounter {
    pub fn new(chars_per_token: f64, safety_margin: f64) -> Self {
        Self {
            chars_per_token,
            safety_margin,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(4.0, 1.1)
    }
}

impl Default for HeuristicTokenCounter {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl TokenCounter for HeuristicTokenCounter {
    fn count_text(&self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }

        let char_count = text.chars().count() as f64;
        let base_tokens = char_count / self.chars_per_token;
        let adjusted_tokens = base_tokens * self.safety_margin;

        adjusted_tokens.ceil() as u32
    }
}

static CL100K_BASE: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn cl100k_base() -> Option<&'static CoreBPE> {
    CL100K_BASE
        .get_or_init(|| match tiktoken_rs::cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                log::warn!("[TokenCounter] cl100k_base unavailable, using heuristic: {}", e);
                None
            }
        })
        .as_ref()
}

/// BPE token counter using the cl100k encoding.
///
/// The encoder is built once per process. If it cannot be initialized the
/// counter degrades to [`HeuristicTokenCounter`].
#[derive(Debug, Clone, Default)]
pub struct Cl100kTokenCounter {
    fallback: HeuristicTokenCounter,
}

impl Cl100kTokenCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenCounter for Cl100kTokenCounter {
    fn count_text(&self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }
        match cl100k_base() {
            Some(bpe) => bpe.encode_with_special_tokens(text).len() as u32,
            None => self.fallback.count_text(text),
        }
    }
}

/// Wraps another counter with a text → count memo.
///
/// Useful for texts that are re-counted on every request, such as the
/// system prompt.
#[derive(Debug)]
pub struct MemoizedTokenCounter<C> {
    inner: C,
    memo: DashMap<String, u32>,
}

impl<C: TokenCounter> MemoizedTokenCounter<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            memo: DashMap::new(),
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.memo.len()
    }
}

impl<C: TokenCounter> TokenCounter for MemoizedTokenCounter<C> {
    fn count_text(&self, text: &str) -> u32 {
        if let Some(count) = self.memo.get(text) {
            return *count;
        }
        let count = self.inner.count_text(text);
        self.memo.insert(text.to_string(), count);
        count
    }
}

/// Arc-wrapped token counter for easy sharing.
pub type SharedTokenCounter = Arc<dyn TokenCounter>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCounter {
        calls: AtomicUsize,
    }

    impl TokenCounter for CountingCounter {
        fn count_text(&self, text: &str) -> u32 {
            self.calls.fetch_add(1, Ordering::SeqCst);
            text.split_whitespace().count() as u32
        }
    }

    #[test]
    fn heuristic_counter_counts_text() {
        let counter = HeuristicTokenCounter::default();

        // "Hello, world!" = 13 chars -> 13/4 * 1.1 ≈ 3.57 -> 4 tokens
        let tokens = counter.count_text("Hello, world!");
        assert_eq!(tokens, 4);
    }

    #[test]
    fn heuristic_counter_counts_empty_text() {
        let counter = HeuristicTokenCounter::default();
        assert_eq!(counter.count_text(""), 0);
    }

    #[test]
    fn safety_margin_applied() {
        let counter_no_margin = HeuristicTokenCounter::new(4.0, 1.0);
        let counter_with_margin = HeuristicTokenCounter::new(4.0, 1.1);

        let text = "Hello world!"; // 12 chars
        assert_eq!(counter_no_margin.count_text(text), 3);
        assert_eq!(counter_with_margin.count_text(text), 4);
    }

    #[test]
    fn count_message_uses_role_prefixed_text() {
        let counter = CountingCounter {
            calls: AtomicUsize::new(0),
        };
        let message = Message::user("one two three");

        // "user: one two three"
        assert_eq!(counter.count_message(&message), 4);
        assert_eq!(counter.count_message(&message), 4);
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn count_message_respects_persisted_count() {
        let counter = HeuristicTokenCounter::default();
        let message = Message::model("anything at all").with_token_count(42);
        assert_eq!(counter.count_message(&message), 42);
    }

    #[test]
    fn count_messages_sums() {
        let counter = HeuristicTokenCounter::default();
        let messages = vec![Message::user("Hello"), Message::model("Hi there")];

        let total = counter.count_messages(&messages);
        let sum: u32 = messages.iter().map(|m| counter.count_message(m)).sum();
        assert_eq!(total, sum);
    }

    #[test]
    fn cl100k_counts_are_deterministic() {
        let counter = Cl100kTokenCounter::new();
        let text = "The quick brown fox jumps over the lazy dog.";
        let first = counter.count_text(text);
        assert!(first > 0);
        assert_eq!(first, counter.count_text(text));
        assert_eq!(counter.count_text(""), 0);
    }

    #[test]
    fn memoized_counter_counts_each_text_once() {
        let counter = MemoizedTokenCounter::new(CountingCounter {
            calls: AtomicUsize::new(0),
        });

        assert_eq!(counter.count_text("system prompt here"), 3);
        assert_eq!(counter.count_text("system prompt here"), 3);
        assert_eq!(counter.count_text("other"), 1);
        assert_eq!(counter.inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(counter.cached_entries(), 2);
    }
}
