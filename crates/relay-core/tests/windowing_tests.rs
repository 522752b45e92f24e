//! Integration tests for conversation windowing against token budgets.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use relay_core::budget::{
    BudgetError, ConversationWindower, Identity, MemoizedTokenCounter, TokenCounter, WindowRequest,
};
use relay_core::{Author, Message};
use tokio_util::sync::CancellationToken;

/// One token per whitespace-separated word.
struct WordCounter;

impl TokenCounter for WordCounter {
    fn count_text(&self, text: &str) -> u32 {
        text.split_whitespace().count() as u32
    }
}

fn windower() -> ConversationWindower {
    ConversationWindower::new(Arc::new(WordCounter))
}

fn words(n: usize) -> String {
    vec!["word"; n].join(" ")
}

/// Alternating turns whose rendered form costs exactly `cost` tokens (label + content).
fn alternating(count: usize, cost: usize, first: Author) -> Vec<Message> {
    (0..count)
        .map(|i| {
            let author = if (i % 2 == 0) == (first == Author::User) {
                Author::User
            } else {
                Author::Model
            };
            Message::new(author, words(cost - 1))
        })
        .collect()
}

async fn window(
    messages: &[Message],
    request: &WindowRequest,
) -> Result<relay_core::ConversationWindow, BudgetError> {
    windower()
        .build_window(messages, request, &CancellationToken::new())
        .await
}

#[tokio::test]
async fn fifty_turn_history_keeps_most_recent_turns() {
    let messages = alternating(50, 100, Author::User);
    let request = WindowRequest::new(1200, 300);

    let window = window(&messages, &request).await.unwrap();

    let kept_turns = window.context.len();
    assert!((8..=9).contains(&kept_turns), "kept {} turns", kept_turns);
    assert_eq!(window.dropped_count, 50 - kept_turns);
    assert!(window.reserved_response_tokens <= 300);
    assert_eq!(window.context[0].author, Author::User);

    let last = window.context.last().unwrap();
    assert_eq!(last.id, messages.last().unwrap().id);
}

#[tokio::test]
async fn single_oversized_message_is_a_length_error() {
    let messages = vec![Message::user(words(4999))];
    let request = WindowRequest::new(4000, 1000);

    let err = window(&messages, &request).await.unwrap_err();

    match &err {
        BudgetError::SingleMessageTooLarge {
            message_tokens,
            available_tokens,
            max_context_tokens,
        } => {
            assert!(*message_tokens >= 5000);
            assert_eq!(*available_tokens, 3000);
            assert_eq!(*max_context_tokens, 4000);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.is_length_exceeded());
    assert!(err.overflow().unwrap() >= 2000);
}

#[tokio::test]
async fn budget_invariant_holds_across_configurations() {
    let counter = WordCounter;
    let histories = [
        alternating(3, 40, Author::User),
        alternating(12, 70, Author::User),
        alternating(25, 33, Author::Model),
        alternating(40, 120, Author::User),
    ];
    let budgets = [(1000, 200), (1500, 500), (3000, 1000), (800, 100)];

    for messages in &histories {
        for (max_context, max_response) in budgets {
            let request = WindowRequest::new(max_context, max_response).with_system_message("stay on topic");
            let window = match window(messages, &request).await {
                Ok(window) => window,
                Err(err) => {
                    assert!(err.is_length_exceeded());
                    continue;
                }
            };

            let used = counter.count_text(&window.prompt_body) + window.reserved_response_tokens;
            assert!(
                used <= max_context,
                "{} + {} > {}",
                counter.count_text(&window.prompt_body),
                window.reserved_response_tokens,
                max_context
            );
        }
    }
}

#[tokio::test]
async fn dropping_only_removes_oldest_messages() {
    let messages = alternating(30, 50, Author::User);
    let window = window(&messages, &WindowRequest::new(800, 200)).await.unwrap();

    assert!(window.dropped_count > 0);
    let kept_ids: Vec<&str> = window.context.iter().map(|m| m.id.as_str()).collect();
    let tail_ids: Vec<&str> = messages[window.dropped_count..]
        .iter()
        .map(|m| m.id.as_str())
        .collect();
    assert_eq!(kept_ids, tail_ids);
}

#[tokio::test]
async fn overflowing_user_turn_drops_its_reply_too() {
    // U M U M U, each turn 100 tokens, reply invitation 1 token.
    let messages = alternating(5, 100, Author::User);
    let request = WindowRequest::new(500, 250);

    let window = window(&messages, &request).await.unwrap();

    assert_eq!(window.context.len(), 1);
    assert_eq!(window.context[0].author, Author::User);
    assert_eq!(window.dropped_count, 4);
}

#[tokio::test]
async fn overflowing_model_turn_drops_only_itself() {
    let messages = alternating(5, 100, Author::User);
    let request = WindowRequest::new(600, 250);

    let window = window(&messages, &request).await.unwrap();

    assert_eq!(window.context.len(), 3);
    assert_eq!(window.context[0].author, Author::User);
    assert_eq!(window.dropped_count, 2);
}

#[tokio::test]
async fn windowing_is_idempotent() {
    let messages = alternating(20, 60, Author::User);
    let request = WindowRequest::new(700, 150).with_system_message("be kind");

    let first = window(&messages, &request).await.unwrap();
    let second = window(&messages, &request).await.unwrap();

    assert_eq!(first.prompt_body, second.prompt_body);
    assert_eq!(first.prompt, second.prompt);
    assert_eq!(first.dropped_count, second.dropped_count);
    assert_eq!(first.reserved_response_tokens, second.reserved_response_tokens);
    assert_eq!(first, second);
}

#[tokio::test]
async fn output_cap_tracks_remaining_context() {
    let request = WindowRequest::new(1200, 300);

    // A short prompt leaves the full response reservation available.
    let short = window(&[Message::user("hello")], &request).await.unwrap();
    assert_eq!(short.reserved_response_tokens, 300);

    // Nine 100-token turns ending on a model turn fill the prompt budget
    // exactly; metadata overhead then eats into the output cap.
    let full = window(&alternating(9, 100, Author::Model), &request).await.unwrap();
    assert_eq!(full.context.len(), 9);
    assert_eq!(full.prompt_tokens, 902);
    assert_eq!(full.reserved_response_tokens, 298);

    for window in [&short, &full] {
        let expected = (1200 - window.prompt_tokens).min(300);
        assert_eq!(window.reserved_response_tokens, expected);
    }
}

#[tokio::test]
async fn continuation_prefixes_the_model_turn() {
    let messages = vec![Message::user("hi"), Message::model("partial answer")];
    let request = WindowRequest::new(500, 100)
        .with_system_message("sys")
        .with_identity(Identity {
            user_name: Some("Ada".to_string()),
            model_name: Some("Gem".to_string()),
        });

    let window = window(&messages, &request).await.unwrap();

    assert!(window.prompt.starts_with("User:\nhi\n"));
    assert!(window.prompt.contains("Human's name: Ada\nYou are Gemsys"));
    assert!(window.prompt.ends_with("Assistant:\npartial answer"));
}

#[tokio::test]
async fn consecutive_messages_window_as_one_turn() {
    let messages = vec![
        Message::user("first part"),
        Message::user("second part"),
        Message::model("answer"),
        Message::user("follow up"),
    ];

    let window = window(&messages, &WindowRequest::new(500, 100)).await.unwrap();

    assert_eq!(window.context.len(), 4);
    assert!(window.prompt_body.contains("User:\nfirst part\nsecond part\n"));
}

/// Cancels the shared token once it has counted `limit` texts.
struct CancellingCounter {
    calls: AtomicUsize,
    limit: usize,
    cancel: CancellationToken,
}

impl TokenCounter for CancellingCounter {
    fn count_text(&self, text: &str) -> u32 {
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.limit {
            self.cancel.cancel();
        }
        text.split_whitespace().count() as u32
    }
}

#[tokio::test]
async fn cancellation_interrupts_a_long_walk() {
    let cancel = CancellationToken::new();
    let counter = CancellingCounter {
        calls: AtomicUsize::new(0),
        limit: 4,
        cancel: cancel.clone(),
    };
    let windower = ConversationWindower::new(Arc::new(counter));
    let messages = alternating(100, 10, Author::User);

    let err = windower
        .build_window(&messages, &WindowRequest::new(100_000, 1000), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err, BudgetError::Cancelled);
}

/// Word counter that reports how often it was asked.
struct TallyCounter {
    calls: Arc<AtomicUsize>,
}

impl TokenCounter for TallyCounter {
    fn count_text(&self, text: &str) -> u32 {
        self.calls.fetch_add(1, Ordering::SeqCst);
        text.split_whitespace().count() as u32
    }
}

#[tokio::test]
async fn memoized_counter_skips_recounting_on_rewindow() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = MemoizedTokenCounter::new(TallyCounter { calls: calls.clone() });
    let windower = ConversationWindower::new(Arc::new(counter));
    let messages = alternating(12, 20, Author::User);
    let request = WindowRequest::new(2_000, 200).with_system_message("be kind");

    let first = windower
        .build_window(&messages, &request, &CancellationToken::new())
        .await
        .unwrap();
    let counted = calls.load(Ordering::SeqCst);
    assert!(counted > 0);

    let second = windower
        .build_window(&messages, &request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), counted);
    assert_eq!(first, second);
}
