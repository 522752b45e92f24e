//! Token-budgeted conversation windowing.
//!
//! Walks the history from the newest turn to the oldest, accepting whole
//! turns until the prompt budget is reached. The walk yields to the runtime
//! after every accepted turn so that long histories do not monopolize the
//! executor, and it honours the caller's cancellation token between steps.

use std::collections::VecDeque;

use tokio_util::sync::CancellationToken;

use crate::budget::counter::{SharedTokenCounter, TokenCounter};
use crate::budget::segmenter::{Turn, TurnSegmenter};
use crate::budget::types::{
    BudgetError, ConversationWindow, WindowRequest, RESPONSE_METADATA_TOKENS,
};
use crate::message::Message;

struct AcceptedTurn {
    turn: Turn,
    rendered: String,
    tokens: i64,
}

/// Builds [`ConversationWindow`]s from message histories.
///
/// Turns are counted in their rendered form (author label plus the joined
/// contents), so the per-message count memo does not apply here. To reuse
/// counts across requests over the same history, wrap the counter in
/// [`MemoizedTokenCounter`](crate::budget::counter::MemoizedTokenCounter).
pub struct ConversationWindower {
    counter: SharedTokenCounter,
    segmenter: TurnSegmenter,
}

impl ConversationWindower {
    pub fn new(counter: SharedTokenCounter) -> Self {
        Self {
            counter,
            segmenter: TurnSegmenter::new(),
        }
    }

    pub fn counter(&self) -> &dyn TokenCounter {
        self.counter.as_ref()
    }

    fn count(&self, text: &str) -> i64 {
        i64::from(self.counter.count_text(text))
    }

    /// Select the most recent turns that fit the request's budget.
    ///
    /// # Errors
    ///
    /// * [`BudgetError::SystemPromptTooLarge`] / [`BudgetError::InvalidBudget`]
    ///   when the reservations alone exceed the context window.
    /// * [`BudgetError::SingleMessageTooLarge`] when the newest turn does not fit.
    /// * [`BudgetError::Cancelled`] when `cancel` fires during the walk.
    pub async fn build_window(
        &self,
        messages: &[Message],
        request: &WindowRequest,
        cancel: &CancellationToken,
    ) -> Result<ConversationWindow, BudgetError> {
        let max_context = i64::from(request.max_context_tokens);
        let max_response = i64::from(request.max_response_tokens);

        let system_text = request.system_text();
        let system_tokens = self.count(system_text);
        let available_context = max_context - system_tokens;
        let max_prompt = available_context - max_response;

        if available_context < 0 || max_prompt < 0 {
            let error = if system_tokens > 0 {
                BudgetError::SystemPromptTooLarge {
                    system_tokens: system_tokens as u32,
                    max_context_tokens: request.max_context_tokens,
                    max_response_tokens: request.max_response_tokens,
                }
            } else {
                BudgetError::InvalidBudget {
                    max_context_tokens: request.max_context_tokens,
                    max_response_tokens: request.max_response_tokens,
                }
            };
            tracing::warn!("Window budget rejected before walking history: {}", error);
            return Err(error);
        }

        if cancel.is_cancelled() {
            return Err(BudgetError::Cancelled);
        }

        let turns = self.segmenter.segment(messages);
        let continuing = turns.last().map_or(false, |turn| !turn.is_user());

        let identity = request
            .identity
            .as_ref()
            .map(|identity| identity.preamble())
            .unwrap_or_default();
        let prompt_prefix = format!("{}{}", identity, system_text);
        let prompt_suffix = if continuing {
            String::new()
        } else {
            format!("{}\n\n{}:\n", prompt_prefix, request.model_label)
        };

        let mut running = if continuing {
            self.count(&prompt_prefix)
        } else {
            self.count(&prompt_suffix)
        };

        let mut accepted: VecDeque<AcceptedTurn> = VecDeque::new();

        for turn in turns.into_iter().rev() {
            let label = if turn.is_user() {
                &request.user_label
            } else {
                &request.model_label
            };
            // The model turn being continued carries the prompt prefix.
            let lead = if continuing && accepted.is_empty() && !turn.is_user() {
                prompt_prefix.as_str()
            } else {
                ""
            };
            let rendered = format!("{}\n\n{}:\n{}\n", lead, label, turn.content());
            let tokens = self.count(&rendered);
            let next = running + tokens;

            if next > max_prompt {
                if accepted.is_empty() {
                    let error = BudgetError::SingleMessageTooLarge {
                        message_tokens: clamp_u32(next),
                        available_tokens: clamp_u32(max_prompt),
                        max_context_tokens: request.max_context_tokens,
                    };
                    tracing::warn!("{}", error);
                    return Err(error);
                }

                // A user turn that does not fit takes its reply with it.
                if turn.is_user() {
                    if let Some(front) = accepted.front() {
                        if !front.turn.is_user() {
                            running -= front.tokens;
                            accepted.pop_front();
                        }
                    }
                }
                break;
            }

            running = next;
            accepted.push_front(AcceptedTurn {
                turn,
                rendered,
                tokens,
            });

            tokio::task::yield_now().await;
            if cancel.is_cancelled() {
                tracing::debug!("Windowing cancelled after {} turns", accepted.len());
                return Err(BudgetError::Cancelled);
            }
        }

        let prompt_body: String = accepted.iter().map(|a| a.rendered.as_str()).collect();
        let prompt = format!("{}{}", prompt_body, prompt_suffix).trim().to_string();
        let context: Vec<Message> = accepted
            .into_iter()
            .flat_map(|a| a.turn.messages)
            .collect();

        running += i64::from(RESPONSE_METADATA_TOKENS);
        let reserved = (available_context - running).min(max_response).max(0);

        let dropped_count = messages.len() - context.len();
        if dropped_count > 0 {
            tracing::debug!(
                kept = context.len(),
                dropped = dropped_count,
                prompt_tokens = running,
                "History truncated to fit context window"
            );
        }

        Ok(ConversationWindow {
            prompt,
            prompt_body,
            context,
            dropped_count,
            reserved_response_tokens: reserved as u32,
            prompt_tokens: clamp_u32(running),
        })
    }
}

fn clamp_u32(value: i64) -> u32 {
    value.clamp(0, i64::from(u32::MAX)) as u32
}
