//! Token budget management for conversation windowing.
//!
//! # Key Components
//!
//! - [`counter`]: Token counting (heuristic, cl100k BPE, memoized)
//! - [`segmenter`]: Grouping of consecutive same-author messages into turns
//! - [`windower`]: Newest-first walk that fits turns into the prompt budget
//! - [`limits`]: Model context window limits registry
//! - [`accounting`]: Reconciling estimates with provider-reported usage

pub mod accounting;
pub mod counter;
pub mod limits;
pub mod segmenter;
pub mod types;
pub mod windower;

pub use accounting::calculate_current_token_count;
pub use counter::{
    Cl100kTokenCounter, HeuristicTokenCounter, MemoizedTokenCounter, SharedTokenCounter,
    TokenCounter,
};
pub use limits::{ModelLimit, ModelLimitsRegistry, DEFAULT_MAX_OUTPUT_TOKENS};
pub use segmenter::{Turn, TurnSegmenter};
pub use types::{BudgetError, ConversationWindow, Identity, WindowRequest};
pub use windower::ConversationWindower;
