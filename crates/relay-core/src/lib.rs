pub mod budget;
pub mod cache;
pub mod config;
pub mod message;

pub use budget::{
    BudgetError, ConversationWindow, ConversationWindower, SharedTokenCounter, TokenCounter,
    WindowRequest,
};
pub use cache::{CacheError, InMemoryCache, KeyValueCache, SharedCache};
pub use config::{QuotaConfig, RelayConfig, RetryConfig, StreamConfig, WindowConfig};
pub use message::{Author, ContentPart, Message, MessageContent};
