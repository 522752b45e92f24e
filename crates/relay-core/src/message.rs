use std::borrow::Cow;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Model,
}

impl Author {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// A single piece of structured message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    /// Base64 payload sent inline with the request.
    InlineData { mime_type: String, data: String },
    /// Reference to an already uploaded or bucket-hosted file.
    FileData { mime_type: String, file_uri: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Text portion of the content. Structured parts are joined by newlines.
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            Self::Text(text) => Cow::Borrowed(text.as_str()),
            Self::Parts(parts) => {
                let texts: Vec<&str> = parts
                    .iter()
                    .filter_map(|part| match part {
                        ContentPart::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();
                Cow::Owned(texts.join("\n"))
            }
        }
    }

    pub fn has_non_text(&self) -> bool {
        match self {
            Self::Text(_) => false,
            Self::Parts(parts) => parts
                .iter()
                .any(|part| !matches!(part, ContentPart::Text { .. })),
        }
    }
}

impl From<String> for MessageContent {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// One entry of a conversation history.
///
/// Messages are immutable once built. The only interior state is the lazily
/// computed token count, which is filled on first use and then reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "generate_id", skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub author: Author,
    pub content: MessageContent,
    #[serde(
        default,
        rename = "tokenCount",
        with = "token_count_cache",
        skip_serializing_if = "token_count_cache::is_unset"
    )]
    token_count: OnceLock<u32>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

impl Message {
    pub fn new(author: Author, content: impl Into<MessageContent>) -> Self {
        Self {
            id: generate_id(),
            author,
            content: content.into(),
            token_count: OnceLock::new(),
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new(Author::User, content)
    }

    pub fn model(content: impl Into<MessageContent>) -> Self {
        Self::new(Author::Model, content)
    }

    /// Attach a token count computed elsewhere (e.g. persisted with the history).
    pub fn with_token_count(self, tokens: u32) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(tokens);
        Self {
            token_count: cell,
            ..self
        }
    }

    pub fn text(&self) -> Cow<'_, str> {
        self.content.text()
    }

    pub fn has_attachments(&self) -> bool {
        self.content.has_non_text()
    }

    /// Text used for per-message token accounting: `"<role>: <text>"`.
    pub fn rendered(&self) -> String {
        format!("{}: {}", self.author.as_str(), self.text())
    }

    pub fn cached_token_count(&self) -> Option<u32> {
        self.token_count.get().copied()
    }

    /// Return the cached token count, computing and storing it on first use.
    pub fn token_count_with<F>(&self, count: F) -> u32
    where
        F: FnOnce(&Message) -> u32,
    {
        *self.token_count.get_or_init(|| count(self))
    }
}

/// Equality ignores the memoized token count.
impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.author == other.author
            && self.content == other.content
            && self.created_at == other.created_at
    }
}

mod token_count_cache {
    use std::sync::OnceLock;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn is_unset(cell: &OnceLock<u32>) -> bool {
        cell.get().is_none()
    }

    pub fn serialize<S: Serializer>(cell: &OnceLock<u32>, serializer: S) -> Result<S::Ok, S::Error> {
        cell.get().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<OnceLock<u32>, D::Error> {
        let cell = OnceLock::new();
        if let Some(tokens) = Option::<u32>::deserialize(deserializer)? {
            let _ = cell.set(tokens);
        }
        Ok(cell)
    }
}
