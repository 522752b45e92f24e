use thiserror::Error;

/// A request that cannot be expressed on the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Request has no messages")]
    EmptyConversation,

    #[error("Invalid {mime_type} part: {reason}")]
    InvalidPart { mime_type: String, reason: String },
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
