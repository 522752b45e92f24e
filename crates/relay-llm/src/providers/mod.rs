//! Provider backends.
//!
//! Both variants speak the same content/parts wire format and differ in
//! endpoint layout, authentication and quota handling.

pub(crate) mod common;
pub mod gemini;
pub mod vertex;

pub use gemini::GeminiBackend;
pub use vertex::{AccessToken, AccessTokenSource, StaticTokenSource, VertexBackend};
