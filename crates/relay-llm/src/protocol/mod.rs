//! Protocol conversion traits and types.
//!
//! Internal types (`relay_core::Message`) convert into the provider wire
//! shape through [`ToProvider`]. Both backends speak the same
//! content/parts format, so a single wire module covers them.

mod errors;
pub mod gemini;

pub use errors::{ProtocolError, ProtocolResult};

/// Trait for converting internal types to provider-specific types.
pub trait ToProvider<T>: Sized {
    fn to_provider(&self) -> ProtocolResult<T>;
}
