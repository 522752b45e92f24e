use relay_core::CacheError;
use thiserror::Error;

pub type MetricsResult<T> = Result<T, MetricsError>;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("billing sink error: {0}")]
    Billing(String),
}
