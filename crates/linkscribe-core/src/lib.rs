pub mod annotate;
pub mod document;
pub mod error;
pub mod pool;
pub mod resolve;
pub mod retry;
pub mod traits;

#[cfg(test)]
pub mod testutil;

pub use annotate::{Annotator, AnnotatorConfig};
pub use error::AppError;
pub use pool::{PoolConfig, RatePool};
pub use resolve::{ResolverConfig, TitleResolver};
pub use retry::RetryPolicy;
pub use traits::{PageExtractor, TitleGenerator};
