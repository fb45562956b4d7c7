pub mod backend;
pub mod jina;

pub use backend::{Backend, BackendConfig, GenerationConfig, Provider};
pub use jina::{ExtractionConfig, JinaExtractor};
