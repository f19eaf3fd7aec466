pub mod conclusions;
pub mod http;
pub mod rate_limiter;
pub mod traits;

pub use conclusions::ConclusionGenerator;
pub use traits::{GenerationConfig, Summarizer};
