// Topic assignment: sentence embeddings and cosine-similarity matching.

pub mod traits;
pub mod embeddings;
pub mod assign;

pub use assign::TopicAssigner;
