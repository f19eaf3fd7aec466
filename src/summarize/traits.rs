// Summarizer trait and the fixed generation settings.
//
// The default implementation calls a hosted bart-large-cnn endpoint over HTTP.
// Tests substitute a deterministic fake.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Generation hyperparameters. Held constant for a run so the same inputs
/// and weights always produce the same summaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationConfig {
    pub max_length: usize,
    pub min_length: usize,
    pub num_beams: usize,
    pub length_penalty: f32,
    pub repetition_penalty: f32,
    pub no_repeat_ngram_size: usize,
    pub early_stopping: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_length: 100,
            min_length: 30,
            num_beams: 4,
            length_penalty: 2.0,
            repetition_penalty: 2.5,
            no_repeat_ngram_size: 3,
            early_stopping: true,
        }
    }
}

/// Produces one summary per input text, in input order.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, texts: &[String], config: &GenerationConfig) -> Result<Vec<String>>;
}
