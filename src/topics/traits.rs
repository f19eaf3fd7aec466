// Embedder trait: swap-ready abstraction over the sentence encoder.
//
// The default implementation runs all-MiniLM-L6-v2 locally through ONNX.
// Tests substitute a deterministic fake.

use anyhow::Result;
use async_trait::async_trait;

/// Encodes texts into fixed-dimension vectors, one per input, same order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Dimensionality of every vector this embedder returns.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
