// Sentence embeddings using all-MiniLM-L6-v2.
//
// Each text is tokenized, run through the BERT encoder and mean-pooled over
// the attention mask into a 384-dimensional vector. The model runs locally via
// ONNX; no API calls.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::debug;

use super::traits::Embedder;

/// Embedding dimension for all-MiniLM-L6-v2.
pub const EMBEDDING_DIM: usize = 384;

/// BERT position-embedding table size.
pub const MAX_SEQUENCE_TOKENS: usize = 512;

/// Sentence embedder backed by a local ONNX session.
///
/// Arc<Mutex<Session>> because Session::run takes &mut self and inference is
/// offloaded to spawn_blocking, which needs 'static shared ownership.
pub struct SentenceEmbedder {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
}

impl SentenceEmbedder {
    /// Load the model and tokenizer from `model_dir`.
    ///
    /// Expects `model.onnx` and `tokenizer.json` in the directory.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !model_path.exists() {
            anyhow::bail!(
                "Embedding model not found: {}\nRun `opinion-analyzer download-model` to download it.",
                model_path.display()
            );
        }
        if !tokenizer_path.exists() {
            anyhow::bail!(
                "Embedding tokenizer not found: {}\nRun `opinion-analyzer download-model` to download it.",
                tokenizer_path.display()
            );
        }

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(&model_path)
            .with_context(|| {
                format!(
                    "Failed to load embedding model from {}",
                    model_path.display()
                )
            })?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load embedding tokenizer: {}", e))?;
        cap_sequence_length(&mut tokenizer)?;

        debug!("Loaded sentence embedding model from {}", model_dir.display());

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
        })
    }
}

#[async_trait]
impl Embedder for SentenceEmbedder {
    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || embed_sync(&session, &tokenizer, &texts))
            .await
            .context("spawn_blocking panicked")?
    }
}

/// Tokenize, run inference and mean-pool. Runs on a blocking thread.
fn embed_sync(
    session: &Mutex<Session>,
    tokenizer: &Tokenizer,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let encodings: Vec<_> = texts
        .iter()
        .map(|t| {
            tokenizer
                .encode(t.as_str(), true)
                .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))
        })
        .collect::<Result<Vec<_>>>()?;

    let batch_size = encodings.len();
    let max_len = encodings
        .iter()
        .map(|e| e.get_ids().len())
        .max()
        .unwrap_or(0);

    if max_len == 0 {
        return Ok(vec![vec![0.0; EMBEDDING_DIM]; batch_size]);
    }

    // BERT inputs, right-padded with id 0 and mask 0.
    let mut input_ids_flat: Vec<i64> = Vec::with_capacity(batch_size * max_len);
    let mut attention_mask_flat: Vec<i64> = Vec::with_capacity(batch_size * max_len);
    let mut token_type_ids_flat: Vec<i64> = Vec::with_capacity(batch_size * max_len);

    for enc in &encodings {
        let ids = enc.get_ids();
        let mask = enc.get_attention_mask();
        let pad_len = max_len - ids.len();

        input_ids_flat.extend(ids.iter().map(|&id| id as i64));
        attention_mask_flat.extend(mask.iter().map(|&m| m as i64));
        token_type_ids_flat.extend(std::iter::repeat_n(0i64, ids.len()));

        input_ids_flat.extend(std::iter::repeat_n(0i64, pad_len));
        attention_mask_flat.extend(std::iter::repeat_n(0i64, pad_len));
        token_type_ids_flat.extend(std::iter::repeat_n(0i64, pad_len));
    }

    let shape = [batch_size as i64, max_len as i64];

    let input_ids_tensor =
        Tensor::from_array((shape, input_ids_flat)).context("Failed to create input_ids tensor")?;
    let attention_mask_tensor = Tensor::from_array((shape, attention_mask_flat.clone()))
        .context("Failed to create attention_mask tensor")?;
    let token_type_ids_tensor = Tensor::from_array((shape, token_type_ids_flat))
        .context("Failed to create token_type_ids tensor")?;

    // last_hidden_state: [batch, seq_len, 384]
    let hidden_states = {
        let mut session = session
            .lock()
            .map_err(|e| anyhow::anyhow!("Session lock poisoned: {}", e))?;

        let outputs = session
            .run(ort::inputs! {
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor
            })
            .context("Embedding ONNX inference failed")?;

        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract embedding output tensor")?;

        data.to_vec()
    };

    let embeddings = mean_pool(&hidden_states, &attention_mask_flat, batch_size, max_len);

    debug!(batch_size, dim = EMBEDDING_DIM, "Computed sentence embeddings");

    Ok(embeddings)
}

/// Average token vectors weighted by the attention mask.
fn mean_pool(
    hidden_states: &[f32],
    attention_mask: &[i64],
    batch_size: usize,
    max_len: usize,
) -> Vec<Vec<f32>> {
    let mut embeddings = Vec::with_capacity(batch_size);

    for i in 0..batch_size {
        let mut sum = vec![0.0_f32; EMBEDDING_DIM];
        let mut mask_sum = 0.0_f32;

        for j in 0..max_len {
            let mask_val = attention_mask[i * max_len + j] as f32;
            if mask_val > 0.0 {
                mask_sum += mask_val;
                let offset = (i * max_len + j) * EMBEDDING_DIM;
                for (k, acc) in sum.iter_mut().enumerate() {
                    *acc += hidden_states[offset + k] * mask_val;
                }
            }
        }

        if mask_sum > 0.0 {
            for val in &mut sum {
                *val /= mask_sum;
            }
        }

        embeddings.push(sum);
    }

    embeddings
}

/// Keep a truncation limit shipped with the tokenizer; otherwise cap at the
/// position table size.
fn cap_sequence_length(tokenizer: &mut Tokenizer) -> Result<()> {
    if tokenizer.get_truncation().is_some() {
        return Ok(());
    }
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: MAX_SEQUENCE_TOKENS,
            ..Default::default()
        }))
        .map_err(|e| anyhow::anyhow!("Failed to configure embedding truncation: {}", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_tokenizer(truncation: &str) -> Tokenizer {
        let json = format!(
            r#"{{
                "version": "1.0",
                "truncation": {truncation},
                "padding": null,
                "added_tokens": [],
                "normalizer": null,
                "pre_tokenizer": {{"type": "WhitespaceSplit"}},
                "post_processor": null,
                "decoder": null,
                "model": {{"type": "WordLevel", "vocab": {{"[UNK]": 0, "topic": 1}}, "unk_token": "[UNK]"}}
            }}"#
        );
        Tokenizer::from_bytes(json).unwrap()
    }

    #[test]
    fn test_long_text_is_cut_to_position_limit() {
        let mut tokenizer = word_tokenizer("null");
        cap_sequence_length(&mut tokenizer).unwrap();
        let text = "topic ".repeat(2000);
        let enc = tokenizer.encode(text.as_str(), true).unwrap();
        assert_eq!(enc.get_ids().len(), MAX_SEQUENCE_TOKENS);
    }

    #[test]
    fn test_shipped_truncation_is_kept() {
        let mut tokenizer = word_tokenizer(
            r#"{"direction": "Right", "max_length": 128, "strategy": "LongestFirst", "stride": 0}"#,
        );
        cap_sequence_length(&mut tokenizer).unwrap();
        let text = "topic ".repeat(2000);
        let enc = tokenizer.encode(text.as_str(), true).unwrap();
        assert_eq!(enc.get_ids().len(), 128);
    }

    #[test]
    fn test_mean_pool_ignores_padding() {
        // One text, two positions; second is padding with a huge value.
        let mut hidden = vec![0.0_f32; 2 * EMBEDDING_DIM];
        hidden[0] = 2.0;
        hidden[EMBEDDING_DIM] = 1000.0;
        let mask = vec![1, 0];
        let pooled = mean_pool(&hidden, &mask, 1, 2);
        assert_eq!(pooled.len(), 1);
        assert!((pooled[0][0] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_mean_pool_averages_real_tokens() {
        let mut hidden = vec![0.0_f32; 2 * EMBEDDING_DIM];
        hidden[1] = 1.0;
        hidden[EMBEDDING_DIM + 1] = 3.0;
        let mask = vec![1, 1];
        let pooled = mean_pool(&hidden, &mask, 1, 2);
        assert!((pooled[0][1] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_mean_pool_all_masked_is_zero() {
        let hidden = vec![5.0_f32; EMBEDDING_DIM];
        let mask = vec![0];
        let pooled = mean_pool(&hidden, &mask, 1, 1);
        assert!(pooled[0].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_load_fails_without_model_files() {
        let dir = std::env::temp_dir().join("opinion-analyzer-embed-missing");
        let err = SentenceEmbedder::load(&dir).err().unwrap();
        assert!(err.to_string().contains("download-model"));
    }
}
