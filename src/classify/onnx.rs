// Local zero-shot classification with an NLI model (bart-large-mnli, ONNX).
//
// Every (text, hypothesis) pair is scored for entailment, where the hypothesis
// is "This example is {label}.". For one text, the entailment logits across
// all candidate labels are softmaxed into a distribution, matching the
// single-label zero-shot formulation.
//
// Model: facebook/bart-large-mnli exported to ONNX (quantized)
// Output: [pairs, 3] logits ordered contradiction, neutral, entailment.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Tokenizer, TruncationParams, TruncationStrategy};
use tracing::debug;

use super::traits::{rank_labels, LabelScore, ZeroShotClassifier};

/// Index of the entailment logit in the model output.
const ENTAILMENT_INDEX: usize = 2;

/// Number of NLI classes the model outputs.
const NLI_CLASSES: usize = 3;

/// BART pad token id.
const PAD_TOKEN_ID: i64 = 1;

/// Hypothesis template; `{}` is replaced by the candidate label.
pub const HYPOTHESIS_TEMPLATE: &str = "This example is {}.";

/// Pairs per forward pass. Bounds the session's working set.
pub const DEFAULT_PAIR_BATCH: usize = 64;

/// BART position-embedding table size. Longer pairs fail inside the session.
pub const MAX_PAIR_TOKENS: usize = 1024;

/// NLI-backed zero-shot classifier. Same shared-session layout as the
/// sentence embedder so inference can run on a blocking thread.
pub struct NliZeroShotClassifier {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    pair_batch: usize,
}

impl NliZeroShotClassifier {
    /// Load the NLI model and tokenizer from `model_dir`.
    ///
    /// Expects `model_quantized.onnx` and `tokenizer.json`.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let model_path = model_dir.join("model_quantized.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !model_path.exists() {
            anyhow::bail!(
                "Zero-shot model not found: {}\nRun `opinion-analyzer download-model` to download it.",
                model_path.display()
            );
        }
        if !tokenizer_path.exists() {
            anyhow::bail!(
                "Zero-shot tokenizer not found: {}\nRun `opinion-analyzer download-model` to download it.",
                tokenizer_path.display()
            );
        }

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(&model_path)
            .with_context(|| format!("Failed to load NLI model from {}", model_path.display()))?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load NLI tokenizer: {}", e))?;
        truncate_premise(&mut tokenizer)?;

        debug!("Loaded zero-shot NLI model from {}", model_dir.display());

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            pair_batch: DEFAULT_PAIR_BATCH,
        })
    }

    /// Override how many (text, label) pairs go through one forward pass.
    pub fn with_pair_batch(mut self, pair_batch: usize) -> Self {
        self.pair_batch = pair_batch.max(1);
        self
    }
}

#[async_trait]
impl ZeroShotClassifier for NliZeroShotClassifier {
    async fn classify(&self, texts: &[String], labels: &[&str]) -> Result<Vec<Vec<LabelScore>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if labels.is_empty() {
            anyhow::bail!("Zero-shot classification needs at least one candidate label");
        }

        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let texts = texts.to_vec();
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        let pair_batch = self.pair_batch;

        tokio::task::spawn_blocking(move || {
            let hypotheses: Vec<String> = labels
                .iter()
                .map(|l| HYPOTHESIS_TEMPLATE.replace("{}", l))
                .collect();

            // Pair order: text-major, so pair p belongs to text p / labels.len().
            let pairs: Vec<(&str, &str)> = texts
                .iter()
                .flat_map(|t| hypotheses.iter().map(move |h| (t.as_str(), h.as_str())))
                .collect();

            let mut entailment = Vec::with_capacity(pairs.len());
            for chunk in pairs.chunks(pair_batch) {
                entailment.extend(entailment_logits(&session, &tokenizer, chunk)?);
            }

            let label_refs: Vec<&str> = labels.iter().map(String::as_str).collect();
            let results = entailment
                .chunks(labels.len())
                .map(|logits| rank_labels(&label_refs, &softmax(logits)))
                .collect::<Vec<_>>();

            debug!(texts = results.len(), labels = labels.len(), "Zero-shot classification done");
            Ok(results)
        })
        .await
        .context("spawn_blocking panicked")?
    }
}

/// Cap every encoded pair at MAX_PAIR_TOKENS by trimming the premise; the
/// hypothesis always survives intact.
fn truncate_premise(tokenizer: &mut Tokenizer) -> Result<()> {
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: MAX_PAIR_TOKENS,
            strategy: TruncationStrategy::OnlyFirst,
            ..Default::default()
        }))
        .map_err(|e| anyhow::anyhow!("Failed to configure NLI truncation: {}", e))?;
    Ok(())
}

/// Run one forward pass over premise/hypothesis pairs and return the
/// entailment logit of each pair.
fn entailment_logits(
    session: &Mutex<Session>,
    tokenizer: &Tokenizer,
    pairs: &[(&str, &str)],
) -> Result<Vec<f32>> {
    let encodings: Vec<_> = pairs
        .iter()
        .map(|&(premise, hypothesis)| {
            tokenizer
                .encode((premise, hypothesis), true)
                .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))
        })
        .collect::<Result<Vec<_>>>()?;

    let batch_size = encodings.len();
    let max_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);

    let mut input_ids_flat: Vec<i64> = Vec::with_capacity(batch_size * max_len);
    let mut attention_mask_flat: Vec<i64> = Vec::with_capacity(batch_size * max_len);

    for enc in &encodings {
        let ids = enc.get_ids();
        let pad_len = max_len - ids.len();
        input_ids_flat.extend(ids.iter().map(|&id| id as i64));
        attention_mask_flat.extend(enc.get_attention_mask().iter().map(|&m| m as i64));
        input_ids_flat.extend(std::iter::repeat_n(PAD_TOKEN_ID, pad_len));
        attention_mask_flat.extend(std::iter::repeat_n(0i64, pad_len));
    }

    let shape = [batch_size as i64, max_len as i64];
    let input_ids_tensor =
        Tensor::from_array((shape, input_ids_flat)).context("Failed to create input_ids tensor")?;
    let attention_mask_tensor = Tensor::from_array((shape, attention_mask_flat))
        .context("Failed to create attention_mask tensor")?;

    let logits = {
        let mut session = session
            .lock()
            .map_err(|e| anyhow::anyhow!("Session lock poisoned: {}", e))?;

        let outputs = session
            .run(ort::inputs! {
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor
            })
            .context("NLI ONNX inference failed")?;

        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract NLI logits")?;

        data.to_vec()
    };

    if logits.len() != batch_size * NLI_CLASSES {
        anyhow::bail!(
            "NLI model returned {} logits for {} pairs",
            logits.len(),
            batch_size
        );
    }

    Ok(logits
        .chunks(NLI_CLASSES)
        .map(|row| row[ENTAILMENT_INDEX])
        .collect())
}

/// Numerically stable softmax.
fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0, 4.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[3] > probs[0]);
    }

    #[test]
    fn test_softmax_handles_large_logits() {
        let probs = softmax(&[1000.0, 1000.0]);
        assert!((probs[0] - 0.5).abs() < 1e-5);
        assert!(probs.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_hypothesis_template() {
        assert_eq!(HYPOTHESIS_TEMPLATE.replace("{}", "Claim"), "This example is Claim.");
    }

    /// Whitespace word-level tokenizer with no special tokens.
    fn word_tokenizer() -> Tokenizer {
        let json = r#"{
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [],
            "normalizer": null,
            "pre_tokenizer": {"type": "WhitespaceSplit"},
            "post_processor": null,
            "decoder": null,
            "model": {"type": "WordLevel", "vocab": {"[UNK]": 0, "opinion": 1, "claim": 2}, "unk_token": "[UNK]"}
        }"#;
        Tokenizer::from_bytes(json).unwrap()
    }

    #[test]
    fn test_long_premise_is_cut_to_position_limit() {
        let mut tokenizer = word_tokenizer();
        truncate_premise(&mut tokenizer).unwrap();

        let premise = "opinion ".repeat(3000);
        let hypothesis = "claim claim claim";
        let enc = tokenizer.encode((premise.as_str(), hypothesis), true).unwrap();

        let ids = enc.get_ids();
        assert_eq!(ids.len(), MAX_PAIR_TOKENS);
        assert_eq!(&ids[ids.len() - 3..], &[2, 2, 2]);
    }

    #[test]
    fn test_short_pair_is_untouched() {
        let mut tokenizer = word_tokenizer();
        truncate_premise(&mut tokenizer).unwrap();

        let enc = tokenizer.encode(("opinion opinion", "claim"), true).unwrap();
        assert_eq!(enc.get_ids(), &[1, 1, 2]);
    }

    #[test]
    fn test_load_fails_without_model_files() {
        let dir = std::env::temp_dir().join("opinion-analyzer-nli-missing");
        let err = NliZeroShotClassifier::load(&dir).err().unwrap();
        assert!(err.to_string().contains("Zero-shot model not found"));
    }
}
