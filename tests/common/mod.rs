// Deterministic stand-ins for the inference collaborators, shared by the
// integration tests. No model weights or network needed.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use opinion_analyzer::classify::traits::{rank_labels, LabelScore, ZeroShotClassifier};
use opinion_analyzer::pipeline::PipelineOrchestrator;
use opinion_analyzer::resources::ResourceScope;
use opinion_analyzer::summarize::{GenerationConfig, Summarizer};
use opinion_analyzer::text::TextNormalizer;
use opinion_analyzer::topics::traits::Embedder;

/// Vocabulary axes for the keyword embedder.
const AXES: &[&[&str]] = &[
    &["climate", "temperature", "warming", "rain", "fact"],
    &["tax", "budget", "price", "economy"],
    &["school", "teacher", "education"],
];

/// Embeds a text as keyword counts per axis, plus a small constant so no
/// vector is all zeros.
pub struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn dimension(&self) -> usize {
        AXES.len() + 1
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v: Vec<f32> = AXES
                    .iter()
                    .map(|words| words.iter().filter(|w| t.contains(**w)).count() as f32)
                    .collect();
                v.push(0.01);
                v
            })
            .collect())
    }
}

/// Counterclaim for texts containing "true" or "wrong", Evidence for texts
/// mentioning "data", otherwise Claim. Fails any batch containing "poison".
/// Records the size of every batch it sees.
#[derive(Default)]
pub struct RuleClassifier {
    pub batch_sizes: Mutex<Vec<usize>>,
}

#[async_trait]
impl ZeroShotClassifier for RuleClassifier {
    async fn classify(&self, texts: &[String], labels: &[&str]) -> Result<Vec<Vec<LabelScore>>> {
        if let Ok(mut sizes) = self.batch_sizes.lock() {
            sizes.push(texts.len());
        }
        if texts.iter().any(|t| t.contains("poison")) {
            anyhow::bail!("classifier crashed on batch");
        }
        Ok(texts
            .iter()
            .map(|t| {
                let wanted = if t.contains("true") || t.contains("wrong") {
                    "Counterclaim"
                } else if t.contains("data") {
                    "Evidence"
                } else {
                    "Claim"
                };
                let scores: Vec<f32> = labels
                    .iter()
                    .map(|l| if *l == wanted { 0.9 } else { 0.03 })
                    .collect();
                rank_labels(labels, &scores)
            })
            .collect())
    }
}

/// Summarizes each text as "summary of <text>".
#[derive(Default)]
pub struct PrefixSummarizer {
    pub calls: Mutex<usize>,
}

#[async_trait]
impl Summarizer for PrefixSummarizer {
    async fn summarize(&self, texts: &[String], config: &GenerationConfig) -> Result<Vec<String>> {
        assert_eq!(config, &GenerationConfig::default());
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }
        Ok(texts.iter().map(|t| format!("summary of {t}")).collect())
    }
}

/// Small stopword list so expected outputs stay short and obvious.
pub fn test_normalizer() -> TextNormalizer {
    TextNormalizer::with_stop_words(
        [
            "i", "is", "a", "the", "that", "at", "all", "not", "no", "and", "of", "to", "it",
        ],
        1024,
    )
}

pub struct Harness {
    pub orchestrator: PipelineOrchestrator,
    pub classifier: Arc<RuleClassifier>,
    pub summarizer: Arc<PrefixSummarizer>,
    pub scope: ResourceScope,
}

pub fn harness(batch_size: usize) -> Harness {
    let classifier = Arc::new(RuleClassifier::default());
    let summarizer = Arc::new(PrefixSummarizer::default());
    let scope = ResourceScope::default();
    let orchestrator = PipelineOrchestrator::new(
        Arc::new(KeywordEmbedder),
        classifier.clone(),
        summarizer.clone(),
        scope.clone(),
    )
    .with_normalizer(test_normalizer())
    .with_batch_size(batch_size);

    Harness {
        orchestrator,
        classifier,
        summarizer,
        scope,
    }
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
