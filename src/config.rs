use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::classify::onnx::DEFAULT_PAIR_BATCH;
use crate::download::{self, EMBEDDING_MODEL, ZERO_SHOT_MODEL};
use crate::summarize::conclusions::DEFAULT_SUMMARY_BATCH_SIZE;
use crate::summarize::http::DEFAULT_SUMMARIZER_URL;
use crate::text::normalize::DEFAULT_MAX_LENGTH;

/// Opinions per classification batch in file mode.
pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// Concurrent pipeline invocations the HTTP service admits.
pub const DEFAULT_SERVER_WORKERS: usize = 10;

/// Largest JSON body the HTTP service accepts (64 MiB).
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 64 * 1024 * 1024;

/// Central configuration loaded from environment variables.
///
/// Secrets come from env vars only. The .env file is loaded automatically at
/// startup via dotenvy.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the embedding and zero-shot model subdirectories
    pub model_dir: PathBuf,
    pub batch_size: usize,
    pub summary_batch_size: usize,
    /// Normalizer truncation limit, in characters
    pub max_text_length: usize,
    /// (text, label) pairs per zero-shot forward pass
    pub nli_pair_batch: usize,
    pub output_dir: PathBuf,
    pub summarizer_url: String,
    /// Bearer token for the summarization endpoint, if it needs one
    pub summarizer_token: Option<String>,
    /// Client-side request cap for the summarization endpoint
    pub summarizer_qps: Option<f64>,
    pub server_workers: usize,
    pub max_request_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables. Everything has a
    /// default; malformed numbers are an error rather than silently ignored.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup. `load` uses the process
    /// environment; tests pass a map.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            model_dir: get("OPINION_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(download::default_model_dir),
            batch_size: parse_positive(get("OPINION_BATCH_SIZE"), "OPINION_BATCH_SIZE")?
                .unwrap_or(DEFAULT_BATCH_SIZE),
            summary_batch_size: parse_positive(
                get("OPINION_SUMMARY_BATCH_SIZE"),
                "OPINION_SUMMARY_BATCH_SIZE",
            )?
            .unwrap_or(DEFAULT_SUMMARY_BATCH_SIZE),
            max_text_length: parse_positive(get("OPINION_MAX_TEXT_LENGTH"), "OPINION_MAX_TEXT_LENGTH")?
                .unwrap_or(DEFAULT_MAX_LENGTH),
            nli_pair_batch: parse_positive(get("OPINION_NLI_PAIR_BATCH"), "OPINION_NLI_PAIR_BATCH")?
                .unwrap_or(DEFAULT_PAIR_BATCH),
            output_dir: get("OPINION_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("outputs")),
            summarizer_url: get("OPINION_SUMMARIZER_URL")
                .unwrap_or_else(|| DEFAULT_SUMMARIZER_URL.to_string()),
            summarizer_token: get("OPINION_SUMMARIZER_TOKEN"),
            summarizer_qps: get("OPINION_SUMMARIZER_QPS")
                .map(|v| {
                    v.trim()
                        .parse::<f64>()
                        .ok()
                        .filter(|q| q.is_finite() && *q > 0.0)
                        .with_context(|| format!("OPINION_SUMMARIZER_QPS must be a positive number, got {v:?}"))
                })
                .transpose()?,
            server_workers: parse_positive(get("OPINION_SERVER_WORKERS"), "OPINION_SERVER_WORKERS")?
                .unwrap_or(DEFAULT_SERVER_WORKERS),
            max_request_bytes: parse_positive(
                get("OPINION_MAX_REQUEST_BYTES"),
                "OPINION_MAX_REQUEST_BYTES",
            )?
            .unwrap_or(DEFAULT_MAX_REQUEST_BYTES),
        })
    }

    /// Check that both local models are downloaded.
    /// Call this before building the inference collaborators.
    pub fn require_models(&self) -> Result<()> {
        let missing: Vec<PathBuf> = [&EMBEDDING_MODEL, &ZERO_SHOT_MODEL]
            .iter()
            .flat_map(|spec| spec.missing_files(&self.model_dir))
            .collect();

        if !missing.is_empty() {
            let list = missing
                .iter()
                .map(|p| format!("  {}", p.display()))
                .collect::<Vec<_>>()
                .join("\n");
            anyhow::bail!(
                "Model files not found:\n{}\n\
                 Run `opinion-analyzer download-model` to download them.\n\
                 Or set OPINION_MODEL_DIR to where they already live.",
                list
            );
        }
        Ok(())
    }

    /// Check that the summarization endpoint is usable.
    /// The hosted default requires a token; a custom endpoint may not.
    pub fn require_summarizer(&self) -> Result<()> {
        if !self.summarizer_url.starts_with("http://") && !self.summarizer_url.starts_with("https://") {
            anyhow::bail!(
                "OPINION_SUMMARIZER_URL must be an http(s) URL, got {:?}",
                self.summarizer_url
            );
        }
        if self.summarizer_url == DEFAULT_SUMMARIZER_URL && self.summarizer_token.is_none() {
            anyhow::bail!(
                "OPINION_SUMMARIZER_TOKEN not set. The hosted summarizer needs a HuggingFace token.\n\
                 Add it to your .env file, or point OPINION_SUMMARIZER_URL at your own endpoint."
            );
        }
        Ok(())
    }
}

fn parse_positive(value: Option<String>, key: &str) -> Result<Option<usize>> {
    value
        .map(|v| match v.trim().parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => anyhow::bail!("{key} must be a positive integer, got {v:?}"),
        })
        .transpose()
}
