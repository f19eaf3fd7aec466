// Summarization over a HuggingFace-inference-compatible HTTP endpoint.
//
// Sends the whole batch in one request:
//   {"inputs": [...], "parameters": {max_length, min_length, ..., truncation}}
// and expects one `{"summary_text": ...}` object back per input, in order.
// Works against the hosted inference API and self-hosted text-generation
// servers running facebook/bart-large-cnn.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::rate_limiter::RateLimiter;
use super::traits::{GenerationConfig, Summarizer};

/// Inputs past the encoder's 1024 positions are cut server-side.
const INPUT_TRUNCATION: &str = "only_first";

/// Hosted bart-large-cnn, used when no endpoint is configured.
pub const DEFAULT_SUMMARIZER_URL: &str =
    "https://router.huggingface.co/hf-inference/models/facebook/bart-large-cnn";

pub struct HttpSummarizer {
    client: Client,
    url: String,
    token: Option<String>,
    rate_limiter: Option<RateLimiter>,
}

impl HttpSummarizer {
    pub fn new(url: String, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            url,
            token,
            rate_limiter: None,
        }
    }

    /// Pace requests to at most `qps` per second.
    pub fn with_rate_limit(mut self, qps: f64) -> Self {
        self.rate_limiter = Some(RateLimiter::new(qps));
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize(&self, texts: &[String], config: &GenerationConfig) -> Result<Vec<String>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(limiter) = &self.rate_limiter {
            limiter.acquire().await;
        }

        let request = SummarizeRequest {
            inputs: texts,
            parameters: RequestParameters::new(config),
            options: RequestOptions {
                wait_for_model: true,
            },
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .context("Failed to call summarization endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Summarization endpoint returned {}: {}", status, body);
        }

        let summaries: Vec<SummaryItem> = response
            .json()
            .await
            .context("Failed to parse summarization response")?;

        if summaries.len() != texts.len() {
            anyhow::bail!(
                "Summarization endpoint returned {} summaries for {} inputs",
                summaries.len(),
                texts.len()
            );
        }

        debug!(inputs = texts.len(), "Summarized batch");

        Ok(summaries.into_iter().map(|s| s.summary_text).collect())
    }
}

// --- Inference API request/response types ---

#[derive(Serialize)]
struct SummarizeRequest<'a> {
    inputs: &'a [String],
    parameters: RequestParameters<'a>,
    options: RequestOptions,
}

#[derive(Serialize)]
struct RequestParameters<'a> {
    #[serde(flatten)]
    generation: &'a GenerationConfig,
    truncation: &'static str,
}

impl<'a> RequestParameters<'a> {
    fn new(generation: &'a GenerationConfig) -> Self {
        Self {
            generation,
            truncation: INPUT_TRUNCATION,
        }
    }
}

#[derive(Serialize)]
struct RequestOptions {
    wait_for_model: bool,
}

#[derive(Deserialize)]
struct SummaryItem {
    summary_text: String,
}
