use anyhow::{anyhow, bail, Result};
use std::time::Duration;
use tracing::warn;

use docsync_core::config::EmbeddingConfig;
use docsync_core::traits::Embedder;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Embedder backed by an OpenAI-compatible embeddings endpoint.
///
/// Requires `OPENAI_API_KEY`. HTTP 429 and 5xx responses and network errors
/// are retried with exponential backoff (1s, 2s, 4s, ... capped at 32s);
/// other 4xx responses fail immediately.
pub struct OpenAiEmbedder {
    client: reqwest::blocking::Client,
    api_key: String,
    endpoint: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let base = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            endpoint: format!("{base}/v1/embeddings"),
            model,
            dims,
            max_retries: config.max_retries,
        })
    }
}

impl Embedder for OpenAiEmbedder {
    fn dim(&self) -> usize {
        self.dims
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({ "model": self.model, "input": [text] });
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                warn!("Retrying embedding request in {:?} (attempt {})", delay, attempt + 1);
                std::thread::sleep(delay);
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send();

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response.json()?;
                        return parse_embedding_response(&json);
                    }
                    let body_text = response.text().unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow!("Embedding API error {}: {}", status, body_text));
                        continue;
                    }
                    bail!("Embedding API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Embedding failed after retries")))
    }
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let first = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .ok_or_else(|| anyhow!("Invalid embedding response: missing data array"))?;
    let embedding = first
        .get("embedding")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid embedding response: missing embedding"))?;
    embedding
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32).ok_or_else(|| anyhow!("Invalid embedding value: {v}")))
        .collect()
}
