
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::EmbeddingConfig;
use crate::embeddings::Embedder;
use crate::http::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_TIMEOUT_SECONDS, new_agent, request_with_retry};

/// Client for the Gemini `embedContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    base_url: Url,
    model: String,
    dimension: u32,
    api_key: String,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest {
    content: EmbedContent,
    output_dimensionality: u32,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Option<EmbedVector>,
}

#[derive(Debug, Deserialize)]
struct EmbedVector {
    #[serde(default)]
    values: Vec<f32>,
}

impl GeminiClient {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base_url =
            Url::parse(&config.base_url).context("Failed to parse embedding provider URL")?;

        Ok(Self {
            base_url,
            model: config.model.clone(),
            dimension: config.dimension,
            api_key: config.api_key.clone(),
            agent: new_agent(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    fn embed_url(&self) -> Result<Url> {
        let path = format!(
            "{}/models/{}:embedContent",
            self.base_url.path().trim_end_matches('/'),
            self.model
        );
        let mut url = self.base_url.clone();
        url.set_path(&path);
        Ok(url)
    }
}

#[async_trait]
impl Embedder for GeminiClient {
    #[inline]
    fn dimension(&self) -> usize {
        self.dimension as usize
    }

    #[inline]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());

        let request = EmbedRequest {
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
            output_dimensionality: self.dimension,
        };

        let url = self.embed_url()?;
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let response_text = request_with_retry("gemini embed", self.retry_attempts, || {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .header("x-goog-api-key", &self.api_key)
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .context("Failed to generate embedding")?;

        let embed_response: EmbedResponse =
            serde_json::from_str(&response_text).context("Failed to parse embedding response")?;

        // A response with no vector is a sentinel, not an error; the caller
        // decides whether to skip the chunk.
        let values = embed_response
            .embedding
            .map(|e| e.values)
            .unwrap_or_default();

        debug!("Generated embedding with {} dimensions", values.len());

        Ok(values)
    }
}
