//! HTTP embedding and rerank clients.
//!
//! [`HttpEmbedder`] speaks the OpenAI-compatible `/embeddings` protocol used by
//! Voyage, OpenAI and most self-hosted servers. Voyage additionally gets
//! `input_type: "document"` / `"query"`. [`HttpReranker`] speaks the
//! `/rerank` protocol returning `{index, relevance_score}` items.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sightline_core::{EmbeddingConfig, RerankerConfig, SightlineError};
use tracing::debug;

use crate::provider::{sort_scores, EmbeddingProvider, RerankScore, Reranker};

const VOYAGE_BASE_URL: &str = "https://api.voyageai.com/v1";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Voyage accepts up to 128 texts per request.
const MAX_BATCH_SIZE: usize = 128;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    input_type: Option<&'a str>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDataItem>,
}

#[derive(Deserialize)]
struct EmbedDataItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
}

#[derive(Deserialize)]
struct RerankResponse {
    #[serde(alias = "results")]
    data: Vec<RerankItem>,
}

#[derive(Deserialize)]
struct RerankItem {
    index: usize,
    #[serde(alias = "score")]
    relevance_score: f64,
}

/// Client for OpenAI-compatible embedding endpoints.
///
/// # Examples
///
/// ```
/// use sightline_core::EmbeddingConfig;
/// use sightline_lens::{EmbeddingProvider, HttpEmbedder};
///
/// let config = EmbeddingConfig { api_key: Some("test-key".into()), ..EmbeddingConfig::default() };
/// let embedder = HttpEmbedder::with_config(&config).unwrap();
/// assert_eq!(embedder.name(), "voyage");
/// assert_eq!(embedder.dimensions(), 1024);
/// ```
pub struct HttpEmbedder {
    client: reqwest::Client,
    provider: String,
    api_key: Option<String>,
    base_url: String,
    model: String,
    dimensions: usize,
    max_tokens: usize,
}

impl std::fmt::Debug for HttpEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbedder")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl HttpEmbedder {
    /// Create a client from an [`EmbeddingConfig`].
    ///
    /// A `base_url` override allows keyless local servers; the hosted
    /// providers require an API key.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::Config`] if no API key is available for a
    /// hosted provider, or if the HTTP client cannot be built.
    pub fn with_config(config: &EmbeddingConfig) -> Result<Self, SightlineError> {
        let api_key = config.resolve_api_key();
        let base_url = match (&config.base_url, config.provider.as_str()) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, "voyage") => VOYAGE_BASE_URL.to_string(),
            (None, "openai") => OPENAI_BASE_URL.to_string(),
            (None, other) => {
                return Err(SightlineError::Config(format!(
                    "embedding provider '{other}' needs embedding.base_url"
                )))
            }
        };
        if api_key.is_none() && config.base_url.is_none() {
            return Err(SightlineError::Config(format!(
                "embedding API key not found: set embedding.api_key in .sightline.toml or {}_API_KEY",
                config.provider.to_uppercase()
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SightlineError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            provider: config.provider.clone(),
            api_key,
            base_url,
            model: config.model.clone(),
            dimensions: config.dimensions,
            max_tokens: config.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn input_type<'a>(&self, kind: &'a str) -> Option<&'a str> {
        (self.provider == "voyage").then_some(kind)
    }

    async fn request(&self, texts: &[String], input_type: Option<&str>) -> Result<Vec<Vec<f32>>, SightlineError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
            input_type,
        };
        let mut builder = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| request_error(&self.provider, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".into());
            return Err(status_error(&self.provider, status, &body));
        }

        let mut parsed: EmbedResponse = response.json().await.map_err(|e| {
            SightlineError::transient(&self.provider, format!("failed to parse response: {e}"))
        })?;
        parsed.data.sort_by_key(|item| item.index);
        if parsed.data.len() != texts.len() {
            return Err(SightlineError::transient(
                &self.provider,
                format!("expected {} embeddings, got {}", texts.len(), parsed.data.len()),
            ));
        }
        debug!(provider = %self.provider, texts = texts.len(), "embedded batch");
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    fn name(&self) -> &str {
        &self.provider
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    fn max_batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SightlineError> {
        self.request(texts, self.input_type("document")).await
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, SightlineError> {
        self.request(&[query.to_string()], self.input_type("query"))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SightlineError::transient(&self.provider, "empty response for query"))
    }

    async fn available(&self) -> Result<(), SightlineError> {
        let probe = self.embed_query("ping").await?;
        if probe.len() != self.dimensions {
            return Err(SightlineError::DimensionMismatch {
                expected: self.dimensions,
                actual: probe.len(),
            });
        }
        Ok(())
    }
}

/// Client for `/rerank` endpoints (Voyage, Cohere-compatible, TEI).
pub struct HttpReranker {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    max_documents: usize,
}

impl std::fmt::Debug for HttpReranker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpReranker")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl HttpReranker {
    /// # Errors
    ///
    /// Returns [`SightlineError::Config`] if the HTTP client cannot be built.
    pub fn with_config(config: &RerankerConfig) -> Result<Self, SightlineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SightlineError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: config.resolve_api_key(),
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(VOYAGE_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone(),
            max_documents: config.max_documents,
        })
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    fn name(&self) -> &str {
        "http"
    }

    fn max_documents(&self) -> usize {
        self.max_documents
    }

    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<RerankScore>, SightlineError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let request = RerankRequest {
            model: &self.model,
            query,
            documents,
        };
        let mut builder = self
            .client
            .post(format!("{}/rerank", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.map_err(|e| request_error("rerank", e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("rerank", status, &body));
        }
        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| SightlineError::transient("rerank", format!("failed to parse response: {e}")))?;

        let mut scores: Vec<RerankScore> = parsed
            .data
            .into_iter()
            .map(|item| RerankScore {
                index: item.index,
                score: item.relevance_score,
            })
            .collect();
        sort_scores(&mut scores);
        Ok(scores)
    }
}

fn request_error(provider: &str, err: reqwest::Error) -> SightlineError {
    if err.is_timeout() || err.is_connect() {
        SightlineError::transient(provider, format!("HTTP request failed: {err}"))
    } else {
        SightlineError::persistent(provider, format!("HTTP request failed: {err}"))
    }
}

/// 429 and 5xx are worth retrying; auth and unknown-model errors are not.
fn status_error(provider: &str, status: StatusCode, body: &str) -> SightlineError {
    let message = format!("API returned {status}: {body}");
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        SightlineError::transient(provider, message)
    } else {
        SightlineError::persistent(provider, message)
    }
}
