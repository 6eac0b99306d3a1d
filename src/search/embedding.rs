//! Embedding generation.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use moka::future::Cache;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use crate::error::{Error, Result};

/// Output length of the bundled FastEmbed model (all-MiniLM-L6-v2).
pub const FASTEMBED_DIMENSIONS: usize = 384;

/// Turns text into a fixed-length vector.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed `text` as a vector of exactly `dimensions` values.
    ///
    /// Fails with [`Error::Embedding`] on quota, auth, network or model errors.
    async fn embed(&self, text: &str, dimensions: usize) -> Result<Vec<f32>>;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI `/embeddings` client.
pub struct OpenAiEmbeddingClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiEmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config.resolved_api_key().ok_or_else(|| {
            Error::Config("embedding.api_key is not set and OPENAI_API_KEY is empty".to_string())
        })?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn embed(&self, text: &str, dimensions: usize) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
            dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Embedding(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Embedding(e.to_string()))?;

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("invalid response body: {}", e)))?;

        let embedding = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::Embedding("response contained no embeddings".to_string()))?;

        check_dimensions(embedding, dimensions)
    }
}

/// Local embeddings through FastEmbed (ONNX, no network after the first
/// model download).
pub struct FastEmbedClient {
    model: Arc<TextEmbedding>,
}

impl FastEmbedClient {
    /// Load the default model, downloading it on first use.
    pub fn new() -> Result<Self> {
        let model = TextEmbedding::try_new(InitOptions::new(EmbeddingModel::AllMiniLML6V2))
            .map_err(|e| Error::Embedding(format!("failed to load model: {}", e)))?;
        Ok(Self {
            model: Arc::new(model),
        })
    }
}

#[async_trait]
impl EmbeddingClient for FastEmbedClient {
    async fn embed(&self, text: &str, dimensions: usize) -> Result<Vec<f32>> {
        if dimensions != FASTEMBED_DIMENSIONS {
            return Err(Error::Embedding(format!(
                "local model produces {} dimensions, {} requested",
                FASTEMBED_DIMENSIONS, dimensions
            )));
        }

        let model = Arc::clone(&self.model);
        let document = text.to_string();
        let mut embeddings = tokio::task::spawn_blocking(move || model.embed(vec![document], None))
            .await
            .map_err(|e| Error::Embedding(format!("embedding task failed: {}", e)))?
            .map_err(|e| Error::Embedding(e.to_string()))?;

        let embedding = embeddings
            .pop()
            .ok_or_else(|| Error::Embedding("model returned no embeddings".to_string()))?;
        check_dimensions(embedding, dimensions)
    }
}

/// Stand-in for an embedding model that could not be initialised.
///
/// Every call fails, so searches take the relational fallback.
pub struct UnavailableEmbeddingClient {
    reason: String,
}

impl UnavailableEmbeddingClient {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl EmbeddingClient for UnavailableEmbeddingClient {
    async fn embed(&self, _text: &str, _dimensions: usize) -> Result<Vec<f32>> {
        Err(Error::Embedding(format!("embedding disabled: {}", self.reason)))
    }
}

/// Build the configured embedding client, wrapped in the cache when enabled.
///
/// Initialisation failures are logged and yield an
/// [`UnavailableEmbeddingClient`]; semantic search is then disabled.
pub fn connect_embedder(config: &EmbeddingConfig) -> Arc<dyn EmbeddingClient> {
    let built: Result<Arc<dyn EmbeddingClient>> = match config.backend {
        EmbeddingBackend::OpenAi => {
            OpenAiEmbeddingClient::new(config).map(|c| Arc::new(c) as Arc<dyn EmbeddingClient>)
        }
        EmbeddingBackend::FastEmbed => {
            info!("Loading local embedding model (downloads ~90MB on first use)...");
            FastEmbedClient::new().map(|c| Arc::new(c) as Arc<dyn EmbeddingClient>)
        }
    };

    let embedder = match built {
        Ok(embedder) => embedder,
        Err(e) => {
            warn!("Failed to initialize embeddings: {}", e);
            warn!("Semantic search will be disabled, using relational search only");
            return Arc::new(UnavailableEmbeddingClient::new(e.to_string()));
        }
    };

    if config.cache_capacity == 0 {
        return embedder;
    }
    Arc::new(CachedEmbeddingClient::new(
        embedder,
        config.cache_capacity,
        Duration::from_secs(config.cache_ttl_secs),
    ))
}

fn check_dimensions(embedding: Vec<f32>, dimensions: usize) -> Result<Vec<f32>> {
    if embedding.len() != dimensions {
        return Err(Error::Embedding(format!(
            "expected {} dimensions, got {}",
            dimensions,
            embedding.len()
        )));
    }
    Ok(embedding)
}

/// Memoizes embeddings of repeated search texts.
pub struct CachedEmbeddingClient {
    inner: Arc<dyn EmbeddingClient>,
    cache: Cache<(String, usize), Arc<Vec<f32>>>,
}

impl CachedEmbeddingClient {
    pub fn new(inner: Arc<dyn EmbeddingClient>, capacity: u64, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl EmbeddingClient for CachedEmbeddingClient {
    async fn embed(&self, text: &str, dimensions: usize) -> Result<Vec<f32>> {
        let key = (text.to_string(), dimensions);
        if let Some(hit) = self.cache.get(&key).await {
            debug!(dimensions, "embedding cache hit");
            return Ok(hit.as_ref().clone());
        }

        let embedding = self.inner.embed(text, dimensions).await?;
        self.cache.insert(key, Arc::new(embedding.clone())).await;
        Ok(embedding)
    }
}
