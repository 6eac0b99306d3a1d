//! Node configuration.
//!
//! Loaded from a TOML file; every section and field has a default so a
//! partial file (or none at all) is valid. API keys left out of the file
//! are read from the environment.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::search::{SearchLimits, FASTEMBED_DIMENSIONS};

/// Environment variable consulted when no OpenAI key is configured.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Environment variable consulted when no Pinecone key is configured.
pub const PINECONE_API_KEY_ENV: &str = "PINECONE_API_KEY";
/// Environment variable consulted when no Qdrant key is configured.
pub const QDRANT_API_KEY_ENV: &str = "QDRANT_API_KEY";

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Top-level configuration for a Milo node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MiloConfig {
    pub api: ApiConfig,
    pub embedding: EmbeddingConfig,
    pub vector_index: VectorIndexConfig,
    pub relational: RelationalConfig,
    pub search: SearchConfig,
    pub chat: ChatConfig,
    pub completion: CompletionConfig,
    pub rate_limit: RateLimitConfig,
}

impl MiloConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: MiloConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.search.limits().validate()?;
        self.chat.limits().validate()?;

        if self.embedding.dimensions == 0 {
            return Err(Error::Config(
                "embedding.dimensions must be greater than zero".to_string(),
            ));
        }
        if self.embedding.backend == EmbeddingBackend::FastEmbed
            && self.embedding.dimensions != FASTEMBED_DIMENSIONS
        {
            return Err(Error::Config(format!(
                "embedding.dimensions must be {} for the fastembed backend, got {}",
                FASTEMBED_DIMENSIONS, self.embedding.dimensions
            )));
        }
        if self.chat.chars_per_chunk == 0 {
            return Err(Error::Config(
                "chat.chars_per_chunk must be greater than zero".to_string(),
            ));
        }
        if self.chat.channel_capacity == 0 {
            return Err(Error::Config(
                "chat.channel_capacity must be greater than zero".to_string(),
            ));
        }
        if self.rate_limit.requests_per_second == 0 {
            return Err(Error::Config(
                "rate_limit.requests_per_second must be greater than zero".to_string(),
            ));
        }
        if self.search.affiliation_keyword.trim().is_empty() {
            return Err(Error::Config(
                "search.affiliation_keyword must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Listen address for the HTTP server
    pub listen_address: String,
    /// Enable CORS
    pub cors_enabled: bool,
    /// Allowed origins (empty = any)
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:8080".to_string(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

/// Which embedding model backs the search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Hosted OpenAI embeddings endpoint
    #[default]
    OpenAi,
    /// Local ONNX model via FastEmbed
    FastEmbed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Model name (OpenAI backend only)
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    /// Requested vector length. Must match the index dimensionality.
    pub dimensions: usize,
    pub timeout_ms: u64,
    /// Cached embeddings (0 disables the cache)
    pub cache_capacity: u64,
    pub cache_ttl_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::OpenAi,
            model: "text-embedding-3-small".to_string(),
            base_url: OPENAI_BASE_URL.to_string(),
            api_key: None,
            dimensions: crate::search::DEFAULT_EMBEDDING_DIMENSIONS,
            timeout_ms: 15_000,
            cache_capacity: 1_024,
            cache_ttl_secs: 600,
        }
    }
}

impl EmbeddingConfig {
    /// Configured key, else `OPENAI_API_KEY`.
    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_key(&self.api_key, OPENAI_API_KEY_ENV)
    }
}

/// Which vector database holds the alumni embeddings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    Pinecone,
    /// Default; `url` points at the local gRPC port
    #[default]
    Qdrant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorIndexConfig {
    pub backend: VectorBackend,
    /// Index host (Pinecone) or gRPC URL (Qdrant)
    pub url: String,
    pub api_key: Option<String>,
    /// Qdrant collection name; ignored by Pinecone
    pub collection: String,
    /// Pinecone namespace; ignored by Qdrant
    pub namespace: Option<String>,
    pub timeout_ms: u64,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Qdrant,
            url: "http://localhost:6334".to_string(),
            api_key: None,
            collection: "yale-alumni".to_string(),
            namespace: None,
            timeout_ms: 10_000,
        }
    }
}

impl VectorIndexConfig {
    /// Configured key, else the backend's environment variable.
    pub fn resolved_api_key(&self) -> Option<String> {
        let env = match self.backend {
            VectorBackend::Pinecone => PINECONE_API_KEY_ENV,
            VectorBackend::Qdrant => QDRANT_API_KEY_ENV,
        };
        resolve_key(&self.api_key, env)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationalConfig {
    /// sqlx connection string
    pub database_url: String,
    pub max_connections: u32,
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://yale.db?mode=ro".to_string(),
            max_connections: 4,
        }
    }
}

/// Defaults for the `/api/search` call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub top_k: usize,
    /// Minimum similarity in [0, 1] for vector matches
    pub score_floor: f32,
    pub display_cap: usize,
    pub fallback_row_limit: usize,
    /// Case-insensitive substring identifying affiliated alumni
    pub affiliation_keyword: String,
    /// Optional boolean metadata field set at ingestion; `false` vetoes a match
    pub affiliation_flag_field: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            score_floor: 0.45,
            display_cap: 10,
            fallback_row_limit: 10,
            affiliation_keyword: "yale".to_string(),
            affiliation_flag_field: None,
        }
    }
}

impl SearchConfig {
    pub fn limits(&self) -> SearchLimits {
        SearchLimits {
            top_k: self.top_k,
            score_floor: self.score_floor,
            display_cap: self.display_cap,
            fallback_row_limit: self.fallback_row_limit,
        }
    }
}

/// Chat call site: search limits plus streaming cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub top_k: usize,
    pub score_floor: f32,
    pub display_cap: usize,
    pub fallback_row_limit: usize,
    /// Delay between text chunks
    pub char_delay_ms: u64,
    pub chars_per_chunk: usize,
    /// Buffered events per stream
    pub channel_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            top_k: 8,
            score_floor: 0.4,
            display_cap: 6,
            fallback_row_limit: 10,
            char_delay_ms: 15,
            chars_per_chunk: 2,
            channel_capacity: 64,
        }
    }
}

impl ChatConfig {
    pub fn limits(&self) -> SearchLimits {
        SearchLimits {
            top_k: self.top_k,
            score_floor: self.score_floor,
            display_cap: self.display_cap,
            fallback_row_limit: self.fallback_row_limit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: OPENAI_BASE_URL.to_string(),
            api_key: None,
            timeout_ms: 30_000,
            max_tokens: 600,
            temperature: 0.7,
        }
    }
}

impl CompletionConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_key(&self.api_key, OPENAI_API_KEY_ENV)
    }
}

/// Global request rate limit for `/api/*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: u32,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 20,
            burst_size: 40,
        }
    }
}

fn resolve_key(configured: &Option<String>, env: &str) -> Option<String> {
    configured
        .clone()
        .filter(|k| !k.trim().is_empty())
        .or_else(|| std::env::var(env).ok().filter(|k| !k.trim().is_empty()))
}
