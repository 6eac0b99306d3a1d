//! Vector index clients.

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{PointId, SearchPointsBuilder, Value as QdrantValue};
use qdrant_client::Qdrant;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::{VectorBackend, VectorIndexConfig};
use crate::error::{Error, Result};

/// A nearest-neighbour hit with its flattened metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    /// Similarity in [0, 1]; `None` when the index omitted it
    pub score: Option<f32>,
    pub metadata: HashMap<String, String>,
}

impl VectorMatch {
    /// Metadata value, treating blank strings as absent.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Nearest-neighbour search over alumni embeddings.
#[async_trait]
pub trait VectorIndexClient: Send + Sync {
    /// Return up to `top_k` matches for `vector`, best first.
    ///
    /// Fails with [`Error::IndexQuery`].
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<VectorMatch>>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PineconeQuery<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PineconeResponse {
    #[serde(default)]
    matches: Vec<PineconeMatch>,
}

#[derive(Debug, Deserialize)]
struct PineconeMatch {
    id: String,
    score: Option<f32>,
    #[serde(default)]
    metadata: HashMap<String, JsonValue>,
}

/// Pinecone data-plane client (`POST {index_host}/query`).
pub struct PineconeIndexClient {
    client: Client,
    host: String,
    api_key: String,
    namespace: Option<String>,
}

impl PineconeIndexClient {
    pub fn new(config: &VectorIndexConfig) -> Result<Self> {
        let api_key = config.resolved_api_key().ok_or_else(|| {
            Error::Config(
                "vector_index.api_key is not set and PINECONE_API_KEY is empty".to_string(),
            )
        })?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            host: config.url.trim_end_matches('/').to_string(),
            api_key,
            namespace: config.namespace.clone(),
        })
    }
}

#[async_trait]
impl VectorIndexClient for PineconeIndexClient {
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<VectorMatch>> {
        let body = PineconeQuery {
            vector,
            top_k,
            include_metadata,
            namespace: self.namespace.as_deref(),
        };

        let response: PineconeResponse = self
            .client
            .post(format!("{}/query", self.host))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::IndexQuery(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::IndexQuery(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::IndexQuery(format!("invalid response body: {}", e)))?;

        Ok(response
            .matches
            .into_iter()
            .map(|m| VectorMatch {
                id: m.id,
                score: m.score,
                metadata: m
                    .metadata
                    .into_iter()
                    .filter_map(|(k, v)| json_to_display(&v).map(|v| (k, v)))
                    .collect(),
            })
            .collect())
    }
}

/// Qdrant client over gRPC.
pub struct QdrantIndexClient {
    client: Qdrant,
    collection: String,
}

impl QdrantIndexClient {
    pub fn new(config: &VectorIndexConfig) -> Result<Self> {
        let client = Qdrant::from_url(&config.url)
            .api_key(config.resolved_api_key())
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("Qdrant client: {}", e)))?;

        Ok(Self {
            client,
            collection: config.collection.clone(),
        })
    }
}

#[async_trait]
impl VectorIndexClient for QdrantIndexClient {
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<VectorMatch>> {
        let request = SearchPointsBuilder::new(&self.collection, vector.to_vec(), top_k as u64)
            .with_payload(include_metadata);

        let response = self
            .client
            .search_points(request)
            .await
            .map_err(|e| Error::IndexQuery(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| VectorMatch {
                id: point.id.as_ref().map(point_id_to_string).unwrap_or_default(),
                score: Some(point.score),
                metadata: point
                    .payload
                    .iter()
                    .filter_map(|(k, v)| qdrant_to_display(v).map(|v| (k.clone(), v)))
                    .collect(),
            })
            .collect())
    }
}

/// Stand-in for a vector index that could not be reached at startup.
pub struct UnavailableIndexClient {
    reason: String,
}

impl UnavailableIndexClient {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl VectorIndexClient for UnavailableIndexClient {
    async fn query(
        &self,
        _vector: &[f32],
        _top_k: usize,
        _include_metadata: bool,
    ) -> Result<Vec<VectorMatch>> {
        Err(Error::IndexQuery(format!("vector index disabled: {}", self.reason)))
    }
}

/// Build the configured index client; failures are logged and yield an
/// [`UnavailableIndexClient`].
pub fn connect_index(config: &VectorIndexConfig) -> Arc<dyn VectorIndexClient> {
    let built: Result<Arc<dyn VectorIndexClient>> = match config.backend {
        VectorBackend::Pinecone => {
            PineconeIndexClient::new(config).map(|c| Arc::new(c) as Arc<dyn VectorIndexClient>)
        }
        VectorBackend::Qdrant => {
            QdrantIndexClient::new(config).map(|c| Arc::new(c) as Arc<dyn VectorIndexClient>)
        }
    };

    built.unwrap_or_else(|e| {
        warn!("Failed to initialize vector index: {}", e);
        warn!("Semantic search will be disabled, using relational search only");
        Arc::new(UnavailableIndexClient::new(e.to_string()))
    })
}

fn point_id_to_string(id: &PointId) -> String {
    match &id.point_id_options {
        Some(PointIdOptions::Num(n)) => n.to_string(),
        Some(PointIdOptions::Uuid(u)) => u.clone(),
        None => String::new(),
    }
}

/// Render a JSON metadata value as display text. Nulls and objects are dropped.
fn json_to_display(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        }),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Array(items) => Some(
            items
                .iter()
                .filter_map(json_to_display)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        JsonValue::Null | JsonValue::Object(_) => None,
    }
}

fn qdrant_to_display(value: &QdrantValue) -> Option<String> {
    match value.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.clone()),
        Kind::IntegerValue(i) => Some(i.to_string()),
        Kind::DoubleValue(f) if f.fract() == 0.0 && f.abs() < 1e15 => {
            Some(format!("{}", *f as i64))
        }
        Kind::DoubleValue(f) => Some(f.to_string()),
        Kind::BoolValue(b) => Some(b.to_string()),
        Kind::ListValue(list) => Some(
            list.values
                .iter()
                .filter_map(qdrant_to_display)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Kind::NullValue(_) | Kind::StructValue(_) => None,
    }
}
