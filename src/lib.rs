//! # Milo Node
//!
//! Alumni discovery for students: semantic search over a vector index of
//! alumni profiles with a relational fallback, and chat answers streamed as
//! server-sent events.
//!
//! ## Modules
//!
//! - [`search`]: Query formulation, embedding, vector and relational search
//! - [`stream`]: Concurrent steps streamed as incremental events
//! - [`chat`]: The chat pipeline built on top of search and streaming
//! - [`api`]: HTTP server
//! - [`config`]: TOML node configuration
//! - [`metrics`]: Prometheus metrics
//! - [`error`]: Error types

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod metrics;
pub mod search;
pub mod stream;

pub use api::{ApiError, ApiServer, AppState, HealthResponse, RateLimitService, SearchResponse};
pub use chat::{ChatPipeline, CompletionClient, OpenAiCompletionClient};
pub use config::{
    ApiConfig, ChatConfig, CompletionConfig, EmbeddingBackend, EmbeddingConfig, MiloConfig,
    RateLimitConfig, RelationalConfig, SearchConfig, VectorBackend, VectorIndexConfig,
};
pub use error::{Error, Result};
pub use metrics::MetricsService;
pub use search::{
    AlumniResult, EmbeddingClient, QueryFormulator, RelationalSearchClient, SearchLimits,
    SearchOrchestrator, SearchPath, SearchRequest, StudentProfile, VectorIndexClient,
};
pub use stream::{StreamEvent, StreamSettings, StreamingResponder};
