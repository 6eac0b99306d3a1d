//! Alumni search.
//!
//! Finds alumni relevant to a student's question using:
//! - An embedding model (OpenAI or FastEmbed) to vectorize the query
//! - A vector index (Pinecone or Qdrant) for similarity search
//! - A relational alumni store (SQLite) as the fallback path
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │ query + profile │────▶│ QueryFormulator │
//! └─────────────────┘     └────────┬────────┘
//!                                  │ search text
//!                                  ▼
//!                        ┌────────────────────┐
//!                        │ SearchOrchestrator │
//!                        └─────────┬──────────┘
//!                    primary       │       fallback (error or empty)
//!                 ┌────────────────┴────────────────┐
//!                 ▼                                 ▼
//!        ┌─────────────────┐              ┌──────────────────┐
//!        │ EmbeddingClient │              │ RelationalSearch │
//!        └────────┬────────┘              │     (SQLite)     │
//!                 ▼                       └────────┬─────────┘
//!        ┌─────────────────┐                       │
//!        │   VectorIndex   │                       │
//!        └────────┬────────┘                       │
//!                 └────────────────┬───────────────┘
//!                                  ▼
//!                        ┌────────────────────┐
//!                        │  ResultNormalizer  │
//!                        │  → AlumniResult[]  │
//!                        └────────────────────┘
//! ```

mod embedding;
mod normalize;
mod orchestrator;
mod query;
mod relational;
#[cfg(test)]
pub(crate) mod testing;
mod types;
mod vector;

pub use embedding::{
    connect_embedder, CachedEmbeddingClient, EmbeddingClient, FastEmbedClient,
    OpenAiEmbeddingClient, UnavailableEmbeddingClient, FASTEMBED_DIMENSIONS,
};
pub use normalize::{extract_keywords, ResultNormalizer};
pub use orchestrator::{SearchOrchestrator, SearchOutcome, SearchPath};
pub use query::QueryFormulator;
pub use relational::{
    build_fallback_query, FallbackQuery, RelationalRow, RelationalSearchClient,
    SqliteSearchClient,
};
pub use types::{AlumniResult, SearchLimits, SearchRequest, StudentProfile};
pub use vector::{
    connect_index, PineconeIndexClient, QdrantIndexClient, UnavailableIndexClient,
    VectorIndexClient, VectorMatch,
};

/// Embedding length requested from the model; bounds index storage and query cost.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 512;

/// Relevance assigned when the source carries no score.
pub const DEFAULT_RELEVANCE_SCORE: f64 = 50.0;

/// Upper bound of the relevance scale.
pub const MAX_RELEVANCE_SCORE: f64 = 100.0;
