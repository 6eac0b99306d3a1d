//! Error types for the Milo node.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by Milo components and external collaborators.
///
/// Collaborator failures (`Embedding`, `IndexQuery`, `Query`, `Completion`)
/// are recovered inside the search orchestrator and the chat pipeline; they
/// only reach a caller through the client traits themselves.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Embedding generation failed (quota, auth, network, model)
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector index query failed
    #[error("Index query error: {0}")]
    IndexQuery(String),

    /// Relational store query failed
    #[error("Query error: {0}")]
    Query(String),

    /// LLM completion failed
    #[error("Completion error: {0}")]
    Completion(String),

    /// Upstream returned text that did not contain the expected structure
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The response stream was already terminated or its receiver is gone
    #[error("Stream closed")]
    StreamClosed,

    /// HTTP API or client error
    #[error("API error: {0}")]
    Api(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Query(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_source_message() {
        let err = Error::IndexQuery("timeout after 5s".to_string());
        assert_eq!(err.to_string(), "Index query error: timeout after 5s");
    }

    #[test]
    fn test_sqlx_error_maps_to_query() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::Query(_)));
    }
}
