//! In-process fakes of the search collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::embedding::EmbeddingClient;
use super::relational::{RelationalRow, RelationalSearchClient};
use super::vector::{VectorIndexClient, VectorMatch};
use crate::error::{Error, Result};

pub(crate) struct FakeEmbedder {
    pub(crate) fail: bool,
}

#[async_trait]
impl EmbeddingClient for FakeEmbedder {
    async fn embed(&self, _text: &str, dimensions: usize) -> Result<Vec<f32>> {
        if self.fail {
            return Err(Error::Embedding("quota exceeded".to_string()));
        }
        Ok(vec![0.1; dimensions])
    }
}

pub(crate) struct FakeIndex {
    pub(crate) matches: Vec<VectorMatch>,
    pub(crate) fail: bool,
    pub(crate) last_top_k: AtomicUsize,
}

impl FakeIndex {
    pub(crate) fn with(matches: Vec<VectorMatch>) -> Self {
        Self {
            matches,
            fail: false,
            last_top_k: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::with(Vec::new())
        }
    }
}

#[async_trait]
impl VectorIndexClient for FakeIndex {
    async fn query(
        &self,
        _vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<VectorMatch>> {
        assert!(include_metadata);
        self.last_top_k.store(top_k, Ordering::SeqCst);
        if self.fail {
            return Err(Error::IndexQuery("connection reset".to_string()));
        }
        Ok(self.matches.iter().take(top_k).cloned().collect())
    }
}

pub(crate) struct FakeStore {
    pub(crate) rows: Vec<RelationalRow>,
    pub(crate) fail: bool,
    pub(crate) calls: AtomicUsize,
    pub(crate) last_params: Mutex<Vec<String>>,
}

impl FakeStore {
    pub(crate) fn with(rows: Vec<RelationalRow>) -> Self {
        Self {
            rows,
            fail: false,
            calls: AtomicUsize::new(0),
            last_params: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::with(Vec::new())
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelationalSearchClient for FakeStore {
    async fn query(&self, _sql: &str, params: &[String]) -> Result<Vec<RelationalRow>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock().unwrap() = params.to_vec();
        if self.fail {
            return Err(Error::Query("database is locked".to_string()));
        }
        Ok(self.rows.clone())
    }
}

pub(crate) fn alum(name: &str, score: f32, education: &str) -> VectorMatch {
    VectorMatch {
        id: name.to_string(),
        score: Some(score),
        metadata: HashMap::from([
            ("name".to_string(), name.to_string()),
            ("education".to_string(), education.to_string()),
            ("current_company".to_string(), "Acme".to_string()),
        ]),
    }
}

pub(crate) fn row(name: &str, position: &str) -> RelationalRow {
    RelationalRow {
        name: Some(name.to_string()),
        position: Some(position.to_string()),
        ..Default::default()
    }
}
