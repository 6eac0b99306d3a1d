//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum_test::TestServer;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use milo_node::api::create_router;
use milo_node::search::{RelationalRow, VectorMatch};
use milo_node::{
    ApiConfig, AppState, ChatConfig, ChatPipeline, CompletionClient, EmbeddingClient, Error,
    MetricsService, RateLimitConfig, RateLimitService, RelationalSearchClient, Result,
    SearchOrchestrator, StreamSettings, StreamingResponder, VectorIndexClient,
};

pub struct StaticEmbedder;

#[async_trait]
impl EmbeddingClient for StaticEmbedder {
    async fn embed(&self, _text: &str, dimensions: usize) -> Result<Vec<f32>> {
        Ok(vec![0.5; dimensions])
    }
}

/// Vector index returning fixed matches, or failing.
pub struct StaticIndex {
    pub matches: Vec<VectorMatch>,
    pub fail: bool,
}

#[async_trait]
impl VectorIndexClient for StaticIndex {
    async fn query(
        &self,
        _vector: &[f32],
        top_k: usize,
        _include_metadata: bool,
    ) -> Result<Vec<VectorMatch>> {
        if self.fail {
            return Err(Error::IndexQuery("index unavailable".to_string()));
        }
        Ok(self.matches.iter().take(top_k).cloned().collect())
    }
}

pub struct StaticStore {
    pub rows: Vec<RelationalRow>,
}

#[async_trait]
impl RelationalSearchClient for StaticStore {
    async fn query(&self, _sql: &str, _params: &[String]) -> Result<Vec<RelationalRow>> {
        Ok(self.rows.clone())
    }
}

/// Answers every prompt with text that satisfies all chat steps.
pub struct StaticCompletion;

#[async_trait]
impl CompletionClient for StaticCompletion {
    async fn complete(&self, system: &str, _user: &str) -> Result<String> {
        let text = if system.contains("JSON object") {
            r#"{"intent": "career_exploration", "keywords": ["quant"]}"#
        } else if system.contains("JSON array") {
            r#"[{"name": "Jane Street", "reason": "Trading firm"}]"#
        } else {
            "Reach out to alumni in quantitative finance."
        };
        Ok(text.to_string())
    }
}

pub fn yale_match(name: &str, score: f32, company: &str) -> VectorMatch {
    VectorMatch {
        id: name.to_lowercase().replace(' ', "-"),
        score: Some(score),
        metadata: HashMap::from([
            ("name".to_string(), name.to_string()),
            ("education".to_string(), "Yale University".to_string()),
            ("current_company".to_string(), company.to_string()),
            ("latest_position".to_string(), "Analyst".to_string()),
            ("yale_major".to_string(), "Economics".to_string()),
        ]),
    }
}

pub fn fallback_row(name: &str, position: &str) -> RelationalRow {
    RelationalRow {
        name: Some(name.to_string()),
        position: Some(position.to_string()),
        field: Some("Economics".to_string()),
        ..Default::default()
    }
}

pub struct Fixture {
    pub matches: Vec<VectorMatch>,
    pub index_fails: bool,
    pub rows: Vec<RelationalRow>,
    pub rate_limit: RateLimitConfig,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            matches: vec![
                yale_match("Ada Park", 0.91, "Jane Street"),
                yale_match("Ben Ortiz", 0.72, "Citadel"),
            ],
            index_fails: false,
            rows: Vec::new(),
            rate_limit: RateLimitConfig {
                enabled: false,
                ..Default::default()
            },
        }
    }
}

impl Fixture {
    pub fn state(self) -> AppState {
        let orchestrator = SearchOrchestrator::new(
            Arc::new(StaticEmbedder),
            Arc::new(StaticIndex {
                matches: self.matches,
                fail: self.index_fails,
            }),
            Arc::new(StaticStore { rows: self.rows }),
        );
        let chat = ChatPipeline::new(
            Arc::new(StaticCompletion),
            orchestrator.clone(),
            &ChatConfig::default(),
        )
        .with_responder(StreamingResponder::new(StreamSettings {
            char_delay: Duration::ZERO,
            chars_per_chunk: 8,
            channel_capacity: 256,
        }));

        AppState {
            orchestrator,
            chat,
            metrics: MetricsService::new(),
            rate_limiter: Arc::new(RateLimitService::new(self.rate_limit)),
            start_time: Instant::now(),
        }
    }

    pub fn server(self) -> TestServer {
        let router = create_router(self.state(), &ApiConfig::default());
        TestServer::new(router).expect("test server")
    }
}

/// Parse an SSE body into `(event name, data)` pairs.
pub fn sse_events(body: &str) -> Vec<(String, serde_json::Value)> {
    body.split("\n\n")
        .filter_map(|frame| {
            let mut name = None;
            let mut data = None;
            for line in frame.lines() {
                if let Some(v) = line.strip_prefix("event:") {
                    name = Some(v.trim().to_string());
                } else if let Some(v) = line.strip_prefix("data:") {
                    data = serde_json::from_str(v.trim()).ok();
                }
            }
            Some((name?, data?))
        })
        .collect()
}
