//! HTTP handlers and shared application state.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use super::error::ApiError;
use super::rate_limit::RateLimitService;
use crate::chat::ChatPipeline;
use crate::metrics::MetricsService;
use crate::search::{AlumniResult, QueryFormulator, SearchOrchestrator, StudentProfile};

/// Shared state passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: SearchOrchestrator,
    pub chat: ChatPipeline,
    pub metrics: MetricsService,
    pub rate_limiter: Arc<RateLimitService>,
    pub start_time: Instant,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Seconds since start
    pub uptime: u64,
}

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    pub query: String,
    #[serde(default)]
    pub profile: Option<StudentProfile>,
    /// Overrides `search.top_k`
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Overrides `search.display_cap`
    #[serde(default)]
    pub display_cap: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<AlumniResult>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub message: String,
    #[serde(default)]
    pub profile: Option<StudentProfile>,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: state.start_time.elapsed().as_secs(),
    })
}

/// `POST /api/search`: an empty result set is still a 200.
pub async fn search(
    State(state): State<AppState>,
    payload: Result<Json<SearchBody>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(body) = payload?;
    if body.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }

    let mut limits = state.orchestrator.limits();
    if let Some(top_k) = body.top_k {
        limits.top_k = top_k;
    }
    if let Some(display_cap) = body.display_cap {
        limits.display_cap = display_cap;
    }
    limits.validate()?;

    let text = QueryFormulator::formulate(&body.query, body.profile.as_ref());
    let outcome = state
        .orchestrator
        .search_with(&text, body.profile.as_ref(), limits)
        .await;

    Ok(Json(SearchResponse {
        count: outcome.results.len(),
        results: outcome.results,
    }))
}

/// `POST /api/chat`: streams [`StreamEvent`](crate::stream::StreamEvent)s
/// as server-sent events named after the event type.
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let Json(body) = payload?;
    if body.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }

    let rx = state.chat.stream(&body.message, body.profile);
    let events = ReceiverStream::new(rx)
        .map(|event| Event::default().event(event.kind()).json_data(&event));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}
