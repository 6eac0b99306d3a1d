//! HTTP API built on Axum.
//!
//! | route             | handler                 |
//! |-------------------|-------------------------|
//! | `GET /health`     | [`handlers::health`]    |
//! | `POST /api/search`| [`handlers::search`]    |
//! | `POST /api/chat`  | [`handlers::chat`] (SSE)|
//! | `GET /metrics`    | [`handlers::metrics`]   |
//!
//! Routes under `/api` share one global rate limiter.

pub mod error;
pub mod handlers;
pub mod rate_limit;

pub use error::ApiError;
pub use handlers::{AppState, HealthResponse, SearchResponse};
pub use rate_limit::RateLimitService;

use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Instrument};

use crate::config::ApiConfig;
use crate::error::Result;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// HTTP API server.
pub struct ApiServer {
    config: ApiConfig,
    state: AppState,
}

impl ApiServer {
    pub fn with_state(config: ApiConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone(), &self.config)
    }

    /// Serve on `addr` until the process exits.
    pub async fn run(&self, addr: &str) -> Result<()> {
        self.run_until(addr, std::future::pending()).await
    }

    /// Serve on `addr` until `shutdown` resolves, then drain open connections.
    pub async fn run_until(
        &self,
        addr: &str,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(address = %addr, "API server listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("API server stopped");
        Ok(())
    }
}

/// Build the router with middleware.
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let api = Router::new()
        .route("/api/search", post(handlers::search))
        .route("/api/chat", post(handlers::chat))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    let mut router = Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .merge(api)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http()),
        );

    if config.cors_enabled {
        router = router.layer(cors_layer(&config.cors_origins));
    }

    router.with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> std::result::Result<Response, ApiError> {
    if !state.rate_limiter.check() {
        warn!(path = %req.uri().path(), "Rate limit exceeded");
        return Err(ApiError::TooManyRequests("Rate limit exceeded".to_string()));
    }
    Ok(next.run(req).await)
}

async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("request", request_id = %request_id);
    async move {
        let mut response = next.run(req).await;
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }
        response
    }
    .instrument(span)
    .await
}
