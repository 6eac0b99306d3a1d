mod common;

use axum::body::Bytes;
use axum::http::StatusCode;
use common::{fallback_row, sse_events, Fixture};
use milo_node::{HealthResponse, RateLimitConfig, SearchResponse};
use serde_json::json;

#[tokio::test]
async fn test_health() {
    let server = Fixture::default().server();

    let response = server.get("/health").await;
    response.assert_status_ok();
    assert!(response.headers().contains_key("x-request-id"));

    let health: HealthResponse = response.json();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_search_returns_ranked_results() {
    let server = Fixture::default().server();

    let response = server
        .post("/api/search")
        .json(&json!({
            "query": "quant finance",
            "profile": {"major": "Economics", "interests": "trading"}
        }))
        .await;
    response.assert_status_ok();

    let body: SearchResponse = response.json();
    assert_eq!(body.count, 2);
    assert_eq!(body.results[0].name, "Ada Park");
    assert!(body.results[0].relevance_score >= body.results[1].relevance_score);
}

#[tokio::test]
async fn test_search_display_cap_override() {
    let server = Fixture::default().server();

    let body: SearchResponse = server
        .post("/api/search")
        .json(&json!({"query": "quant", "display_cap": 1}))
        .await
        .json();
    assert_eq!(body.count, 1);
    assert_eq!(body.results.len(), 1);
}

#[tokio::test]
async fn test_search_falls_back_when_index_fails() {
    let server = Fixture {
        index_fails: true,
        rows: vec![fallback_row("Cara Li", "Trading Analyst")],
        ..Default::default()
    }
    .server();

    let body: SearchResponse = server
        .post("/api/search")
        .json(&json!({"query": "trading"}))
        .await
        .json();
    assert_eq!(body.count, 1);
    assert_eq!(body.results[0].name, "Cara Li");
    assert_eq!(body.results[0].relevance_score, 60.0);
}

#[tokio::test]
async fn test_search_with_no_results_is_ok() {
    let server = Fixture {
        matches: Vec::new(),
        ..Default::default()
    }
    .server();

    let response = server
        .post("/api/search")
        .json(&json!({"query": "underwater basket weaving"}))
        .await;
    response.assert_status_ok();
    let body: SearchResponse = response.json();
    assert_eq!(body.count, 0);
}

#[tokio::test]
async fn test_search_rejects_bad_input() {
    let server = Fixture::default().server();

    let response = server
        .post("/api/search")
        .json(&json!({"query": "   "}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(response.json::<serde_json::Value>()["error"].is_string());

    server
        .post("/api/search")
        .json(&json!({"query": "quant", "top_k": 0}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_is_a_json_error() {
    let server = Fixture::default().server();

    for path in ["/api/search", "/api/chat"] {
        let response = server
            .post(path)
            .content_type("application/json")
            .bytes(Bytes::from_static(b"{\"query\": "))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.json::<serde_json::Value>()["error"].is_string());
    }
}

#[tokio::test]
async fn test_chat_streams_events_until_complete() {
    let server = Fixture::default().server();

    let response = server
        .post("/api/chat")
        .json(&json!({"message": "How do I get into quant finance?"}))
        .await;
    response.assert_status_ok();

    let events = sse_events(&response.text());
    let (last_name, last_data) = events.last().expect("at least one event");
    assert_eq!(last_name, "complete");
    assert_eq!(last_data["type"], "complete");

    for (name, data) in &events {
        assert_eq!(data["type"], name.as_str());
    }

    let reply: Vec<&str> = events
        .iter()
        .filter(|(name, data)| name == "chunk" && data["step"] == "reply")
        .filter_map(|(_, data)| data["text"].as_str())
        .collect();
    assert!(reply.len() > 1);
    assert!(reply.windows(2).all(|w| w[1].starts_with(w[0]) && w[1].len() > w[0].len()));
    assert_eq!(
        *reply.last().unwrap(),
        "Reach out to alumni in quantitative finance."
    );

    let steps: Vec<&str> = events
        .iter()
        .filter(|(name, _)| name == "data")
        .filter_map(|(_, data)| data["step"].as_str())
        .collect();
    for step in ["intent", "companies", "alumni"] {
        assert!(steps.contains(&step), "missing {}", step);
    }
}

#[tokio::test]
async fn test_chat_rejects_empty_message() {
    let server = Fixture::default().server();

    server
        .post("/api/chat")
        .json(&json!({"message": ""}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rate_limit() {
    let server = Fixture {
        rate_limit: RateLimitConfig {
            enabled: true,
            requests_per_second: 1,
            burst_size: 2,
        },
        ..Default::default()
    }
    .server();

    for _ in 0..2 {
        server
            .post("/api/search")
            .json(&json!({"query": "quant"}))
            .await
            .assert_status_ok();
    }
    server
        .post("/api/search")
        .json(&json!({"query": "quant"}))
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);

    // Only /api routes are limited.
    server.get("/health").await.assert_status_ok();
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let server = Fixture::default().server();
    server.get("/metrics").await.assert_status_ok();
}
