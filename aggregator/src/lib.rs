pub mod clist;
pub mod config;
pub mod contest;
pub mod errors;
pub mod fanout;
pub mod metrics_defs;
pub mod service;

#[cfg(test)]
mod testutils;

pub use errors::{AggregatorError, Result};
pub use fanout::Aggregator;
pub use service::{AggregatorService, Variant};

use http_body_util::BodyExt;
use hyper::body::Bytes;
use hyper::{Method, Response};
use shared::http::run_http_service;

/// Runs the standalone server until the listener fails.
pub async fn run(config: config::Config) -> Result<()> {
    let aggregator = Aggregator::from_config(&config)?;
    shared::metrics_defs::describe_all(metrics_defs::ALL_METRICS);

    let resources: Vec<&str> = aggregator
        .resources()
        .iter()
        .map(|r| r.name.as_str())
        .collect();
    tracing::info!(?resources, upstream = %config.upstream.url, "Starting contest aggregator");

    let service = AggregatorService::new(aggregator, Variant::Standalone);
    run_http_service(&config.listener.host, config.listener.port, service).await
}

/// Handles a single request the way a function deployment does: build the
/// service, answer one request and return the buffered response.
pub async fn invoke(
    config: config::Config,
    method: &Method,
    path: &str,
) -> Result<Response<Bytes>> {
    let aggregator = Aggregator::from_config(&config)?;
    let service = AggregatorService::new(aggregator, Variant::Function);

    let (parts, body) = service.handle(method, path).await.into_parts();
    let body = body.collect().await?.to_bytes();

    Ok(Response::from_parts(parts, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{MockReply, MockUpstream, test_config};
    use hyper::StatusCode;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_invoke_combined_listing() {
        let upstream = MockUpstream::start(HashMap::from([
            (
                1,
                MockReply::Json(json!({"objects": [
                    {"event": "Round A", "href": "u1", "start": "2025-01-02T00:00:00Z"}
                ]})),
            ),
            (
                2,
                MockReply::Json(json!({"objects": [
                    {"event": "Round B", "href": "u2", "start": "2025-01-01T00:00:00Z"}
                ]})),
            ),
        ]))
        .await;

        let response = invoke(test_config(upstream.url()), &Method::GET, "/api")
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(
            body,
            json!([
                {"name": "Round B", "url": "u2", "start": "2025-01-01T00:00:00Z"},
                {"name": "Round A", "url": "u1", "start": "2025-01-02T00:00:00Z"}
            ])
        );
        assert_eq!(upstream.requests().len(), 5);
    }

    #[tokio::test]
    async fn test_invoke_upstream_error() {
        let upstream =
            MockUpstream::start(HashMap::from([(93, MockReply::Status(500, "boom"))])).await;

        let response = invoke(test_config(upstream.url()), &Method::GET, "/api")
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body, json!({"error": "Failed to fetch combined contests"}));
    }

    #[tokio::test]
    async fn test_invoke_rejects_invalid_config() {
        let result = invoke(config::Config::default(), &Method::GET, "/api").await;
        assert!(matches!(result, Err(AggregatorError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_run_serves_requests() {
        let upstream = MockUpstream::start(HashMap::new()).await;

        // Reserve a free port for the server
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut config = test_config(upstream.url());
        config.listener.port = port;
        tokio::spawn(run(config));
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let response = reqwest::get(format!("http://127.0.0.1:{port}/"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.text().await.unwrap(),
            "Clist.by v4 combined-backend is up"
        );

        let response = reqwest::get(format!("http://127.0.0.1:{port}/api"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(response.json::<Value>().await.unwrap(), json!([]));
    }
}
