//! Webhook listener for Traccar event and position forwarding.

mod handlers;
mod state;

use axum::routing::{delete, get};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub use handlers::extract_device_id;
pub use state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook", get(handlers::webhook_get).post(handlers::webhook_post))
        .route("/api/devices", get(handlers::device_list))
        .route("/api/devices/{id}/cache", delete(handlers::clear_device_cache))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start(state: AppState, host: &str, port: u16) -> std::io::Result<()> {
    let state = Arc::new(state);
    let app = build_router(Arc::clone(&state));
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Traccar webhook server listening on http://{}/webhook", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
}

/// Resolves on Ctrl-C, after waking any device blocked on the rate limiter.
async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down, cancelling pending geocoder waits");
    state.cancel_pending();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacon::{BeaconIdentityRouter, BeaconNameStore};
    use crate::config::DeviceConfig;
    use crate::device::DeviceEnricher;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let mut config = DeviceConfig::new(42);
        config.beacon3_mac = Some("AA:BB:CC:00:00:01".into());
        let router = BeaconIdentityRouter::new(&config, BeaconNameStore::in_memory());
        let enricher = DeviceEnricher::new(42, None, router);
        build_router(Arc::new(AppState::with_devices([enricher])))
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_post_position_is_enriched() {
        let (status, body) = call(
            app(),
            post(json!({
                "position": {
                    "deviceId": 42,
                    "latitude": 55.0,
                    "longitude": 12.0,
                    "address": "Torvet 1, Køge",
                    "attributes": {"tag1Mac": "aa:bb:cc:00:00:01", "tag1Rssi": -59},
                },
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["position"]["address"], "Torvet 1, Køge");
        assert_eq!(body["position"]["addressSource"], "tracker");
        assert_eq!(body["position"]["beacons"][0]["slot"], 3);
        assert_eq!(body["position"]["beacons"][0]["distanceM"], 1.0);
    }

    #[tokio::test]
    async fn test_get_with_json_parameter() {
        let request = Request::builder()
            .uri("/webhook?json=%7B%22event%22%3A%7B%22deviceId%22%3A42%2C%22type%22%3A%22deviceOnline%22%7D%7D")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["eventType"], "deviceOnline");
        assert!(body.get("position").is_none());
    }

    #[tokio::test]
    async fn test_get_without_parameter_is_ignored() {
        let request = Request::builder().uri("/webhook").body(Body::empty()).unwrap();
        let (status, body) = call(app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ignored");
    }

    #[tokio::test]
    async fn test_unknown_device_is_not_found() {
        let (status, body) = call(app(), post(json!({"deviceId": 7}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], 404);
    }

    #[tokio::test]
    async fn test_missing_device_id_is_ignored() {
        let (status, body) = call(app(), post(json!({"position": {"latitude": 1.0}}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ignored");
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, _) = call(app(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_device_list_and_cache_clear() {
        let app = app();

        let request = Request::builder().uri("/api/devices").body(Body::empty()).unwrap();
        let (status, body) = call(app.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["deviceId"], 42);
        assert_eq!(body[0]["geocoding"], false);

        let request = Request::builder()
            .method("DELETE")
            .uri("/api/devices/42/cache")
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(app.clone(), request).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let request = Request::builder()
            .method("DELETE")
            .uri("/api/devices/1/cache")
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
