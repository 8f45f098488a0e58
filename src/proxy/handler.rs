//! Request/response handler for the proxy

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tracing::Instrument;

use super::classify::is_stream_request;
use super::relay::{forward_buffered, OutboundRequest, RelayError};
use super::server::ProxyState;
use super::streaming::open_stream;
use super::transform::{build_target_url, filter_request_headers, proxy_path_suffix};

/// Proxy request handler
pub struct ProxyHandler {
    state: ProxyState,
}

impl ProxyHandler {
    pub fn new(state: ProxyState) -> Self {
        Self { state }
    }

    /// Handle an incoming request
    pub async fn handle(&self, req: Request<Body>) -> Response {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!(
            "proxy",
            request_id = %request_id,
            method = %req.method(),
            path = %req.uri().path(),
        );
        self.handle_inner(req).instrument(span).await
    }

    async fn handle_inner(&self, req: Request<Body>) -> Response {
        let start = Instant::now();
        let (parts, body) = req.into_parts();

        let Some(path) = proxy_path_suffix(parts.uri.path()) else {
            tracing::warn!("Request outside the proxy prefix reached the proxy handler");
            return StatusCode::NOT_FOUND.into_response();
        };

        // Read request body once
        let body_bytes = match to_bytes(body, self.state.config.server.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read request body");
                return (
                    StatusCode::BAD_REQUEST,
                    format!("Failed to read request body: {}", e),
                )
                    .into_response();
            }
        };

        let target_url = build_target_url(
            self.state.config.upstream.base_url(),
            path,
            parts.uri.query(),
        );
        let streaming = is_stream_request(&body_bytes);

        tracing::debug!(
            target_url = %target_url,
            streaming = streaming,
            body_size = body_bytes.len(),
            "Forwarding request upstream"
        );

        let outbound = OutboundRequest {
            method: parts.method,
            url: target_url,
            headers: filter_request_headers(&parts.headers),
            body: body_bytes,
        };

        let result = if streaming {
            open_stream(
                &self.state.streaming_client,
                self.state.notifier.clone(),
                outbound,
            )
            .await
        } else {
            forward_buffered(&self.state.buffered_client, outbound).await
        };

        let response = match result {
            Ok(response) => response,
            Err(e) => self.fail(e).await,
        };

        tracing::info!(
            status = %response.status(),
            streaming = streaming,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Request relayed"
        );

        response
    }

    /// Alert and turn a pre-commit relay failure into a plain-text response
    async fn fail(&self, error: RelayError) -> Response {
        tracing::error!(error = %error, status = %error.status_code(), "Upstream request failed");
        self.state
            .notifier
            .notify(format!("Claude Proxy Error: {}", error))
            .await;
        error.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::notify::{Alert, AlertSink, NotifyError, Notifier};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingSink {
        alerts: Mutex<Vec<Alert>>,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn deliver(&self, alert: &Alert) -> Result<(), NotifyError> {
            self.alerts.lock().unwrap().push(alert.clone());
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn create_test_handler(max_body_bytes: usize) -> ProxyHandler {
        let mut config = AppConfig::default();
        config.server.max_body_bytes = max_body_bytes;
        ProxyHandler::new(ProxyState::with_notifier(config, Notifier::disabled()).unwrap())
    }

    #[tokio::test]
    async fn test_oversized_body_rejected_before_forwarding() {
        let handler = create_test_handler(4);
        let req = Request::post("/api/anthropic/v1/messages")
            .body(Body::from("0123456789"))
            .unwrap();

        let response = handler.handle(req).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).starts_with("Failed to read request body"));
    }

    #[tokio::test]
    async fn test_path_outside_prefix_not_found() {
        let handler = create_test_handler(1024);
        let req = Request::get("/v1/messages").body(Body::empty()).unwrap();

        let response = handler.handle(req).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unparseable_base_url_fails_with_single_alert() {
        let sink = Arc::new(RecordingSink::default());
        let mut config = AppConfig::default();
        config.upstream.url = "not a url".to_string();
        let state = ProxyState::with_notifier(config, Notifier::new(sink.clone())).unwrap();
        let handler = ProxyHandler::new(state);

        let req = Request::post("/api/anthropic/v1/messages")
            .body(Body::from(r#"{"stream": false}"#))
            .unwrap();
        let response = handler.handle(req).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).starts_with("Unexpected error:"));

        let alerts = sink.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].message.starts_with("Claude Proxy Error: Unexpected error:"));
    }
}
