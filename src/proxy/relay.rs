//! Upstream calls and their failure taxonomy

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};

use super::transform::filter_response_headers;
use crate::config::TimeoutConfig;

/// Everything needed to issue one upstream call
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OutboundRequest {
    pub(crate) fn build(&self, client: &reqwest::Client) -> reqwest::RequestBuilder {
        client
            .request(self.method.clone(), &self.url)
            .headers(self.headers.clone())
            .body(self.body.clone())
    }
}

/// Failure while relaying a request upstream
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Upstream answered with an error status surfaced by the client library
    #[error("HTTP error: {status} - {message}")]
    Status { status: StatusCode, message: String },

    /// Connect, DNS, timeout or read failure before the response was committed
    #[error("Request error: {0}")]
    Transport(String),

    /// Upstream failed after the response head was already sent downstream
    #[error("Streaming interrupted: {0}")]
    Interrupted(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status().filter(|_| e.is_status()) {
            return RelayError::Status {
                status,
                message: e.to_string(),
            };
        }
        if e.is_builder() {
            return RelayError::Unexpected(e.to_string());
        }
        RelayError::Transport(e.to_string())
    }
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Status { status, .. } => *status,
            RelayError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::Interrupted(_) | RelayError::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}

/// Build an upstream client with the given connect/total deadlines
pub fn build_upstream_client(timeouts: &TimeoutConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(timeouts.connect())
        .timeout(timeouts.total())
        .pool_max_idle_per_host(10)
        .build()
}

/// Issue one call and return the whole upstream response as a single unit
pub async fn forward_buffered(
    client: &reqwest::Client,
    request: OutboundRequest,
) -> Result<Response, RelayError> {
    let backend_response = request.build(client).send().await?;

    let status = backend_response.status();
    let headers = filter_response_headers(backend_response.headers());
    let body = backend_response.bytes().await?;

    if status.is_client_error() || status.is_server_error() {
        tracing::warn!(
            status = %status,
            error_body = %String::from_utf8_lossy(&body[..body.len().min(500)]),
            "Upstream returned error response"
        );
    } else {
        tracing::debug!(status = %status, body_size = body.len(), "Received buffered response");
    }

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
