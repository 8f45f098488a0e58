//! Shared utilities for proxy integration tests.
//!
//! The mock upstream records every request it receives and serves replies that
//! tests queue up ahead of time.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
    Router,
};
use futures::StreamExt;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use claude_proxy::config::AppConfig;
use claude_proxy::notify::{Alert, AlertSink, NotifyError};
use claude_proxy::proxy::{build_router, ProxyState};
use claude_proxy::Notifier;

/// Records alerts instead of delivering them
#[derive(Default)]
pub struct RecordingSink {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.message.clone())
            .collect()
    }
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

/// A reply the mock upstream will serve for the next request
#[derive(Debug, Clone)]
pub enum MockReply {
    Full {
        status: u16,
        headers: Vec<(&'static str, &'static str)>,
        body: &'static str,
    },
    Stream {
        chunks: Vec<&'static [u8]>,
        delay: Duration,
    },
}

/// A request received by the mock upstream
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub method: String,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug, Default)]
pub struct UpstreamState {
    pub replies: VecDeque<MockReply>,
    pub received: Vec<ReceivedRequest>,
}

pub type SharedUpstream = Arc<Mutex<UpstreamState>>;

async fn handle_upstream(State(state): State<SharedUpstream>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, 10 * 1024 * 1024)
        .await
        .unwrap_or_default();

    let reply = {
        let mut state = state.lock().unwrap();
        state.received.push(ReceivedRequest {
            method: parts.method.to_string(),
            path_and_query: parts
                .uri
                .path_and_query()
                .map(|pq| pq.to_string())
                .unwrap_or_default(),
            headers: parts.headers.clone(),
            body,
        });
        state.replies.pop_front()
    };

    match reply.unwrap_or(MockReply::Full {
        status: 200,
        headers: vec![("content-type", "application/json")],
        body: r#"{"type":"message","content":[]}"#,
    }) {
        MockReply::Full {
            status,
            headers,
            body,
        } => {
            let mut response = Response::new(Body::from(body));
            *response.status_mut() = StatusCode::from_u16(status).unwrap();
            for (name, value) in headers {
                response.headers_mut().append(
                    HeaderName::from_static(name),
                    HeaderValue::from_static(value),
                );
            }
            response
        }
        MockReply::Stream { chunks, delay } => {
            let stream = futures::stream::iter(chunks).then(move |chunk| async move {
                tokio::time::sleep(delay).await;
                Ok::<_, std::io::Error>(Bytes::from_static(chunk))
            });
            Response::builder()
                .status(StatusCode::OK)
                .header("content-type", "text/event-stream")
                .header("x-upstream", "mock")
                .body(Body::from_stream(stream))
                .unwrap()
        }
    }
}

/// Serve `router` on an ephemeral local port
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Start the recording mock upstream
pub async fn start_upstream() -> (SocketAddr, SharedUpstream) {
    let state: SharedUpstream = Arc::new(Mutex::new(UpstreamState::default()));
    let router = Router::new()
        .fallback(handle_upstream)
        .with_state(state.clone());
    (serve(router).await, state)
}

/// Upstream that sends a chunked response head and one chunk, then drops the
/// connection without finishing the body
pub async fn start_resetting_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let head = "HTTP/1.1 200 OK\r\n\
                            Content-Type: text/event-stream\r\n\
                            Transfer-Encoding: chunked\r\n\r\n\
                            1\r\na\r\n";
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_millis(100)).await;
                drop(socket);
            });
        }
    });

    addr
}

/// A local address nothing is listening on
pub async fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Start the proxy pointed at `base_url`, recording alerts
pub async fn start_proxy(base_url: String) -> (SocketAddr, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let mut config = AppConfig::default();
    config.upstream.url = base_url;

    let state = ProxyState::with_notifier(config, Notifier::new(sink.clone())).unwrap();
    (serve(build_router(state)).await, sink)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
