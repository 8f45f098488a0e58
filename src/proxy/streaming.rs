//! Streaming relay
//!
//! A pump task owns the upstream response. It sends the response head as the
//! first event on a channel, then every non-empty body chunk in arrival order.
//! The handler waits for that first event before it commits its own status and
//! headers, and turns the remainder of the channel into the response body.

use axum::{
    body::Body,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use super::relay::{OutboundRequest, RelayError};
use super::transform::filter_response_headers;
use crate::notify::Notifier;

/// Chunks buffered between the pump and the downstream writer
const CHANNEL_CAPACITY: usize = 16;

/// Status and filtered headers of the upstream response
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamMeta {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl UpstreamMeta {
    fn from_response(response: &reqwest::Response) -> Self {
        Self {
            status: response.status(),
            headers: filter_response_headers(response.headers()),
        }
    }
}

/// One item produced by the pump
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Always first, sent exactly once
    Meta(UpstreamMeta),
    Chunk(Bytes),
}

type EventSender = mpsc::Sender<Result<StreamEvent, RelayError>>;
type EventReceiver = mpsc::Receiver<Result<StreamEvent, RelayError>>;

/// Open a streamed upstream call and build the downstream response once the
/// upstream head is known
pub async fn open_stream(
    client: &reqwest::Client,
    notifier: Notifier,
    request: OutboundRequest,
) -> Result<Response, RelayError> {
    let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
    let pending = request.build(client);

    tokio::spawn(async move {
        let backend_response = match pending.send().await {
            Ok(resp) => resp,
            Err(e) => {
                let _ = tx.send(Err(RelayError::from(e))).await;
                return;
            }
        };

        let meta = UpstreamMeta::from_response(&backend_response);
        tracing::debug!(status = %meta.status, headers = ?meta.headers, "Upstream stream opened");
        if tx.send(Ok(StreamEvent::Meta(meta))).await.is_err() {
            return;
        }

        pump_chunks(backend_response.bytes_stream(), &tx, &notifier).await;
    });

    let meta = match rx.recv().await {
        Some(Ok(StreamEvent::Meta(meta))) => meta,
        Some(Err(e)) => return Err(e),
        Some(Ok(StreamEvent::Chunk(_))) => {
            return Err(RelayError::Unexpected(
                "upstream body arrived before response head".to_string(),
            ))
        }
        None => {
            return Err(RelayError::Unexpected(
                "upstream stream closed before response head".to_string(),
            ))
        }
    };

    let mut response = Response::new(Body::from_stream(chunk_stream(rx)));
    *response.status_mut() = meta.status;
    *response.headers_mut() = meta.headers;
    Ok(response)
}

/// Forward upstream chunks into the channel until the upstream ends, fails,
/// or the downstream side goes away
pub(crate) async fn pump_chunks<S, E>(upstream: S, tx: &EventSender, notifier: &Notifier)
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    tokio::pin!(upstream);
    let mut forwarded: usize = 0;

    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                tracing::info!(forwarded_bytes = forwarded, "Client disconnected, abandoning upstream stream");
                return;
            }
            next = upstream.next() => next,
        };

        match next {
            None => {
                tracing::debug!(forwarded_bytes = forwarded, "Upstream stream finished");
                return;
            }
            Some(Ok(chunk)) if chunk.is_empty() => continue,
            Some(Ok(chunk)) => {
                forwarded += chunk.len();
                tracing::trace!(chunk_len = chunk.len(), "Forwarding chunk");
                if tx.send(Ok(StreamEvent::Chunk(chunk))).await.is_err() {
                    tracing::info!(forwarded_bytes = forwarded, "Client disconnected mid-stream");
                    return;
                }
            }
            Some(Err(e)) => {
                let err = RelayError::Interrupted(e.to_string());
                tracing::error!(error = %e, forwarded_bytes = forwarded, "Error during streaming");
                notifier
                    .notify(format!("Claude Proxy Stream Error: {}", err))
                    .await;
                let _ = tx.send(Err(err)).await;
                return;
            }
        }
    }
}

/// Body chunks from the channel; an error item aborts the downstream body
fn chunk_stream(rx: EventReceiver) -> impl Stream<Item = Result<Bytes, RelayError>> {
    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    })
    .filter_map(|event| async move {
        match event {
            Ok(StreamEvent::Chunk(chunk)) => Some(Ok(chunk)),
            Ok(StreamEvent::Meta(_)) => None,
            Err(e) => Some(Err(e)),
        }
    })
}
