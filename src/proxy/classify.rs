//! Streaming-intent detection

/// True iff the body is a JSON object whose `stream` field is literally `true`.
///
/// Anything unparseable is treated as non-streaming.
pub fn is_stream_request(body: &[u8]) -> bool {
    if body.is_empty() {
        return false;
    }

    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(json) => json
            .get("stream")
            .and_then(|s| s.as_bool())
            .unwrap_or(false),
        Err(e) => {
            tracing::trace!(error = %e, "Request body is not JSON, treating as non-streaming");
            false
        }
    }
}
