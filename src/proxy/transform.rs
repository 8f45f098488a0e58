//! Target URL construction and header filtering

use axum::http::{header, HeaderMap, HeaderName};

/// Route prefix every proxied request lives under
pub const PROXY_PREFIX: &str = "/api/anthropic/";

/// Response headers that describe upstream framing; hyper recomputes these
const RESPONSE_FRAMING_HEADERS: [HeaderName; 3] = [
    header::CONTENT_LENGTH,
    header::CONTENT_ENCODING,
    header::TRANSFER_ENCODING,
];

/// Everything after the proxy prefix, taken from the raw (undecoded) path
pub fn proxy_path_suffix(path: &str) -> Option<&str> {
    path.strip_prefix(PROXY_PREFIX)
}

/// Build `{base}/{path}` with the query string appended verbatim
pub fn build_target_url(base_url: &str, path: &str, query: Option<&str>) -> String {
    let mut target = format!("{}/{}", base_url, path);
    if let Some(q) = query.filter(|q| !q.is_empty()) {
        target.push('?');
        target.push_str(q);
    }
    target
}

/// Copy inbound headers minus `Host`; credentials pass through untouched
pub fn filter_request_headers(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = headers.clone();
    filtered.remove(header::HOST);
    filtered
}

/// Copy upstream headers minus length/encoding framing
pub fn filter_response_headers(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = headers.clone();
    for name in &RESPONSE_FRAMING_HEADERS {
        filtered.remove(name);
    }
    filtered
}
