//! claude-proxy: transparent HTTP reverse proxy for the Anthropic API
//!
//! Features:
//! - Verbatim forwarding of `/api/anthropic/*` to a single upstream
//! - Streaming relay for `"stream": true` requests
//! - ntfy push alerts when upstream calls fail or streams break

pub mod config;
pub mod notify;
pub mod proxy;

pub use config::AppConfig;
pub use notify::Notifier;
pub use proxy::run_server;
