//! HTTP proxy server

pub mod classify;
mod handler;
pub mod relay;
pub mod server;
pub mod streaming;
pub mod transform;

pub use handler::ProxyHandler;
pub use relay::{OutboundRequest, RelayError};
pub use server::{build_router, run_server, ProxyState};
pub use streaming::{StreamEvent, UpstreamMeta};
