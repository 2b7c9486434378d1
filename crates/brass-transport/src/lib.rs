//! # Brass Transport
//!
//! Network implementations of the capability traits in `brass-core`.
//!
//! ## Features
//!
//! - `http-server`: webhook [`HttpListener`](http::HttpListener) with signature checks and inline replies
//! - `http-client`: [`HttpEmitter`](http::HttpEmitter)
//! - `ws-server`: reverse WebSocket [`WsServer`](ws::WsServer)
//! - `ws-client`: forward WebSocket [`WsClient`](ws::WsClient) with reconnects
//! - `full` (default): all of the above
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  brass-framework    │  (Engine: Driver consumer)
//! ├─────────────────────┤
//! │  brass-core         │  (Emitter / Listener / Replyer traits)
//! ├─────────────────────┤
//! │  brass-transport    │  <- This crate
//! ├─────────────────────┤
//! │  Network (TCP/HTTP) │
//! └─────────────────────┘
//! ```
//!
//! Every driver owns an [`EmitterRegistry`]; identities appear in it as
//! gateways connect and disappear when their socket closes.

pub mod registry;

#[cfg(any(feature = "http-server", feature = "ws-server"))]
mod serve;
#[cfg(any(feature = "http-server", feature = "ws-server"))]
pub use serve::DEFAULT_SHUTDOWN_GRACE;

#[cfg(any(feature = "http-client", feature = "http-server"))]
pub mod http;

#[cfg(any(feature = "ws-client", feature = "ws-server"))]
pub mod ws;

pub use registry::EmitterRegistry;

#[cfg(all(feature = "http-client", feature = "http-server"))]
pub use http::HttpDriver;

#[cfg(feature = "ws-client")]
pub use ws::WsClient;

#[cfg(feature = "ws-server")]
pub use ws::WsServer;
