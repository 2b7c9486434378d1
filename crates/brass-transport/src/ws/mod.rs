//! WebSocket transport.
//!
//! Both variants speak the same frames: events without an `echo`, action
//! responses with one. A socket's identity is learned from its first
//! meta event.

mod connection;
pub use connection::{DEFAULT_ACTION_TIMEOUT, WsEmitter, WsReplyer};

#[cfg(feature = "ws-client")]
mod client;
#[cfg(feature = "ws-client")]
pub use client::{DEFAULT_RETRY_INTERVAL, WsClient, WsClientConfig, WsNode};

#[cfg(feature = "ws-server")]
mod server;
#[cfg(feature = "ws-server")]
pub use server::{WsServer, WsServerConfig};
