//! HTTP transport.
//!
//! - `http-server`: [`HttpListener`] receives webhooks, with inline replies.
//! - `http-client`: [`HttpEmitter`] posts actions.
//! - both: [`HttpDriver`] pairs one listener with a set of emitters.

#[cfg(feature = "http-client")]
mod client;
#[cfg(feature = "http-client")]
pub use client::{DEFAULT_REQUEST_TIMEOUT, HttpEmitter, HttpEmitterConfig};

#[cfg(feature = "http-server")]
mod server;
#[cfg(feature = "http-server")]
pub use server::{
    DEFAULT_REPLY_TIMEOUT, HttpListener, HttpListenerConfig, HttpReplyer, SIGNATURE_HEADER, sign,
    verify_signature,
};

#[cfg(all(feature = "http-client", feature = "http-server"))]
mod driver;
#[cfg(all(feature = "http-client", feature = "http-server"))]
pub use driver::HttpDriver;
