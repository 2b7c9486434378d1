//! Listening socket and graceful shutdown shared by the HTTP and WebSocket
//! servers.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use brass_core::{TransportError, TransportResult};

/// Grace period for in-flight requests once shutdown starts.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub(crate) async fn bind(host: &str, port: u16) -> TransportResult<TcpListener> {
    let addr = format!("{host}:{port}");
    TcpListener::bind(&addr)
        .await
        .map_err(|e| TransportError::BindFailed {
            addr,
            reason: e.to_string(),
        })
}

/// Serves `router` until `token` is cancelled, then waits at most `grace`
/// for open requests to finish.
pub(crate) async fn serve(
    listener: TcpListener,
    router: Router,
    token: CancellationToken,
    grace: Duration,
    kind: &'static str,
) -> TransportResult<()> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, "{kind} server listening");

    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(token.clone().cancelled_owned())
    .into_future();
    let mut server = std::pin::pin!(server);

    tokio::select! {
        result = &mut server => result?,
        _ = token.cancelled() => {
            match tokio::time::timeout(grace, &mut server).await {
                Ok(result) => result?,
                Err(_) => warn!(addr = %addr, ?grace, "{kind} server did not drain in time"),
            }
        }
    }

    info!(addr = %addr, "{kind} server stopped");
    Ok(())
}
