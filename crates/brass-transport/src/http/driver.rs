use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use brass_core::{ApiResult, Driver, EmitterMux, Event, Listener, TransportResult};

use super::client::{self, HttpEmitter, HttpEmitterConfig};
use super::server::{HttpListener, HttpListenerConfig};
use crate::registry::EmitterRegistry;

/// Webhook listener plus a fixed set of HTTP emitters.
pub struct HttpDriver {
    listener: HttpListener,
    registry: Arc<EmitterRegistry>,
}

impl HttpDriver {
    /// Connects every emitter and registers it under its identity.
    ///
    /// # Errors
    /// Any emitter failing validation or identity discovery aborts startup.
    pub async fn connect(
        listener: HttpListenerConfig,
        emitters: Vec<HttpEmitterConfig>,
    ) -> ApiResult<Self> {
        let registry = Arc::new(EmitterRegistry::new());
        for config in emitters {
            client::validate(&config)?;
            let emitter = HttpEmitter::connect(config).await?;
            registry.insert(Arc::new(emitter));
        }
        Ok(Self {
            listener: HttpListener::new(listener),
            registry,
        })
    }

    pub fn registry(&self) -> &Arc<EmitterRegistry> {
        &self.registry
    }
}

#[async_trait]
impl Listener for HttpDriver {
    async fn listen(
        &self,
        token: CancellationToken,
        events: mpsc::Sender<Event>,
    ) -> TransportResult<()> {
        self.listener.listen(token, events).await
    }
}

impl Driver for HttpDriver {
    fn emitters(&self) -> Arc<dyn EmitterMux> {
        self.registry.clone()
    }
}
