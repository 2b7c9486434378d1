//! Identity → emitter registry shared by all transports.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::instrument::WithSubscriber;
use tracing::{debug, info, warn};

use brass_core::{ApiError, ApiResult, Emitter, EmitterExt, EmitterMux};

type ConnectHook = Arc<dyn Fn(Arc<dyn Emitter>) + Send + Sync>;
type CloseHook = Arc<dyn Fn(i64) + Send + Sync>;

/// The [`EmitterMux`] every transport registers identities with.
///
/// Lookups take a read lock; inserts and removals are rare (HTTP: startup,
/// WebSocket: connect / disconnect).
#[derive(Default)]
pub struct EmitterRegistry {
    emitters: RwLock<HashMap<i64, Arc<dyn Emitter>>>,
    connect_hooks: RwLock<HashMap<i64, ConnectHook>>,
    close_hook: RwLock<Option<CloseHook>>,
}

impl EmitterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `callback` each time `self_id` is registered.
    pub fn on_connect<F>(&self, self_id: i64, callback: F)
    where
        F: Fn(Arc<dyn Emitter>) + Send + Sync + 'static,
    {
        self.connect_hooks.write().insert(self_id, Arc::new(callback));
    }

    /// Runs `callback` with the identity each time one is removed.
    pub fn on_close<F>(&self, callback: F)
    where
        F: Fn(i64) + Send + Sync + 'static,
    {
        *self.close_hook.write() = Some(Arc::new(callback));
    }

    /// Registers `emitter` under its identity, replacing any other emitter
    /// for the same identity.
    ///
    /// Returns `false` if this exact emitter was already registered. On a new
    /// registration the gateway's version is logged in the background and the
    /// identity's connect hook is run. Must be called inside a Tokio runtime.
    pub fn insert(&self, emitter: Arc<dyn Emitter>) -> bool {
        let self_id = emitter.self_id();
        {
            let mut emitters = self.emitters.write();
            if let Some(existing) = emitters.get(&self_id) {
                if same_emitter(existing, &emitter) {
                    return false;
                }
                debug!(self_id, "Replacing emitter");
            }
            emitters.insert(self_id, emitter.clone());
        }

        let version_emitter = emitter.clone();
        tokio::spawn(
            async move {
                match version_emitter.get_version_info().await {
                    Ok(info) => info!(
                        self_id,
                        app_name = %info.app_name,
                        app_version = %info.app_version,
                        protocol_version = %info.protocol_version,
                        "Bot connected"
                    ),
                    Err(e) => warn!(self_id, error = %e, "Bot connected, version unknown"),
                }
            }
            .with_current_subscriber(),
        );

        if let Some(hook) = self.connect_hooks.read().get(&self_id).cloned() {
            tokio::spawn(async move { hook(emitter) }.with_current_subscriber());
        }
        true
    }

    /// Removes `self_id` only if it is still bound to `emitter`.
    ///
    /// A socket that closes after its identity reconnected elsewhere leaves
    /// the newer registration alone.
    pub fn remove_if_same(&self, self_id: i64, emitter: &Arc<dyn Emitter>) -> bool {
        let removed = {
            let mut emitters = self.emitters.write();
            match emitters.get(&self_id) {
                Some(existing) if same_emitter(existing, emitter) => {
                    emitters.remove(&self_id);
                    true
                }
                _ => false,
            }
        };
        if removed {
            self.closed(self_id);
        }
        removed
    }

    /// Removes `self_id` unconditionally.
    pub fn remove(&self, self_id: i64) -> bool {
        let removed = self.emitters.write().remove(&self_id).is_some();
        if removed {
            self.closed(self_id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.emitters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn closed(&self, self_id: i64) {
        info!(self_id, "Bot disconnected");
        if let Some(hook) = self.close_hook.read().clone() {
            tokio::spawn(async move { hook(self_id) }.with_current_subscriber());
        }
    }
}

impl EmitterMux for EmitterRegistry {
    fn get_emitter(&self, self_id: i64) -> ApiResult<Arc<dyn Emitter>> {
        self.emitters
            .read()
            .get(&self_id)
            .cloned()
            .ok_or(ApiError::UnknownIdentity(self_id))
    }

    fn self_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.emitters.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

fn same_emitter(a: &Arc<dyn Emitter>, b: &Arc<dyn Emitter>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    use brass_core::actions;

    use super::*;

    struct StubEmitter(i64);

    #[async_trait]
    impl Emitter for StubEmitter {
        fn self_id(&self) -> i64 {
            self.0
        }

        async fn call(&self, action: &str, _params: Value) -> ApiResult<Value> {
            match action {
                actions::GET_VERSION_INFO => Ok(json!({"app_name": "stub"})),
                _ => Ok(Value::Null),
            }
        }
    }

    #[tokio::test]
    async fn insert_lookup_remove() {
        let registry = EmitterRegistry::new();
        let first: Arc<dyn Emitter> = Arc::new(StubEmitter(42));
        let second: Arc<dyn Emitter> = Arc::new(StubEmitter(42));

        assert!(registry.insert(first.clone()));
        assert!(!registry.insert(first.clone()));
        assert_eq!(registry.self_ids(), [42]);
        assert!(matches!(
            registry.get_emitter(7),
            Err(ApiError::UnknownIdentity(7))
        ));

        // A reconnect replaces the old socket; the old one closing later is
        // a no-op.
        assert!(registry.insert(second.clone()));
        assert!(!registry.remove_if_same(42, &first));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove_if_same(42, &second));
        assert!(registry.is_empty());
        assert!(!registry.remove(42));
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn hooks_fire() {
        let registry = EmitterRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let connected = tx.clone();
        registry.on_connect(42, move |emitter| {
            let _ = connected.send(format!("connect:{}", emitter.self_id()));
        });
        registry.on_connect(43, |_| unreachable!("not registered in this test"));
        registry.on_close(move |self_id| {
            let _ = tx.send(format!("close:{self_id}"));
        });

        registry.insert(Arc::new(StubEmitter(42)));
        assert_eq!(next(&mut rx).await.as_deref(), Some("connect:42"));

        registry.remove(42);
        assert_eq!(next(&mut rx).await.as_deref(), Some("close:42"));
    }
}
