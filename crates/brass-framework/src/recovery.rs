//! Panic recovery middleware, installed first on every handler end.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::error;

use brass_core::Payload;

use crate::context::Context;
use crate::handler::Handler;

/// Catches a panic anywhere further down the chain and logs it with the
/// event's time and identity. Only the panicking handler end is affected.
pub fn recovery<T: Payload>() -> Handler<T> {
    Handler::named("recovery", |ctx: &mut Context<T>| {
        Box::pin(async move {
            let (time, self_id) = (ctx.time(), ctx.self_id());
            if let Err(panic) = AssertUnwindSafe(ctx.next()).catch_unwind().await {
                error!(
                    time,
                    self_id,
                    panic = %panic_message(panic.as_ref()),
                    "Handler panicked"
                );
            }
        })
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio_util::sync::CancellationToken;

    use brass_core::EventType;

    use super::*;
    use crate::context::tests::NullEmitter;

    struct Boom;

    impl<'de> serde::Deserialize<'de> for Boom {
        fn deserialize<D: serde::Deserializer<'de>>(_: D) -> Result<Self, D::Error> {
            Ok(Boom)
        }
    }

    impl Payload for Boom {
        fn event_type() -> EventType {
            EventType::Other("test:boom".into())
        }
    }

    fn explode() {
        panic!("boom");
    }

    #[tokio::test]
    async fn panic_unwinds_to_recovery() {
        let before = Arc::new(AtomicBool::new(false));
        let after = Arc::new(AtomicBool::new(false));
        let (b, a) = (before.clone(), after.clone());

        let outer = Handler::named("outer", move |ctx: &mut Context<Boom>| {
            let (b, a) = (b.clone(), a.clone());
            Box::pin(async move {
                b.store(true, Ordering::SeqCst);
                ctx.next().await;
                a.store(true, Ordering::SeqCst);
            })
        });
        let bad = Handler::named("bad", |_ctx: &mut Context<Boom>| Box::pin(async { explode() }));

        let mut ctx = Context::new(
            CancellationToken::new(),
            Arc::new(NullEmitter(5)),
            1,
            Arc::new(Boom),
            None,
            Arc::from(vec![recovery(), outer, bad]),
        );
        // Returns normally even though the innermost handler panicked.
        ctx.next().await;

        assert!(before.load(Ordering::SeqCst));
        // The panic unwound through `outer` before its post-processing.
        assert!(!after.load(Ordering::SeqCst));
        assert_eq!(ctx.cursor(), 3);
    }

    #[test]
    fn panic_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&1u8), "non-string panic payload");
    }
}
