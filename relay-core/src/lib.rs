//! Transport-agnostic core of a transparent remote-object proxy system:
//! wrap one end of any duplex message channel and get back a handle whose
//! field access, calls, and construction turn into wire requests against
//! whatever the other end exposed.
//!
//! The six wire operations (`GET`/`SET`/`APPLY`/`CONSTRUCT`/`ENDPOINT`/
//! `RELEASE`), the pluggable transfer-handler codec, and the per-endpoint
//! release lifecycle are implemented here without reference to any
//! concrete transport; `relay::local_channel` supplies the one transport
//! this workspace ships, and `relay-macros` generates strongly-typed
//! wrappers over [`proxy::RemoteHandle`] and [`exposed::Exposed`].

pub mod codec;
pub mod correlator;
pub mod endpoint;
pub mod error;
pub mod expose;
pub mod exposed;
pub mod handlers;
pub mod keys;
pub mod lifetime;
pub mod proxy;
pub mod session;
pub mod transfer_table;
pub mod wire;

pub use endpoint::{ChannelFactory, Endpoint, EndpointError, IncomingEvent, IncomingHandler, ListenerId, Transfer};
pub use error::{CodecError, RelayError, RemoteError};
pub use expose::expose;
pub use exposed::{DispatchError, ErrorPayload, Exposed, ExposedValue, OriginPolicy, ThrownValue};
pub use handlers::{CodecContext, HandlerRegistry, ProxyHandler, ThrowHandler, TransferHandler};
pub use keys::{BIND_KEY, THEN_KEY};
pub use proxy::{wrap, RemoteHandle, RemoteValue};
pub use session::Session;
pub use transfer_table::transfer;
pub use wire::{Operation, Path, PathSegment, WireMessage, WireValue};

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use crate::endpoint::{ChannelFactory, Endpoint, EndpointError, IncomingEvent, IncomingHandler, ListenerId, Transfer};
    use crate::exposed::{DispatchError, Exposed, ExposedValue, OriginPolicy};
    use crate::proxy::RemoteValue;
    use crate::session::Session;
    use crate::wire::WireMessage;

    /// A minimal in-memory duplex [`Endpoint`] pair, enough to exercise the
    /// core end to end without pulling in the `relay` facade crate's
    /// transport. Mirrors the shape of `relay::local_channel` but kept
    /// local to these tests to avoid a dev-dependency cycle.
    struct ChannelHalf {
        outbound: mpsc::UnboundedSender<(WireMessage, Vec<Transfer>, Option<String>)>,
        handlers: Mutex<Vec<(ListenerId, IncomingHandler)>>,
        next_id: std::sync::atomic::AtomicU64,
    }

    #[async_trait]
    impl Endpoint for ChannelHalf {
        async fn post(&self, message: WireMessage, transfers: Vec<Transfer>) -> Result<(), EndpointError> {
            self.outbound
                .send((message, transfers, None))
                .map_err(|e| EndpointError::PostFailed(e.to_string()))
        }

        fn listen(&self, handler: IncomingHandler) -> ListenerId {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.handlers.lock().unwrap().push((id, handler));
            id
        }

        fn unlisten(&self, id: ListenerId) {
            self.handlers.lock().unwrap().retain(|(hid, _)| *hid != id);
        }
    }

    fn spawn_pair() -> (Arc<ChannelHalf>, Arc<ChannelHalf>) {
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = Arc::new(ChannelHalf {
            outbound: tx_b,
            handlers: Mutex::new(Vec::new()),
            next_id: std::sync::atomic::AtomicU64::new(0),
        });
        let b = Arc::new(ChannelHalf {
            outbound: tx_a,
            handlers: Mutex::new(Vec::new()),
            next_id: std::sync::atomic::AtomicU64::new(0),
        });

        let pump_a = a.clone();
        tokio::spawn(async move {
            while let Some((data, transfers, origin)) = rx_a.recv().await {
                let handlers = pump_a.handlers.lock().unwrap().clone();
                for (_, handler) in handlers {
                    handler(IncomingEvent { data: data.clone(), origin: origin.clone(), transfers: clone_transfers(&transfers) });
                }
            }
        });
        let pump_b = b.clone();
        tokio::spawn(async move {
            while let Some((data, transfers, origin)) = rx_b.recv().await {
                let handlers = pump_b.handlers.lock().unwrap().clone();
                for (_, handler) in handlers {
                    handler(IncomingEvent { data: data.clone(), origin: origin.clone(), transfers: clone_transfers(&transfers) });
                }
            }
        });

        (a, b)
    }

    /// Test-only transfers never carry a real port, so cloning is just
    /// re-emitting empty placeholders for each listener fan-out.
    fn clone_transfers(transfers: &[Transfer]) -> Vec<Transfer> {
        transfers.iter().map(|_| Transfer::Opaque(Box::new(()))).collect()
    }

    struct Counter {
        value: std::sync::atomic::AtomicI64,
        finalized: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Exposed for Counter {
        fn get(&self, path: &[String]) -> Result<ExposedValue, DispatchError> {
            match path {
                [] => ExposedValue::json(&self.value.load(Ordering::SeqCst)),
                [field] if field == "value" => ExposedValue::json(&self.value.load(Ordering::SeqCst)),
                _ => Err(DispatchError::NoSuchPath(path.to_vec())),
            }
        }

        fn set(&self, path: &[String], value: RemoteValue) -> Result<(), DispatchError> {
            match path {
                [field] if field == "value" => {
                    let RemoteValue::Json(serde_json::Value::Number(n)) = value else {
                        return Err(DispatchError::Unserializable("expected a number".into()));
                    };
                    self.value.store(n.as_i64().unwrap_or_default(), Ordering::SeqCst);
                    Ok(())
                }
                _ => Err(DispatchError::NoSuchPath(path.to_vec())),
            }
        }

        async fn apply(&self, path: &[String], args: Vec<RemoteValue>) -> Result<ExposedValue, DispatchError> {
            match path {
                [method] if method == "increment" => {
                    let RemoteValue::Json(serde_json::Value::Number(n)) =
                        args.into_iter().next().unwrap_or(RemoteValue::Json(serde_json::json!(1)))
                    else {
                        return Err(DispatchError::Unserializable("expected a number".into()));
                    };
                    let delta = n.as_i64().unwrap_or(1);
                    let updated = self.value.fetch_add(delta, Ordering::SeqCst) + delta;
                    ExposedValue::json(&updated)
                }
                [method] if method == "boom" => Err(DispatchError::Thrown(crate::exposed::ThrownValue::error(
                    "RangeError",
                    "counter exploded",
                ))),
                _ => Err(DispatchError::NotCallable),
            }
        }

        async fn construct(&self, _path: &[String], args: Vec<RemoteValue>) -> Result<Arc<dyn Exposed>, DispatchError> {
            let initial = match args.into_iter().next() {
                Some(RemoteValue::Json(serde_json::Value::Number(n))) => n.as_i64().unwrap_or_default(),
                Some(_) => return Err(DispatchError::Unserializable("expected a number".into())),
                None => 0,
            };
            Ok(Arc::new(Counter {
                value: std::sync::atomic::AtomicI64::new(initial),
                finalized: Arc::new(AtomicBool::new(false)),
            }))
        }

        fn finalize(&self) {
            self.finalized.store(true, Ordering::SeqCst);
        }
    }

    /// A plain callable exposed at the root path — stands in for a
    /// function-valued argument (spec §8 scenario 4: "pass a proxy as a
    /// call argument").
    struct Doubler;

    #[async_trait]
    impl Exposed for Doubler {
        fn get(&self, path: &[String]) -> Result<ExposedValue, DispatchError> {
            Err(DispatchError::NoSuchPath(path.to_vec()))
        }

        fn set(&self, path: &[String], _value: RemoteValue) -> Result<(), DispatchError> {
            Err(DispatchError::NoSuchPath(path.to_vec()))
        }

        async fn apply(&self, path: &[String], args: Vec<RemoteValue>) -> Result<ExposedValue, DispatchError> {
            match path {
                [] => {
                    let Some(RemoteValue::Json(serde_json::Value::Number(n))) = args.into_iter().next() else {
                        return Err(DispatchError::Unserializable("expected a number".into()));
                    };
                    ExposedValue::json(&(n.as_i64().unwrap_or_default() * 2))
                }
                _ => Err(DispatchError::NotCallable),
            }
        }

        async fn construct(&self, _path: &[String], _args: Vec<RemoteValue>) -> Result<Arc<dyn Exposed>, DispatchError> {
            Err(DispatchError::NotConstructible)
        }
    }

    /// Receives a callback argument and calls it straight back — exercises
    /// that a `RemoteValue::Handle` argument survives `Exposed::apply`
    /// rather than being flattened to `null`.
    struct Dispatcher;

    #[async_trait]
    impl Exposed for Dispatcher {
        fn get(&self, path: &[String]) -> Result<ExposedValue, DispatchError> {
            Err(DispatchError::NoSuchPath(path.to_vec()))
        }

        fn set(&self, path: &[String], _value: RemoteValue) -> Result<(), DispatchError> {
            Err(DispatchError::NoSuchPath(path.to_vec()))
        }

        async fn apply(&self, path: &[String], args: Vec<RemoteValue>) -> Result<ExposedValue, DispatchError> {
            match path {
                [method] if method == "invoke" => {
                    let callback = args
                        .into_iter()
                        .next()
                        .ok_or_else(|| DispatchError::Unserializable("missing callback".into()))?;
                    let callback = callback
                        .into_handle()
                        .map_err(|_| DispatchError::Unserializable("expected a callback proxy".into()))?;
                    let result = callback
                        .apply(vec![ExposedValue::Json(serde_json::json!(21))])
                        .await
                        .map_err(|e| DispatchError::Unserializable(e.to_string()))?;
                    let json = result.into_json().map_err(|e| DispatchError::Unserializable(e.to_string()))?;
                    Ok(ExposedValue::Json(json))
                }
                _ => Err(DispatchError::NotCallable),
            }
        }

        async fn construct(&self, _path: &[String], _args: Vec<RemoteValue>) -> Result<Arc<dyn Exposed>, DispatchError> {
            Err(DispatchError::NotConstructible)
        }
    }

    struct LocalFactory;

    impl ChannelFactory for LocalFactory {
        fn create_pair(&self) -> (Arc<dyn Endpoint>, Arc<dyn Endpoint>) {
            let (a, b) = spawn_pair();
            (a, b)
        }
    }

    #[tokio::test]
    async fn get_returns_current_value() {
        let session = Session::new(Arc::new(LocalFactory));
        let (local, remote) = spawn_pair();
        let finalized = Arc::new(AtomicBool::new(false));
        let counter = Arc::new(Counter { value: std::sync::atomic::AtomicI64::new(7), finalized: finalized.clone() });

        crate::expose::expose(counter, local, OriginPolicy::allow_all(), session.clone());
        let handle = crate::proxy::wrap(remote, false, session);

        let value = handle.field("value").get().await.unwrap();
        assert_eq!(value.into_json().unwrap(), serde_json::json!(7));
    }

    #[tokio::test]
    async fn apply_increments_and_returns_new_value() {
        let session = Session::new(Arc::new(LocalFactory));
        let (local, remote) = spawn_pair();
        let finalized = Arc::new(AtomicBool::new(false));
        let counter = Arc::new(Counter { value: std::sync::atomic::AtomicI64::new(0), finalized: finalized.clone() });

        crate::expose::expose(counter, local, OriginPolicy::allow_all(), session.clone());
        let handle = crate::proxy::wrap(remote, false, session);

        let result = handle
            .field("increment")
            .apply(vec![ExposedValue::Json(serde_json::json!(5))])
            .await
            .unwrap();
        assert_eq!(result.into_json().unwrap(), serde_json::json!(5));
    }

    #[tokio::test]
    async fn thrown_value_surfaces_as_remote_error() {
        let session = Session::new(Arc::new(LocalFactory));
        let (local, remote) = spawn_pair();
        let finalized = Arc::new(AtomicBool::new(false));
        let counter = Arc::new(Counter { value: std::sync::atomic::AtomicI64::new(0), finalized: finalized.clone() });

        crate::expose::expose(counter, local, OriginPolicy::allow_all(), session.clone());
        let handle = crate::proxy::wrap(remote, false, session);

        let err = handle.field("boom").apply(vec![]).await.unwrap_err();
        assert!(matches!(err, crate::error::RemoteError::Remote(_)));
    }

    #[tokio::test]
    async fn release_invokes_finalizer_on_the_exposed_side() {
        let session = Session::new(Arc::new(LocalFactory));
        let (local, remote) = spawn_pair();
        let finalized = Arc::new(AtomicBool::new(false));
        let counter = Arc::new(Counter { value: std::sync::atomic::AtomicI64::new(0), finalized: finalized.clone() });

        crate::expose::expose(counter, local, OriginPolicy::allow_all(), session.clone());
        let handle = crate::proxy::wrap(remote, false, session);

        handle.release().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(finalized.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn release_on_a_field_navigated_handle_is_an_error() {
        let session = Session::new(Arc::new(LocalFactory));
        let (local, remote) = spawn_pair();
        let finalized = Arc::new(AtomicBool::new(false));
        let counter = Arc::new(Counter { value: std::sync::atomic::AtomicI64::new(0), finalized: finalized.clone() });

        crate::expose::expose(counter, local, OriginPolicy::allow_all(), session.clone());
        let handle = crate::proxy::wrap(remote, false, session);

        let err = handle.field("value").release().await.unwrap_err();
        assert!(matches!(err, crate::error::RemoteError::NotRoot));
    }

    #[tokio::test]
    async fn construct_returns_a_working_proxy() {
        let session = Session::new(Arc::new(LocalFactory));
        let (local, remote) = spawn_pair();
        let finalized = Arc::new(AtomicBool::new(false));
        let counter = Arc::new(Counter { value: std::sync::atomic::AtomicI64::new(0), finalized: finalized.clone() });

        crate::expose::expose(counter, local, OriginPolicy::allow_all(), session.clone());
        let handle = crate::proxy::wrap(remote, false, session);

        let result = handle.construct(vec![ExposedValue::Json(serde_json::json!(10))]).await.unwrap();
        let fresh = result.into_handle().unwrap();

        let value = fresh.field("value").get().await.unwrap();
        assert_eq!(value.into_json().unwrap(), serde_json::json!(10));

        let incremented = fresh.field("increment").apply(vec![ExposedValue::Json(serde_json::json!(1))]).await.unwrap();
        assert_eq!(incremented.into_json().unwrap(), serde_json::json!(11));
    }

    #[tokio::test]
    async fn proxy_marked_callback_works_as_a_call_argument() {
        let session = Session::new(Arc::new(LocalFactory));
        let (local, remote) = spawn_pair();

        crate::expose::expose(Arc::new(Dispatcher), local, OriginPolicy::allow_all(), session.clone());
        let handle = crate::proxy::wrap(remote, false, session);

        let result = handle
            .field("invoke")
            .apply(vec![ExposedValue::Proxy(Arc::new(Doubler))])
            .await
            .unwrap();
        assert_eq!(result.into_json().unwrap(), serde_json::json!(42));
    }

    #[tokio::test]
    async fn bind_is_a_local_no_op() {
        let session = Session::new(Arc::new(LocalFactory));
        let (local, remote) = spawn_pair();
        let finalized = Arc::new(AtomicBool::new(false));
        let counter = Arc::new(Counter { value: std::sync::atomic::AtomicI64::new(3), finalized: finalized.clone() });

        crate::expose::expose(counter, local, OriginPolicy::allow_all(), session.clone());
        let handle = crate::proxy::wrap(remote, false, session);

        let bound = handle.field("value").field("bind").apply(vec![]).await.unwrap();
        let bound_handle = bound.into_handle().unwrap();
        assert_eq!(bound_handle.path().len(), 1);
        assert_eq!(bound_handle.path()[0], "value");

        let value = bound_handle.get().await.unwrap();
        assert_eq!(value.into_json().unwrap(), serde_json::json!(3));
    }

    #[tokio::test]
    async fn awaiting_a_root_proxy_never_round_trips() {
        let session = Session::new(Arc::new(LocalFactory));
        let (local, remote) = spawn_pair();
        let finalized = Arc::new(AtomicBool::new(false));
        let counter = Arc::new(Counter { value: std::sync::atomic::AtomicI64::new(9), finalized: finalized.clone() });

        crate::expose::expose(counter, local, OriginPolicy::allow_all(), session.clone());
        let handle = crate::proxy::wrap(remote, false, session);

        let resolved = handle.await.unwrap();
        let resolved_handle = resolved.into_handle().unwrap();
        assert!(resolved_handle.path().is_empty());
    }

    #[tokio::test]
    async fn awaiting_a_field_navigated_handle_performs_a_get() {
        let session = Session::new(Arc::new(LocalFactory));
        let (local, remote) = spawn_pair();
        let finalized = Arc::new(AtomicBool::new(false));
        let counter = Arc::new(Counter { value: std::sync::atomic::AtomicI64::new(5), finalized: finalized.clone() });

        crate::expose::expose(counter, local, OriginPolicy::allow_all(), session.clone());
        let handle = crate::proxy::wrap(remote, false, session);

        let value = handle.field("value").await.unwrap();
        assert_eq!(value.into_json().unwrap(), serde_json::json!(5));
    }

    #[tokio::test]
    async fn legacy_flag_is_sticky_once_detected_on_an_endpoint() {
        let session = Session::new(Arc::new(LocalFactory));
        let (endpoint, _other) = spawn_pair();

        // Simulates what `expose::dispatch` does on receiving an inbound
        // legacy-tagged request (spec §4.5 detection).
        session.lifetime.mark_legacy(&endpoint);
        assert!(session.is_legacy(&endpoint));

        // A later `wrap` over the same endpoint asks for current encoding
        // but is still forced legacy because the endpoint was already
        // flagged — the bug this guards against silently reverted it.
        let handle = crate::proxy::wrap(endpoint, false, session);
        assert!(handle.is_legacy());
    }
}
