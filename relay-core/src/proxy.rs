//! The proxy / virtualizing handle (spec §4.2): turns path navigation,
//! calls, and construction into wire requests over a correlator, and owns
//! the release-on-drop lifecycle of the channel it was wrapped around.
//!
//! Rust has no intercepted property access, so where the source system's
//! proxy traps `get`/`apply`/`construct`/`has` on a `Proxy` object, this
//! type exposes the same four operations as explicit async methods plus a
//! `field` navigation step that extends the path locally with no wire
//! traffic — only a terminal operation (`get`/`apply`/`construct`) ever
//! sends a message. `relay-macros` generates strongly-typed wrappers over
//! exactly these primitives.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::codec::{from_wire, to_wire, to_wire_many};
use crate::correlator::new_call_id;
use crate::endpoint::{Endpoint, Transfer};
use crate::error::RemoteError;
use crate::exposed::{ExposedValue, ThrownValue};
use crate::handlers::CodecContext;
use crate::keys::{BIND_KEY, THEN_KEY};
use crate::session::Session;
use crate::wire::{Operation, Path, PathSegment, WireMessage};

/// A value decoded off the wire and handed to application code: either a
/// plain clone-safe leaf, a callback/object the other side marked as a
/// proxy (now wrapped as a fresh [`RemoteHandle`]), or a thrown marker a
/// caller that wants the raw shape (rather than an `Err`) asked for
/// explicitly.
#[derive(Debug, Clone)]
pub enum RemoteValue {
    Json(serde_json::Value),
    Handle(Arc<RemoteHandle>),
    Thrown(ThrownValue),
}

impl RemoteValue {
    pub fn into_json(self) -> Result<serde_json::Value, RemoteError> {
        match self {
            RemoteValue::Json(v) => Ok(v),
            RemoteValue::Thrown(t) => Err(RemoteError::Remote(t)),
            RemoteValue::Handle(_) => Err(RemoteError::Unserializable),
        }
    }

    /// Recovers a callback/proxy-marked argument as a usable handle — the
    /// counterpart to [`into_json`] for values the other side tagged with
    /// the `proxy` transfer handler rather than encoded as plain JSON.
    pub fn into_handle(self) -> Result<Arc<RemoteHandle>, RemoteError> {
        match self {
            RemoteValue::Handle(h) => Ok(h),
            RemoteValue::Thrown(t) => Err(RemoteError::Remote(t)),
            RemoteValue::Json(_) => Err(RemoteError::Unserializable),
        }
    }
}

/// A live remote-object handle: an endpoint, the path from that
/// endpoint's exposed root to the value this handle addresses, and the
/// shared session it dispatches through.
///
/// Only a *root* handle (the one [`wrap`] hands back, and the one the
/// `proxy` transfer handler materializes on decode) owns a slot in the
/// [`crate::lifetime::LifetimeRegistry`]; handles produced by [`field`]
/// are cheap unregistered views over the same endpoint, sidestepping the
/// question of when a Rust value produced by chained navigation
/// (`h.field("a").field("b")`) is "unreachable" — there is no
/// GC-finalization signal to answer that with, so only the handle an
/// application actually holds onto is charged to the refcount.
pub struct RemoteHandle {
    endpoint: Arc<dyn Endpoint>,
    path: Path,
    session: Arc<Session>,
    legacy: bool,
    released: AtomicBool,
    root: bool,
}

impl fmt::Debug for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteHandle")
            .field("path", &self.path)
            .field("legacy", &self.legacy)
            .field("root", &self.root)
            .finish()
    }
}

/// Wraps `endpoint` as a root proxy (spec `wrap`): registers it with the
/// session's lifetime table and attaches the correlator's reply listener.
/// Called once per freshly received port — by application code for a
/// top-level channel, and internally by the `proxy` transfer handler and
/// by [`RemoteHandle::endpoint_channel`] for every sub-channel a call
/// produces.
pub fn wrap(endpoint: Arc<dyn Endpoint>, legacy: bool, session: Arc<Session>) -> RemoteHandle {
    // Once an endpoint is known legacy (spec §4.5), every later wrap over
    // it must keep using legacy encoding even if this caller asked for
    // current — the flag is sticky per endpoint, not per handle.
    let legacy = legacy || session.is_legacy(&endpoint);
    session.lifetime.register(&endpoint, legacy);
    session.correlator.attach(&endpoint);
    RemoteHandle {
        endpoint,
        path: Path::new(),
        session,
        legacy,
        released: AtomicBool::new(false),
        root: true,
    }
}

impl RemoteHandle {
    /// Extends the path by one segment with no wire traffic — the proxy
    /// equivalent of a plain property `get` trap, deferred until a
    /// terminal operation actually needs a value.
    pub fn field(&self, segment: impl Into<PathSegment>) -> RemoteHandle {
        let mut path = self.path.clone();
        path.push(segment.into());
        self.with_path(path)
    }

    /// An unregistered view over the same endpoint at a different path —
    /// shared by [`field`] and the bind no-op in [`apply`].
    fn with_path(&self, path: Path) -> RemoteHandle {
        RemoteHandle {
            endpoint: self.endpoint.clone(),
            path,
            session: self.session.clone(),
            legacy: self.legacy,
            released: AtomicBool::new(true),
            root: false,
        }
    }

    pub fn path(&self) -> &[PathSegment] {
        &self.path
    }

    /// Whether this handle is using legacy (numeric-tagged) wire encoding
    /// — either because the caller asked for it at [`wrap`] time, or
    /// because the endpoint was already known legacy (spec §4.5).
    pub fn is_legacy(&self) -> bool {
        self.legacy
    }

    /// Spec P6: `then` at the proxy root never performs a round trip — an
    /// `await` over a proxy must resolve to the proxy itself rather than
    /// chase a thenable protocol that does not exist on this side. A
    /// deeper `.field("then")` (an exposed method actually named `then`)
    /// behaves like any other path segment.
    pub fn is_guarded_then(&self, segment: &str) -> bool {
        segment == THEN_KEY && self.path.is_empty()
    }

    /// GET at this handle's path (spec §4.2).
    pub async fn get(&self) -> Result<RemoteValue, RemoteError> {
        self.call(Operation::Get, None, None).await
    }

    /// SET at this handle's path (spec §4.2).
    pub async fn set(&self, value: ExposedValue) -> Result<(), RemoteError> {
        self.call(Operation::Set, Some(value), None).await.map(|_| ())
    }

    /// APPLY at this handle's path (spec §4.2). Spec P5: a terminal `bind`
    /// segment is a local no-op — it strips itself and hands back the
    /// parent path's proxy with no wire traffic, so `foo.bind(ctx)` and
    /// `foo` behave identically in later chains.
    pub async fn apply(&self, args: Vec<ExposedValue>) -> Result<RemoteValue, RemoteError> {
        if self.path.last().map(String::as_str) == Some(BIND_KEY) {
            if self.root && self.released.load(Ordering::SeqCst) {
                return Err(RemoteError::Released);
            }
            let parent = self.path[..self.path.len() - 1].iter().cloned().collect();
            return Ok(RemoteValue::Handle(Arc::new(self.with_path(parent))));
        }
        self.call(Operation::Apply, None, Some(args)).await
    }

    /// CONSTRUCT at this handle's path (spec §4.2). A proxy-carrying
    /// result arrives already wrapped as a fresh root [`RemoteHandle`] by
    /// the `proxy` transfer handler's decode side.
    pub async fn construct(&self, args: Vec<ExposedValue>) -> Result<RemoteValue, RemoteError> {
        self.call(Operation::Construct, None, Some(args)).await
    }

    /// ENDPOINT (spec §4.2, §4.1): requests a fresh channel pair re-
    /// exposing the same remote root, wraps the returned port as a new
    /// root handle. Bypasses the generic value codec — the reply carries
    /// the new port directly as a transfer, not as a `proxy`-tagged value.
    pub async fn endpoint_channel(&self) -> Result<RemoteHandle, RemoteError> {
        let message = WireMessage::request(new_call_id(), Operation::Endpoint, self.legacy, self.path.clone());
        let (_, mut transfers) = self.session.correlator.request(&self.endpoint, message, Vec::new()).await?;
        let Some(Transfer::Port(port)) = transfers.pop() else {
            return Err(RemoteError::Unserializable);
        };
        port.start();
        Ok(wrap(port, self.legacy, self.session.clone()))
    }

    /// Explicit release (spec §4.2 `[releaseProxy]`, P4): issues `RELEASE`
    /// exactly once, the moment this endpoint's last root handle goes
    /// away, and closes the endpoint if it is port-like. Only a root
    /// handle owns a lifetime-table slot (see the refcount note on
    /// [`RemoteHandle`]), so calling this on a `field()`-navigated view
    /// is a caller error rather than a silent no-op — there is no
    /// endpoint-wide release for it to trigger. Dropping a root handle
    /// without calling this runs the same logic from [`Drop`]; calling it
    /// explicitly lets a caller await the in-flight notification instead
    /// of firing it into the background.
    pub async fn release(&self) -> Result<(), RemoteError> {
        if !self.root {
            return Err(RemoteError::NotRoot);
        }
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if self.session.lifetime.deregister(&self.endpoint) {
            let message = WireMessage::request(new_call_id(), Operation::Release, self.legacy, Path::new());
            self.session.correlator.request(&self.endpoint, message, Vec::new()).await?;
            if self.endpoint.is_port() {
                self.endpoint.close();
            }
        }
        Ok(())
    }

    async fn call(
        &self,
        op: Operation,
        value: Option<ExposedValue>,
        args: Option<Vec<ExposedValue>>,
    ) -> Result<RemoteValue, RemoteError> {
        if self.root && self.released.load(Ordering::SeqCst) {
            return Err(RemoteError::Released);
        }
        let ctx = CodecContext { session: self.session.clone(), legacy: self.legacy };
        let mut message = WireMessage::request(new_call_id(), op, self.legacy, self.path.clone());
        let mut out_transfers = Vec::new();

        if let Some(value) = value {
            let (wire, mut transfers) = to_wire(value, &ctx, &self.session.registry).await?;
            message.value = Some(wire);
            out_transfers.append(&mut transfers);
        }
        if let Some(args) = args {
            let (wires, mut transfers) = to_wire_many(args, &ctx, &self.session.registry).await?;
            message.argument_list = Some(wires);
            out_transfers.append(&mut transfers);
        }

        let (reply, reply_transfers) = self.session.correlator.request(&self.endpoint, message, out_transfers).await?;
        let wire = reply.value.ok_or(RemoteError::Unserializable)?;
        let mut queue: VecDeque<Transfer> = reply_transfers.into();
        let decoded = from_wire(wire, &mut queue, &ctx, &self.session.registry).await?;
        if let RemoteValue::Thrown(thrown) = decoded {
            return Err(RemoteError::Remote(thrown));
        }
        Ok(decoded)
    }
}

/// Spec P6: `await`ing a bare proxy must not chase a thenable protocol
/// Rust doesn't have. At the root path this resolves to the handle itself
/// with no wire traffic, via [`RemoteHandle::is_guarded_then`]; at any
/// other path `.await` performs the `GET` it would anywhere else.
impl std::future::IntoFuture for RemoteHandle {
    type Output = Result<RemoteValue, RemoteError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            if self.is_guarded_then(THEN_KEY) {
                return Ok(RemoteValue::Handle(Arc::new(self)));
            }
            self.get().await
        })
    }
}

impl Drop for RemoteHandle {
    fn drop(&mut self) {
        if !self.root || self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if !self.session.lifetime.deregister(&self.endpoint) {
            return;
        }
        let endpoint = self.endpoint.clone();
        let session = self.session.clone();
        let legacy = self.legacy;
        // Drop cannot be async; the RELEASE notification and any
        // transport teardown it triggers are pushed onto the runtime
        // instead of awaited here. Requires a tokio runtime to be active
        // at drop time, true of every entry point this workspace ships.
        tokio::spawn(async move {
            let message = WireMessage::request(new_call_id(), Operation::Release, legacy, Path::new());
            if let Err(err) = session.correlator.request(&endpoint, message, Vec::new()).await {
                log::debug!("relay: release notification failed: {err}");
            }
            if endpoint.is_port() {
                endpoint.close();
            }
        });
    }
}
