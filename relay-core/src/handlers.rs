//! Named, ordered transfer handlers (spec §3, §4.3) — the codec's
//! extension point. Registration order is iteration order, so the first
//! handler whose `can_handle` matches wins, exactly as spec requires.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::endpoint::Transfer;
use crate::error::CodecError;
use crate::exposed::{ExposedValue, OriginPolicy, ThrownValue};
use crate::proxy::RemoteValue;
use crate::session::Session;

/// Per-call context a handler needs beyond the bare payload: the shared
/// session (channel factory, registry, lifetime table, correlator) and
/// whether this call is legacy-encoded.
///
/// The session's channel factory is the "channel constructor" spec §1
/// calls out as an external collaborator the core consumes but does not
/// own.
#[derive(Clone)]
pub struct CodecContext {
    pub session: Arc<Session>,
    pub legacy: bool,
}

/// {canHandle, serialize, deserialize} (spec §3).
///
/// `deserialize` additionally receives the message's shared transfer
/// queue: unlike the source language, Rust cannot embed a live channel
/// handle positionally inside a JSON payload, so a handler that needs one
/// (only `proxy` does) pops it off the front of the queue. Decode visits
/// `value`/`argument_list` in the same order encode produced their
/// transfers, so the queue always has the right transfer at its front
/// when a handler needs one.
#[async_trait]
pub trait TransferHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_handle(&self, value: &ExposedValue) -> bool;

    async fn serialize(
        &self,
        value: ExposedValue,
        ctx: &CodecContext,
    ) -> Result<(Value, Vec<Transfer>), CodecError>;

    async fn deserialize(
        &self,
        payload: Value,
        transfers: &mut VecDeque<Transfer>,
        ctx: &CodecContext,
    ) -> Result<RemoteValue, CodecError>;
}

/// Serializes a marked object by spawning a sub-channel and exposing it on
/// one side (spec §4.3). Deserialize starts the opposite port (if it has a
/// start capability) and wraps it into a proxy.
pub struct ProxyHandler;

#[async_trait]
impl TransferHandler for ProxyHandler {
    fn name(&self) -> &'static str {
        "proxy"
    }

    fn can_handle(&self, value: &ExposedValue) -> bool {
        matches!(value, ExposedValue::Proxy(_))
    }

    async fn serialize(
        &self,
        value: ExposedValue,
        ctx: &CodecContext,
    ) -> Result<(Value, Vec<Transfer>), CodecError> {
        let ExposedValue::Proxy(exposed) = value else {
            return Err(CodecError::EncodeFailed("proxy handler given a non-proxy value".into()));
        };
        let (local, remote) = ctx.session.factory.create_pair();
        crate::expose::expose(exposed, local, OriginPolicy::allow_all(), ctx.session.clone());
        Ok((Value::Null, vec![Transfer::Port(remote)]))
    }

    async fn deserialize(
        &self,
        _payload: Value,
        transfers: &mut VecDeque<Transfer>,
        ctx: &CodecContext,
    ) -> Result<RemoteValue, CodecError> {
        let Some(Transfer::Port(port)) = transfers.pop_front() else {
            return Err(CodecError::DecodeFailed("proxy handler expected a port transfer".into()));
        };
        port.start();
        let handle = crate::proxy::wrap(port, ctx.legacy, ctx.session.clone());
        Ok(RemoteValue::Handle(Arc::new(handle)))
    }
}

/// Serializes thrown values: error-like values flatten to
/// `{name, message, stack}`; everything else passes through verbatim
/// (spec §4.3).
pub struct ThrowHandler;

#[async_trait]
impl TransferHandler for ThrowHandler {
    fn name(&self) -> &'static str {
        "throw"
    }

    fn can_handle(&self, value: &ExposedValue) -> bool {
        matches!(value, ExposedValue::Thrown(_))
    }

    async fn serialize(
        &self,
        value: ExposedValue,
        _ctx: &CodecContext,
    ) -> Result<(Value, Vec<Transfer>), CodecError> {
        let ExposedValue::Thrown(thrown) = value else {
            return Err(CodecError::EncodeFailed("throw handler given a non-thrown value".into()));
        };
        let payload = serde_json::to_value(&thrown).map_err(|e| CodecError::EncodeFailed(e.to_string()))?;
        Ok((payload, Vec::new()))
    }

    async fn deserialize(
        &self,
        payload: Value,
        _transfers: &mut VecDeque<Transfer>,
        _ctx: &CodecContext,
    ) -> Result<RemoteValue, CodecError> {
        let thrown: ThrownValue =
            serde_json::from_value(payload).map_err(|e| CodecError::DecodeFailed(e.to_string()))?;
        Ok(RemoteValue::Thrown(thrown))
    }
}

/// Named, insertion-ordered set of handlers (spec §6: "exposed as a named,
/// mutable collection keyed by stable handler names"). Built-ins `proxy`
/// and `throw` are present at construction and are not special-cased by
/// the codec — external handlers compose identically (spec §9).
#[derive(Clone)]
pub struct HandlerRegistry {
    entries: Vec<(&'static str, Arc<dyn TransferHandler>)>,
}

impl HandlerRegistry {
    /// Registry with the built-in `proxy` and `throw` handlers installed,
    /// in that order.
    pub fn with_builtins() -> Self {
        let mut registry = HandlerRegistry { entries: Vec::new() };
        registry.register(Arc::new(ProxyHandler));
        registry.register(Arc::new(ThrowHandler));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn TransferHandler>) {
        let name = handler.name();
        self.entries.retain(|(n, _)| *n != name);
        self.entries.push((name, handler));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn TransferHandler>> {
        self.entries.iter().find(|(n, _)| *n == name).map(|(_, h)| h)
    }

    pub fn find_for(&self, value: &ExposedValue) -> Option<&Arc<dyn TransferHandler>> {
        self.entries.iter().find(|(_, h)| h.can_handle(value)).map(|(_, h)| h)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
