//! The exposer (spec §4.1): listens on an endpoint, resolves a path
//! against a host object, dispatches the six operations, encodes the
//! reply, honors finalizer hooks. Directly analogous to the teacher's
//! server-side dispatch loop (`ObjectData::event`), generalized from a
//! fixed opcode table to `GET`/`SET`/`APPLY`/`CONSTRUCT`/`ENDPOINT`/`RELEASE`.

use std::sync::Arc;

use crate::codec::{from_wire_many, to_wire};
use crate::endpoint::{Endpoint, IncomingEvent, Transfer};
use crate::exposed::{DispatchError, Exposed, ExposedValue, OriginPolicy, ThrownValue};
use crate::handlers::CodecContext;
use crate::proxy::RemoteValue;
use crate::session::Session;
use crate::wire::{Operation, WireMessage, WireValue};

/// Installs a persistent listener on `endpoint` that dispatches every
/// inbound request against `object`. Each message is processed
/// independently on its own spawned task — no ordering is assumed among
/// in-flight calls (spec §4.1).
pub fn expose(object: Arc<dyn Exposed>, endpoint: Arc<dyn Endpoint>, origins: OriginPolicy, session: Arc<Session>) {
    let dispatch_endpoint = endpoint.clone();
    let dispatch_session = session.clone();
    endpoint.listen(Arc::new(move |event: IncomingEvent| {
        if !event.data.is_request() {
            // Not ours: replies are the correlator's business.
            return;
        }
        if !origins.allows(event.origin.as_deref()) {
            log::warn!("relay: dropping message from disallowed origin {:?}", event.origin);
            return;
        }
        let object = object.clone();
        let endpoint = dispatch_endpoint.clone();
        let session = dispatch_session.clone();
        tokio::spawn(async move {
            dispatch(object, endpoint, session, event.data, event.transfers).await;
        });
    }));
}

async fn dispatch(
    object: Arc<dyn Exposed>,
    endpoint: Arc<dyn Endpoint>,
    session: Arc<Session>,
    msg: WireMessage,
    transfers: Vec<Transfer>,
) {
    let Some((op, legacy)) = msg.ty.as_ref().and_then(|t| t.decode()) else {
        // Unknown/malformed operation tag: silent drop (spec §4.1, §7e).
        return;
    };
    if legacy {
        session.lifetime.mark_legacy(&endpoint);
    }

    // ENDPOINT is handled outside the generic value pipeline: its result is
    // a bare port, not a value the `proxy` transfer handler should wrap a
    // second time (spec §4.1 ENDPOINT, §4.3).
    if op == Operation::Endpoint {
        let (local, remote) = session.factory.create_pair();
        expose(object.clone(), local, OriginPolicy::allow_all(), session.clone());
        let reply = WireMessage::reply(msg.id.clone(), WireValue::Raw { value: serde_json::Value::Null });
        if let Err(err) = endpoint.post(reply, vec![Transfer::Port(remote)]).await {
            log::warn!("relay: failed to post ENDPOINT reply for call {}: {err}", msg.id);
        }
        return;
    }

    let ctx = CodecContext { session: session.clone(), legacy };
    let outcome = run_operation(&object, op, &msg, transfers, &ctx, &session).await;

    let (reply_value, reply_transfers) = match outcome {
        Ok(value) => match to_wire(value, &ctx, &session.registry).await {
            Ok((wire, transfers)) => (wire, transfers),
            Err(err) => {
                log::warn!("relay: reply could not be encoded: {err}");
                let thrown = ThrownValue::error("TypeError", "Unserializable return value");
                let (wire, transfers) = to_wire(ExposedValue::Thrown(thrown), &ctx, &session.registry)
                    .await
                    .expect("the throw handler always encodes");
                (wire, transfers)
            }
        },
        Err(dispatch_err) => {
            let thrown = dispatch_err.into_thrown();
            let (wire, transfers) = to_wire(ExposedValue::Thrown(thrown), &ctx, &session.registry)
                .await
                .expect("the throw handler always encodes");
            (wire, transfers)
        }
    };

    let reply = WireMessage::reply(msg.id.clone(), reply_value);
    if let Err(err) = endpoint.post(reply, reply_transfers).await {
        log::warn!("relay: failed to post reply for call {}: {err}", msg.id);
    }

    if op == Operation::Release {
        object.finalize();
        if endpoint.is_port() {
            endpoint.close();
        }
    }
}

async fn run_operation(
    object: &Arc<dyn Exposed>,
    op: Operation,
    msg: &WireMessage,
    transfers: Vec<Transfer>,
    ctx: &CodecContext,
    session: &Arc<Session>,
) -> Result<ExposedValue, DispatchError> {
    match op {
        Operation::Get => object.get(&msg.path),
        Operation::Set => {
            let wire = msg
                .value
                .clone()
                .ok_or_else(|| DispatchError::NoSuchPath(msg.path.to_vec()))?;
            let decoded = decode_single(wire, transfers, ctx, session).await?;
            object.set(&msg.path, decoded)?;
            Ok(ExposedValue::Json(serde_json::Value::Bool(true)))
        }
        Operation::Apply => {
            let args = decode_args(msg, transfers, ctx, session).await?;
            object.apply(&msg.path, args).await
        }
        Operation::Construct => {
            let args = decode_args(msg, transfers, ctx, session).await?;
            let instance = object.construct(&msg.path, args).await?;
            Ok(ExposedValue::Proxy(instance))
        }
        Operation::Endpoint => unreachable!("ENDPOINT is handled before run_operation is called"),
        Operation::Release => Ok(ExposedValue::Unit),
    }
}

async fn decode_args(
    msg: &WireMessage,
    transfers: Vec<Transfer>,
    ctx: &CodecContext,
    session: &Arc<Session>,
) -> Result<Vec<RemoteValue>, DispatchError> {
    let wires = msg.argument_list.clone().unwrap_or_default();
    from_wire_many(wires, transfers, ctx, &session.registry)
        .await
        .map_err(|e| DispatchError::Unserializable(e.to_string()))
}

async fn decode_single(
    wire: WireValue,
    transfers: Vec<Transfer>,
    ctx: &CodecContext,
    session: &Arc<Session>,
) -> Result<RemoteValue, DispatchError> {
    let mut queue = transfers.into();
    crate::codec::from_wire(wire, &mut queue, ctx, &session.registry)
        .await
        .map_err(|e| DispatchError::Unserializable(e.to_string()))
}
