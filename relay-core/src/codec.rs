//! `toWire`/`fromWire` (spec §4.3): encodes a dispatch value through the
//! handler registry (falling back to RAW), and decodes a wire value back
//! using the handler named on the wire.

use std::collections::VecDeque;

use crate::endpoint::Transfer;
use crate::error::CodecError;
use crate::exposed::ExposedValue;
use crate::handlers::{CodecContext, HandlerRegistry};
use crate::proxy::RemoteValue;
use crate::transfer_table;
use crate::wire::WireValue;

/// Encode a dispatch value into its wire representation plus any
/// transferables it carries.
pub async fn to_wire(
    value: ExposedValue,
    ctx: &CodecContext,
    registry: &HandlerRegistry,
) -> Result<(WireValue, Vec<Transfer>), CodecError> {
    if let Some(handler) = registry.find_for(&value) {
        let name = handler.name().to_string();
        let (payload, transfers) = handler.serialize(value, ctx).await?;
        let wire = if ctx.legacy {
            WireValue::LegacyHandler { name, value: payload }
        } else {
            WireValue::Handler { name, value: payload }
        };
        return Ok((wire, transfers));
    }

    let json = match value {
        ExposedValue::Json(v) => v,
        ExposedValue::Unit => serde_json::Value::Null,
        // Proxy/Thrown are always claimed by a built-in handler above.
        ExposedValue::Proxy(_) | ExposedValue::Thrown(_) => {
            return Err(CodecError::EncodeFailed(
                "no handler claimed a proxy or thrown value".into(),
            ))
        }
    };
    let (json, transfers) = transfer_table::take_for_value(json);
    let wire = if ctx.legacy {
        WireValue::LegacyRaw { value: json }
    } else {
        WireValue::Raw { value: json }
    };
    Ok((wire, transfers))
}

/// Encode a whole slice of values (e.g. an argument list), in order,
/// accumulating every value's transferables into one combined list ready
/// to hand to `Endpoint::post` (spec §4.2: "encode each argument ...
/// collecting transferables").
pub async fn to_wire_many(
    values: Vec<ExposedValue>,
    ctx: &CodecContext,
    registry: &HandlerRegistry,
) -> Result<(Vec<WireValue>, Vec<Transfer>), CodecError> {
    let mut wires = Vec::with_capacity(values.len());
    let mut transfers = Vec::new();
    for value in values {
        let (wire, mut value_transfers) = to_wire(value, ctx, registry).await?;
        wires.push(wire);
        transfers.append(&mut value_transfers);
    }
    Ok((wires, transfers))
}

/// Decode a single wire value, pulling from the shared transfer queue in
/// encode order (see [`crate::handlers::TransferHandler`]).
pub async fn from_wire(
    wire: WireValue,
    transfers: &mut VecDeque<Transfer>,
    ctx: &CodecContext,
    registry: &HandlerRegistry,
) -> Result<RemoteValue, CodecError> {
    match wire {
        WireValue::Raw { value } | WireValue::LegacyRaw { value } => Ok(RemoteValue::Json(value)),
        WireValue::Handler { name, value } | WireValue::LegacyHandler { name, value } => {
            let handler = registry
                .get(&name)
                .ok_or_else(|| CodecError::UnknownHandler(name.clone()))?;
            handler.deserialize(value, transfers, ctx).await
        }
    }
}

/// Decode a whole slice of values in order against one shared transfer
/// queue built from the message's transfer list.
pub async fn from_wire_many(
    wires: Vec<WireValue>,
    transfers: Vec<Transfer>,
    ctx: &CodecContext,
    registry: &HandlerRegistry,
) -> Result<Vec<RemoteValue>, CodecError> {
    let mut queue: VecDeque<Transfer> = transfers.into();
    let mut out = Vec::with_capacity(wires.len());
    for wire in wires {
        out.push(from_wire(wire, &mut queue, ctx, registry).await?);
    }
    Ok(out)
}
