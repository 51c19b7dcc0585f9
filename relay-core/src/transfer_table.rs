//! One-shot side-table mapping a value to the transferables it should move
//! with when next encoded as RAW (spec §3, §8, P9).
//!
//! Rust values carry no object identity the way JS objects do, so
//! [`transfer`] tags the serialized payload with an opaque marker instead
//! of keying off the value's address; [`take_for_value`] strips that
//! marker and resolves the associated transferables, consuming the
//! association exactly once.

use std::sync::OnceLock;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;

use crate::endpoint::Transfer;
use crate::error::CodecError;

const TAG_KEY: &str = "__relay_transfer_tag__";
const VALUE_KEY: &str = "__relay_transfer_value__";

fn table() -> &'static DashMap<u64, Vec<Transfer>> {
    static TABLE: OnceLock<DashMap<u64, Vec<Transfer>>> = OnceLock::new();
    TABLE.get_or_init(DashMap::new)
}

/// Records that `transfers` should move (not clone) with `value` the next
/// time it is encoded as RAW. Returns the value unchanged, annotated with
/// a hidden tag that [`take_for_value`] strips back off on encode.
pub fn transfer<T: Serialize>(value: T, transfers: Vec<Transfer>) -> Result<Value, CodecError> {
    let payload = serde_json::to_value(value).map_err(|e| CodecError::EncodeFailed(e.to_string()))?;
    let tag = fastrand::u64(..);
    table().insert(tag, transfers);
    Ok(serde_json::json!({ TAG_KEY: tag, VALUE_KEY: payload }))
}

/// If `value` carries a transfer tag, consumes and returns the associated
/// transferables plus the untagged payload. Otherwise returns `value`
/// unchanged with no transferables.
pub(crate) fn take_for_value(value: Value) -> (Value, Vec<Transfer>) {
    let Value::Object(ref map) = value else {
        return (value, Vec::new());
    };
    let Some(tag) = map.get(TAG_KEY).and_then(Value::as_u64) else {
        return (value, Vec::new());
    };
    let inner = map.get(VALUE_KEY).cloned().unwrap_or(Value::Null);
    let transfers = table().remove(&tag).map(|(_, v)| v).unwrap_or_default();
    (inner, transfers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_value_yields_its_transfers_exactly_once() {
        let transfers = vec![Transfer::Opaque(Box::new(7i32))];
        let tagged = transfer(&serde_json::json!({"x": 1}), transfers).unwrap();

        let (value, got) = take_for_value(tagged.clone());
        assert_eq!(value, serde_json::json!({"x": 1}));
        assert_eq!(got.len(), 1);

        // Re-encoding the same tagged value without re-annotating finds no
        // entry left in the table: the association is consumed exactly once.
        let (value_again, got_again) = take_for_value(tagged);
        assert_eq!(value_again, serde_json::json!({"x": 1}));
        assert!(got_again.is_empty());
    }

    #[test]
    fn untagged_value_passes_through_with_no_transfers() {
        let (value, transfers) = take_for_value(serde_json::json!({"plain": true}));
        assert_eq!(value, serde_json::json!({"plain": true}));
        assert!(transfers.is_empty());
    }
}
