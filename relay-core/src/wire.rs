//! Wire message and wire-value schemas.
//!
//! Mirrors the shape of a Wayland [`Message`](https://docs.rs/wayland-backend) —
//! a sender path, an opcode-like operation tag, and an argument list — but
//! generalized from a fixed set of protocol opcodes to the six dynamic
//! operations a remote-object proxy needs.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A single navigation step: a field name, array index, or method name.
pub type PathSegment = String;

/// The path from the exposed root to the value a request addresses.
/// `SmallVec` keeps the common shallow-path case allocation-free, the way
/// the teacher uses it for `Message::args`.
pub type Path = SmallVec<[PathSegment; 4]>;

/// The six operations a wire request can carry.
///
/// Two encodings coexist on the wire: the current string-tagged encoding
/// and a legacy numeric encoding (spec §4.5). [`Operation`] is the decoded,
/// encoding-independent form; [`LegacyEncoding`] carries the mapping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Set,
    Apply,
    Construct,
    Endpoint,
    Release,
}

impl Operation {
    /// The numeric tag used by legacy-encoded endpoints (spec §4.5).
    pub fn legacy_code(self) -> u8 {
        match self {
            Operation::Get => 0,
            Operation::Set => 1,
            Operation::Apply => 2,
            Operation::Construct => 3,
            Operation::Endpoint => 4,
            Operation::Release => 5,
        }
    }

    pub fn from_legacy_code(code: u8) -> Option<Operation> {
        Some(match code {
            0 => Operation::Get,
            1 => Operation::Set,
            2 => Operation::Apply,
            3 => Operation::Construct,
            4 => Operation::Endpoint,
            5 => Operation::Release,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Operation::Get => "GET",
            Operation::Set => "SET",
            Operation::Apply => "APPLY",
            Operation::Construct => "CONSTRUCT",
            Operation::Endpoint => "ENDPOINT",
            Operation::Release => "RELEASE",
        }
    }

    pub fn from_name(name: &str) -> Option<Operation> {
        Some(match name {
            "GET" => Operation::Get,
            "SET" => Operation::Set,
            "APPLY" => Operation::Apply,
            "CONSTRUCT" => Operation::Construct,
            "ENDPOINT" => Operation::Endpoint,
            "RELEASE" => Operation::Release,
            _ => return None,
        })
    }
}

/// The on-the-wire operation tag: either the current string form or the
/// legacy numeric form. Decoding either marks the reply's encoding (spec
/// §4.5): "a numeric operation tag both selects the operation and marks
/// the reply encoding for that call."
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationTag {
    Current(String),
    Legacy(u8),
}

impl OperationTag {
    pub fn encode(op: Operation, legacy: bool) -> Self {
        if legacy {
            OperationTag::Legacy(op.legacy_code())
        } else {
            OperationTag::Current(op.name().to_string())
        }
    }

    /// Decode the tag, returning the operation and whether this call arrived
    /// (or must reply) in legacy encoding.
    pub fn decode(&self) -> Option<(Operation, bool)> {
        match self {
            OperationTag::Current(s) => Operation::from_name(s).map(|op| (op, false)),
            OperationTag::Legacy(n) => Operation::from_legacy_code(*n).map(|op| (op, true)),
        }
    }
}

/// Tagged union carried as a `WireValue` payload: RAW values ride the
/// channel's own clone mechanism (here: `serde_json::Value`, the
/// structural-clone surrogate used throughout this workspace); HANDLER
/// values defer materialization to a named transfer handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireValue {
    #[serde(rename = "raw")]
    Raw { value: serde_json::Value },
    #[serde(rename = "handler")]
    Handler {
        name: String,
        value: serde_json::Value,
    },
    /// Legacy variants use a distinct tag namespace (spec §4.5) but carry
    /// identical payload shapes; kept separate so a legacy peer's wire
    /// bytes round-trip unchanged through this process.
    #[serde(rename = "legacy_raw")]
    LegacyRaw { value: serde_json::Value },
    #[serde(rename = "legacy_handler")]
    LegacyHandler {
        name: String,
        value: serde_json::Value,
    },
}

impl WireValue {
    pub fn is_legacy(&self) -> bool {
        matches!(self, WireValue::LegacyRaw { .. } | WireValue::LegacyHandler { .. })
    }
}

/// A request or reply message as it travels over an [`crate::endpoint::Endpoint`].
///
/// `ty` is `Some` for requests (spec §3's "Wire message (request)" shape)
/// and `None` for replies — a reply carries only `id` and `value`, there
/// being nothing left to dispatch on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    /// Opaque id, unique within the endpoint's lifetime; correlates a
    /// request with its single reply (spec I1).
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ty: Option<OperationTag>,
    #[serde(default)]
    pub path: Path,
    /// The SET value (requests) or the call's outcome (replies).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<WireValue>,
    /// Present only for APPLY/CONSTRUCT requests.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub argument_list: Option<Vec<WireValue>>,
}

impl WireMessage {
    pub fn request(id: impl Into<String>, op: Operation, legacy: bool, path: Path) -> Self {
        WireMessage {
            id: id.into(),
            ty: Some(OperationTag::encode(op, legacy)),
            path,
            value: None,
            argument_list: None,
        }
    }

    pub fn reply(id: impl Into<String>, value: WireValue) -> Self {
        WireMessage { id: id.into(), ty: None, path: Path::new(), value: Some(value), argument_list: None }
    }

    pub fn is_request(&self) -> bool {
        self.ty.is_some()
    }
}
