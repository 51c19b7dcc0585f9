//! Per-module error enums (spec §7), following the teacher's convention of
//! one `thiserror` enum per concern (`wayland_client::cx::ConnectError`,
//! `conn::ConnectError`, `global::GlobalError`, ...) rather than a single
//! catch-all. [`RelayError`] aggregates them for callers that just want one
//! `?`-able type.

use crate::endpoint::EndpointError;
use crate::exposed::{DispatchError, ThrownValue};

#[derive(thiserror::Error, Debug, Clone)]
pub enum CodecError {
    #[error("no transfer handler named {0:?}")]
    UnknownHandler(String),
    #[error("failed to encode value: {0}")]
    EncodeFailed(String),
    #[error("failed to decode value: {0}")]
    DecodeFailed(String),
}

/// Surfaced to a proxy caller when the remote side threw, the reply could
/// not be decoded, or the proxy had already been released (spec §7 a-c).
#[derive(thiserror::Error, Debug, Clone)]
pub enum RemoteError {
    #[error("remote threw: {0}")]
    Remote(ThrownValue),
    #[error("Unserializable return value")]
    Unserializable,
    #[error("Proxy has been released and is not useable")]
    Released,
    #[error("release() was called on a field-navigated handle, which owns no lifetime slot to release")]
    NotRoot,
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}
