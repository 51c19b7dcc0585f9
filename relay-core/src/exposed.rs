//! The dynamic object graph an [`crate::expose::expose`] call dispatches
//! against, and the values that flow through it.
//!
//! Rust has no per-access interception the way the source language does
//! (spec §9 "Virtualizing handle"), so the object graph is addressed
//! through this explicit navigation trait instead of an intercepted
//! property lookup. `relay-macros` generates implementations of this
//! trait from an annotated trait definition; it can also be implemented
//! by hand for dynamic use cases.
//!
//! Modeled after the teacher's `ObjectData` (spec's exposer dispatch +
//! finalizer hook are exactly `ObjectData::event`/`destroyed`).

use std::sync::Arc;

use async_trait::async_trait;
use downcast_rs::DowncastSync;
use serde::{Deserialize, Serialize};

use crate::proxy::RemoteValue;
use crate::wire::PathSegment;

/// An error-like thrown value, flattened the way the built-in `throw`
/// transfer handler requires (spec §4.3): `{name, message, stack}` for
/// error values, the raw value verbatim for anything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

impl ErrorPayload {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        ErrorPayload { name: name.into(), message: message.into(), stack: None }
    }
}

impl std::fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// A value captured as "thrown": either a structured error or an
/// arbitrary raw value passed through verbatim (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThrownValue {
    Error(ErrorPayload),
    Raw(serde_json::Value),
}

impl ThrownValue {
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        ThrownValue::Error(ErrorPayload::new(name, message))
    }
}

/// The outcome of a `get`/`set`/`apply`/`construct` dispatch, before it is
/// handed to the wire codec (spec §4.3's transfer-handler `canHandle`
/// logic operates on this enum's variants rather than runtime markers,
/// since Rust values do not carry an intrinsic proxy/thrown tag).
#[derive(Debug, Clone)]
pub enum ExposedValue {
    /// A leaf value, structurally cloned via serde.
    Json(serde_json::Value),
    /// An object marked to be routed through a fresh sub-channel on
    /// serialization (spec's proxy marker / `proxy()` free function).
    Proxy(Arc<dyn Exposed>),
    /// A thrown value, routed through the built-in `throw` handler.
    Thrown(ThrownValue),
    /// The empty wire value (spec: RELEASE's result).
    Unit,
}

impl ExposedValue {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, DispatchError> {
        serde_json::to_value(value)
            .map(ExposedValue::Json)
            .map_err(|e| DispatchError::Unserializable(e.to_string()))
    }
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum DispatchError {
    #[error("no such path: {0:?}")]
    NoSuchPath(Vec<String>),
    #[error("value at path is not callable")]
    NotCallable,
    #[error("value at path is not constructible")]
    NotConstructible,
    #[error("{0}")]
    Thrown(ThrownValue),
    #[error("value could not be serialized: {0}")]
    Unserializable(String),
}

impl DispatchError {
    pub fn into_thrown(self) -> ThrownValue {
        match self {
            DispatchError::Thrown(t) => t,
            other => ThrownValue::error("DispatchError", other.to_string()),
        }
    }
}

/// The object graph dispatched against by `GET`/`SET`/`APPLY`/`CONSTRUCT`
/// (spec §4.1). One `Exposed` is installed per call to
/// [`crate::expose::expose`]; `relay-macros::Remote` derives this trait
/// from a plain Rust trait definition.
///
/// `get` *returns* an [`ExposedValue`] (what the exposer hands back onto
/// the wire), but `set`/`apply`/`construct` *receive* decoded
/// [`RemoteValue`]s — the values the other side sent, which may
/// themselves be callback proxies the other side marked. Routing incoming
/// arguments through `ExposedValue` instead would silently drop any
/// `RemoteValue::Handle` argument, since `ExposedValue` has no variant for
/// "a handle the exposer side already holds a decoded reference to."
#[async_trait]
pub trait Exposed: DowncastSync {
    /// Resolve the value addressed by `path` (empty path means "the
    /// exposed root itself").
    fn get(&self, path: &[PathSegment]) -> Result<ExposedValue, DispatchError>;

    /// Assign `value` at `path`.
    fn set(&self, path: &[PathSegment], value: RemoteValue) -> Result<(), DispatchError>;

    /// Invoke the callable at `path` with `args`.
    async fn apply(
        &self,
        path: &[PathSegment],
        args: Vec<RemoteValue>,
    ) -> Result<ExposedValue, DispatchError>;

    /// Invoke the constructor at `path` with `args`, producing a fresh
    /// object that the exposer marks as proxy-carrying (spec §4.1 CONSTRUCT).
    async fn construct(
        &self,
        path: &[PathSegment],
        args: Vec<RemoteValue>,
    ) -> Result<Arc<dyn Exposed>, DispatchError>;

    /// Invoked exactly once, after this object's dedicated endpoint
    /// receives `RELEASE` (spec §4.1 RELEASE, P4). Default: no finalizer.
    fn finalize(&self) {}
}

downcast_rs::impl_downcast!(sync Exposed);

/// Inbound-origin allow-list (spec §6): exact strings, the `"*"` wildcard,
/// or pattern-matching entries. An empty policy permits all origins.
#[derive(Clone, Default)]
pub struct OriginPolicy {
    entries: Vec<OriginMatcher>,
}

#[derive(Clone)]
enum OriginMatcher {
    Exact(String),
    Wildcard,
    Pattern(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl OriginPolicy {
    pub fn allow_all() -> Self {
        OriginPolicy { entries: vec![OriginMatcher::Wildcard] }
    }

    pub fn exact(origins: impl IntoIterator<Item = String>) -> Self {
        OriginPolicy { entries: origins.into_iter().map(OriginMatcher::Exact).collect() }
    }

    pub fn with_pattern(mut self, pattern: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.entries.push(OriginMatcher::Pattern(Arc::new(pattern)));
        self
    }

    /// Returns whether `origin` is accepted. A missing origin (the
    /// transport did not report one) is always accepted — there is
    /// nothing to check against.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        let Some(origin) = origin else { return true };
        self.entries.iter().any(|m| match m {
            OriginMatcher::Exact(o) => o == origin,
            OriginMatcher::Wildcard => true,
            OriginMatcher::Pattern(f) => f(origin),
        })
    }
}
