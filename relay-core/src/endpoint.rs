//! Minimal contract over a bidirectional channel (spec §3, §6).
//!
//! The core never inspects a concrete transport; it only ever reaches for
//! the capabilities below. This plays the role `wayland_sys`'s `UnixStream`
//! plumbing plays for the teacher, generalized to any duplex channel with
//! structured-clone semantics (worker threads, WebSockets, in-process
//! `mpsc` pairs — see `relay::local_channel` for the one transport this
//! workspace ships).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::wire::WireMessage;

/// An incoming message plus the sender's claimed origin, mirroring the
/// `{data, origin?}` event shape of spec §6.
pub struct IncomingEvent {
    pub data: WireMessage,
    pub origin: Option<String>,
    /// Transferables delivered alongside this message, in the same order
    /// the sender's codec produced them while walking `value`/
    /// `argument_list` (spec §4.3: a transferred value is embedded
    /// positionally in the cloned structure; since this workspace's wire
    /// values are plain JSON, the transfer itself travels out-of-band here
    /// and is matched back up by decode order).
    pub transfers: Vec<Transfer>,
}

/// A value transferred (moved) alongside a message rather than cloned.
/// The only transferable this core ships is a sub-channel endpoint — the
/// result of the `proxy` transfer handler or an `ENDPOINT` request (spec
/// §4.3, §4.1). Applications may extend this for transport-specific
/// transferables (e.g. file descriptors) without changing the core.
pub enum Transfer {
    Port(Arc<dyn Endpoint>),
    Opaque(Box<dyn std::any::Any + Send + Sync>),
}

impl fmt::Debug for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transfer::Port(_) => f.write_str("Transfer::Port(..)"),
            Transfer::Opaque(_) => f.write_str("Transfer::Opaque(..)"),
        }
    }
}

/// Identifies a registered incoming-message listener, returned by
/// [`Endpoint::listen`] so it can later be removed via [`Endpoint::unlisten`].
pub type ListenerId = u64;

pub type IncomingHandler = Arc<dyn Fn(IncomingEvent) + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum EndpointError {
    #[error("endpoint is closed")]
    Closed,
    #[error("failed to post message: {0}")]
    PostFailed(String),
}

/// Duplex message channel meeting the capability contract of spec §6.
///
/// `start`/`close` default to no-ops; concrete transports override them
/// only when they have meaningful startup/teardown (e.g. a message-port
/// that must be started before it delivers events, or a socket that must
/// be closed when its last proxy releases).
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn post(&self, message: WireMessage, transfers: Vec<Transfer>) -> Result<(), EndpointError>;

    fn listen(&self, handler: IncomingHandler) -> ListenerId;

    fn unlisten(&self, id: ListenerId);

    fn start(&self) {}

    fn close(&self) {}

    /// The capability probe set at wrap/attach time (spec §3): only
    /// port-like sub-channels (materialized by the `proxy` handler or by
    /// `ENDPOINT`) are eligible for automatic `close()` on release.
    fn is_port(&self) -> bool {
        false
    }
}

/// Allocates a fresh bidirectional channel pair. The core consumes this as
/// an external collaborator (spec §1: "channel constructors" are out of
/// scope) — it is supplied by whatever concrete transport an application
/// is built on. `relay::local_channel` provides the one implementation
/// this workspace owns.
pub trait ChannelFactory: Send + Sync {
    fn create_pair(&self) -> (Arc<dyn Endpoint>, Arc<dyn Endpoint>);
}
