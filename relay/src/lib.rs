//! A transparent remote-object proxy system for asynchronous message
//! channels: wrap one end of a duplex channel, get back a handle whose
//! field access, calls, and construction become `GET`/`SET`/`APPLY`/
//! `CONSTRUCT` requests against whatever the other end exposed.
//!
//! This crate is the facade: it re-exports [`relay_core`]'s engine,
//! ships [`local_channel`] (an in-process transport built on
//! `tokio::sync::mpsc`), and [`window`] (the adapter trait for embedding
//! this crate inside a host with its own message-passing primitive).
//! `relay_macros::remote_trait` generates typed wrappers over the engine's
//! [`relay_core::Exposed`]/[`relay_core::RemoteHandle`] primitives.

pub mod local_channel;
pub mod window;

pub use relay_core::*;
pub use relay_macros::remote_trait;

pub use local_channel::{local_pair, LocalChannel, LocalChannelFactory};
pub use window::{WindowEndpoint, WindowLike};

/// Exposes `object` on one half of a fresh in-process channel pair and
/// returns a root [`relay_core::RemoteHandle`] wrapping the other half —
/// the same-process shortcut most of this crate's tests and examples
/// reach for instead of standing up a real transport.
pub fn connect(object: std::sync::Arc<dyn relay_core::Exposed>) -> std::sync::Arc<RemoteHandle> {
    let session = Session::new(std::sync::Arc::new(LocalChannelFactory));
    let (local, remote) = local_pair();
    expose(object, local, OriginPolicy::allow_all(), session.clone());
    std::sync::Arc::new(wrap(remote, false, session))
}
