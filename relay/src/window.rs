//! Adapter surface for host-provided message targets (spec §6 "window
//! endpoint"). The source system wraps `window`/`self`/a `MessagePort`
//! directly; there is no equivalent ambient global in a Rust process, so
//! this module defines the trait a host embedding this crate implements
//! instead, plus a thin [`relay_core::Endpoint`] over it.
//!
//! No concrete implementor ships here — an application embedding this
//! crate inside a host that already has its own message-passing primitive
//! (a windowing toolkit's event loop, a WASM `postMessage` binding, a
//! custom IPC layer) implements [`WindowLike`] over that primitive.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use relay_core::{Endpoint, EndpointError, IncomingEvent, IncomingHandler, ListenerId, Transfer, WireMessage};

/// The capability a host-provided message target must offer: post a
/// serialized message (the wire bytes plus any transferables, left
/// opaque here since their shape is transport-specific) and report its
/// own incoming messages as they arrive via `on_message`.
pub trait WindowLike: Send + Sync {
    fn post_message(&self, payload: Vec<u8>) -> Result<(), String>;

    /// Registers `callback` to be invoked by the host for every inbound
    /// message. Implementations typically store this once and fan
    /// incoming host events into it.
    fn on_message(&self, callback: Box<dyn Fn(Vec<u8>, Option<String>) + Send + Sync>);
}

/// Wraps a [`WindowLike`] host target as an [`relay_core::Endpoint`].
/// Wire messages are serialized with `serde_json` before crossing into
/// `post_message`'s opaque byte payload; transferables do not survive
/// this adapter (a host's `postMessage` analogue able to move a live
/// channel handle would need its own [`Transfer`] extension, which is
/// out of scope for this generic adapter).
pub struct WindowEndpoint<W: WindowLike> {
    window: Arc<W>,
    listeners: Mutex<Vec<(ListenerId, IncomingHandler)>>,
    next_listener_id: std::sync::atomic::AtomicU64,
}

impl<W: WindowLike + 'static> WindowEndpoint<W> {
    pub fn new(window: Arc<W>) -> Arc<Self> {
        let this = Arc::new(WindowEndpoint {
            window,
            listeners: Mutex::new(Vec::new()),
            next_listener_id: std::sync::atomic::AtomicU64::new(0),
        });
        let callback_target = this.clone();
        this.window.on_message(Box::new(move |payload, origin| {
            let Ok(message) = serde_json::from_slice::<WireMessage>(&payload) else {
                log::warn!("relay: dropping malformed message from window endpoint");
                return;
            };
            let listeners = callback_target.listeners.lock().unwrap().clone();
            for (_, handler) in listeners {
                handler(IncomingEvent { data: message.clone(), origin: origin.clone(), transfers: Vec::new() });
            }
        }));
        this
    }
}

#[async_trait]
impl<W: WindowLike> Endpoint for WindowEndpoint<W> {
    async fn post(&self, message: WireMessage, transfers: Vec<Transfer>) -> Result<(), EndpointError> {
        if !transfers.is_empty() {
            return Err(EndpointError::PostFailed(
                "window endpoint adapter cannot carry transferables".into(),
            ));
        }
        let payload = serde_json::to_vec(&message).map_err(|e| EndpointError::PostFailed(e.to_string()))?;
        self.window.post_message(payload).map_err(EndpointError::PostFailed)
    }

    fn listen(&self, handler: IncomingHandler) -> ListenerId {
        let id = self.next_listener_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.listeners.lock().unwrap().push((id, handler));
        id
    }

    fn unlisten(&self, id: ListenerId) {
        self.listeners.lock().unwrap().retain(|(listener_id, _)| *listener_id != id);
    }
}
