//! The one concrete [`relay_core::Endpoint`] this workspace ships: an
//! in-process duplex channel backed by `tokio::sync::mpsc`, playing the
//! role a real worker/iframe/socket transport plays for an out-of-process
//! deployment. Useful on its own for same-process actor-style
//! concurrency, and as the default [`relay_core::ChannelFactory`] every
//! sub-channel (`proxy`-marked values, `ENDPOINT` requests) is minted
//! from when an application doesn't supply its own transport.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use relay_core::{ChannelFactory, Endpoint, EndpointError, IncomingEvent, IncomingHandler, ListenerId, Transfer, WireMessage};
use tokio::sync::mpsc;

type Envelope = (WireMessage, Vec<Transfer>);

/// Duplex half of an in-process channel pair. Cloning the `Arc` is the
/// normal way to share one end across tasks; each half owns its outbound
/// sender and a Mutex-guarded listener list, mirroring the plain-struct
/// style the core's own tests use for their minimal harness endpoint.
pub struct LocalChannel {
    outbound: mpsc::UnboundedSender<Envelope>,
    listeners: Mutex<Vec<(ListenerId, IncomingHandler)>>,
    next_listener_id: AtomicU64,
    is_port: bool,
}

/// Clones a transferable for delivery to a second listener. A `postMessage`
/// event's port list is a plain JS array every listener can read; the
/// nearest Rust equivalent is cloning the `Arc` a `Port` transfer carries.
/// An `Opaque` transfer has no such cheap duplicate — fanning it out to
/// more than one listener on the same endpoint is not supported and is
/// logged rather than silently dropped.
fn duplicate_transfer(transfer: &Transfer) -> Transfer {
    match transfer {
        Transfer::Port(endpoint) => Transfer::Port(endpoint.clone()),
        Transfer::Opaque(_) => {
            log::warn!("relay: opaque transfer cannot fan out to more than one listener on this endpoint");
            Transfer::Opaque(Box::new(()))
        }
    }
}

impl LocalChannel {
    fn dispatch(&self, message: WireMessage, transfers: Vec<Transfer>) {
        let listeners = self.listeners.lock().unwrap().clone();
        let last = listeners.len().saturating_sub(1);
        let mut transfers = Some(transfers);
        for (index, (_, handler)) in listeners.into_iter().enumerate() {
            let these = if index == last {
                transfers.take().unwrap_or_default()
            } else {
                transfers.as_ref().map(|t| t.iter().map(duplicate_transfer).collect()).unwrap_or_default()
            };
            handler(IncomingEvent { data: message.clone(), origin: None, transfers: these });
        }
    }
}

#[async_trait]
impl Endpoint for LocalChannel {
    async fn post(&self, message: WireMessage, transfers: Vec<Transfer>) -> Result<(), EndpointError> {
        self.outbound
            .send((message, transfers))
            .map_err(|_| EndpointError::Closed)
    }

    fn listen(&self, handler: IncomingHandler) -> ListenerId {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().push((id, handler));
        id
    }

    fn unlisten(&self, id: ListenerId) {
        self.listeners.lock().unwrap().retain(|(listener_id, _)| *listener_id != id);
    }

    fn is_port(&self) -> bool {
        self.is_port
    }
}

fn build_pair(is_port: bool) -> (Arc<LocalChannel>, Arc<LocalChannel>) {
    let (tx_a, mut rx_a) = mpsc::unbounded_channel::<Envelope>();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel::<Envelope>();

    let a = Arc::new(LocalChannel {
        outbound: tx_b,
        listeners: Mutex::new(Vec::new()),
        next_listener_id: AtomicU64::new(0),
        is_port,
    });
    let b = Arc::new(LocalChannel {
        outbound: tx_a,
        listeners: Mutex::new(Vec::new()),
        next_listener_id: AtomicU64::new(0),
        is_port,
    });

    let pump_a = a.clone();
    tokio::spawn(async move {
        while let Some((message, transfers)) = rx_a.recv().await {
            pump_a.dispatch(message, transfers);
        }
    });
    let pump_b = b.clone();
    tokio::spawn(async move {
        while let Some((message, transfers)) = rx_b.recv().await {
            pump_b.dispatch(message, transfers);
        }
    });

    (a, b)
}

/// Allocates a fresh in-process channel pair, neither half port-like —
/// the application owns their lifetime directly (e.g. one half handed to
/// [`relay_core::expose`], the other to [`relay_core::wrap`]).
pub fn local_pair() -> (Arc<dyn Endpoint>, Arc<dyn Endpoint>) {
    let (a, b) = build_pair(false);
    (a, b)
}

/// A [`relay_core::ChannelFactory`] that mints [`LocalChannel`] pairs,
/// marked port-like so the lifetime machinery closes them automatically
/// once their last root proxy releases (spec §4.1 `ENDPOINT`, §4.3
/// `proxy`).
#[derive(Default)]
pub struct LocalChannelFactory;

impl ChannelFactory for LocalChannelFactory {
    fn create_pair(&self) -> (Arc<dyn Endpoint>, Arc<dyn Endpoint>) {
        let (a, b) = build_pair(true);
        (a, b)
    }
}
