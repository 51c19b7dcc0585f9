//! Request/response correlator (spec §4.4): assigns a call id, installs a
//! one-shot listener that resolves when the matching reply arrives, posts
//! the message. Never rejects on its own — surfacing an error is entirely
//! the caller's job, based on whether the decoded reply is a thrown
//! marker (spec §7).

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::endpoint::{Endpoint, EndpointError, IncomingEvent, Transfer};
use crate::wire::WireMessage;

/// Generates an opaque id: four random 64-bit chunks hex-encoded, ample
/// per-endpoint uniqueness (spec §9 open question — any opaque generator
/// with per-endpoint uniqueness is conforming).
pub fn new_call_id() -> String {
    format!(
        "{:016x}{:016x}{:016x}{:016x}",
        fastrand::u64(..),
        fastrand::u64(..),
        fastrand::u64(..),
        fastrand::u64(..)
    )
}

/// Tracks in-flight requests across every endpoint this process has
/// attached to. Keyed globally by call id rather than per endpoint, since
/// ids are drawn from a space large enough that per-endpoint uniqueness
/// (the spec's actual requirement) is satisfied a fortiori.
type PendingReply = (WireMessage, Vec<Transfer>);

pub struct Correlator {
    pending: DashMap<String, oneshot::Sender<PendingReply>>,
}

impl Correlator {
    pub fn new() -> Arc<Self> {
        Arc::new(Correlator { pending: DashMap::new() })
    }

    /// Installs this correlator's reply-routing listener on `endpoint`.
    /// Safe to call once per endpoint; replies whose id isn't pending
    /// (e.g. inbound requests the exposer should handle instead) are
    /// silently ignored here, per spec I1 ("no replies with other ids are
    /// consumed by its listener" — symmetrically, a listener never
    /// consumes a message it doesn't recognize as its own reply).
    pub fn attach(self: &Arc<Self>, endpoint: &Arc<dyn Endpoint>) {
        let this = self.clone();
        endpoint.listen(Arc::new(move |event: IncomingEvent| {
            if let Some((_, sender)) = this.pending.remove(&event.data.id) {
                let _ = sender.send((event.data, event.transfers));
            }
        }));
    }

    /// Issues a request and awaits its single reply. Starts the endpoint
    /// (idempotent) before posting, per spec §4.4.
    pub async fn request(
        &self,
        endpoint: &Arc<dyn Endpoint>,
        message: WireMessage,
        transfers: Vec<Transfer>,
    ) -> Result<(WireMessage, Vec<Transfer>), EndpointError> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(message.id.clone(), tx);
        endpoint.start();
        if let Err(err) = endpoint.post(message, transfers).await {
            return Err(err);
        }
        rx.await.map_err(|_| EndpointError::Closed)
    }
}
