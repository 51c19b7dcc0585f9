//! Bundles the pieces every `expose`/`wrap` call needs: the channel
//! factory, the handler registry, the lifetime table, and the
//! request/response correlator. Analogous to the teacher's `Backend` —
//! one shared object both the client and server halves of a connection
//! hold a reference to.

use std::sync::Arc;

use crate::correlator::Correlator;
use crate::endpoint::{ChannelFactory, Endpoint};
use crate::handlers::HandlerRegistry;
use crate::lifetime::LifetimeRegistry;

pub struct Session {
    pub factory: Arc<dyn ChannelFactory>,
    pub registry: Arc<HandlerRegistry>,
    pub lifetime: Arc<LifetimeRegistry>,
    pub correlator: Arc<Correlator>,
}

impl Session {
    pub fn new(factory: Arc<dyn ChannelFactory>) -> Arc<Self> {
        Self::with_registry(factory, HandlerRegistry::with_builtins())
    }

    pub fn with_registry(factory: Arc<dyn ChannelFactory>, registry: HandlerRegistry) -> Arc<Self> {
        Arc::new(Session {
            factory,
            registry: Arc::new(registry),
            lifetime: LifetimeRegistry::new(),
            correlator: Correlator::new(),
        })
    }

    /// Whether `endpoint` is currently legacy-encoded, per the lifetime
    /// table's tracking (spec §4.5).
    pub fn is_legacy(self: &Arc<Self>, endpoint: &Arc<dyn Endpoint>) -> bool {
        self.lifetime.is_legacy(endpoint)
    }
}
