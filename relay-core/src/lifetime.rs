//! Per-endpoint refcount and legacy-membership tracking (spec §4.6, §3).
//!
//! Rust has no GC-unreachability notification, so the "automatic RELEASE
//! on unreachability" the spec describes for hosts with a finalization
//! registry is realized here as the scoped-acquisition idiom spec §9
//! calls for: the root [`crate::proxy::RemoteHandle`] returned by `wrap`
//! (and by the `proxy` transfer handler's deserialize) registers on
//! construction and its `Drop` impl deregisters, issuing `RELEASE` and
//! closing the endpoint the moment the count reaches zero. Sub-proxies
//! produced by plain path navigation are cheap views and do not carry
//! their own registration (see DESIGN.md for this simplification).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::endpoint::Endpoint;

struct Entry {
    count: AtomicUsize,
    legacy: AtomicBool,
}

/// Keyed by the `Arc<dyn Endpoint>`'s data pointer — a stable, cheap
/// per-endpoint identity without requiring `Endpoint` impls to mint their
/// own ids.
fn key_of(endpoint: &Arc<dyn Endpoint>) -> usize {
    Arc::as_ptr(endpoint) as *const () as usize
}

#[derive(Default)]
pub struct LifetimeRegistry {
    entries: DashMap<usize, Entry>,
}

impl LifetimeRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers one more live root proxy over `endpoint` (spec
    /// `registerProxy`). `legacy` ORs into the endpoint's legacy flag; it
    /// never clears it back to current encoding once set.
    pub fn register(&self, endpoint: &Arc<dyn Endpoint>, legacy: bool) {
        let entry = self
            .entries
            .entry(key_of(endpoint))
            .or_insert_with(|| Entry { count: AtomicUsize::new(0), legacy: AtomicBool::new(false) });
        entry.count.fetch_add(1, Ordering::SeqCst);
        if legacy {
            entry.legacy.store(true, Ordering::SeqCst);
        }
    }

    /// Marks `endpoint` as legacy-encoded without affecting its refcount
    /// (spec §4.5: an inbound numeric operation tag marks the encoding
    /// even when no local proxy was ever registered for that endpoint,
    /// e.g. a pure exposer side).
    pub fn mark_legacy(&self, endpoint: &Arc<dyn Endpoint>) {
        let entry = self
            .entries
            .entry(key_of(endpoint))
            .or_insert_with(|| Entry { count: AtomicUsize::new(0), legacy: AtomicBool::new(false) });
        entry.legacy.store(true, Ordering::SeqCst);
    }

    pub fn is_legacy(&self, endpoint: &Arc<dyn Endpoint>) -> bool {
        self.entries
            .get(&key_of(endpoint))
            .map(|e| e.legacy.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Decrements the refcount for `endpoint`. Returns `true` exactly once
    /// per endpoint, the moment the count crosses to zero (spec I2) — the
    /// caller is responsible for then issuing `RELEASE` and closing the
    /// endpoint if it is port-like.
    pub fn deregister(&self, endpoint: &Arc<dyn Endpoint>) -> bool {
        let key = key_of(endpoint);
        let reached_zero = match self.entries.get(&key) {
            Some(entry) => entry.count.fetch_sub(1, Ordering::SeqCst) == 1,
            None => false,
        };
        if reached_zero {
            self.entries.remove(&key);
        }
        reached_zero
    }
}
