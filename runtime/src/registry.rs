//! Correlation registry: in-flight requests waiting for a reply.
//!
//! Maps a [`CorrelationId`] to the write half of a one-shot cell. The dispatch
//! call that registered the ID owns the read half through a [`Registration`],
//! which removes the entry when dropped, so the table never outlives the calls
//! that populated it.
//!
//! Flow:
//! 1. Dispatcher calls [`CorrelationRegistry::register`] and keeps the [`Registration`]
//! 2. Dispatcher publishes the request envelope
//! 3. Reply listener calls [`CorrelationRegistry::resolve`] with the decoded reply
//! 4. Dispatcher awaits [`Registration::wait`] or times out
//! 5. The [`Registration`] drops and unregisters, whatever the exit path
//!
//! Replies for IDs that are not registered, or whose cell was already filled,
//! are orphans. They are dropped and counted, never reported as errors.

use crate::metrics::BridgeMetrics;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use kafka_bridge_core::{BridgeError, CorrelationId, ReplyEnvelope};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, error};

/// A registered waiter, as seen by the registry.
struct Slot {
    /// `None` once a reply has been delivered.
    sender: Option<oneshot::Sender<ReplyEnvelope>>,
    request_type: String,
    created_at: Instant,
}

/// Counters describing registry traffic.
#[derive(Debug, Default)]
pub struct RegistryStats {
    registered: AtomicU64,
    resolved: AtomicU64,
    unregistered: AtomicU64,
    orphaned_unknown: AtomicU64,
    orphaned_duplicate: AtomicU64,
}

/// Point-in-time copy of [`RegistryStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStatsSnapshot {
    /// Waiters registered.
    pub registered: u64,
    /// Replies delivered to a waiter.
    pub resolved: u64,
    /// Waiters removed.
    pub unregistered: u64,
    /// Replies for IDs with no waiter (late, cancelled or never issued).
    pub orphaned_unknown: u64,
    /// Replies for IDs whose waiter already received a reply.
    pub orphaned_duplicate: u64,
}

impl RegistryStats {
    /// Take a snapshot of the counters.
    #[must_use]
    pub fn snapshot(&self) -> RegistryStatsSnapshot {
        RegistryStatsSnapshot {
            registered: self.registered.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            unregistered: self.unregistered.load(Ordering::Relaxed),
            orphaned_unknown: self.orphaned_unknown.load(Ordering::Relaxed),
            orphaned_duplicate: self.orphaned_duplicate.load(Ordering::Relaxed),
        }
    }
}

/// Table of in-flight requests keyed by correlation ID.
///
/// One instance per process, constructed by the composition root and shared
/// as `Arc<CorrelationRegistry>` between the dispatcher and every reply
/// listener. All operations are a single access to a sharded map.
#[derive(Default)]
pub struct CorrelationRegistry {
    slots: DashMap<CorrelationId, Slot>,
    stats: RegistryStats,
}

impl CorrelationRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::DuplicateCorrelationId`] if `id` is already
    /// registered. Random IDs make this an invariant violation.
    pub fn register(
        self: &Arc<Self>,
        id: CorrelationId,
        request_type: &str,
    ) -> Result<Registration, BridgeError> {
        let (sender, receiver) = oneshot::channel();
        let created_at = Instant::now();

        match self.slots.entry(id) {
            Entry::Occupied(_) => {
                error!(correlation_id = %id, request_type, "Correlation ID already registered");
                return Err(BridgeError::DuplicateCorrelationId(id));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot {
                    sender: Some(sender),
                    request_type: request_type.to_string(),
                    created_at,
                });
            }
        }

        self.stats.registered.fetch_add(1, Ordering::Relaxed);
        BridgeMetrics::record_pending(self.slots.len());
        debug!(correlation_id = %id, request_type, "Registered waiter");

        Ok(Registration {
            id,
            registry: Arc::clone(self),
            receiver,
            created_at,
        })
    }

    /// Deliver `reply` to the waiter registered under `id`.
    ///
    /// Returns `true` if the reply was delivered. Unknown IDs and waiters that
    /// already received a reply are orphans: the reply is dropped.
    pub fn resolve(&self, id: &CorrelationId, reply: ReplyEnvelope) -> bool {
        let (sender, request_type, waited) = match self.slots.get_mut(id) {
            Some(mut slot) => (
                slot.sender.take(),
                slot.request_type.clone(),
                slot.created_at.elapsed(),
            ),
            None => {
                self.stats.orphaned_unknown.fetch_add(1, Ordering::Relaxed);
                BridgeMetrics::record_orphan("unknown");
                debug!(correlation_id = %id, "Dropping reply for unknown or expired correlation ID");
                return false;
            }
        };

        let Some(sender) = sender else {
            self.stats.orphaned_duplicate.fetch_add(1, Ordering::Relaxed);
            BridgeMetrics::record_orphan("duplicate");
            debug!(correlation_id = %id, request_type, "Dropping duplicate reply");
            return false;
        };

        if sender.send(reply).is_err() {
            // Waiter was dropped between lookup and delivery.
            self.stats.orphaned_unknown.fetch_add(1, Ordering::Relaxed);
            BridgeMetrics::record_orphan("unknown");
            debug!(correlation_id = %id, request_type, "Waiter gone before delivery");
            return false;
        }

        self.stats.resolved.fetch_add(1, Ordering::Relaxed);
        debug!(
            correlation_id = %id,
            request_type,
            waited_ms = duration_ms(waited),
            "Delivered reply"
        );
        true
    }

    /// Remove the waiter registered under `id`.
    ///
    /// Idempotent: returns `false` if nothing was registered.
    pub fn unregister(&self, id: &CorrelationId) -> bool {
        let removed = self.slots.remove(id).is_some();
        if removed {
            self.stats.unregistered.fetch_add(1, Ordering::Relaxed);
            BridgeMetrics::record_pending(self.slots.len());
        }
        removed
    }

    /// Whether a waiter is registered under `id`.
    #[must_use]
    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.slots.contains_key(id)
    }

    /// Number of in-flight waiters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no waiter is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Traffic counters.
    #[must_use]
    pub const fn stats(&self) -> &RegistryStats {
        &self.stats
    }
}

/// A waiter owned by the dispatch call that created it.
///
/// Dropping the registration unregisters its ID, which covers success,
/// timeout, early error and cancellation alike.
pub struct Registration {
    id: CorrelationId,
    registry: Arc<CorrelationRegistry>,
    receiver: oneshot::Receiver<ReplyEnvelope>,
    created_at: Instant,
}

impl Registration {
    /// Correlation ID of this waiter.
    #[must_use]
    pub const fn id(&self) -> CorrelationId {
        self.id
    }

    /// When the waiter was registered.
    #[must_use]
    pub const fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Wait for the reply to be delivered.
    ///
    /// Cancel-safe: dropping the future leaves the cell untouched.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::WaiterDropped`] if the registry side of the cell
    /// was discarded without a reply.
    pub async fn wait(&mut self) -> Result<ReplyEnvelope, BridgeError> {
        (&mut self.receiver)
            .await
            .map_err(|_| BridgeError::WaiterDropped(self.id))
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(&self.id);
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
