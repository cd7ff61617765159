//! Connection registry and per-connection lifecycle tracking.
//!
//! # Responsibilities
//! - Bound the number of live connections (fixed slot arena)
//! - Hand out stable slot ids used for tracing and shutdown enumeration
//! - Track each connection's state (Accepted → Parsing → Resolving → Relaying → Closed)
//! - Give every connection a child of the shutdown token
//!
//! # Design Decisions
//! - Slot allocation and release happen under one mutex; the live count is
//!   an atomic mirror of it so readers never take the lock
//! - The registry never owns sockets; a [`SlotGuard`] owned by the session
//!   releases the slot when dropped, on every exit path

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::observability::metrics;

/// Slot index of a live connection. Unique while the connection is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(usize);

impl ConnectionId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state for lifecycle tracking.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Admitted into a slot, nothing read yet.
    Accepted = 0,
    /// Reading and parsing the client's request.
    Parsing = 1,
    /// Resolving and connecting to upstream.
    Resolving = 2,
    /// Relaying bytes.
    Relaying = 3,
    /// Finished; the slot is being released.
    Closed = 4,
}

impl From<u8> for ConnectionState {
    fn from(val: u8) -> Self {
        match val {
            0 => ConnectionState::Accepted,
            1 => ConnectionState::Parsing,
            2 => ConnectionState::Resolving,
            3 => ConnectionState::Relaying,
            _ => ConnectionState::Closed,
        }
    }
}

/// Point-in-time view of a live connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    pub state: ConnectionState,
    pub age: Duration,
}

struct SlotEntry {
    peer: SocketAddr,
    state: Arc<AtomicU8>,
    admitted_at: Instant,
}

struct Slots {
    entries: Vec<Option<SlotEntry>>,
    /// Free slot indices; the lowest index is popped first.
    free: Vec<usize>,
}

/// Fixed-capacity registry of live connections.
pub struct ConnectionRegistry {
    slots: Mutex<Slots>,
    live: AtomicUsize,
    capacity: usize,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("live", &self.live_count())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl ConnectionRegistry {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new(Slots {
                entries: (0..capacity).map(|_| None).collect(),
                free: (0..capacity).rev().collect(),
            }),
            live: AtomicUsize::new(0),
            capacity,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        // Slot bookkeeping stays consistent even if a holder panicked.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a connection into a free slot, or `None` when at capacity.
    ///
    /// The slot's token is a child of `shutdown`.
    pub fn admit(self: &Arc<Self>, peer: SocketAddr, shutdown: &CancellationToken) -> Option<SlotGuard> {
        let mut slots = self.lock();
        let index = slots.free.pop()?;

        let state = Arc::new(AtomicU8::new(ConnectionState::Accepted as u8));
        let cancel = shutdown.child_token();
        slots.entries[index] = Some(SlotEntry {
            peer,
            state: Arc::clone(&state),
            admitted_at: Instant::now(),
        });
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        drop(slots);

        metrics::set_active_connections(live);
        Some(SlotGuard {
            registry: Arc::clone(self),
            id: ConnectionId(index),
            state,
            cancel,
        })
    }

    fn release(&self, id: ConnectionId) {
        let mut slots = self.lock();
        if slots.entries[id.0].take().is_none() {
            return;
        }
        slots.free.push(id.0);
        let live = self.live.fetch_sub(1, Ordering::SeqCst) - 1;
        drop(slots);

        metrics::set_active_connections(live);
    }

    /// Current number of live connections.
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Enumerate live connections.
    pub fn snapshot(&self) -> Vec<ConnectionInfo> {
        let slots = self.lock();
        slots
            .entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                entry.as_ref().map(|e| ConnectionInfo {
                    id: ConnectionId(index),
                    peer: e.peer,
                    state: ConnectionState::from(e.state.load(Ordering::SeqCst)),
                    age: e.admitted_at.elapsed(),
                })
            })
            .collect()
    }
}

/// Ownership of one registry slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct SlotGuard {
    registry: Arc<ConnectionRegistry>,
    id: ConnectionId,
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
}

impl SlotGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, ?state, "Connection state changed");
    }

    /// Token cancelled when the proxy shuts down.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.set_state(ConnectionState::Closed);
        self.registry.release(self.id);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_admit_until_full() {
        let root = CancellationToken::new();
        let registry = ConnectionRegistry::new(2);
        let a = registry.admit(peer(1), &root).unwrap();
        let b = registry.admit(peer(2), &root).unwrap();
        assert_eq!(registry.live_count(), 2);
        assert_ne!(a.id(), b.id());

        assert!(registry.admit(peer(3), &root).is_none());
        assert_eq!(registry.live_count(), 2);
    }

    #[test]
    fn test_slot_reused_after_release() {
        let root = CancellationToken::new();
        let registry = ConnectionRegistry::new(2);
        let first = registry.admit(peer(1), &root).unwrap();
        let _second = registry.admit(peer(2), &root).unwrap();
        let freed = first.id();

        drop(first);
        assert_eq!(registry.live_count(), 1);

        let third = registry.admit(peer(3), &root).unwrap();
        assert_eq!(third.id(), freed);
        assert_eq!(registry.live_count(), 2);
    }

    #[test]
    fn test_lowest_slot_first() {
        let registry = ConnectionRegistry::new(3);
        let guard = registry.admit(peer(1), &CancellationToken::new()).unwrap();
        assert_eq!(guard.id().index(), 0);
        assert_eq!(guard.id().to_string(), "conn-0");
        assert_eq!(guard.state(), ConnectionState::Accepted);
    }

    #[test]
    fn test_snapshot_reports_state() {
        let registry = ConnectionRegistry::new(4);
        let guard = registry.admit(peer(40), &CancellationToken::new()).unwrap();
        guard.set_state(ConnectionState::Relaying);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].peer, peer(40));
        assert_eq!(snapshot[0].state, ConnectionState::Relaying);

        drop(guard);
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_shutdown_cancels_every_slot() {
        let root = CancellationToken::new();
        let registry = ConnectionRegistry::new(4);
        let a = registry.admit(peer(1), &root).unwrap();
        let b = registry.admit(peer(2), &root).unwrap();
        assert!(!a.cancel_token().is_cancelled());

        root.cancel();
        assert!(a.cancel_token().is_cancelled());
        assert!(b.cancel_token().is_cancelled());
    }

    #[test]
    fn test_slot_cancel_does_not_reach_siblings() {
        let root = CancellationToken::new();
        let registry = ConnectionRegistry::new(4);
        let a = registry.admit(peer(1), &root).unwrap();
        let b = registry.admit(peer(2), &root).unwrap();

        a.cancel_token().cancel();
        assert!(!b.cancel_token().is_cancelled());
        assert!(!root.is_cancelled());
    }

    #[test]
    fn test_concurrent_admit_release() {
        let root = CancellationToken::new();
        let registry = ConnectionRegistry::new(8);
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = Arc::clone(&registry);
                let root = root.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        if let Some(guard) = registry.admit(peer(i), &root) {
                            assert!(registry.live_count() <= registry.capacity());
                            drop(guard);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.live_count(), 0);
        assert_eq!(registry.snapshot().len(), 0);
    }
}
