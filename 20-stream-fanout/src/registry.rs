//! Registry of connected clients.
//!
//! Every connected client owns a bounded inbox. The registry keeps the sending
//! half of each inbox keyed by a [`ClientId`], so the broadcaster can find every
//! live client without knowing anything about sockets.

use std::{
    collections::HashMap,
    num::NonZeroUsize,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::mpsc;
use tracing::debug;

/// Identifier handed out by [`Registry::register`]. Never reused.
pub type ClientId = u64;

/// One line of input, including its trailing newline.
///
/// Shared between every inbox it is delivered to.
pub type Line = Arc<[u8]>;

/// Inbox capacity used when none is configured.
pub const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(100) {
    Some(capacity) => capacity,
    None => unreachable!(),
};

/// A registered client as seen by the broadcaster.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub id: ClientId,
    pub sender: mpsc::Sender<Line>,
}

/// Thread-safe store of active client sessions.
///
/// A client is active exactly while its id is a key in the map. Removing the
/// entry drops the registry's sender, which closes the inbox once any in-flight
/// snapshot clones are gone.
#[derive(Debug)]
pub struct Registry {
    capacity: NonZeroUsize,
    state: Mutex<RegistryState>,
}

#[derive(Debug)]
struct RegistryState {
    clients: HashMap<ClientId, mpsc::Sender<Line>>,
    // Only ever incremented, so an id cannot be handed to two sessions.
    next_id: ClientId,
}

impl Registry {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            state: Mutex::new(RegistryState {
                clients: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Adds a new active session and returns its id and inbox.
    pub fn register(&self) -> (ClientId, mpsc::Receiver<Line>) {
        let (sender, inbox) = mpsc::channel(self.capacity.get());
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.clients.insert(id, sender);
        debug!(client = id, active = state.clients.len(), "client registered");
        (id, inbox)
    }

    /// Removes a session. Returns `false` if `id` was not active, which is not
    /// an error.
    pub fn unregister(&self, id: ClientId) -> bool {
        let mut state = self.lock();
        let removed = state.clients.remove(&id).is_some();
        if removed {
            debug!(client = id, active = state.clients.len(), "client unregistered");
        }
        removed
    }

    /// Point-in-time copy of all active sessions.
    ///
    /// The lock is released before this returns, so callers may take their time
    /// delivering without blocking registration.
    pub fn snapshot(&self) -> Vec<Subscriber> {
        self.lock()
            .clients
            .iter()
            .map(|(&id, sender)| Subscriber {
                id,
                sender: sender.clone(),
            })
            .collect()
    }

    /// Removes every session, closing all inboxes. Returns how many were active.
    pub fn close_all(&self) -> usize {
        let mut state = self.lock();
        let closed = state.clients.len();
        state.clients.clear();
        closed
    }

    pub fn len(&self) -> usize {
        self.lock().clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.lock().clients.contains_key(&id)
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // Every critical section leaves the map consistent, so a panic elsewhere
        // while holding the lock does not invalidate it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
