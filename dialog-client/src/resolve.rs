//! Coalescing message resolution.
//!
//! Updates name a message only by its `mid`; the [`ResolveQueue`] turns that
//! into a full [`Message`] while guaranteeing:
//!
//! * at most one outstanding transport fetch per `mid` — concurrent callers
//!   attach to the pending fetch as waiters;
//! * resolved messages are cached and served without a round trip;
//! * failures are delivered to every waiter and then forgotten, so the next
//!   call fetches again.
//!
//! Mutual exclusion is table-wide rather than per id: one plain mutex guards
//! every entry.  Its critical sections are O(1) map operations and it is
//! never held across an `.await`, so it serializes only the check-and-insert
//! and settle steps.  The fetches themselves run outside the lock, and
//! fetches for different ids proceed in parallel.

use std::collections::hash_map::Entry as MapEntry;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::errors::ResolutionError;
use crate::message::{Message, MessageId};
use crate::peer::Peer;
use crate::transport::Transport;

type Waiter = oneshot::Sender<Result<Message, ResolutionError>>;

enum Entry {
    Pending(Vec<Waiter>),
    Resolved(Message),
}

#[derive(Default)]
struct Table {
    entries: HashMap<MessageId, Entry>,
    /// Resolved mids, oldest first. Only maintained when a capacity is set.
    order:   VecDeque<MessageId>,
}

/// What a caller has to do after inspecting the table.
enum Role {
    Hit(Message),
    Wait(oneshot::Receiver<Result<Message, ResolutionError>>),
    Fetch,
}

// ─── ResolveQueue ────────────────────────────────────────────────────────────

pub struct ResolveQueue {
    transport: Arc<dyn Transport>,
    capacity:  Option<usize>,
    table:     Mutex<Table>,
}

impl ResolveQueue {
    /// Create a queue that never evicts resolved messages.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_capacity(transport, None)
    }

    /// Create a queue keeping at most `capacity` resolved messages (oldest
    /// evicted first). `None` keeps everything.
    pub fn with_capacity(transport: Arc<dyn Transport>, capacity: Option<usize>) -> Self {
        Self { transport, capacity, table: Mutex::new(Table::default()) }
    }

    /// Resolve `mid` in `peer` into a full message.
    pub async fn resolve(&self, peer: Peer, mid: MessageId) -> Result<Message, ResolutionError> {
        loop {
            match self.claim(&mid) {
                Role::Hit(msg) => {
                    tracing::debug!("[dialog] resolve {mid}: cache hit");
                    return Ok(msg);
                }
                Role::Wait(rx) => {
                    tracing::debug!("[dialog] resolve {mid}: joining in-flight fetch");
                    match rx.await {
                        Ok(result) => return result,
                        // The fetching caller was dropped mid-flight; start over.
                        Err(_) => continue,
                    }
                }
                Role::Fetch => return self.fetch(peer, mid).await,
            }
        }
    }

    /// Number of resolved messages currently cached.
    pub fn cached_len(&self) -> usize {
        self.lock()
            .entries
            .values()
            .filter(|e| matches!(e, Entry::Resolved(_)))
            .count()
    }

    /// Returns `true` if `mid` is resolved and cached.
    pub fn is_cached(&self, mid: &MessageId) -> bool {
        matches!(self.lock().entries.get(mid), Some(Entry::Resolved(_)))
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomic check-and-insert: exactly one caller per missing `mid` is told
    /// to fetch; everyone else either hits the cache or waits.
    fn claim(&self, mid: &MessageId) -> Role {
        let mut table = self.lock();
        match table.entries.entry(mid.clone()) {
            MapEntry::Occupied(mut e) => match e.get_mut() {
                Entry::Resolved(msg) => Role::Hit(msg.clone()),
                Entry::Pending(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Role::Wait(rx)
                }
            },
            MapEntry::Vacant(e) => {
                e.insert(Entry::Pending(Vec::new()));
                Role::Fetch
            }
        }
    }

    async fn fetch(&self, peer: Peer, mid: MessageId) -> Result<Message, ResolutionError> {
        let mut guard = PendingGuard { queue: self, mid: &mid, armed: true };

        tracing::debug!("[dialog] resolve {mid}: fetching");
        let result = self
            .transport
            .fetch_message(&mid)
            .await
            .map(|raw| Message::from_raw(peer, mid.clone(), raw))
            .map_err(|source| ResolutionError { mid: mid.clone(), source });

        guard.armed = false;
        let waiters = self.settle(&mid, &result);
        if let Err(e) = &result {
            tracing::warn!("[dialog] {e} ({} waiter(s) notified)", waiters.len());
        }
        for w in waiters {
            let _ = w.send(result.clone());
        }
        result
    }

    /// Replace the pending entry with the outcome and hand back its waiters.
    fn settle(&self, mid: &MessageId, result: &Result<Message, ResolutionError>) -> Vec<Waiter> {
        let mut table = self.lock();
        let waiters = match table.entries.remove(mid) {
            Some(Entry::Pending(w)) => w,
            _ => Vec::new(),
        };
        if let Ok(msg) = result {
            table.entries.insert(mid.clone(), Entry::Resolved(msg.clone()));
            if let Some(cap) = self.capacity {
                table.order.push_back(mid.clone());
                while table.order.len() > cap {
                    if let Some(old) = table.order.pop_front() {
                        tracing::trace!("[dialog] evicting {old} from resolve cache");
                        table.entries.remove(&old);
                    }
                }
            }
        }
        waiters
    }
}

/// Clears a pending entry if the fetching future is dropped before it
/// settles. Dropping the waiters' senders makes them retry.
struct PendingGuard<'a> {
    queue: &'a ResolveQueue,
    mid:   &'a MessageId,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut table = self.queue.lock();
            if matches!(table.entries.get(self.mid), Some(Entry::Pending(_))) {
                table.entries.remove(self.mid);
            }
        }
    }
}
