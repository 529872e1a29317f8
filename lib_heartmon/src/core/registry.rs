//! # Subscription Registry
//!
//! The set of live subscriber queues. Callers on any task may subscribe or
//! unsubscribe while the dispatcher loop fans samples out; a single mutex
//! guards the set and is only held for the map operation itself.
//!
//! Fan-out never iterates the map directly. It copies the current senders out
//! (`snapshot_into`) and sends after the lock is released, so a subscriber
//! joining or leaving mid fan-out can't stall the loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// Identifies one subscription for the lifetime of its registry.
pub type SubscriberId = u64;

/// Default queue depth: roughly ten seconds of samples.
pub const DEFAULT_QUEUE_CAPACITY: usize = 2048;

struct SubscriberEntry {
    sender: mpsc::Sender<u16>,
    evicted: Arc<AtomicBool>,
}

/// # Registry
///
/// Owns the sending half of every subscriber queue.
pub struct Registry {
    subscribers: Mutex<HashMap<SubscriberId, SubscriberEntry>>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl Registry {
    /// Creates an empty registry whose queues hold `queue_capacity` samples.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// # Insert
    ///
    /// Creates a bounded queue, registers its sender and hands the receiving
    /// side back as a `Subscription`.
    pub fn insert(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        let evicted = Arc::new(AtomicBool::new(false));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.lock().insert(
            id,
            SubscriberEntry {
                sender,
                evicted: Arc::clone(&evicted),
            },
        );
        log::info!("Subscriber {} registered (queue capacity {})", id, self.queue_capacity);

        Subscription { id, receiver, evicted }
    }

    /// # Remove
    ///
    /// Drops the subscriber's sender. Returns `false` if it was already gone,
    /// which is not an error.
    pub fn remove(&self, id: SubscriberId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            log::info!("Subscriber {} removed", id);
        }
        removed
    }

    /// # Evict
    ///
    /// Forced removal for a subscriber that fell a full queue behind. Marks
    /// the handle evicted before the sender is dropped, so the subscriber sees
    /// the flag no later than the closed queue.
    pub fn evict(&self, id: SubscriberId) -> bool {
        let entry = self.lock().remove(&id);
        match entry {
            Some(entry) => {
                entry.evicted.store(true, Ordering::Release);
                log::warn!("Subscriber {} evicted: queue full", id);
                true
            }
            None => false,
        }
    }

    /// Replaces `out` with a copy of the current senders.
    pub fn snapshot_into(&self, out: &mut Vec<(SubscriberId, mpsc::Sender<u16>)>) {
        out.clear();
        out.extend(
            self.lock()
                .iter()
                .map(|(id, entry)| (*id, entry.sender.clone())),
        );
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// `true` when nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, SubscriberEntry>> {
        // The map holds no invariants a panicking holder could break halfway.
        self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

/// # Subscription
///
/// The consumer's end of a subscriber queue. Samples arrive in ingest order.
/// Once the engine evicts or removes the subscription the queue closes after
/// its remaining samples are read.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<u16>,
    evicted: Arc<AtomicBool>,
}

impl Subscription {
    /// The registry id, for `unsubscribe`.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Waits for the next sample. `None` once the queue is closed and empty.
    pub async fn recv(&mut self) -> Option<u16> {
        self.receiver.recv().await
    }

    /// Takes the next sample if one is queued.
    pub fn try_recv(&mut self) -> Result<u16, TryRecvError> {
        self.receiver.try_recv()
    }

    /// `true` if the engine dropped this subscription for falling behind.
    pub fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::Acquire)
    }
}
