use parking_lot::Mutex;
use std::{
    collections::{HashSet, VecDeque},
    fmt,
};

/// Default number of event keys remembered by the dedup window.
pub const DEFAULT_DEDUP_CAPACITY: usize = 1000;

/// Identity of a push event, shared by every session that relays it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKey {
    Transaction(String),
    Ledger(u32),
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transaction(hash) => write!(f, "tx{hash}"),
            Self::Ledger(index) => write!(f, "ledger{index}"),
        }
    }
}

/// Bounded FIFO of recently seen keys with a membership index.
#[derive(Debug)]
struct DedupWindow {
    order: VecDeque<EventKey>,
    members: HashSet<EventKey>,
}

/// Suppresses re-delivery of events already relayed by another session.
///
/// Holds the last `capacity` distinct keys. Admitting a key beyond capacity evicts the
/// oldest one, after which that evicted key counts as new again.
pub struct EventDeduplicator {
    window: Mutex<DedupWindow>,
    capacity: usize,
}

impl Default for EventDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}

impl EventDeduplicator {
    /// Creates a deduplicator remembering up to `capacity` keys (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: Mutex::new(DedupWindow {
                order: VecDeque::with_capacity(capacity + 1),
                members: HashSet::with_capacity(capacity + 1),
            }),
            capacity,
        }
    }

    /// Returns `true` the first time a key is seen within the window and records it.
    pub fn should_emit(&self, key: EventKey) -> bool {
        let mut window = self.window.lock();

        if window.members.contains(&key) {
            return false;
        }

        window.members.insert(key.clone());
        window.order.push_back(key);

        if window.order.len() > self.capacity {
            if let Some(evicted) = window.order.pop_front() {
                window.members.remove(&evicted);
            }
        }

        true
    }

    /// Returns whether the key is currently remembered.
    #[must_use]
    pub fn contains(&self, key: &EventKey) -> bool {
        self.window.lock().members.contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.window.lock().order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
