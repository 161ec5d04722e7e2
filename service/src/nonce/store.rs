//! In-memory expiring token store for replay prevention.
//!
//! Every entry carries its own deadline. Deadlines are also kept in a
//! min-heap so expired entries can be evicted in deadline order before each
//! operation, which keeps `exists` and `count` exact without scanning the
//! whole map.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

/// Deadline used when `now + ttl` does not fit in an [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Instant at which an entry recorded at `now` stops being live. Saturates
/// instead of overflowing for very large TTLs.
fn deadline(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Result of an atomic [`TokenStore::try_insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The token was not live and has been recorded.
    Inserted,
    /// A live entry for the token already exists.
    Duplicate,
    /// The store holds the maximum number of live tokens; nothing was recorded.
    AtCapacity,
}

#[derive(Debug, Default)]
struct Entries {
    /// Token value -> instant at which it stops being live.
    live: HashMap<String, Instant>,
    /// Deadlines in ascending order. May hold stale deadlines for tokens that
    /// were re-inserted; those are skipped during eviction.
    deadlines: BinaryHeap<Reverse<(Instant, String)>>,
}

impl Entries {
    /// Drop every entry whose deadline is at or before `now`.
    fn evict(&mut self, now: Instant) -> usize {
        let mut evicted = 0;
        while let Some(Reverse((deadline, _))) = self.deadlines.peek() {
            if *deadline > now {
                break;
            }
            let Some(Reverse((deadline, token))) = self.deadlines.pop() else {
                break;
            };
            if self.live.get(&token) == Some(&deadline) {
                self.live.remove(&token);
                evicted += 1;
            }
        }
        evicted
    }

    fn record(&mut self, token: &str, expires_at: Instant) {
        self.live.insert(token.to_owned(), expires_at);
        self.deadlines.push(Reverse((expires_at, token.to_owned())));
    }
}

/// Thread-safe store of recently seen tokens, each live for a bounded TTL.
#[derive(Debug)]
pub struct TokenStore {
    entries: Mutex<Entries>,
    ttl: Duration,
}

impl TokenStore {
    /// Create an empty store whose entries default to `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            ttl,
        }
    }

    /// Default time-to-live applied by the guard.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    // Every operation leaves the maps consistent before it can panic, so a
    // poisoned lock still guards valid data.
    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `token` as live for `ttl`, replacing any expired entry.
    pub fn insert(&self, token: &str, ttl: Duration) {
        self.insert_at(token, ttl, Instant::now());
    }

    /// Whether a live entry exists for `token`.
    #[must_use]
    pub fn exists(&self, token: &str) -> bool {
        self.exists_at(token, Instant::now())
    }

    /// Number of live entries.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count_at(Instant::now())
    }

    /// Record `token` only if it is not live and the store holds fewer than
    /// `max_live` live entries. The duplicate check, the capacity check and
    /// the insert happen under one lock.
    pub fn try_insert(&self, token: &str, ttl: Duration, max_live: usize) -> InsertOutcome {
        self.try_insert_at(token, ttl, max_live, Instant::now())
    }

    /// Physically remove expired entries. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub(crate) fn insert_at(&self, token: &str, ttl: Duration, now: Instant) {
        let mut entries = self.lock();
        entries.evict(now);
        entries.record(token, deadline(now, ttl));
    }

    pub(crate) fn exists_at(&self, token: &str, now: Instant) -> bool {
        let mut entries = self.lock();
        entries.evict(now);
        entries.live.contains_key(token)
    }

    pub(crate) fn count_at(&self, now: Instant) -> usize {
        let mut entries = self.lock();
        entries.evict(now);
        entries.live.len()
    }

    pub(crate) fn try_insert_at(
        &self,
        token: &str,
        ttl: Duration,
        max_live: usize,
        now: Instant,
    ) -> InsertOutcome {
        let mut entries = self.lock();
        entries.evict(now);

        if entries.live.contains_key(token) {
            return InsertOutcome::Duplicate;
        }
        if entries.live.len() >= max_live {
            return InsertOutcome::AtCapacity;
        }

        entries.record(token, deadline(now, ttl));
        InsertOutcome::Inserted
    }

    pub(crate) fn purge_expired_at(&self, now: Instant) -> usize {
        self.lock().evict(now)
    }

    /// Spawn a background task purging expired entries every `interval`.
    ///
    /// The task only holds a weak reference and exits once the store is
    /// dropped. Must be called from within a tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    tracing::debug!("token store dropped, stopping sweeper");
                    break;
                };
                let purged = store.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, live = store.count(), "purged expired nonces");
                }
            }
        })
    }
}
