//! DNS response cache with TTL-based expiration.
//!
//! Entries are never purged in the background: an expired entry is removed
//! by the lookup that finds it, or replaced by a newer store for the same
//! key. There is no size bound.

use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use crate::dns::{Answer, Question};

/// TTL used when a response is stored without answer records.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Source of the current time for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Exact-match cache key. Names are compared as received, without case
/// folding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub name: String,
    pub qtype: u16,
    pub qclass: u16,
}

impl CacheKey {
    pub fn new(name: impl Into<String>, qtype: u16, qclass: u16) -> Self {
        Self {
            name: name.into(),
            qtype,
            qclass,
        }
    }
}

impl From<&Question> for CacheKey {
    fn from(q: &Question) -> Self {
        Self::new(q.name.clone(), q.qtype, q.qclass)
    }
}

struct CacheEntry {
    response: Vec<u8>,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_valid_at(&self, now: Instant) -> bool {
        now < self.inserted_at + self.ttl
    }
}

/// TTL-based DNS response cache, safe to share between tasks.
pub struct ResponseCache {
    entries: RwLock<FxHashMap<CacheKey, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            clock,
        }
    }

    /// Look up a cached response.
    ///
    /// An entry found expired is removed and reported as a miss.
    pub fn lookup(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let now = self.clock.now();

        {
            let Ok(entries) = self.entries.read() else {
                return None;
            };
            match entries.get(key) {
                Some(entry) if entry.is_valid_at(now) => return Some(entry.response.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let Ok(mut entries) = self.entries.write() else {
            return None;
        };
        // A concurrent store may have replaced the entry since the read.
        match entries.get(key) {
            Some(entry) if entry.is_valid_at(now) => Some(entry.response.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a response, replacing any entry for `key`.
    ///
    /// The entry lives for the smallest TTL among `answers`, or
    /// [`DEFAULT_TTL`] if there are none. Returns that TTL.
    pub fn store(&self, key: CacheKey, response: &[u8], answers: &[Answer]) -> Duration {
        let ttl = answers
            .iter()
            .map(|a| a.ttl)
            .min()
            .map(|secs| Duration::from_secs(secs.into()))
            .unwrap_or(DEFAULT_TTL);

        let entry = CacheEntry {
            response: response.to_vec(),
            inserted_at: self.clock.now(),
            ttl,
        };

        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key, entry);
        }

        ttl
    }

    /// Number of entries, including expired ones not yet looked up.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}
