//! Collapsing of identical concurrent upstream queries.
//!
//! The first query to miss the cache for a key becomes the leader and goes
//! upstream. Queries for the same key that arrive while the leader is out
//! become followers and wait for its reply instead of sending their own.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rustc_hash::FxBuildHasher;
use tokio::sync::watch;

use crate::cache::CacheKey;

/// A reply shared with followers. `None` means the leader gave up.
pub type SharedReply = Option<Arc<Vec<u8>>>;

type Slots = Arc<DashMap<CacheKey, Arc<watch::Sender<SharedReply>>, FxBuildHasher>>;

/// Table of keys currently being resolved upstream.
#[derive(Clone, Default)]
pub struct Inflight {
    slots: Slots,
}

/// Outcome of [`Inflight::join`].
pub enum Role {
    Leader(LeaderGuard),
    Follower(Follower),
}

impl Inflight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `key`, becoming its leader if nobody else is.
    pub fn join(&self, key: &CacheKey) -> Role {
        match self.slots.entry(key.clone()) {
            Entry::Occupied(e) => {
                let rx = e.get().subscribe();
                Role::Follower(Follower { rx })
            }
            Entry::Vacant(e) => {
                let (tx, _) = watch::channel(None);
                e.insert(Arc::new(tx));
                Role::Leader(LeaderGuard {
                    slots: self.slots.clone(),
                    key: key.clone(),
                    finished: false,
                })
            }
        }
    }

    /// Number of keys with a leader in flight.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Held by the leader. Dropping it without calling
/// [`complete`](Self::complete) releases followers empty-handed.
pub struct LeaderGuard {
    slots: Slots,
    key: CacheKey,
    finished: bool,
}

impl LeaderGuard {
    /// Hand `reply` to every follower and retire the key.
    pub fn complete(mut self, reply: &[u8]) {
        self.finish(Some(Arc::new(reply.to_vec())));
    }

    fn finish(&mut self, reply: SharedReply) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some((_, tx)) = self.slots.remove(&self.key) {
            let _ = tx.send(reply);
        }
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        self.finish(None);
    }
}

/// Waits on a leader's outcome.
pub struct Follower {
    rx: watch::Receiver<SharedReply>,
}

impl Follower {
    /// The leader's reply, or `None` if it failed.
    pub async fn wait(mut self) -> SharedReply {
        self.rx.changed().await.ok()?;
        self.rx.borrow().clone()
    }
}
