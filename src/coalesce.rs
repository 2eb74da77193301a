//! Single-flight request coalescing.
//!
//! The first caller for a key becomes the leader: it registers a pending fetch and
//! spawns the work on its own task, so the fetch finishes even if every caller stops
//! waiting. Later callers for the same key subscribe to the pending fetch and receive
//! the identical outcome. Check-and-register happens under one lock.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;

/// In-flight fetch for one key. Lives from registration until its outcome is published.
struct PendingFetch<V> {
    tx: watch::Sender<Option<V>>,
    waiters: AtomicUsize,
}

/// How a caller's request was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Waiter,
}

pub struct Coalescer<V> {
    in_flight: Arc<Mutex<HashMap<String, Arc<PendingFetch<V>>>>>,
}

impl<V> Default for Coalescer<V> {
    fn default() -> Self {
        Self { in_flight: Arc::new(Mutex::new(HashMap::new())) }
    }
}

impl<V> Coalescer<V>
where
    V: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` for `key` unless a fetch for `key` is already in flight, in which
    /// case `work` is dropped unpolled and the pending outcome is awaited instead.
    /// `on_abort` builds the outcome if the leader task dies before publishing.
    pub async fn run<F>(&self, key: &str, work: F, on_abort: impl FnOnce() -> V) -> (V, Role)
    where
        F: Future<Output = V> + Send + 'static,
    {
        let (mut rx, role) = {
            let mut table = self.in_flight.lock();
            if let Some(pending) = table.get(key) {
                pending.waiters.fetch_add(1, Ordering::Relaxed);
                (pending.tx.subscribe(), Role::Waiter)
            } else {
                let (tx, rx) = watch::channel(None);
                let pending = Arc::new(PendingFetch { tx, waiters: AtomicUsize::new(0) });
                table.insert(key.to_owned(), Arc::clone(&pending));
                drop(table);
                self.spawn_leader(key.to_owned(), pending, work);
                (rx, Role::Leader)
            }
        };
        if role == Role::Waiter {
            log::debug!("coalesced request for {key} onto in-flight fetch");
        }

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(v) => v.clone(),
            Err(_) => None,
        };
        (outcome.unwrap_or_else(on_abort), role)
    }

    fn spawn_leader<F>(&self, key: String, pending: Arc<PendingFetch<V>>, work: F)
    where
        F: Future<Output = V> + Send + 'static,
    {
        let table = Arc::clone(&self.in_flight);
        tokio::spawn(async move {
            // Deregisters even if `work` panics, so the key is never wedged.
            let guard = Deregister { table, key, pending: Arc::clone(&pending) };
            let outcome = work.await;
            drop(guard);
            let waiters = pending.waiters.load(Ordering::Relaxed);
            if waiters > 0 {
                log::debug!("publishing fetch outcome to {waiters} coalesced waiter(s)");
            }
            pending.tx.send_replace(Some(outcome));
        });
    }

    /// Number of keys with a fetch in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    #[must_use]
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight.lock().contains_key(key)
    }
}

struct Deregister<V> {
    table: Arc<Mutex<HashMap<String, Arc<PendingFetch<V>>>>>,
    key: String,
    pending: Arc<PendingFetch<V>>,
}

impl<V> Drop for Deregister<V> {
    fn drop(&mut self) {
        let mut table = self.table.lock();
        if table.get(&self.key).is_some_and(|p| Arc::ptr_eq(p, &self.pending)) {
            table.remove(&self.key);
        }
    }
}
