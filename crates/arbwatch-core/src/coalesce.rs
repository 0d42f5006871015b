//! Keyed single-flight de-duplication of async work.
//!
//! `Coalescer` maps a key to the future currently computing it. The first
//! caller for a key starts the work; every caller arriving while it runs
//! awaits the same shared future and receives a clone of its output. The
//! work is driven by its own task, so it settles and removes its entry even
//! if every caller stops waiting; the next caller after that starts fresh.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;

type InFlight<K, V> = Arc<Mutex<HashMap<K, Shared<BoxFuture<'static, V>>>>>;

pub struct Coalescer<K, V> {
    inflight: InFlight<K, V>,
}

impl<K, V> Coalescer<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Join the in-flight work for `key`, or start it with `make`.
    ///
    /// `make` is only called when no work is in flight for `key`. Dropping
    /// the returned future does not cancel the work.
    pub async fn run<F, Fut>(&self, key: K, make: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let shared = {
            let mut inflight = self.inflight.lock().await;
            match inflight.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let work = make();
                    let registry = Arc::clone(&self.inflight);
                    let settled_key = key.clone();
                    let shared = async move {
                        let output = work.await;
                        registry.lock().await.remove(&settled_key);
                        output
                    }
                    .boxed()
                    .shared();
                    inflight.insert(key, shared.clone());
                    tokio::spawn(shared.clone());
                    shared
                }
            }
        };

        shared.await
    }

    /// Whether work for `key` is currently running.
    pub async fn in_flight(&self, key: &K) -> bool {
        self.inflight.lock().await.contains_key(key)
    }
}

impl<K, V> Default for Coalescer<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for Coalescer<K, V> {
    fn clone(&self) -> Self {
        Self {
            inflight: Arc::clone(&self.inflight),
        }
    }
}
