//! Fetch-if-absent cache that never runs two fetches for the same key at once

use std::collections::HashSet;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use anyhow::Result;
use parking_lot::Mutex;

use super::executor::MainExecutor;
use super::observable::{KeyedStore, WeakKeyedStore};

/// What a call to [`RequestCoalescer::request`] did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestOutcome<V> {
    /// The value was already resolved; nothing was fetched
    Cached(V),
    /// A fetch for this key is already outstanding and will satisfy the caller
    InFlight,
    /// A new fetch was issued
    Started,
}

type Views<K, V> = Arc<Mutex<Vec<WeakKeyedStore<K, V>>>>;

/// Cloning shares the store and its listener. [`RequestCoalescer::view`]
/// shares the fetches and the resolved values but gets a store of its own.
pub struct RequestCoalescer<K, V> {
    store: KeyedStore<K, V>,
    /// Every live store resolved values are written to, this one included
    views: Views<K, V>,
    in_flight: Arc<Mutex<HashSet<K>>>,
    executor: MainExecutor,
}

impl<K, V> Clone for RequestCoalescer<K, V> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            views: self.views.clone(),
            in_flight: self.in_flight.clone(),
            executor: self.executor.clone(),
        }
    }
}

impl<K, V> RequestCoalescer<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(executor: &MainExecutor) -> Self {
        let store = KeyedStore::new(executor);
        Self {
            views: Arc::new(Mutex::new(vec![store.downgrade()])),
            store,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            executor: executor.clone(),
        }
    }

    /// A handle over the same values and in-flight set with its own store,
    /// so its listener does not replace anyone else's.
    pub fn view(&self) -> Self {
        let store = KeyedStore::with_entries(&self.executor, self.store.snapshot());
        {
            let mut views = self.views.lock();
            views.retain(|view| view.upgrade().is_some());
            views.push(store.downgrade());
        }
        Self {
            store,
            views: self.views.clone(),
            in_flight: self.in_flight.clone(),
            executor: self.executor.clone(),
        }
    }

    /// Resolve `key`, calling `fetch` only if it is neither cached nor already
    /// being fetched. Callers learn about the result through the store.
    pub fn request<F, Fut>(&self, key: K, fetch: F) -> RequestOutcome<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        if let Some(value) = self.store.get(&key) {
            return RequestOutcome::Cached(value);
        }

        if !self.in_flight.lock().insert(key.clone()) {
            tracing::trace!(key = ?key, "Request already in flight");
            return RequestOutcome::InFlight;
        }

        tracing::debug!(key = ?key, "Fetching");
        let views = self.views.clone();
        let in_flight = self.in_flight.clone();
        self.executor.spawn_then(fetch(), move |result| {
            in_flight.lock().remove(&key);
            match result {
                Ok(value) => each_view(&views, |store| store.set(key.clone(), value.clone())),
                // No negative caching: the next observation retries.
                Err(e) => tracing::warn!(key = ?key, error = %e, "Fetch failed"),
            }
        });
        RequestOutcome::Started
    }

    /// Forget the cached value so the next request fetches again.
    pub fn invalidate(&self, key: &K) {
        tracing::debug!(key = ?key, "Invalidating cached value");
        each_view(&self.views, |store| store.remove(key));
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.store.get(key)
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.in_flight.lock().contains(key)
    }

    pub fn store(&self) -> &KeyedStore<K, V> {
        &self.store
    }
}

fn each_view<K, V>(views: &Views<K, V>, mut apply: impl FnMut(&KeyedStore<K, V>))
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    views.lock().retain(|view| match view.upgrade() {
        Some(store) => {
            apply(&store);
            true
        }
        None => false,
    });
}
