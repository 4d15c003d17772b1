//! Observable containers that fan results out to a single subscriber
//!
//! Both containers hold at most one listener. Binding replays the current
//! state synchronously; later changes are delivered through the main executor
//! in the order they were made.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use parking_lot::Mutex;

use super::executor::MainExecutor;

type CellListener<T> = Arc<dyn Fn(Option<T>) + Send + Sync + 'static>;
type StoreListener<K, V> = Arc<dyn Fn(Arc<HashMap<K, V>>) + Send + Sync + 'static>;

/// Tracks the current listener together with a binding number, so deliveries
/// queued for a replaced or removed listener can be recognized and dropped.
struct Binding<L> {
    listener: Option<L>,
    id: u64,
}

impl<L: Clone> Binding<L> {
    fn new() -> Self {
        Self { listener: None, id: 0 }
    }

    fn replace(&mut self, listener: L) -> u64 {
        self.id += 1;
        self.listener = Some(listener);
        self.id
    }

    fn clear(&mut self) {
        self.id += 1;
        self.listener = None;
    }

    fn current(&self) -> Option<(L, u64)> {
        self.listener.clone().map(|listener| (listener, self.id))
    }

    fn is_current(&self, id: u64) -> bool {
        self.listener.is_some() && self.id == id
    }
}

struct CellInner<T> {
    value: Option<T>,
    binding: Binding<CellListener<T>>,
}

/// Single-value reactive container
pub struct Cell<T> {
    inner: Arc<Mutex<CellInner<T>>>,
    executor: MainExecutor,
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            executor: self.executor.clone(),
        }
    }
}

impl<T> Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(executor: &MainExecutor) -> Self {
        Self::from_option(executor, None)
    }

    pub fn with_value(executor: &MainExecutor, value: T) -> Self {
        Self::from_option(executor, Some(value))
    }

    fn from_option(executor: &MainExecutor, value: Option<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CellInner {
                value,
                binding: Binding::new(),
            })),
            executor: executor.clone(),
        }
    }

    /// Replace the listener and hand it the current value before returning.
    pub fn bind<F>(&self, listener: F)
    where
        F: Fn(Option<T>) + Send + Sync + 'static,
    {
        let listener: CellListener<T> = Arc::new(listener);
        let value = {
            let mut inner = self.inner.lock();
            inner.binding.replace(listener.clone());
            inner.value.clone()
        };
        listener(value);
    }

    pub fn unbind(&self) {
        self.inner.lock().binding.clear();
    }

    pub fn is_bound(&self) -> bool {
        self.inner.lock().binding.listener.is_some()
    }

    pub fn get(&self) -> Option<T> {
        self.inner.lock().value.clone()
    }

    pub fn set(&self, value: T) {
        self.store(Some(value));
    }

    pub fn clear(&self) {
        self.store(None);
    }

    fn store(&self, value: Option<T>) {
        let pending = {
            let mut inner = self.inner.lock();
            inner.value = value.clone();
            inner.binding.current()
        };

        let Some((listener, binding_id)) = pending else {
            return;
        };

        let inner = self.inner.clone();
        self.executor.dispatch(move || {
            if inner.lock().binding.is_current(binding_id) {
                listener(value);
            }
        });
    }
}

struct StoreInner<K, V> {
    entries: Arc<HashMap<K, V>>,
    binding: Binding<StoreListener<K, V>>,
}

/// Reactive map that publishes a full snapshot on every change
pub struct KeyedStore<K, V> {
    inner: Arc<Mutex<StoreInner<K, V>>>,
    executor: MainExecutor,
}

impl<K, V> Clone for KeyedStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            executor: self.executor.clone(),
        }
    }
}

impl<K, V> KeyedStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(executor: &MainExecutor) -> Self {
        Self::with_entries(executor, Arc::new(HashMap::new()))
    }

    /// Start from an existing map without notifying anyone.
    pub fn with_entries(executor: &MainExecutor, entries: Arc<HashMap<K, V>>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                entries,
                binding: Binding::new(),
            })),
            executor: executor.clone(),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakKeyedStore<K, V> {
        WeakKeyedStore {
            inner: Arc::downgrade(&self.inner),
            executor: self.executor.clone(),
        }
    }

    /// Replace the listener and hand it the current map before returning.
    pub fn bind<F>(&self, listener: F)
    where
        F: Fn(Arc<HashMap<K, V>>) + Send + Sync + 'static,
    {
        let listener: StoreListener<K, V> = Arc::new(listener);
        let entries = {
            let mut inner = self.inner.lock();
            inner.binding.replace(listener.clone());
            inner.entries.clone()
        };
        listener(entries);
    }

    pub fn unbind(&self) {
        self.inner.lock().binding.clear();
    }

    pub fn is_bound(&self) -> bool {
        self.inner.lock().binding.listener.is_some()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().entries.get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn snapshot(&self) -> Arc<HashMap<K, V>> {
        self.inner.lock().entries.clone()
    }

    pub fn set(&self, key: K, value: V) {
        self.mutate(|entries| {
            entries.insert(key, value);
        });
    }

    pub fn remove(&self, key: &K) {
        self.mutate(|entries| {
            entries.remove(key);
        });
    }

    fn mutate(&self, change: impl FnOnce(&mut HashMap<K, V>)) {
        let pending = {
            let mut inner = self.inner.lock();
            // Listeners may still hold the previous map; it is never touched again.
            let mut entries = (*inner.entries).clone();
            change(&mut entries);
            inner.entries = Arc::new(entries);
            inner
                .binding
                .current()
                .map(|(listener, id)| (listener, id, inner.entries.clone()))
        };

        let Some((listener, binding_id, entries)) = pending else {
            return;
        };

        let inner = self.inner.clone();
        self.executor.dispatch(move || {
            if inner.lock().binding.is_current(binding_id) {
                listener(entries);
            }
        });
    }
}

/// Non-owning handle to a [`KeyedStore`]
pub(crate) struct WeakKeyedStore<K, V> {
    inner: Weak<Mutex<StoreInner<K, V>>>,
    executor: MainExecutor,
}

impl<K, V> WeakKeyedStore<K, V> {
    pub(crate) fn upgrade(&self) -> Option<KeyedStore<K, V>> {
        self.inner.upgrade().map(|inner| KeyedStore {
            inner,
            executor: self.executor.clone(),
        })
    }
}
