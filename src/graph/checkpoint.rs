// Per-thread state persistence

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Stores the latest graph state per thread id. Implementations must make the
/// per-thread read-modify-write atomic; distinct threads never interfere.
#[async_trait]
pub trait Checkpointer<S>: Send + Sync {
    async fn get(&self, thread_id: &str) -> Option<S>;
    async fn put(&self, thread_id: &str, state: S);
}

struct Entry<S> {
    state: S,
    touched: u64,
}

/// In-memory checkpoint store, capacity-bounded.
///
/// Threads are created implicitly on first use and the map would otherwise
/// grow without bound, so once `capacity` threads exist the least recently
/// touched one is evicted. An evicted conversation simply restarts from the
/// initial state on its next turn.
pub struct MemorySaver<S> {
    inner: Mutex<SaverInner<S>>,
    capacity: usize,
}

struct SaverInner<S> {
    entries: HashMap<String, Entry<S>>,
    clock: u64,
}

impl<S: Clone + Send> MemorySaver<S> {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(SaverInner {
                entries: HashMap::new(),
                clock: 0,
            }),
            capacity: capacity.max(1),
        })
    }
}

#[async_trait]
impl<S: Clone + Send + Sync> Checkpointer<S> for MemorySaver<S> {
    async fn get(&self, thread_id: &str) -> Option<S> {
        let mut inner = self.inner.lock().await;
        inner.clock += 1;
        let clock = inner.clock;
        inner.entries.get_mut(thread_id).map(|entry| {
            entry.touched = clock;
            entry.state.clone()
        })
    }

    async fn put(&self, thread_id: &str, state: S) {
        let mut inner = self.inner.lock().await;
        inner.clock += 1;
        let clock = inner.clock;

        if !inner.entries.contains_key(thread_id) && inner.entries.len() >= self.capacity {
            if let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.touched)
                .map(|(id, _)| id.clone())
            {
                tracing::debug!(thread_id = %oldest, "Evicting least recently used checkpoint");
                inner.entries.remove(&oldest);
            }
        }

        inner.entries.insert(
            thread_id.to_string(),
            Entry {
                state,
                touched: clock,
            },
        );
    }
}
