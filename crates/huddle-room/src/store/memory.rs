//! In-process [`SharedStore`] backend.
//!
//! One [`MemoryStore`] is the shared database; each participant talks to it
//! through its own [`MemoryConnection`], which carries that participant's
//! disconnect-removal registrations. Dropping a connection abruptly (see
//! [`MemoryConnection::disconnect`]) runs those removals, the same way a
//! hosted realtime database reacts to a lost socket.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Map;
use tokio::sync::{watch, Mutex};
use tracing::debug;

use super::path::{self, split_path};
use super::{SharedStore, StoreError, TxDecision, TxResult, Value};

struct Subscriber {
    segments: Vec<String>,
    tx: watch::Sender<Option<Value>>,
}

struct StoreState {
    root: Value,
    subscribers: Vec<Subscriber>,
    /// Paths to delete per connection id when that connection drops.
    on_disconnect: HashMap<u64, Vec<Vec<String>>>,
    next_connection: u64,
    /// Transactions that will report contention instead of running.
    injected_conflicts: u32,
}

impl StoreState {
    fn apply(&mut self, segments: &[String], value: Option<Value>) {
        path::set(&mut self.root, segments, value);
        self.notify(segments);
    }

    /// Push fresh snapshots to every subscriber whose subtree overlaps the
    /// changed path. Unchanged snapshots are not re-sent.
    fn notify(&mut self, changed: &[String]) {
        self.subscribers.retain(|sub| !sub.tx.is_closed());
        for sub in &self.subscribers {
            if !path::related(&sub.segments, changed) {
                continue;
            }
            let fresh = path::get(&self.root, &sub.segments).cloned();
            sub.tx.send_if_modified(|current| {
                if *current == fresh {
                    false
                } else {
                    *current = fresh;
                    true
                }
            });
        }
    }
}

/// Shared in-memory database. Clones refer to the same data.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState {
                root: Value::Object(Map::new()),
                subscribers: Vec::new(),
                on_disconnect: HashMap::new(),
                next_connection: 1,
                injected_conflicts: 0,
            })),
        }
    }

    /// Open a new client connection.
    pub async fn connect(&self) -> MemoryConnection {
        let mut state = self.state.lock().await;
        let id = state.next_connection;
        state.next_connection += 1;
        MemoryConnection {
            store: self.clone(),
            connection_id: id,
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Make the next `count` transactions report contention without running
    /// their update function.
    pub async fn inject_conflicts(&self, count: u32) {
        self.state.lock().await.injected_conflicts = count;
    }

    /// Full database contents, for inspection in tests and the simulator.
    pub async fn dump(&self) -> Value {
        self.state.lock().await.root.clone()
    }
}

/// One participant's connection to a [`MemoryStore`].
#[derive(Clone)]
pub struct MemoryConnection {
    store: MemoryStore,
    connection_id: u64,
    alive: Arc<AtomicBool>,
}

impl MemoryConnection {
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Drop the connection without an explicit leave. Registered
    /// disconnect removals run; further calls fail with
    /// [`StoreError::Disconnected`]. Idempotent.
    pub async fn disconnect(&self) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut state = self.store.state.lock().await;
        let removals = state
            .on_disconnect
            .remove(&self.connection_id)
            .unwrap_or_default();
        debug!(
            connection = self.connection_id,
            removals = removals.len(),
            "store connection dropped"
        );
        for segments in removals {
            state.apply(&segments, None);
        }
    }

    fn ensure_alive(&self) -> Result<(), StoreError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(StoreError::Disconnected)
        }
    }
}

#[async_trait]
impl SharedStore for MemoryConnection {
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.ensure_alive()?;
        let segments = split_path(path)?;
        let state = self.store.state.lock().await;
        Ok(path::get(&state.root, &segments).cloned())
    }

    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.ensure_alive()?;
        let segments = split_path(path)?;
        self.store.state.lock().await.apply(&segments, Some(value));
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.ensure_alive()?;
        let segments = split_path(path)?;
        self.store.state.lock().await.apply(&segments, None);
        Ok(())
    }

    async fn transaction(
        &self,
        path: &str,
        update: &mut (dyn FnMut(Option<Value>) -> TxDecision + Send),
    ) -> Result<TxResult, StoreError> {
        self.ensure_alive()?;
        let segments = split_path(path)?;
        let mut state = self.store.state.lock().await;
        let current = path::get(&state.root, &segments).cloned();

        if state.injected_conflicts > 0 {
            state.injected_conflicts -= 1;
            return Ok(TxResult {
                committed: false,
                value: current,
            });
        }

        match update(current.clone()) {
            TxDecision::Commit(next) => {
                state.apply(&segments, next);
                Ok(TxResult {
                    committed: true,
                    value: path::get(&state.root, &segments).cloned(),
                })
            }
            TxDecision::Abort => Ok(TxResult {
                committed: false,
                value: current,
            }),
        }
    }

    async fn subscribe(&self, path: &str) -> Result<watch::Receiver<Option<Value>>, StoreError> {
        self.ensure_alive()?;
        let segments = split_path(path)?;
        let mut state = self.store.state.lock().await;
        let current = path::get(&state.root, &segments).cloned();
        let (tx, rx) = watch::channel(current);
        state.subscribers.push(Subscriber { segments, tx });
        Ok(rx)
    }

    async fn remove_on_disconnect(&self, path: &str) -> Result<(), StoreError> {
        self.ensure_alive()?;
        let segments = split_path(path)?;
        self.store
            .state
            .lock()
            .await
            .on_disconnect
            .entry(self.connection_id)
            .or_default()
            .push(segments);
        Ok(())
    }
}
