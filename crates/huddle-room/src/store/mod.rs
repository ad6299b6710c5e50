//! Shared State Client: the hierarchical key-value store every participant
//! talks to.
//!
//! The store is the only shared mutable resource. Race-sensitive updates go
//! through [`SharedStore::transaction`]; everything else uses plain reads
//! and writes. Subscriptions deliver whole snapshots of a subtree through a
//! `tokio::sync::watch` channel, so rapid changes may collapse into one
//! notification. Dropping the receiver unsubscribes.

mod memory;
mod path;


use async_trait::async_trait;
use tokio::sync::watch;

pub use memory::{MemoryConnection, MemoryStore};
pub use path::split_path;

pub type Value = serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid store path: {0}")]
    InvalidPath(String),

    #[error("store serialization error: {0}")]
    Serialization(String),

    #[error("store connection closed")]
    Disconnected,
}

/// What an update function wants done with the value it was shown.
#[derive(Debug, Clone, PartialEq)]
pub enum TxDecision {
    /// Replace the value; `None` deletes it.
    Commit(Option<Value>),
    /// Leave the value untouched and report the transaction as not committed.
    Abort,
}

/// Outcome of [`SharedStore::transaction`].
#[derive(Debug, Clone, PartialEq)]
pub struct TxResult {
    pub committed: bool,
    /// Value at the path after the transaction.
    pub value: Option<Value>,
}

/// Primitive operations offered by the shared store.
///
/// Paths are `/`-separated segments. Writing `null` is the same as
/// deleting, and empty objects are never kept.
#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError>;

    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Recursive delete. Deleting an absent path succeeds.
    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// Atomic read-modify-write of the subtree at `path`.
    ///
    /// `update` may be invoked more than once when the store retries after
    /// contention; only the final invocation's decision is applied.
    async fn transaction(
        &self,
        path: &str,
        update: &mut (dyn FnMut(Option<Value>) -> TxDecision + Send),
    ) -> Result<TxResult, StoreError>;

    /// Subscribe to snapshots of the subtree at `path`. The receiver holds
    /// the current value immediately.
    async fn subscribe(&self, path: &str) -> Result<watch::Receiver<Option<Value>>, StoreError>;

    /// Delete `path` when this client's connection goes away without an
    /// explicit leave.
    async fn remove_on_disconnect(&self, path: &str) -> Result<(), StoreError>;
}
