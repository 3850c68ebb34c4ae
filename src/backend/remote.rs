//! Path-addressable tree store.
//!
//! Paths are `/`-separated keys into a JSON tree (`polls/{id}/candidates`).
//! Writing `null` anywhere erases that node.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, RwLock};

use super::{StoreError, StoreResult};

/// Attempts before a contended transaction is reported as failed
pub const MAX_TRANSACTION_ATTEMPTS: usize = 25;

/// Decision returned by a transaction update function
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionAction {
    /// Write this value at the transaction path
    Commit(Value),
    /// Leave the stored value untouched
    Abort,
}

/// Update function run against the current value at the transaction path.
///
/// May be invoked several times if another writer gets in between the read
/// and the commit, so it must not have side effects.
pub type TransactionFn = Box<dyn FnMut(Option<Value>) -> TransactionAction + Send>;

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionOutcome {
    pub committed: bool,
    /// Value at the path after the transaction finished
    pub snapshot: Option<Value>,
}

/// A realtime tree database: partial updates, whole-record writes, atomic
/// read-modify-write and change notifications on subtrees.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get(&self, path: &str) -> StoreResult<Option<Value>>;

    async fn set(&self, path: &str, value: Value) -> StoreResult<()>;

    /// Write each field below `path`, leaving siblings untouched
    async fn update(&self, path: &str, fields: Map<String, Value>) -> StoreResult<()>;

    async fn remove(&self, path: &str) -> StoreResult<()>;

    async fn transaction(
        &self,
        path: &str,
        update: TransactionFn,
    ) -> StoreResult<TransactionOutcome>;

    /// Get notified whenever anything at, above or below `path` changes
    fn subscribe(&self, path: &str) -> Subscription;
}

/// Change feed for one subtree
pub struct Subscription {
    path: String,
    rx: broadcast::Receiver<String>,
}

impl Subscription {
    pub fn new(path: &str, rx: broadcast::Receiver<String>) -> Self {
        Self {
            path: path.to_string(),
            rx,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Wait for the next change touching the subscribed subtree.
    ///
    /// Returns `false` once the store is gone. A lagged receiver counts as a
    /// change since the caller has to re-read anyway.
    pub async fn changed(&mut self) -> bool {
        loop {
            match self.rx.recv().await {
                Ok(changed) => {
                    if overlaps(&segments(&self.path), &segments(&changed)) {
                        return true;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(
                        "Subscription on '{}' lagged by {} notifications",
                        self.path,
                        skipped
                    );
                    return true;
                }
                Err(broadcast::error::RecvError::Closed) => return false,
            }
        }
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn overlaps(a: &[&str], b: &[&str]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

fn pointer(segs: &[&str]) -> String {
    segs.iter()
        .map(|s| format!("/{}", s.replace('~', "~0").replace('/', "~1")))
        .collect()
}

fn get_at<'a>(root: &'a Value, segs: &[&str]) -> Option<&'a Value> {
    root.pointer(&pointer(segs)).filter(|v| !v.is_null())
}

/// Step into `key`, turning scalars into objects as needed
fn child_mut<'a>(node: &'a mut Value, key: &str) -> &'a mut Value {
    let index = match (&*node, key.parse::<usize>()) {
        (Value::Array(items), Ok(i)) if i < items.len() => Some(i),
        _ => None,
    };
    if let Some(i) = index {
        return &mut node[i];
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    &mut node[key]
}

fn remove_at(root: &mut Value, segs: &[&str]) {
    let Some((last, parents)) = segs.split_last() else {
        *root = Value::Object(Map::new());
        return;
    };
    match root.pointer_mut(&pointer(parents)) {
        Some(Value::Object(map)) => {
            map.remove(*last);
        }
        Some(Value::Array(items)) => {
            if let Some(item) = last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                *item = Value::Null;
            }
        }
        _ => {}
    }
}

fn write_at(root: &mut Value, segs: &[&str], value: Value) {
    if value.is_null() {
        remove_at(root, segs);
        return;
    }
    let target = segs.iter().fold(root, |node, key| child_mut(node, key));
    *target = value;
}

struct Tree {
    root: Value,
    /// Bumped on every write; transactions commit only if it is unchanged
    version: u64,
}

/// In-process [`RemoteStore`] holding the whole tree in memory
pub struct MemoryTreeStore {
    tree: RwLock<Tree>,
    changes: broadcast::Sender<String>,
}

impl MemoryTreeStore {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            tree: RwLock::new(Tree {
                root: Value::Object(Map::new()),
                version: 0,
            }),
            changes: tx,
        }
    }

    /// Number of writes applied so far
    pub async fn version(&self) -> u64 {
        self.tree.read().await.version
    }

    fn notify(&self, path: &str) {
        // No subscribers is fine
        let _ = self.changes.send(path.to_string());
    }
}

impl Default for MemoryTreeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryTreeStore {
    async fn get(&self, path: &str) -> StoreResult<Option<Value>> {
        let tree = self.tree.read().await;
        Ok(get_at(&tree.root, &segments(path)).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> StoreResult<()> {
        let mut tree = self.tree.write().await;
        write_at(&mut tree.root, &segments(path), value);
        tree.version += 1;
        drop(tree);
        self.notify(path);
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> StoreResult<()> {
        let mut tree = self.tree.write().await;
        for (key, value) in fields {
            let field_path = format!("{}/{}", path, key);
            write_at(&mut tree.root, &segments(&field_path), value);
        }
        tree.version += 1;
        drop(tree);
        self.notify(path);
        Ok(())
    }

    async fn remove(&self, path: &str) -> StoreResult<()> {
        let mut tree = self.tree.write().await;
        remove_at(&mut tree.root, &segments(path));
        tree.version += 1;
        drop(tree);
        self.notify(path);
        Ok(())
    }

    async fn transaction(
        &self,
        path: &str,
        mut update: TransactionFn,
    ) -> StoreResult<TransactionOutcome> {
        let segs = segments(path);

        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            let (current, seen_version) = {
                let tree = self.tree.read().await;
                (get_at(&tree.root, &segs).cloned(), tree.version)
            };

            let value = match update(current.clone()) {
                TransactionAction::Abort => {
                    return Ok(TransactionOutcome {
                        committed: false,
                        snapshot: current,
                    });
                }
                TransactionAction::Commit(value) => value,
            };

            let mut tree = self.tree.write().await;
            if tree.version != seen_version {
                tracing::debug!(
                    "Transaction on '{}' saw an intervening write, retrying (attempt {})",
                    path,
                    attempt
                );
                continue;
            }
            write_at(&mut tree.root, &segs, value.clone());
            tree.version += 1;
            drop(tree);
            self.notify(path);

            return Ok(TransactionOutcome {
                committed: true,
                snapshot: Some(value).filter(|v| !v.is_null()),
            });
        }

        Err(StoreError::Contention {
            path: path.to_string(),
            attempts: MAX_TRANSACTION_ATTEMPTS,
        })
    }

    fn subscribe(&self, path: &str) -> Subscription {
        Subscription::new(path, self.changes.subscribe())
    }
}
