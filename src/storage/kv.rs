//! Keyed persistence layer over Sled
//!
//! A typed key-value map with explicit commit and close. Writes are
//! best-effort: a failed `set` is logged and swallowed, a failed `get`
//! reads as a miss. Only `commit` surfaces storage faults to callers,
//! because durability is the one promise batches rely on.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use std::marker::PhantomData;
use thiserror::Error;
use tracing::{error, warn};

/// Storage faults
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage i/o: {0}")]
    Io(#[from] sled::Error),
    #[error("storage codec: {0}")]
    Codec(#[from] bincode::Error),
}

/// A typed view over one Sled tree
pub struct KvStore<K, V> {
    tree: Tree,
    name: String,
    _marker: PhantomData<(K, V)>,
}

impl<K, V> KvStore<K, V>
where
    K: Serialize,
    V: Serialize + DeserializeOwned,
{
    /// Open (or create) the named tree inside a database
    pub fn open(db: &Db, name: &str) -> Result<Self, StorageError> {
        let tree = db.open_tree(name)?;
        Ok(Self {
            tree,
            name: name.to_string(),
            _marker: PhantomData,
        })
    }

    /// Insert or overwrite. Faults are logged, never propagated; the
    /// write is retried implicitly by the next `commit` of a clean run.
    pub fn set(&self, key: &K, value: &V) {
        let encoded_key = match bincode::serialize(key) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(tree = %self.name, "failed to encode key: {e}");
                return;
            }
        };
        let encoded_value = match bincode::serialize(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(tree = %self.name, "failed to encode value: {e}");
                return;
            }
        };
        if let Err(e) = self.tree.insert(encoded_key, encoded_value) {
            warn!(tree = %self.name, "write failed: {e}");
        }
    }

    /// Fetch a value. Misses and faults both read as `None`; faults are
    /// logged so corruption is visible in the journal.
    pub fn get(&self, key: &K) -> Option<V> {
        let encoded_key = bincode::serialize(key).ok()?;
        match self.tree.get(encoded_key) {
            Ok(Some(bytes)) => match bincode::deserialize(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(tree = %self.name, "undecodable value: {e}");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(tree = %self.name, "read failed: {e}");
                None
            }
        }
    }

    /// Membership check without decoding the value
    pub fn contains_key(&self, key: &K) -> bool {
        let encoded_key = match bincode::serialize(key) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        self.tree.contains_key(encoded_key).unwrap_or(false)
    }

    /// Remove a key. Best-effort like `set`.
    pub fn remove(&self, key: &K) {
        if let Ok(encoded_key) = bincode::serialize(key) {
            if let Err(e) = self.tree.remove(encoded_key) {
                warn!(tree = %self.name, "remove failed: {e}");
            }
        }
    }

    /// Persist all dirty writes. After a successful return the batch
    /// survives a crash.
    pub fn commit(&self) -> Result<(), StorageError> {
        self.tree.flush()?;
        Ok(())
    }

    /// Flush and release. Safe to call more than once.
    pub fn close(&self) -> Result<(), StorageError> {
        self.tree.flush()?;
        Ok(())
    }

    /// Decode every stored value, skipping undecodable entries
    pub fn values(&self) -> impl Iterator<Item = V> + '_ {
        self.tree.iter().filter_map(move |entry| match entry {
            Ok((_, bytes)) => match bincode::deserialize(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(tree = %self.name, "skipping undecodable entry: {e}");
                    None
                }
            },
            Err(e) => {
                warn!(tree = %self.name, "iteration fault: {e}");
                None
            }
        })
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}
