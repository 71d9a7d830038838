//! Record store: whole-collection load and replace of JSON records.
//!
//! Every snapshot carries a version (hex SHA-256 of the serialized records).
//! `save` compares the caller's version with the current one before
//! replacing the collection, so a concurrent write surfaces as
//! [`StoreError::VersionMismatch`] instead of a silent lost update.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub use file::JsonFileStore;
pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{collection}: backing file unavailable: {source}")]
    Unavailable {
        collection: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{collection}: stored document is corrupt: {reason}")]
    Corrupt { collection: String, reason: String },

    #[error("{collection}: version mismatch (expected {expected}, found {actual})")]
    VersionMismatch {
        collection: String,
        expected: String,
        actual: String,
    },

    #[error("failed to encode records: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Raw contents of a collection at one point in time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub records: Vec<Value>,
    pub version: String,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Loads the full collection. A collection that was never written is empty.
    async fn load(&self, collection: &str) -> StoreResult<Snapshot>;

    /// Replaces the full collection and returns the new version.
    ///
    /// With `expected_version` set, the write only happens if the stored
    /// collection still has that version.
    async fn save(
        &self,
        collection: &str,
        records: Vec<Value>,
        expected_version: Option<&str>,
    ) -> StoreResult<String>;
}

/// A decoded collection together with the version it was read at.
#[derive(Debug, Clone)]
pub struct Collection<T> {
    pub records: Vec<T>,
    pub version: String,
}

pub fn version_of(records: &[Value]) -> StoreResult<String> {
    let bytes = serde_json::to_vec(records)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

pub(crate) fn check_version(
    collection: &str,
    current: &str,
    expected: Option<&str>,
) -> StoreResult<()> {
    match expected {
        Some(expected) if expected != current => Err(StoreError::VersionMismatch {
            collection: collection.to_string(),
            expected: expected.to_string(),
            actual: current.to_string(),
        }),
        _ => Ok(()),
    }
}

pub async fn load_typed<T: DeserializeOwned>(
    store: &dyn RecordStore,
    collection: &str,
) -> StoreResult<Collection<T>> {
    let snapshot = store.load(collection).await?;
    let records = snapshot
        .records
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            serde_json::from_value(value).map_err(|e| StoreError::Corrupt {
                collection: collection.to_string(),
                reason: format!("record #{i}: {e}"),
            })
        })
        .collect::<StoreResult<Vec<T>>>()?;

    Ok(Collection {
        records,
        version: snapshot.version,
    })
}

pub async fn save_typed<T: Serialize>(
    store: &dyn RecordStore,
    collection: &str,
    records: &[T],
    expected_version: Option<&str>,
) -> StoreResult<String> {
    let values = records
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;
    store.save(collection, values, expected_version).await
}
