use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{check_version, version_of, RecordStore, Snapshot, StoreError, StoreResult};

/// In-process store. Cloning shares the same collections.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<Mutex<HashMap<String, Vec<Value>>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent load and save fail as if the backing medium
    /// were gone.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self, collection: &str) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                collection: collection.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "store offline"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn load(&self, collection: &str) -> StoreResult<Snapshot> {
        self.ensure_available(collection)?;
        let collections = self.collections.lock().await;
        let records = collections.get(collection).cloned().unwrap_or_default();
        let version = version_of(&records)?;
        Ok(Snapshot { records, version })
    }

    async fn save(
        &self,
        collection: &str,
        records: Vec<Value>,
        expected_version: Option<&str>,
    ) -> StoreResult<String> {
        self.ensure_available(collection)?;
        let mut collections = self.collections.lock().await;

        let current = version_of(
            collections
                .get(collection)
                .map(Vec::as_slice)
                .unwrap_or_default(),
        )?;
        check_version(collection, &current, expected_version)?;

        let version = version_of(&records)?;
        collections.insert(collection.to_string(), records);
        Ok(version)
    }
}
