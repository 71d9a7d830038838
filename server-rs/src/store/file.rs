use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::{check_version, version_of, RecordStore, Snapshot, StoreError, StoreResult};

/// Flat JSON files, one per collection: `<dir>/<collection>-data.json`
/// holding `{ "<collection>": [ ... ] }`.
///
/// Writes go to a temp file that is renamed over the target, and are
/// serialized through a process-local lock. Writers in other processes are
/// not coordinated.
pub struct JsonFileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{collection}-data.json"))
    }

    async fn read_records(&self, collection: &str) -> StoreResult<Vec<Value>> {
        let path = self.path_for(collection);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Unavailable {
                    collection: collection.to_string(),
                    source,
                })
            }
        };

        let corrupt = |reason: String| StoreError::Corrupt {
            collection: collection.to_string(),
            reason,
        };

        let doc: Value = serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        match doc.get(collection) {
            Some(Value::Array(items)) => Ok(items.clone()),
            // A document without the key is treated as an empty collection.
            None => Ok(Vec::new()),
            Some(_) => Err(corrupt(format!("`{collection}` is not an array"))),
        }
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn load(&self, collection: &str) -> StoreResult<Snapshot> {
        let records = self.read_records(collection).await?;
        let version = version_of(&records)?;
        Ok(Snapshot { records, version })
    }

    async fn save(
        &self,
        collection: &str,
        records: Vec<Value>,
        expected_version: Option<&str>,
    ) -> StoreResult<String> {
        let _guard = self.write_lock.lock().await;

        let current = self.read_records(collection).await?;
        check_version(collection, &version_of(&current)?, expected_version)?;

        let new_version = version_of(&records)?;
        let mut doc = Map::new();
        doc.insert(collection.to_string(), Value::Array(records));
        let bytes = serde_json::to_vec_pretty(&Value::Object(doc))?;

        let unavailable = |source: std::io::Error| StoreError::Unavailable {
            collection: collection.to_string(),
            source,
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(unavailable)?;

        let path = self.path_for(collection);
        let tmp_path = self.dir.join(format!("{collection}-data.json.tmp"));
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(unavailable)?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(unavailable(e));
        }

        tracing::debug!(collection, version = %new_version, "Collection written");
        Ok(new_version)
    }
}
