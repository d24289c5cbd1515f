//! File-backed storage: one JSON document per entity kind.
//!
//! Each kind is a JSON object mapping keys to values, written atomically
//! via a temp file so a crash mid-write cannot corrupt the table. Data
//! lives under the platform data dir; tests point the root elsewhere.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::{EntityKind, StorageAdapter, StorageError};
use crate::core::config::project_dirs;

pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new() -> Self {
        Self {
            root: project_dirs().data_dir().to_path_buf(),
        }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn table_path(&self, kind: EntityKind) -> PathBuf {
        self.root.join(format!("{}.json", kind.as_str()))
    }

    fn load_table(&self, kind: EntityKind) -> Result<Map<String, Value>, StorageError> {
        let path = self.table_path(kind);
        if !path.exists() {
            return Ok(Map::new());
        }
        let contents = fs::read_to_string(&path).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;
        let value: Value = serde_json::from_str(&contents)?;
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(StorageError::Encode {
                source: serde_json::Error::io(std::io::Error::other(format!(
                    "table {} is not a JSON object",
                    path.display()
                ))),
            }),
        }
    }

    fn save_table(&self, kind: EntityKind, table: &Map<String, Value>) -> Result<(), StorageError> {
        let path = self.table_path(kind);
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StorageError::Io {
                path: path.clone(),
                source,
            }
        };

        fs::create_dir_all(&self.root).map_err(io_err(&self.root))?;

        let contents = serde_json::to_string_pretty(&Value::Object(table.clone()))?;
        let mut temp_file = NamedTempFile::new_in(&self.root).map_err(io_err(&path))?;
        temp_file
            .write_all(contents.as_bytes())
            .map_err(io_err(&path))?;
        temp_file.as_file_mut().sync_all().map_err(io_err(&path))?;
        temp_file
            .persist(&path)
            .map_err(|err| StorageError::Io {
                path: path.clone(),
                source: err.error,
            })?;
        Ok(())
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageAdapter for LocalStore {
    async fn get(&self, kind: EntityKind, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.load_table(kind)?.get(key).cloned())
    }

    async fn put(&self, kind: EntityKind, key: &str, value: Value) -> Result<(), StorageError> {
        let mut table = self.load_table(kind)?;
        table.insert(key.to_string(), value);
        self.save_table(kind, &table)
    }

    async fn list(&self, kind: EntityKind) -> Result<Vec<Value>, StorageError> {
        Ok(self.load_table(kind)?.into_iter().map(|(_, v)| v).collect())
    }

    async fn delete(&self, kind: EntityKind, key: &str) -> Result<(), StorageError> {
        let mut table = self.load_table(kind)?;
        if table.remove(key).is_some() {
            self.save_table(kind, &table)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::with_root(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn put_get_round_trip_survives_reopen() {
        let (dir, store) = store();
        store
            .put(EntityKind::Users, "u1", json!({"email": "a@example.com"}))
            .await
            .unwrap();

        let reopened = LocalStore::with_root(dir.path());
        let value = reopened.get(EntityKind::Users, "u1").await.unwrap();
        assert_eq!(value, Some(json!({"email": "a@example.com"})));
    }

    #[tokio::test]
    async fn get_missing_key_is_absent_not_error() {
        let (_dir, store) = store();
        assert_eq!(store.get(EntityKind::Chats, "nope").await.unwrap(), None);
        assert!(store.list(EntityKind::Chats).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_only_the_named_key() {
        let (_dir, store) = store();
        store
            .put(EntityKind::Memory, "u1", json!(["fact one"]))
            .await
            .unwrap();
        store
            .put(EntityKind::Memory, "u2", json!(["fact two"]))
            .await
            .unwrap();

        store.delete(EntityKind::Memory, "u1").await.unwrap();
        assert_eq!(store.get(EntityKind::Memory, "u1").await.unwrap(), None);
        assert_eq!(
            store.get(EntityKind::Memory, "u2").await.unwrap(),
            Some(json!(["fact two"]))
        );
    }

    #[tokio::test]
    async fn kinds_are_isolated_tables() {
        let (_dir, store) = store();
        store
            .put(EntityKind::Users, "k", json!("user"))
            .await
            .unwrap();
        store
            .put(EntityKind::Chats, "k", json!("chat"))
            .await
            .unwrap();
        assert_eq!(
            store.get(EntityKind::Users, "k").await.unwrap(),
            Some(json!("user"))
        );
        assert_eq!(
            store.get(EntityKind::Chats, "k").await.unwrap(),
            Some(json!("chat"))
        );
    }
}
