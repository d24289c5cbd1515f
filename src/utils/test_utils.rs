//! Shared fixtures: an in-memory storage adapter and a scripted chat
//! provider, so storage and orchestration tests run without disk or
//! network.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::core::message;
use crate::provider::{ChatProvider, ProviderError, ProviderReply, TurnRequest};
use crate::storage::{EntityKind, StorageAdapter, StorageError, Store};

#[derive(Default)]
pub struct MemStore {
    tables: Mutex<HashMap<(EntityKind, String), Value>>,
}

#[async_trait]
impl StorageAdapter for MemStore {
    async fn get(&self, kind: EntityKind, key: &str) -> Result<Option<Value>, StorageError> {
        let tables = self.tables.lock().await;
        Ok(tables.get(&(kind, key.to_string())).cloned())
    }

    async fn put(&self, kind: EntityKind, key: &str, value: Value) -> Result<(), StorageError> {
        let mut tables = self.tables.lock().await;
        tables.insert((kind, key.to_string()), value);
        Ok(())
    }

    async fn list(&self, kind: EntityKind) -> Result<Vec<Value>, StorageError> {
        let tables = self.tables.lock().await;
        let mut entries: Vec<(&String, &Value)> = tables
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|((_, key), value)| (key, value))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        Ok(entries.into_iter().map(|(_, value)| value.clone()).collect())
    }

    async fn delete(&self, kind: EntityKind, key: &str) -> Result<(), StorageError> {
        let mut tables = self.tables.lock().await;
        tables.remove(&(kind, key.to_string()));
        Ok(())
    }
}

pub fn mem_store() -> Store {
    Store::new(Arc::new(MemStore::default()))
}

/// Chat provider with a queue of canned results. An exhausted queue
/// answers with a fixed reply so extra turns do not panic.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ProviderReply, ProviderError>>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ProviderReply, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            delay: None,
        }
    }

    /// One canned reply from raw model text. Reasoning blocks are split
    /// out the way the real providers do before returning.
    pub fn replying(raw: &str) -> Self {
        let (reasoning, content) = message::split_reasoning(raw);
        Self::new(vec![Ok(ProviderReply { content, reasoning })])
    }

    pub fn erroring(error: ProviderError) -> Self {
        Self::new(vec![Err(error)])
    }

    pub fn delayed(script: Vec<Result<ProviderReply, ProviderError>>, delay: Duration) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            delay: Some(delay),
        }
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn chat(&self, _request: &TurnRequest) -> Result<ProviderReply, ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script.lock().await.pop_front().unwrap_or_else(|| {
            Ok(ProviderReply {
                content: "scripted reply".to_string(),
                reasoning: None,
            })
        })
    }
}
