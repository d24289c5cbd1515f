//! Durable key-value persistence behind one adapter interface.
//!
//! Two interchangeable backends exist: [`local::LocalStore`] (JSON files
//! under the platform data dir) and [`remote::RemoteStore`] (a REST
//! key-value database). The backend is chosen once at startup from
//! [`crate::core::config::Config`]; everything above [`Store`] is
//! backend-agnostic and never branches on which one is active.

use async_trait::async_trait;
use serde_json::Value;
use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

pub mod local;
pub mod remote;
mod store;

pub use store::{CredentialRecord, Store};

/// Logical tables the adapters persist. Keys within a kind are unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Users,
    Chats,
    Models,
    Credentials,
    Memory,
    Settings,
    Session,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Users => "users",
            EntityKind::Chats => "chats",
            EntityKind::Models => "models",
            EntityKind::Credentials => "credentials",
            EntityKind::Memory => "memory",
            EntityKind::Settings => "settings",
            EntityKind::Session => "session",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Storage failures are always surfaced to the caller. A failed write is
/// never silently dropped, and the engine never falls back to the other
/// backend on its own.
#[derive(Debug)]
pub enum StorageError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Http {
        url: String,
        source: reqwest::Error,
    },
    Backend {
        url: String,
        status: u16,
        detail: String,
    },
    Encode {
        source: serde_json::Error,
    },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io { path, source } => {
                write!(f, "storage I/O error at {}: {}", path.display(), source)
            }
            StorageError::Http { url, source } => {
                write!(f, "storage request to {url} failed: {source}")
            }
            StorageError::Backend {
                url,
                status,
                detail,
            } => {
                write!(f, "storage backend at {url} returned {status}: {detail}")
            }
            StorageError::Encode { source } => write!(f, "storage encoding error: {source}"),
        }
    }
}

impl StdError for StorageError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            StorageError::Io { source, .. } => Some(source),
            StorageError::Http { source, .. } => Some(source),
            StorageError::Backend { .. } => None,
            StorageError::Encode { source } => Some(source),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(source: serde_json::Error) -> Self {
        StorageError::Encode { source }
    }
}

/// The persistence contract. Values are JSON documents; typed access goes
/// through [`Store`].
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn get(&self, kind: EntityKind, key: &str) -> Result<Option<Value>, StorageError>;
    async fn put(&self, kind: EntityKind, key: &str, value: Value) -> Result<(), StorageError>;
    async fn list(&self, kind: EntityKind) -> Result<Vec<Value>, StorageError>;
    async fn delete(&self, kind: EntityKind, key: &str) -> Result<(), StorageError>;
}
