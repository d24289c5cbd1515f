use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::{EntityKind, StorageAdapter, StorageError};
use crate::auth::{Session, User, UserRole};
use crate::core::message::Chat;
use crate::core::models::{self, CustomModel, Provider};

const ACTIVE_SESSION_KEY: &str = "active";
const SYSTEM_PROMPT_KEY: &str = "system_prompt";

/// Per-provider credential record owned by the active storage backend.
/// `aux` carries provider-specific extras such as the search engine id
/// (`search_cx`) or the image model id (`image_model`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub api_key: String,
    #[serde(default)]
    pub aux: HashMap<String, String>,
}

impl CredentialRecord {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            aux: HashMap::new(),
        }
    }

    pub fn with_aux(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.aux.insert(key.into(), value.into());
        self
    }

    pub fn aux(&self, key: &str) -> Option<&str> {
        self.aux.get(key).map(String::as_str)
    }
}

/// Typed facade over the active [`StorageAdapter`]. Everything above this
/// type works with domain structs; only this module touches raw JSON rows.
#[derive(Clone)]
pub struct Store {
    adapter: Arc<dyn StorageAdapter>,
}

impl Store {
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self { adapter }
    }

    // --- users ---

    pub async fn put_user(&self, user: &User) -> Result<(), StorageError> {
        self.adapter
            .put(EntityKind::Users, &user.id, serde_json::to_value(user)?)
            .await
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        Ok(self
            .list_users()
            .await?
            .into_iter()
            .find(|user| user.email.eq_ignore_ascii_case(email)))
    }

    pub async fn list_users(&self) -> Result<Vec<User>, StorageError> {
        decode_list(self.adapter.list(EntityKind::Users).await?)
    }

    pub async fn delete_user(&self, id: &str) -> Result<(), StorageError> {
        self.adapter.delete(EntityKind::Users, id).await
    }

    /// Create the built-in admin account when the user table is empty, so
    /// a fresh installation is usable without manual setup.
    pub async fn ensure_seed_admin(&self) -> Result<Option<User>, StorageError> {
        if !self.list_users().await?.is_empty() {
            return Ok(None);
        }
        let admin = User::new("admin@example.com", "password", "Admin User", UserRole::Admin);
        self.put_user(&admin).await?;
        debug!(email = %admin.email, "seeded admin user");
        Ok(Some(admin))
    }

    // --- chats ---

    pub async fn save_chat(&self, chat: &Chat) -> Result<(), StorageError> {
        self.adapter
            .put(EntityKind::Chats, &chat.id, serde_json::to_value(chat)?)
            .await
    }

    pub async fn get_chat(&self, id: &str) -> Result<Option<Chat>, StorageError> {
        decode_opt(self.adapter.get(EntityKind::Chats, id).await?)
    }

    /// Chats owned by a user, most recently updated first.
    pub async fn list_chats(&self, owner_id: &str) -> Result<Vec<Chat>, StorageError> {
        let mut chats: Vec<Chat> = decode_list(self.adapter.list(EntityKind::Chats).await?)?
            .into_iter()
            .filter(|chat: &Chat| chat.owner_id == owner_id)
            .collect();
        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(chats)
    }

    pub async fn delete_chat(&self, id: &str) -> Result<(), StorageError> {
        self.adapter.delete(EntityKind::Chats, id).await
    }

    // --- custom models ---

    pub async fn save_custom_model(&self, model: &CustomModel) -> Result<(), StorageError> {
        self.adapter
            .put(
                EntityKind::Models,
                &model.uuid.to_string(),
                serde_json::to_value(model)?,
            )
            .await
    }

    pub async fn list_custom_models(&self) -> Result<Vec<CustomModel>, StorageError> {
        decode_list(self.adapter.list(EntityKind::Models).await?)
    }

    pub async fn delete_custom_model(&self, uuid: Uuid) -> Result<(), StorageError> {
        self.adapter
            .delete(EntityKind::Models, &uuid.to_string())
            .await
    }

    /// Models offered for selection: the configured custom list, or the
    /// built-in defaults only when nothing is configured.
    pub async fn selectable_models(&self) -> Result<Vec<CustomModel>, StorageError> {
        Ok(models::selectable_models(&self.list_custom_models().await?))
    }

    // --- credentials ---

    pub async fn credentials_for(
        &self,
        provider: Provider,
    ) -> Result<Option<CredentialRecord>, StorageError> {
        decode_opt(
            self.adapter
                .get(EntityKind::Credentials, provider.tag())
                .await?,
        )
    }

    pub async fn set_credentials(
        &self,
        provider: Provider,
        record: &CredentialRecord,
    ) -> Result<(), StorageError> {
        self.adapter
            .put(
                EntityKind::Credentials,
                provider.tag(),
                serde_json::to_value(record)?,
            )
            .await
    }

    pub async fn clear_credentials(&self, provider: Provider) -> Result<(), StorageError> {
        self.adapter
            .delete(EntityKind::Credentials, provider.tag())
            .await
    }

    // --- settings ---

    pub async fn system_prompt(&self) -> Result<Option<String>, StorageError> {
        decode_opt(
            self.adapter
                .get(EntityKind::Settings, SYSTEM_PROMPT_KEY)
                .await?,
        )
    }

    pub async fn set_system_prompt(&self, prompt: &str) -> Result<(), StorageError> {
        self.adapter
            .put(
                EntityKind::Settings,
                SYSTEM_PROMPT_KEY,
                Value::String(prompt.to_string()),
            )
            .await
    }

    // --- per-user memory (raw list access; see `crate::memory`) ---

    pub async fn memory_list(&self, user_id: &str) -> Result<Vec<String>, StorageError> {
        Ok(decode_opt(self.adapter.get(EntityKind::Memory, user_id).await?)?.unwrap_or_default())
    }

    pub async fn set_memory_list(
        &self,
        user_id: &str,
        facts: &[String],
    ) -> Result<(), StorageError> {
        self.adapter
            .put(EntityKind::Memory, user_id, serde_json::to_value(facts)?)
            .await
    }

    pub async fn delete_memory(&self, user_id: &str) -> Result<(), StorageError> {
        self.adapter.delete(EntityKind::Memory, user_id).await
    }

    // --- active session record ---

    pub async fn set_active_session(&self, session: &Session) -> Result<(), StorageError> {
        self.adapter
            .put(
                EntityKind::Session,
                ACTIVE_SESSION_KEY,
                serde_json::to_value(session)?,
            )
            .await
    }

    pub async fn active_session(&self) -> Result<Option<Session>, StorageError> {
        decode_opt(
            self.adapter
                .get(EntityKind::Session, ACTIVE_SESSION_KEY)
                .await?,
        )
    }

    pub async fn clear_active_session(&self) -> Result<(), StorageError> {
        self.adapter
            .delete(EntityKind::Session, ACTIVE_SESSION_KEY)
            .await
    }
}

fn decode_opt<T: serde::de::DeserializeOwned>(
    value: Option<Value>,
) -> Result<Option<T>, StorageError> {
    value
        .map(|value| serde_json::from_value(value).map_err(StorageError::from))
        .transpose()
}

fn decode_list<T: serde::de::DeserializeOwned>(values: Vec<Value>) -> Result<Vec<T>, StorageError> {
    values
        .into_iter()
        .map(|value| serde_json::from_value(value).map_err(StorageError::from))
        .collect()
}
