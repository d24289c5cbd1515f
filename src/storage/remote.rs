//! Remote storage backed by a PostgREST-style key-value database.
//!
//! All kinds share one `kv` table with `kind`, `key`, and `value` columns.
//! Writes are independent upserts; no cross-entity transaction is assumed.
//! A failed write surfaces as [`StorageError`], never as a silent fall
//! back to the local backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{EntityKind, StorageAdapter, StorageError};
use crate::utils::url::construct_api_url;

/// Connection parameters entered on the admin configuration surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub url: String,
    pub api_key: String,
}

#[derive(Serialize)]
struct KvRow<'a> {
    kind: &'a str,
    key: &'a str,
    value: &'a Value,
}

#[derive(Deserialize)]
struct KvValue {
    value: Value,
}

pub struct RemoteStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RemoteStore {
    pub fn new(client: reqwest::Client, config: RemoteConfig) -> Self {
        Self {
            client,
            base_url: config.url,
            api_key: config.api_key,
        }
    }

    fn kv_url(&self) -> String {
        construct_api_url(&self.base_url, "rest/v1/kv")
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn check_status(
        url: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.text().await.unwrap_or_else(|_| "<no body>".to_string());
        Err(StorageError::Backend {
            url: url.to_string(),
            status: status.as_u16(),
            detail,
        })
    }
}

/// Probe the remote database before switching backends. Returns `Ok` only
/// when the REST root answers with a success status for the given key.
pub async fn test_connection(
    client: &reqwest::Client,
    config: &RemoteConfig,
) -> Result<(), StorageError> {
    let url = construct_api_url(&config.url, "rest/v1/");
    let response = client
        .get(&url)
        .header("apikey", &config.api_key)
        .header("Authorization", format!("Bearer {}", config.api_key))
        .send()
        .await
        .map_err(|source| StorageError::Http {
            url: url.clone(),
            source,
        })?;
    RemoteStore::check_status(&url, response).await?;
    debug!(url = %url, "remote storage connection test succeeded");
    Ok(())
}

#[async_trait]
impl StorageAdapter for RemoteStore {
    async fn get(&self, kind: EntityKind, key: &str) -> Result<Option<Value>, StorageError> {
        let url = self.kv_url();
        let response = self
            .authed(self.client.get(&url))
            .query(&[
                ("kind", format!("eq.{kind}")),
                ("key", format!("eq.{key}")),
                ("select", "value".to_string()),
            ])
            .send()
            .await
            .map_err(|source| StorageError::Http {
                url: url.clone(),
                source,
            })?;
        let response = Self::check_status(&url, response).await?;
        let mut rows: Vec<KvValue> =
            response
                .json()
                .await
                .map_err(|source| StorageError::Http {
                    url: url.clone(),
                    source,
                })?;
        Ok(rows.pop().map(|row| row.value))
    }

    async fn put(&self, kind: EntityKind, key: &str, value: Value) -> Result<(), StorageError> {
        let url = self.kv_url();
        let rows = [KvRow {
            kind: kind.as_str(),
            key,
            value: &value,
        }];
        let response = self
            .authed(self.client.post(&url))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&rows)
            .send()
            .await
            .map_err(|source| StorageError::Http {
                url: url.clone(),
                source,
            })?;
        Self::check_status(&url, response).await?;
        debug!(kind = %kind, key, "remote storage write");
        Ok(())
    }

    async fn list(&self, kind: EntityKind) -> Result<Vec<Value>, StorageError> {
        let url = self.kv_url();
        let response = self
            .authed(self.client.get(&url))
            .query(&[
                ("kind", format!("eq.{kind}")),
                ("select", "value".to_string()),
                ("order", "key.asc".to_string()),
            ])
            .send()
            .await
            .map_err(|source| StorageError::Http {
                url: url.clone(),
                source,
            })?;
        let response = Self::check_status(&url, response).await?;
        let rows: Vec<KvValue> = response
            .json()
            .await
            .map_err(|source| StorageError::Http {
                url: url.clone(),
                source,
            })?;
        Ok(rows.into_iter().map(|row| row.value).collect())
    }

    async fn delete(&self, kind: EntityKind, key: &str) -> Result<(), StorageError> {
        let url = self.kv_url();
        let response = self
            .authed(self.client.delete(&url))
            .query(&[
                ("kind", format!("eq.{kind}")),
                ("key", format!("eq.{key}")),
            ])
            .send()
            .await
            .map_err(|source| StorageError::Http {
                url: url.clone(),
                source,
            })?;
        Self::check_status(&url, response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_url_is_rooted_at_rest_v1() {
        let store = RemoteStore::new(
            reqwest::Client::new(),
            RemoteConfig {
                url: "https://db.example.com/".to_string(),
                api_key: "service-key".to_string(),
            },
        );
        assert_eq!(store.kv_url(), "https://db.example.com/rest/v1/kv");
    }

    #[test]
    fn backend_errors_report_status_and_detail() {
        let err = StorageError::Backend {
            url: "https://db.example.com/rest/v1/kv".to_string(),
            status: 503,
            detail: "unavailable".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("503"));
        assert!(rendered.contains("unavailable"));
    }
}
