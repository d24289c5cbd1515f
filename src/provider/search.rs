//! Google programmable search, backing the web search tool.

use tracing::debug;

use super::ProviderError;
use crate::api::search::SearchResponse;
use crate::core::models::Provider;

pub const SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// One result formatted for tool output.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

pub async fn web_search(
    client: &reqwest::Client,
    api_key: &str,
    cx: &str,
    query: &str,
) -> Result<Vec<SearchHit>, ProviderError> {
    debug!(query, "web search");
    let response = client
        .get(SEARCH_URL)
        .query(&[("key", api_key), ("cx", cx), ("q", query)])
        .send()
        .await
        .map_err(|source| ProviderError::Network {
            provider: Provider::Google,
            source,
        })?;

    let status = response.status().as_u16();
    if status == 401 || status == 403 {
        return Err(ProviderError::Auth {
            provider: Provider::Google,
            status,
        });
    }
    if !response.status().is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(ProviderError::Api {
            provider: Provider::Google,
            status,
            detail: detail.trim().chars().take(200).collect(),
        });
    }

    let decoded: SearchResponse =
        response.json().await.map_err(|err| ProviderError::Decode {
            provider: Provider::Google,
            detail: err.to_string(),
        })?;
    Ok(decoded
        .items
        .into_iter()
        .map(|item| SearchHit {
            title: item.title,
            link: item.link,
            snippet: item.snippet,
        })
        .collect())
}
