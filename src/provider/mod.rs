//! Provider adapters and dispatch.
//!
//! Every turn is routed by the selected model's provider tag: OpenAI-tagged
//! models use the Chat Completions API, while Vertex- and Google-tagged
//! models both use the Gemini streaming API. The Google provider
//! additionally backs the web search and image generation tools.

pub mod gemini;
pub mod openai;
pub mod search;

use async_trait::async_trait;
use std::error::Error as StdError;
use std::fmt;
use tracing::warn;

use crate::core::message::Role;
use crate::core::models::{CustomModel, ModelKind, Provider};
use crate::storage::{CredentialRecord, Store};

/// Aux credential key holding the Google programmable search engine id.
pub const AUX_SEARCH_CX: &str = "search_cx";
/// Aux credential key overriding the default image generation model.
pub const AUX_IMAGE_MODEL: &str = "image_model";

pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";

/// One message as sent upstream. Attachments and reasoning are already
/// folded into `content` by the orchestrator.
#[derive(Debug, Clone)]
pub struct ProviderMessage {
    pub role: Role,
    pub content: String,
}

impl ProviderMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub model: CustomModel,
    pub system_prompt: Option<String>,
    pub messages: Vec<ProviderMessage>,
}

/// The assistant text for one turn, with any reasoning block already
/// separated out.
#[derive(Debug, Clone, Default)]
pub struct ProviderReply {
    pub content: String,
    pub reasoning: Option<String>,
}

#[derive(Debug)]
pub enum ProviderError {
    /// No API key is stored for the provider the selected model needs.
    MissingCredentials(Provider),
    /// The upstream rejected our key (HTTP 401 or 403).
    Auth { provider: Provider, status: u16 },
    /// Any other non-success HTTP status.
    Api {
        provider: Provider,
        status: u16,
        detail: String,
    },
    /// Transport-level failure before a status was received.
    Network {
        provider: Provider,
        source: reqwest::Error,
    },
    /// The upstream answered 2xx but the body was not understood.
    Decode { provider: Provider, detail: String },
}

impl ProviderError {
    pub fn provider(&self) -> Provider {
        match self {
            ProviderError::MissingCredentials(provider)
            | ProviderError::Auth { provider, .. }
            | ProviderError::Api { provider, .. }
            | ProviderError::Network { provider, .. }
            | ProviderError::Decode { provider, .. } => *provider,
        }
    }

    /// Status-bearing failures surface in chat as `"{provider} Error: {status}"`.
    pub fn user_message(&self) -> String {
        match self {
            ProviderError::MissingCredentials(provider) => {
                format!("{} Error: missing API key", provider.display_name())
            }
            ProviderError::Auth { provider, status }
            | ProviderError::Api {
                provider, status, ..
            } => format!("{} Error: {status}", provider.display_name()),
            ProviderError::Network { provider, .. } => {
                format!("{} Error: network failure", provider.display_name())
            }
            ProviderError::Decode { provider, .. } => {
                format!("{} Error: malformed response", provider.display_name())
            }
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::MissingCredentials(provider) => {
                write!(f, "no API key configured for {}", provider.display_name())
            }
            ProviderError::Auth { provider, status } => {
                write!(f, "{} rejected the API key ({status})", provider.display_name())
            }
            ProviderError::Api {
                provider,
                status,
                detail,
            } => write!(
                f,
                "{} request failed ({status}): {detail}",
                provider.display_name()
            ),
            ProviderError::Network { provider, source } => {
                write!(f, "{} request failed: {source}", provider.display_name())
            }
            ProviderError::Decode { provider, detail } => {
                write!(
                    f,
                    "could not decode {} response: {detail}",
                    provider.display_name()
                )
            }
        }
    }
}

impl StdError for ProviderError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ProviderError::Network { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Chat completion backend, object-safe so tests can script replies.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(&self, request: &TurnRequest) -> Result<ProviderReply, ProviderError>;
}

/// Routes turns, searches, and image requests to the concrete adapters
/// using credentials from the active store.
pub struct Dispatcher {
    client: reqwest::Client,
    store: Store,
}

impl Dispatcher {
    pub fn new(client: reqwest::Client, store: Store) -> Self {
        Self { client, store }
    }

    async fn require_credentials(
        &self,
        provider: Provider,
    ) -> Result<CredentialRecord, ProviderError> {
        self.store
            .credentials_for(provider)
            .await
            .map_err(|err| ProviderError::Decode {
                provider,
                detail: err.to_string(),
            })?
            .filter(|record| !record.api_key.is_empty())
            .ok_or(ProviderError::MissingCredentials(provider))
    }

    /// Whether a real upstream can serve this model, or the deterministic
    /// simulation has to stand in.
    pub async fn has_credentials(&self, provider: Provider) -> bool {
        self.require_credentials(provider).await.is_ok()
    }

    async fn chat_once(&self, request: &TurnRequest) -> Result<ProviderReply, ProviderError> {
        if request.model.kind == ModelKind::Image {
            let prompt = request
                .messages
                .iter()
                .rev()
                .find(|message| message.role == Role::User)
                .map(|message| message.content.as_str())
                .unwrap_or_default();
            let url = self.generate_image(prompt).await?;
            return Ok(ProviderReply {
                content: format!("![Generated Image]({url})"),
                reasoning: None,
            });
        }
        match request.model.provider {
            Provider::OpenAi => {
                let creds = self.require_credentials(Provider::OpenAi).await?;
                openai::chat(&self.client, &creds.api_key, request).await
            }
            Provider::Vertex | Provider::Google => {
                let provider = request.model.provider;
                let creds = self.require_credentials(provider).await?;
                gemini::chat(&self.client, &creds.api_key, provider, request).await
            }
        }
    }

    /// One retry on transport failures only. Status-bearing errors are
    /// final: the upstream answered, retrying will not change its mind.
    pub async fn chat(&self, request: &TurnRequest) -> Result<ProviderReply, ProviderError> {
        match self.chat_once(request).await {
            Err(ProviderError::Network { provider, source }) => {
                warn!(provider = %provider, error = %source, "transport failure, retrying once");
                self.chat_once(request).await
            }
            other => other,
        }
    }

    pub async fn web_search(
        &self,
        query: &str,
    ) -> Result<Vec<search::SearchHit>, ProviderError> {
        let creds = self.require_credentials(Provider::Google).await?;
        let cx = creds
            .aux(AUX_SEARCH_CX)
            .ok_or(ProviderError::MissingCredentials(Provider::Google))?;
        search::web_search(&self.client, &creds.api_key, cx, query).await
    }

    pub async fn generate_image(&self, prompt: &str) -> Result<String, ProviderError> {
        let creds = self.require_credentials(Provider::OpenAi).await?;
        let model = creds.aux(AUX_IMAGE_MODEL).unwrap_or(DEFAULT_IMAGE_MODEL);
        openai::generate_image(&self.client, &creds.api_key, model, prompt).await
    }
}

#[async_trait]
impl ChatProvider for Dispatcher {
    async fn chat(&self, request: &TurnRequest) -> Result<ProviderReply, ProviderError> {
        Dispatcher::chat(self, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ModelKind;
    use crate::utils::test_utils::mem_store;

    #[tokio::test]
    async fn missing_key_is_reported_before_any_request() {
        let dispatcher = Dispatcher::new(reqwest::Client::new(), mem_store());
        let request = TurnRequest {
            model: CustomModel::new("GPT", "gpt-4o-mini", Provider::OpenAi, ModelKind::Text),
            system_prompt: None,
            messages: vec![ProviderMessage::new(Role::User, "hello")],
        };
        let err = dispatcher.chat(&request).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::MissingCredentials(Provider::OpenAi)
        ));
    }

    #[test]
    fn auth_errors_render_the_original_status() {
        let err = ProviderError::Auth {
            provider: Provider::OpenAi,
            status: 401,
        };
        assert_eq!(err.user_message(), "OpenAI Error: 401");
    }

    #[test]
    fn gemini_errors_carry_the_vertex_label() {
        let err = ProviderError::Api {
            provider: Provider::Vertex,
            status: 429,
            detail: "quota".to_string(),
        };
        assert_eq!(err.user_message(), "Vertex AI Error: 429");
    }
}
