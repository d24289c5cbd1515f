//! OpenAI adapter: chat completions and image generation.

use tracing::debug;

use super::{ProviderError, ProviderMessage, ProviderReply, TurnRequest};
use crate::api::{ChatMessage, ChatRequest, ChatResponse, ImageRequest, ImageResponse};
use crate::core::message::{self, Role};
use crate::core::models::Provider;
use crate::utils::url::construct_api_url;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

fn wire_message(message: &ProviderMessage) -> ChatMessage {
    match message.role {
        Role::User => ChatMessage {
            role: "user".to_string(),
            content: message.content.clone(),
        },
        Role::Assistant => ChatMessage {
            role: "assistant".to_string(),
            content: message.content.clone(),
        },
        // Tool results go back upstream as user turns so the follow-up
        // completion can incorporate them without tool-call plumbing.
        Role::Tool => ChatMessage {
            role: "user".to_string(),
            content: format!("[Tool result]\n{}", message.content),
        },
    }
}

async fn check_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let code = status.as_u16();
    let detail = response.text().await.unwrap_or_default();
    if code == 401 || code == 403 {
        return Err(ProviderError::Auth {
            provider: Provider::OpenAi,
            status: code,
        });
    }
    Err(ProviderError::Api {
        provider: Provider::OpenAi,
        status: code,
        detail: truncate_detail(&detail),
    })
}

fn truncate_detail(detail: &str) -> String {
    let trimmed = detail.trim();
    if trimmed.len() > 200 {
        let mut end = 200;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &trimmed[..end])
    } else {
        trimmed.to_string()
    }
}

pub async fn chat(
    client: &reqwest::Client,
    api_key: &str,
    request: &TurnRequest,
) -> Result<ProviderReply, ProviderError> {
    let mut messages: Vec<ChatMessage> = Vec::with_capacity(request.messages.len() + 1);
    if let Some(prompt) = &request.system_prompt {
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: prompt.clone(),
        });
    }
    messages.extend(request.messages.iter().map(wire_message));

    let body = ChatRequest {
        model: request.model.model_id.clone(),
        messages,
    };
    let url = construct_api_url(OPENAI_BASE_URL, "chat/completions");
    debug!(model = %body.model, messages = body.messages.len(), "openai chat request");

    let response = client
        .post(&url)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await
        .map_err(|source| ProviderError::Network {
            provider: Provider::OpenAi,
            source,
        })?;
    let response = check_response(response).await?;

    let decoded: ChatResponse = response.json().await.map_err(|err| ProviderError::Decode {
        provider: Provider::OpenAi,
        detail: err.to_string(),
    })?;
    let raw = decoded
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ProviderError::Decode {
            provider: Provider::OpenAi,
            detail: "response carried no choices".to_string(),
        })?;

    let (reasoning, content) = message::split_reasoning(&raw);
    Ok(ProviderReply { content, reasoning })
}

/// Generate one image and return its URL.
pub async fn generate_image(
    client: &reqwest::Client,
    api_key: &str,
    model: &str,
    prompt: &str,
) -> Result<String, ProviderError> {
    let body = ImageRequest {
        model: model.to_string(),
        prompt: prompt.to_string(),
        n: 1,
        size: "1024x1024".to_string(),
    };
    let url = construct_api_url(OPENAI_BASE_URL, "images/generations");
    debug!(model = %body.model, "openai image request");

    let response = client
        .post(&url)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await
        .map_err(|source| ProviderError::Network {
            provider: Provider::OpenAi,
            source,
        })?;
    let response = check_response(response).await?;

    let decoded: ImageResponse = response.json().await.map_err(|err| ProviderError::Decode {
        provider: Provider::OpenAi,
        detail: err.to_string(),
    })?;
    decoded
        .data
        .into_iter()
        .next()
        .and_then(|image| image.url)
        .ok_or_else(|| ProviderError::Decode {
            provider: Provider::OpenAi,
            detail: "image response carried no data".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_results_are_sent_as_user_turns() {
        let wired = wire_message(&ProviderMessage::new(Role::Tool, "Result: 100"));
        assert_eq!(wired.role, "user");
        assert!(wired.content.contains("Result: 100"));
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let detail = truncate_detail(&"x".repeat(500));
        assert!(detail.len() <= 203);
        assert!(detail.ends_with("..."));
    }
}
