//! Gemini adapter, shared by the Vertex and Google provider tags.
//!
//! `streamGenerateContent` returns one JSON array whose elements arrive
//! incrementally. [`ChunkDecoder`] cuts complete top-level objects out of
//! the byte stream without waiting for the closing bracket, so text can be
//! aggregated as it arrives.

use futures_util::StreamExt;
use tracing::debug;

use super::{ProviderError, ProviderMessage, ProviderReply, TurnRequest};
use crate::api::gemini::{Content, GenerateChunk, GenerateRequest, Part};
use crate::core::message::{self, Role};
use crate::core::models::Provider;
use crate::utils::url::construct_api_url;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

fn wire_content(message: &ProviderMessage) -> Content {
    let (role, text) = match message.role {
        Role::User => ("user", message.content.clone()),
        Role::Assistant => ("model", message.content.clone()),
        Role::Tool => ("user", format!("[Tool result]\n{}", message.content)),
    };
    Content {
        role: Some(role.to_string()),
        parts: vec![Part { text }],
    }
}

/// Incremental splitter for a streamed JSON array of objects.
///
/// Tracks brace depth outside of strings, and string/escape state inside
/// them, so `{` and `}` embedded in response text never confuse the cut.
/// Feed arbitrary byte slices; complete objects come back as they close.
#[derive(Default)]
pub struct ChunkDecoder {
    buf: Vec<u8>,
    scan: usize,
    start: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl ChunkDecoder {
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<GenerateChunk>, serde_json::Error> {
        self.buf.extend_from_slice(data);
        let mut out = Vec::new();
        while self.scan < self.buf.len() {
            if self.depth == 0 {
                match memchr::memchr(b'{', &self.buf[self.scan..]) {
                    Some(offset) => {
                        self.start = self.scan + offset;
                        self.scan = self.start + 1;
                        self.depth = 1;
                    }
                    None => {
                        self.scan = self.buf.len();
                    }
                }
                continue;
            }
            let byte = self.buf[self.scan];
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
            } else {
                match byte {
                    b'"' => self.in_string = true,
                    b'{' => self.depth += 1,
                    b'}' => {
                        self.depth -= 1;
                        if self.depth == 0 {
                            out.push(serde_json::from_slice(
                                &self.buf[self.start..=self.scan],
                            )?);
                        }
                    }
                    _ => {}
                }
            }
            self.scan += 1;
        }
        if self.depth == 0 {
            self.buf.clear();
            self.scan = 0;
            self.start = 0;
        } else if self.start > 0 {
            self.buf.drain(..self.start);
            self.scan -= self.start;
            self.start = 0;
        }
        Ok(out)
    }
}

pub async fn chat(
    client: &reqwest::Client,
    api_key: &str,
    provider: Provider,
    request: &TurnRequest,
) -> Result<ProviderReply, ProviderError> {
    let body = GenerateRequest {
        contents: request.messages.iter().map(wire_content).collect(),
        system_instruction: request.system_prompt.as_ref().map(|prompt| Content {
            role: None,
            parts: vec![Part {
                text: prompt.clone(),
            }],
        }),
    };
    let url = construct_api_url(
        GEMINI_BASE_URL,
        &format!(
            "v1beta/models/{}:streamGenerateContent",
            request.model.model_id
        ),
    );
    debug!(model = %request.model.model_id, provider = %provider, "gemini stream request");

    let response = client
        .post(&url)
        .query(&[("key", api_key)])
        .json(&body)
        .send()
        .await
        .map_err(|source| ProviderError::Network { provider, source })?;

    let status = response.status().as_u16();
    if status == 401 || status == 403 {
        return Err(ProviderError::Auth { provider, status });
    }
    if !response.status().is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(ProviderError::Api {
            provider,
            status,
            detail: detail.trim().chars().take(200).collect(),
        });
    }

    let mut decoder = ChunkDecoder::default();
    let mut text = String::new();
    let mut stream = response.bytes_stream();
    while let Some(bytes) = stream.next().await {
        let bytes = bytes.map_err(|source| ProviderError::Network { provider, source })?;
        let chunks = decoder.push(&bytes).map_err(|err| ProviderError::Decode {
            provider,
            detail: err.to_string(),
        })?;
        for chunk in chunks {
            for fragment in chunk.text_fragments() {
                text.push_str(fragment);
            }
        }
    }

    if text.is_empty() {
        return Err(ProviderError::Decode {
            provider,
            detail: "stream carried no candidate text".to_string(),
        });
    }
    let (reasoning, content) = message::split_reasoning(&text);
    Ok(ProviderReply { content, reasoning })
}
