//! Wire payloads for the Gemini-style `streamGenerateContent` endpoint.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone)]
pub struct Part {
    pub text: String,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Serialize)]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

#[derive(Deserialize)]
pub struct Candidate {
    pub content: Option<Content>,
}

/// One generate-content chunk. The endpoint may deliver a single object,
/// or an array of these streamed incrementally.
#[derive(Deserialize)]
pub struct GenerateChunk {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl GenerateChunk {
    /// Text fragments of this chunk, in arrival order.
    pub fn text_fragments(&self) -> impl Iterator<Item = &str> {
        self.candidates
            .iter()
            .filter_map(|candidate| candidate.content.as_ref())
            .flat_map(|content| content.parts.iter())
            .map(|part| part.text.as_str())
    }
}
