use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a transcript message.
///
/// Tool results live in the transcript as their own role so that the turn
/// structure (one user message, one assistant reply, zero or more tool
/// results) stays visible after persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }

    pub fn is_assistant(self) -> bool {
        self == Role::Assistant
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "tool" => Ok(Role::Tool),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

/// A file attached to a user message. Bytes are carried inline and
/// base64-encoded at the storage boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// One transcript entry. Immutable once appended to a chat; corrections
/// append a new message instead of editing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Hidden-by-default reasoning segment, kept separate from the final
    /// reply text rather than conflated with it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            attachments: Vec::new(),
            reasoning: None,
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_reasoning(mut self, reasoning: Option<String>) -> Self {
        self.reasoning = reasoning;
        self
    }
}

/// Longest chat title derived from a first message before truncation.
const TITLE_MAX_CHARS: usize = 30;

/// A conversation owned by one user. Messages are strictly append-ordered;
/// append order is conversation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    /// `None` until derived from the first user message or set explicitly.
    pub title: Option<String>,
    pub owner_id: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn new(owner_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: None,
            owner_id: owner_id.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message, bumping `updated_at`. The title is derived from
    /// the first user message unless it was already set explicitly.
    pub fn append(&mut self, message: Message) {
        if self.title.is_none() && message.role.is_user() {
            self.title = Some(derive_title(&message.content));
        }
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
        self.updated_at = Utc::now();
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("New Chat")
    }
}

/// Derive a chat title from the first user message: the leading 30
/// characters, with an ellipsis when truncated.
pub fn derive_title(first_message: &str) -> String {
    let trimmed = first_message.trim();
    let mut title: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    if trimmed.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

/// Split a `<thinking>…</thinking>` reasoning segment from model output.
///
/// Returns the reasoning text (if any) and the remaining final text.
/// Multiple thinking blocks are concatenated in order; unterminated blocks
/// swallow the rest of the text as reasoning.
pub fn split_reasoning(raw: &str) -> (Option<String>, String) {
    const OPEN: &str = "<thinking>";
    const CLOSE: &str = "</thinking>";

    let mut reasoning = String::new();
    let mut visible = String::new();
    let mut rest = raw;

    while let Some(start) = rest.find(OPEN) {
        visible.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        match after_open.find(CLOSE) {
            Some(end) => {
                if !reasoning.is_empty() {
                    reasoning.push('\n');
                }
                reasoning.push_str(after_open[..end].trim());
                rest = &after_open[end + CLOSE.len()..];
            }
            None => {
                if !reasoning.is_empty() {
                    reasoning.push('\n');
                }
                reasoning.push_str(after_open.trim());
                rest = "";
            }
        }
    }
    visible.push_str(rest);

    let reasoning = if reasoning.is_empty() {
        None
    } else {
        Some(reasoning)
    };
    (reasoning, visible.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_round_trip_through_strings() {
        for role in [Role::User, Role::Assistant, Role::Tool] {
            assert_eq!(Role::try_from(role.as_str()).unwrap(), role);
        }
        assert!(Role::try_from("system").is_err());
    }

    #[test]
    fn append_derives_title_from_first_user_message() {
        let mut chat = Chat::new("user-1");
        assert_eq!(chat.title(), "New Chat");

        chat.append(Message::user("Plan a weekend trip to the Dolomites please"));
        assert_eq!(chat.title(), "Plan a weekend trip to the Dol...");

        chat.append(Message::user("Another message"));
        assert_eq!(chat.title(), "Plan a weekend trip to the Dol...");
    }

    #[test]
    fn explicit_title_is_not_overwritten() {
        let mut chat = Chat::new("user-1");
        chat.set_title("Trip notes");
        chat.append(Message::user("hello"));
        assert_eq!(chat.title(), "Trip notes");
    }

    #[test]
    fn short_titles_are_not_truncated() {
        assert_eq!(derive_title("hello"), "hello");
        assert_eq!(derive_title("  hello  "), "hello");
    }

    #[test]
    fn append_bumps_updated_at_and_preserves_order() {
        let mut chat = Chat::new("user-1");
        let before = chat.updated_at;
        chat.append(Message::user("one"));
        chat.append(Message::assistant("two"));
        chat.append(Message::tool("three"));
        assert!(chat.updated_at >= before);
        let contents: Vec<_> = chat.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["one", "two", "three"]);
    }

    #[test]
    fn split_reasoning_extracts_thinking_block() {
        let raw = "<thinking>plan the reply</thinking>\nHere you go.";
        let (reasoning, text) = split_reasoning(raw);
        assert_eq!(reasoning.as_deref(), Some("plan the reply"));
        assert_eq!(text, "Here you go.");
    }

    #[test]
    fn split_reasoning_handles_missing_and_unterminated_blocks() {
        let (reasoning, text) = split_reasoning("plain reply");
        assert!(reasoning.is_none());
        assert_eq!(text, "plain reply");

        let (reasoning, text) = split_reasoning("before <thinking>never closed");
        assert_eq!(reasoning.as_deref(), Some("never closed"));
        assert_eq!(text, "before");
    }

    #[test]
    fn attachment_bytes_round_trip_as_base64() {
        let attachment = Attachment {
            name: "notes.txt".to_string(),
            mime_type: "text/plain".to_string(),
            bytes: b"test content".to_vec(),
        };
        let json = serde_json::to_string(&attachment).unwrap();
        assert!(json.contains("dGVzdCBjb250ZW50"));
        let back: Attachment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, attachment);
    }
}
