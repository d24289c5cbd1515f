//! Deterministic fallback replies for models without credentials.
//!
//! Pure functions, no I/O, no randomness: the same request always produces
//! the same reply, which is what the demo flows and the orchestrator tests
//! rely on. Replies embed the same bracketed tool directives a real model
//! would emit, so the tool loop downstream behaves identically.

use crate::core::message::{self, Role};
use crate::core::models::ModelKind;
use crate::provider::{ProviderReply, TurnRequest};

pub const SIMULATED_IMAGE_MARKDOWN: &str =
    "![Simulated Image - Nano Banano Pro](https://placehold.co/600x400/1A1A1A/FFF?text=Simulated+Google+Image)";

/// Produce the simulated assistant reply for one turn. Trigger order is
/// fixed; the first matching rule wins.
pub fn simulate(request: &TurnRequest) -> ProviderReply {
    let text = request
        .messages
        .iter()
        .rev()
        .find(|message| message.role == Role::User)
        .map(|message| message.content.as_str())
        .unwrap_or_default();

    let raw = reply_text(request, text);
    let (reasoning, content) = message::split_reasoning(&raw);
    ProviderReply { content, reasoning }
}

fn reply_text(request: &TurnRequest, text: &str) -> String {
    if let Some(expr) = arithmetic_expression(text) {
        return format!("Let me work that out.\n\n[CALCULATE: {expr}]");
    }
    if let Some(name) = stated_name(text) {
        return format!(
            "Nice to meet you, {name}!\n\n[UPDATE_MEMORY: User's name is {name}]"
        );
    }
    if let Some(query) = search_query(text) {
        return format!("I will search.\n\n[WEB_SEARCH: {query}]");
    }
    if request.model.kind == ModelKind::Image || contains_ignore_case(text, "draw ") {
        return SIMULATED_IMAGE_MARKDOWN.to_string();
    }
    format!(
        "<thinking>\nI see the user wants to chat.\nUser said: \"{text}\"\nI am running in simulation mode because no API key is configured.\nI should check if the user is asking for a specific task.\n</thinking>\n\n[Simulated {name} Response]\n\nI received your message: \"{text}\".",
        name = request.model.display_name,
    )
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    find_ignore_case(haystack, needle).is_some()
}

// ASCII-only fold so byte offsets stay valid in the original string.
fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

/// An arithmetic expression worth delegating to the calculator: either the
/// tail of a "calculate ..." request, or a bare `a op b` form.
fn arithmetic_expression(text: &str) -> Option<String> {
    if let Some(at) = find_ignore_case(text, "calculate") {
        let tail = text[at + "calculate".len()..]
            .trim_start_matches([':', ' '])
            .trim_end_matches(['.', '!', '?'])
            .trim();
        if tail.chars().any(|c| c.is_ascii_digit()) {
            return Some(tail.to_string());
        }
        return None;
    }
    bare_expression(text)
}

fn bare_expression(text: &str) -> Option<String> {
    let start = text.find(|c: char| c.is_ascii_digit() || c == '(')?;
    let run: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || "+-*/(). ".contains(*c))
        .collect();
    let run = run.trim().trim_end_matches('.').trim();
    let digits = run.chars().filter(char::is_ascii_digit).count();
    let operators = run.chars().filter(|c| "+-*/".contains(*c)).count();
    if digits >= 2 && operators >= 1 {
        Some(run.to_string())
    } else {
        None
    }
}

pub(crate) fn stated_name(text: &str) -> Option<String> {
    let at = find_ignore_case(text, "my name is ")?;
    let tail = &text[at + "my name is ".len()..];
    let name = tail
        .split(['.', '!', '?', ',', '\n'])
        .next()
        .unwrap_or("")
        .trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn search_query(text: &str) -> Option<String> {
    let at = find_ignore_case(text, "search")?;
    let tail = text[at + "search".len()..]
        .trim_start_matches(|c: char| c.is_whitespace())
        .trim_start_matches("for ")
        .trim_end_matches(['.', '!', '?'])
        .trim();
    if tail.is_empty() {
        Some(text.trim().to_string())
    } else {
        Some(tail.to_string())
    }
}
