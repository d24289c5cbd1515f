//! Bracketed tool directives and the per-turn tool loop.
//!
//! Assistant output may embed `[CALCULATE: expr]`, `[WEB_SEARCH: query]`,
//! `[GENERATE_IMAGE: prompt]`, and `[UPDATE_MEMORY: fact]`. The first
//! three are executed here, each producing a tool-role message; memory
//! directives are stripped and handed to the memory store. Directives are
//! removed from the text the user sees.

pub mod calculator;

use tracing::{debug, warn};

use crate::provider::{Dispatcher, ProviderError, ProviderReply};
use crate::simulation::SIMULATED_IMAGE_MARKDOWN;

pub const MAX_TOOL_ROUNDS: usize = 4;

const CAP_NOTE: &str = "(Tool limit reached; remaining tool calls were skipped.)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Calculate(String),
    WebSearch(String),
    GenerateImage(String),
    UpdateMemory(String),
}

impl Directive {
    fn tag(&self) -> &'static str {
        match self {
            Directive::Calculate(_) => "CALCULATE",
            Directive::WebSearch(_) => "WEB_SEARCH",
            Directive::GenerateImage(_) => "GENERATE_IMAGE",
            Directive::UpdateMemory(_) => "UPDATE_MEMORY",
        }
    }
}

const TAGS: [&str; 4] = ["CALCULATE", "WEB_SEARCH", "GENERATE_IMAGE", "UPDATE_MEMORY"];

fn directive_at(text: &str, open: usize) -> Option<(Directive, usize)> {
    let rest = &text[open + 1..];
    let tag = TAGS
        .iter()
        .find(|tag| rest.starts_with(**tag) && rest[tag.len()..].starts_with(':'))?;
    let body_start = open + 1 + tag.len() + 1;
    let close = memchr::memchr(b']', text[body_start..].as_bytes())? + body_start;
    let body = text[body_start..close].trim().to_string();
    let directive = match *tag {
        "CALCULATE" => Directive::Calculate(body),
        "WEB_SEARCH" => Directive::WebSearch(body),
        "GENERATE_IMAGE" => Directive::GenerateImage(body),
        _ => Directive::UpdateMemory(body),
    };
    Some((directive, close + 1))
}

/// All directives in `text`, in order of appearance.
pub fn scan_directives(text: &str) -> Vec<Directive> {
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(offset) = memchr::memchr(b'[', text[pos..].as_bytes()) {
        let open = pos + offset;
        match directive_at(text, open) {
            Some((directive, end)) => {
                out.push(directive);
                pos = end;
            }
            None => pos = open + 1,
        }
    }
    out
}

/// `text` with every directive removed and leftover whitespace tidied.
pub fn strip_directives(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    while let Some(offset) = memchr::memchr(b'[', text[pos..].as_bytes()) {
        let open = pos + offset;
        match directive_at(text, open) {
            Some((_, end)) => {
                out.push_str(&text[pos..open]);
                pos = end;
            }
            None => {
                out.push_str(&text[pos..=open]);
                pos = open + 1;
            }
        }
    }
    out.push_str(&text[pos..]);
    collapse_blank_runs(out.trim())
}

fn collapse_blank_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0;
    for c in text.chars() {
        if c == '\n' {
            newlines += 1;
            if newlines <= 2 {
                out.push(c);
            }
        } else {
            newlines = 0;
            out.push(c);
        }
    }
    out
}

/// Loop phases, logged as the turn progresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolPhase {
    AwaitingModelOutput,
    ToolDetected,
    ToolExecuting,
    ToolResultAppended,
    Done,
}

/// What one turn's tool loop produced: the cleaned assistant reply, the
/// tool-role message bodies in execution order, and the memory facts the
/// model asked to save.
#[derive(Debug, Default)]
pub struct ToolLoopOutcome {
    pub assistant: ProviderReply,
    pub tool_messages: Vec<String>,
    pub memory_directives: Vec<String>,
    pub capped: bool,
}

pub struct ToolInvoker<'a> {
    dispatcher: &'a Dispatcher,
}

impl<'a> ToolInvoker<'a> {
    pub fn new(dispatcher: &'a Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Execute every directive in `reply`, bounded by [`MAX_TOOL_ROUNDS`].
    /// Tool failures become tool-role error notes; they never abort the
    /// turn.
    pub async fn run(&self, reply: ProviderReply) -> ToolLoopOutcome {
        let mut phase = ToolPhase::AwaitingModelOutput;
        debug!(phase = ?phase, "scanning model output");
        let directives = scan_directives(&reply.content);
        let mut content = strip_directives(&reply.content);

        let mut outcome = ToolLoopOutcome {
            assistant: ProviderReply {
                content: String::new(),
                reasoning: reply.reasoning,
            },
            ..ToolLoopOutcome::default()
        };

        let mut rounds = 0;
        for directive in directives {
            if let Directive::UpdateMemory(fact) = directive {
                outcome.memory_directives.push(fact);
                continue;
            }
            if rounds == MAX_TOOL_ROUNDS {
                warn!(limit = MAX_TOOL_ROUNDS, "tool round limit reached");
                outcome.capped = true;
                if !content.is_empty() {
                    content.push_str("\n\n");
                }
                content.push_str(CAP_NOTE);
                break;
            }
            phase = ToolPhase::ToolDetected;
            debug!(tool = directive.tag(), phase = ?phase, "tool detected");

            phase = ToolPhase::ToolExecuting;
            debug!(tool = directive.tag(), phase = ?phase, "executing tool");
            let result = self.execute(&directive).await;
            rounds += 1;

            phase = ToolPhase::ToolResultAppended;
            debug!(tool = directive.tag(), phase = ?phase, "tool result appended");
            outcome.tool_messages.push(result);
        }

        phase = ToolPhase::Done;
        debug!(rounds, phase = ?phase, "tool loop finished");
        outcome.assistant.content = content;
        outcome
    }

    async fn execute(&self, directive: &Directive) -> String {
        match directive {
            Directive::Calculate(expr) => match calculator::evaluate_display(expr) {
                Ok(result) => format!("Result: {result}"),
                Err(err) => format!("Calculator error: {err}"),
            },
            Directive::WebSearch(query) => match self.dispatcher.web_search(query).await {
                Ok(hits) if !hits.is_empty() => {
                    let mut body = format!("Results for \"{query}\":");
                    for (index, hit) in hits.iter().take(3).enumerate() {
                        body.push_str(&format!(
                            "\n{}. {} - {} ({})",
                            index + 1,
                            hit.title,
                            hit.snippet,
                            hit.link
                        ));
                    }
                    body
                }
                Ok(_) => format!("Results for \"{query}\": no matches."),
                Err(ProviderError::MissingCredentials(_)) => simulated_search(query),
                Err(err) => {
                    warn!(error = %err, "web search failed");
                    format!("Search error: {}", err.user_message())
                }
            },
            Directive::GenerateImage(prompt) => {
                match self.dispatcher.generate_image(prompt).await {
                    Ok(url) => format!("![Generated Image]({url})"),
                    Err(ProviderError::MissingCredentials(_)) => {
                        SIMULATED_IMAGE_MARKDOWN.to_string()
                    }
                    Err(err) => {
                        warn!(error = %err, "image generation failed");
                        format!("Image error: {}", err.user_message())
                    }
                }
            }
            Directive::UpdateMemory(_) => String::new(),
        }
    }
}

fn simulated_search(query: &str) -> String {
    format!(
        "Results for \"{query}\":\n1. Simulated Search Result - top match for \"{query}\" (https://example.com/search?q={query})\n2. Simulated Search Result - related coverage for \"{query}\" (https://example.com/news?q={query})"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::mem_store;

    fn invoker_fixture() -> Dispatcher {
        Dispatcher::new(reqwest::Client::new(), mem_store())
    }

    #[test]
    fn directives_are_scanned_in_order() {
        let text = "First [CALCULATE: 1 + 1] then [WEB_SEARCH: apple] and [UPDATE_MEMORY: likes apples]";
        let directives = scan_directives(text);
        assert_eq!(
            directives,
            vec![
                Directive::Calculate("1 + 1".to_string()),
                Directive::WebSearch("apple".to_string()),
                Directive::UpdateMemory("likes apples".to_string()),
            ]
        );
    }

    #[test]
    fn unknown_brackets_are_left_alone() {
        let text = "See [1] and [NOTE: keep] for details";
        assert!(scan_directives(text).is_empty());
        assert_eq!(strip_directives(text), text);
    }

    #[test]
    fn stripping_removes_directives_and_tidies_whitespace() {
        let text = "Let me work that out.\n\n[CALCULATE: 25 * 4]";
        assert_eq!(strip_directives(text), "Let me work that out.");
    }

    #[tokio::test]
    async fn calculate_round_appends_the_result() {
        let dispatcher = invoker_fixture();
        let reply = ProviderReply {
            content: "Let me work that out.\n\n[CALCULATE: 25 * 4]".to_string(),
            reasoning: None,
        };
        let outcome = ToolInvoker::new(&dispatcher).run(reply).await;
        assert_eq!(outcome.assistant.content, "Let me work that out.");
        assert_eq!(outcome.tool_messages, vec!["Result: 100".to_string()]);
        assert!(!outcome.capped);
    }

    #[tokio::test]
    async fn calculator_failures_become_tool_error_notes() {
        let dispatcher = invoker_fixture();
        let reply = ProviderReply {
            content: "[CALCULATE: 1 / 0] [CALCULATE: 2 + 2]".to_string(),
            reasoning: None,
        };
        let outcome = ToolInvoker::new(&dispatcher).run(reply).await;
        assert_eq!(outcome.tool_messages.len(), 2);
        assert!(outcome.tool_messages[0].contains("division by zero"));
        assert_eq!(outcome.tool_messages[1], "Result: 4");
    }

    #[tokio::test]
    async fn search_without_credentials_uses_simulated_results() {
        let dispatcher = invoker_fixture();
        let reply = ProviderReply {
            content: "I will search.\n\n[WEB_SEARCH: apple]".to_string(),
            reasoning: None,
        };
        let outcome = ToolInvoker::new(&dispatcher).run(reply).await;
        assert_eq!(outcome.tool_messages.len(), 1);
        assert!(outcome.tool_messages[0].contains("Simulated Search Result"));
    }

    #[tokio::test]
    async fn image_without_credentials_uses_the_placeholder() {
        let dispatcher = invoker_fixture();
        let reply = ProviderReply {
            content: "[GENERATE_IMAGE: a cat]".to_string(),
            reasoning: None,
        };
        let outcome = ToolInvoker::new(&dispatcher).run(reply).await;
        assert_eq!(outcome.tool_messages, vec![SIMULATED_IMAGE_MARKDOWN.to_string()]);
    }

    #[tokio::test]
    async fn memory_directives_are_collected_not_executed() {
        let dispatcher = invoker_fixture();
        let reply = ProviderReply {
            content: "Noted.\n\n[UPDATE_MEMORY: User's name is Alice]".to_string(),
            reasoning: None,
        };
        let outcome = ToolInvoker::new(&dispatcher).run(reply).await;
        assert!(outcome.tool_messages.is_empty());
        assert_eq!(
            outcome.memory_directives,
            vec!["User's name is Alice".to_string()]
        );
        assert_eq!(outcome.assistant.content, "Noted.");
    }

    #[tokio::test]
    async fn rounds_beyond_the_cap_are_skipped_with_a_note() {
        let dispatcher = invoker_fixture();
        let reply = ProviderReply {
            content: (0..6)
                .map(|n| format!("[CALCULATE: {n} + 1]"))
                .collect::<Vec<_>>()
                .join(" "),
            reasoning: None,
        };
        let outcome = ToolInvoker::new(&dispatcher).run(reply).await;
        assert_eq!(outcome.tool_messages.len(), MAX_TOOL_ROUNDS);
        assert!(outcome.capped);
        assert!(outcome.assistant.content.contains("Tool limit reached"));
    }
}
