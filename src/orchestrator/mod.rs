//! Turn orchestration: one user message in, exactly one assistant (or
//! error) message out, with tool-role messages in between.
//!
//! Turns for the same chat are serialized; a cancelled or superseded turn
//! is discarded before anything past the user message reaches the
//! transcript. The user message itself is appended and persisted before
//! any network activity, so it survives provider failures.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::auth::Session;
use crate::core::message::{Attachment, Chat, Message};
use crate::core::models::CustomModel;
use crate::memory::{self, MemoryStore};
use crate::provider::{
    ChatProvider, Dispatcher, ProviderMessage, ProviderReply, TurnRequest,
};
use crate::simulation;
use crate::storage::{StorageError, Store};
use crate::tools::{ToolInvoker, ToolLoopOutcome};

#[derive(Debug)]
pub enum TurnError {
    ChatNotFound(String),
    Storage(StorageError),
}

impl fmt::Display for TurnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnError::ChatNotFound(id) => write!(f, "no such chat: {id}"),
            TurnError::Storage(err) => write!(f, "storage error: {err}"),
        }
    }
}

impl StdError for TurnError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            TurnError::Storage(err) => Some(err),
            TurnError::ChatNotFound(_) => None,
        }
    }
}

impl From<StorageError> for TurnError {
    fn from(err: StorageError) -> Self {
        TurnError::Storage(err)
    }
}

#[derive(Debug)]
pub enum TurnOutcome {
    Completed {
        chat: Chat,
        assistant: Message,
        simulated: bool,
    },
    /// The turn was cancelled or superseded; nothing past the user
    /// message was appended.
    Discarded,
}

/// Serialization state for one chat: the turn lock, a generation counter
/// bumped by `cancel_chat`, and the in-flight cancellation token.
#[derive(Default)]
struct TurnGate {
    lock: Mutex<()>,
    generation: AtomicU64,
    cancel: Mutex<CancellationToken>,
}

pub struct ChatOrchestrator {
    store: Store,
    memory: MemoryStore,
    dispatcher: Dispatcher,
    /// Chat backend override; `None` routes through the dispatcher with
    /// the simulation fallback.
    provider: Option<Arc<dyn ChatProvider>>,
    gates: Mutex<HashMap<String, Arc<TurnGate>>>,
}

impl ChatOrchestrator {
    pub fn new(store: Store, dispatcher: Dispatcher) -> Self {
        Self {
            memory: MemoryStore::new(store.clone()),
            store,
            dispatcher,
            provider: None,
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_provider(
        store: Store,
        dispatcher: Dispatcher,
        provider: Arc<dyn ChatProvider>,
    ) -> Self {
        Self {
            provider: Some(provider),
            ..Self::new(store, dispatcher)
        }
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    async fn gate(&self, chat_id: &str) -> Arc<TurnGate> {
        let mut gates = self.gates.lock().await;
        Arc::clone(
            gates
                .entry(chat_id.to_string())
                .or_insert_with(|| Arc::new(TurnGate::default())),
        )
    }

    /// Abort the in-flight turn of a chat, if any. The turn's result is
    /// discarded even when the provider call has already finished.
    pub async fn cancel_chat(&self, chat_id: &str) {
        let gate = self.gates.lock().await.get(chat_id).cloned();
        if let Some(gate) = gate {
            gate.generation.fetch_add(1, Ordering::SeqCst);
            gate.cancel.lock().await.cancel();
            debug!(chat_id, "cancelled in-flight turn");
        }
    }

    pub async fn send_message(
        &self,
        session: &Session,
        chat_id: Option<&str>,
        model: &CustomModel,
        text: &str,
        attachments: Vec<Attachment>,
    ) -> Result<TurnOutcome, TurnError> {
        // A fresh chat gets its id here, before anyone else can race on
        // it, so the gate is taken up front either way. Existing chats
        // are loaded only inside the critical section: a snapshot taken
        // while another turn is in flight would overwrite its appends.
        let mut fresh = None;
        let gate_key = match chat_id {
            Some(id) => id.to_string(),
            None => {
                let chat = Chat::new(&session.user_id);
                let id = chat.id.clone();
                fresh = Some(chat);
                id
            }
        };

        let gate = self.gate(&gate_key).await;
        let _turn = gate.lock.lock().await;
        let generation = gate.generation.load(Ordering::SeqCst);
        let cancel = CancellationToken::new();
        *gate.cancel.lock().await = cancel.clone();

        let mut chat = match fresh {
            Some(chat) => chat,
            None => self
                .store
                .get_chat(&gate_key)
                .await?
                .ok_or(TurnError::ChatNotFound(gate_key))?,
        };

        // The user message lands before any network activity.
        chat.append(Message::user(text).with_attachments(attachments));
        self.store.save_chat(&chat).await?;

        let request = self.build_request(session, &chat, model).await?;

        let (reply, simulated) = match self.obtain_reply(&request, &cancel).await {
            Some(pair) => pair,
            None => {
                debug!(chat_id = %chat.id, "turn cancelled mid-flight");
                return Ok(TurnOutcome::Discarded);
            }
        };

        let outcome = match reply {
            Ok(reply) => ToolInvoker::new(&self.dispatcher).run(reply).await,
            Err(user_message) => ToolLoopOutcome {
                assistant: ProviderReply {
                    content: user_message,
                    reasoning: None,
                },
                ..ToolLoopOutcome::default()
            },
        };

        if gate.generation.load(Ordering::SeqCst) != generation {
            debug!(chat_id = %chat.id, "discarding superseded turn");
            return Ok(TurnOutcome::Discarded);
        }

        let mut facts = memory::extract([text]);
        for fact in outcome.memory_directives {
            if !facts.contains(&fact) {
                facts.push(fact);
            }
        }
        self.memory.append(&session.user_id, &facts).await?;

        for body in outcome.tool_messages {
            chat.append(Message::tool(body));
        }
        let assistant = Message::assistant(outcome.assistant.content)
            .with_reasoning(outcome.assistant.reasoning);
        chat.append(assistant.clone());
        self.store.save_chat(&chat).await?;

        Ok(TurnOutcome::Completed {
            chat,
            assistant,
            simulated,
        })
    }

    async fn build_request(
        &self,
        session: &Session,
        chat: &Chat,
        model: &CustomModel,
    ) -> Result<TurnRequest, TurnError> {
        let mut system_parts = Vec::new();
        if let Some(prompt) = self.store.system_prompt().await? {
            system_parts.push(prompt);
        }
        if let Some(block) = self.memory.context_block(&session.user_id).await? {
            system_parts.push(block);
        }
        let system_prompt = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        let messages = chat
            .messages
            .iter()
            .map(|message| {
                let mut content = message.content.clone();
                if !message.attachments.is_empty() {
                    let names: Vec<&str> = message
                        .attachments
                        .iter()
                        .map(|attachment| attachment.name.as_str())
                        .collect();
                    content.push_str(&format!(
                        "\n\n[Attached {} file(s): {}]",
                        names.len(),
                        names.join(", ")
                    ));
                }
                ProviderMessage::new(message.role, content)
            })
            .collect();

        Ok(TurnRequest {
            model: model.clone(),
            system_prompt,
            messages,
        })
    }

    /// The assistant reply for a turn: a scripted/real provider reply, the
    /// deterministic simulation when no credentials exist, or the error
    /// text to surface. `None` means the turn was cancelled.
    async fn obtain_reply(
        &self,
        request: &TurnRequest,
        cancel: &CancellationToken,
    ) -> Option<(Result<ProviderReply, String>, bool)> {
        if self.provider.is_none()
            && !self.dispatcher.has_credentials(request.model.provider).await
        {
            debug!(model = %request.model.model_id, "no credentials, simulating reply");
            return Some((Ok(simulation::simulate(request)), true));
        }

        let chat_call = async {
            match &self.provider {
                Some(provider) => provider.chat(request).await,
                None => self.dispatcher.chat(request).await,
            }
        };
        tokio::select! {
            _ = cancel.cancelled() => None,
            result = chat_call => match result {
                Ok(reply) => Some((Ok(reply), false)),
                Err(err) => {
                    warn!(error = %err, "provider call failed");
                    Some((Err(err.user_message()), false))
                }
            },
        }
    }
}
