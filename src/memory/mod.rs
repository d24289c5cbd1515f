//! Per-user long-term memory.
//!
//! Facts are plain strings. Extraction is pure and pattern-based; the
//! store dedups by exact string on append, so replaying a turn never
//! duplicates what is already known. Clearing is explicit and
//! irreversible.

use tracing::debug;

use crate::simulation::stated_name;
use crate::storage::{StorageError, Store};
use crate::tools::{scan_directives, Directive};

/// Facts stated in one turn's texts: every `[UPDATE_MEMORY: fact]`
/// directive, plus the "my name is X" rule applied to user text.
pub fn extract<'a>(texts: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut facts: Vec<String> = Vec::new();
    let mut push = |fact: String| {
        if !fact.is_empty() && !facts.contains(&fact) {
            facts.push(fact);
        }
    };
    for text in texts {
        for directive in scan_directives(text) {
            if let Directive::UpdateMemory(fact) = directive {
                push(fact);
            }
        }
        if let Some(name) = stated_name(text) {
            push(format!("User's name is {name}"));
        }
    }
    facts
}

#[derive(Clone)]
pub struct MemoryStore {
    store: Store,
}

impl MemoryStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Append facts for a user, skipping exact duplicates. Returns how
    /// many were actually added.
    pub async fn append(&self, user_id: &str, facts: &[String]) -> Result<usize, StorageError> {
        if facts.is_empty() {
            return Ok(0);
        }
        let mut known = self.store.memory_list(user_id).await?;
        let before = known.len();
        for fact in facts {
            if !known.contains(fact) {
                known.push(fact.clone());
            }
        }
        let added = known.len() - before;
        if added > 0 {
            self.store.set_memory_list(user_id, &known).await?;
            debug!(user_id, added, "memory facts appended");
        }
        Ok(added)
    }

    pub async fn read(&self, user_id: &str) -> Result<Vec<String>, StorageError> {
        self.store.memory_list(user_id).await
    }

    pub async fn clear(&self, user_id: &str) -> Result<(), StorageError> {
        self.store.delete_memory(user_id).await
    }

    /// Memory rendered for the system context of the next model call, or
    /// `None` when nothing is known yet.
    pub async fn context_block(&self, user_id: &str) -> Result<Option<String>, StorageError> {
        let facts = self.read(user_id).await?;
        if facts.is_empty() {
            return Ok(None);
        }
        let mut block = String::from("Known facts about the user:");
        for fact in &facts {
            block.push_str("\n- ");
            block.push_str(fact);
        }
        Ok(Some(block))
    }
}
