//! Teaching correlation.
//!
//! Tracks the "teach me" prompts nemu has sent and every other message it
//! authored, so that a later reply can be recognised as a lesson (reply to a
//! pending prompt) or at least as addressed to nemu (reply to any of its
//! messages). Both structures are bounded FIFO caches: under pressure the
//! oldest entries are dropped and the same question is simply asked again.

mod bounded;

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CorrelatorConfig;
use crate::types::{Author, MessageId, Scope};
use bounded::BoundedFifo;

/// An outstanding "teach me" prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTeachingPrompt {
    /// Id of the prompt message nemu sent.
    pub prompt_message_id: MessageId,
    /// Scope the unanswered query belonged to.
    pub scope: Scope,
    /// The original query text, not normalized.
    pub query: String,
}

/// A reply that answered a pending prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeachingLesson {
    pub scope: Scope,
    /// The query the lesson answers.
    pub query: String,
    /// The taught response.
    pub text: String,
    pub author: Author,
}

struct CorrelatorState {
    pending: BoundedFifo<MessageId, PendingTeachingPrompt>,
    system: BoundedFifo<MessageId, ()>,
}

/// Bounded, shared record of prompts awaiting a lesson and of nemu's own messages.
pub struct TeachingCorrelator {
    state: Mutex<CorrelatorState>,
}

impl TeachingCorrelator {
    pub fn new(config: &CorrelatorConfig) -> Self {
        Self::with_capacity(config.pending_capacity, config.system_capacity)
    }

    pub fn with_capacity(pending_capacity: usize, system_capacity: usize) -> Self {
        Self {
            state: Mutex::new(CorrelatorState {
                pending: BoundedFifo::new(pending_capacity),
                system: BoundedFifo::new(system_capacity),
            }),
        }
    }

    // Poisoning is recovered from: no FIFO update can panic midway.
    fn lock(&self) -> MutexGuard<'_, CorrelatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remember a prompt awaiting a lesson. The prompt also counts as a system message.
    pub fn register_prompt(&self, prompt_message_id: MessageId, scope: Scope, query: impl Into<String>) {
        let prompt = PendingTeachingPrompt {
            prompt_message_id,
            scope,
            query: query.into(),
        };

        let mut state = self.lock();
        let dropped_prompts = state.pending.insert(prompt_message_id, prompt);
        let dropped_markers = state.system.insert(prompt_message_id, ());
        drop(state);

        if dropped_prompts > 0 || dropped_markers > 0 {
            debug!(
                prompt_message_id,
                dropped_prompts, dropped_markers, "Evicted oldest correlation entries"
            );
        }
    }

    /// Remember a message nemu sent (answer, acknowledgement, prompt).
    pub fn register_system_message(&self, message_id: MessageId) {
        let dropped = self.lock().system.insert(message_id, ());
        if dropped > 0 {
            debug!(message_id, dropped, "Evicted oldest system message markers");
        }
    }

    /// Consume the pending prompt `replied_to` answers, if there is one.
    ///
    /// The lookup and the removal share one critical section, so a prompt
    /// yields at most one lesson.
    pub fn resolve_teaching_reply(
        &self,
        replied_to: MessageId,
        teaching_text: &str,
        author: &Author,
    ) -> Option<TeachingLesson> {
        let prompt = self.lock().pending.remove(&replied_to)?;
        Some(TeachingLesson {
            scope: prompt.scope,
            query: prompt.query,
            text: teaching_text.to_string(),
            author: author.clone(),
        })
    }

    pub fn is_pending_prompt(&self, message_id: MessageId) -> bool {
        self.lock().pending.contains(&message_id)
    }

    pub fn is_system_message(&self, message_id: MessageId) -> bool {
        self.lock().system.contains(&message_id)
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn system_len(&self) -> usize {
        self.lock().system.len()
    }
}

impl Default for TeachingCorrelator {
    fn default() -> Self {
        Self::new(&CorrelatorConfig::default())
    }
}
