use crate::chat_client::ChatModel;
use futures::StreamExt;
use ragchat_common::{ChatMessage, Result};
use ragchat_knowledge::{AugmentationComposer, KnowledgeBase};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Session-only file content. Never embedded or persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporaryContent {
    pub name: String,
    pub content: String,
}

/// A user turn after retrieval and composition, before the model call.
///
/// Holding on to it lets a caller resend after an upstream failure without
/// repeating retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedTurn {
    pub display: String,
    pub composed: String,
    pub retrieved: usize,
}

pub struct ChatSession {
    id: String,
    knowledge: Arc<KnowledgeBase>,
    composer: Arc<AugmentationComposer>,
    model: Arc<dyn ChatModel>,
    history: Vec<ChatMessage>,
    temporary: Option<TemporaryContent>,
    top_k: usize,
    max_history_messages: usize,
}

impl ChatSession {
    pub fn new(
        id: impl Into<String>,
        knowledge: Arc<KnowledgeBase>,
        composer: Arc<AugmentationComposer>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        let top_k = knowledge.config().top_k;
        Self {
            id: id.into(),
            knowledge,
            composer,
            model,
            history: Vec::new(),
            temporary: None,
            top_k,
            max_history_messages: usize::MAX,
        }
    }

    pub fn with_max_history(mut self, max_history_messages: usize) -> Self {
        self.max_history_messages = max_history_messages;
        self
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn temporary(&self) -> Option<&TemporaryContent> {
        self.temporary.as_ref()
    }

    /// Replaces whatever temporary content the session held before.
    pub fn attach_temporary(&mut self, name: impl Into<String>, content: impl Into<String>) {
        let temporary = TemporaryContent {
            name: name.into(),
            content: content.into(),
        };
        info!("Session {} attached temporary file '{}'", self.id, temporary.name);
        self.temporary = Some(temporary);
    }

    pub fn clear_temporary(&mut self) {
        self.temporary = None;
    }

    /// Retrieve context for `prompt` and compose the model input.
    pub async fn prepare_turn(&self, prompt: &str) -> Result<PreparedTurn> {
        let retrieved = self.knowledge.query(prompt, self.top_k).await?;
        let temporary = self.temporary.as_ref().map(|t| t.content.as_str());
        let composed = self.composer.compose(prompt, &retrieved, temporary);

        debug!(
            "Session {} composed prompt with {} retrieved chunks",
            self.id,
            retrieved.len()
        );

        Ok(PreparedTurn {
            display: prompt.to_string(),
            composed,
            retrieved: retrieved.len(),
        })
    }

    /// Send a prepared turn with the prior history and stream the reply.
    ///
    /// History only changes once the whole reply has arrived.
    pub async fn complete_turn<F>(&mut self, turn: &PreparedTurn, mut on_fragment: F) -> Result<String>
    where
        F: FnMut(&str) + Send,
    {
        let user_turn = ChatMessage::user(turn.composed.clone(), turn.display.clone());
        let mut payload = self.history.clone();
        payload.push(user_turn.clone());

        let mut fragments = self.model.stream_chat(&payload).await?;
        let mut reply = String::new();
        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            on_fragment(&fragment);
            reply.push_str(&fragment);
        }

        self.history.push(user_turn);
        self.history.push(ChatMessage::assistant(reply.clone()));
        self.trim_history();

        info!("Session {} completed turn ({} chars)", self.id, reply.len());
        Ok(reply)
    }

    /// `prepare_turn` followed by `complete_turn`.
    pub async fn send<F>(&mut self, prompt: &str, on_fragment: F) -> Result<String>
    where
        F: FnMut(&str) + Send,
    {
        let turn = self.prepare_turn(prompt).await?;
        self.complete_turn(&turn, on_fragment).await
    }

    fn trim_history(&mut self) {
        if self.history.len() > self.max_history_messages {
            // Drop whole exchanges so the history keeps starting with a user turn.
            let mut excess = self.history.len() - self.max_history_messages;
            excess += excess % 2;
            self.history.drain(0..excess.min(self.history.len()));
            debug!("Trimmed {} old messages from session {}", excess, self.id);
        }
    }
}
