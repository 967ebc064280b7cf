use crate::chat_client::ChatModel;
use crate::config::ChatConfig;
use crate::session::{ChatSession, PreparedTurn};
use ragchat_common::{ChatMessage, RagError, Result};
use ragchat_knowledge::{AugmentationComposer, KnowledgeBase};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Result of one conversational turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub session_id: String,
    pub response: String,
    pub retrieved: usize,
    /// Set when the chat model failed and `response` is the fallback text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_error: Option<String>,
}

struct SessionState {
    chat: ChatSession,
    /// Turn whose model call failed, kept for `retry_last`.
    pending: Option<PreparedTurn>,
}

struct SessionEntry {
    state: Arc<Mutex<SessionState>>,
    last_used: u64,
}

#[derive(Default)]
struct SessionMap {
    entries: HashMap<String, SessionEntry>,
    clock: u64,
}

impl SessionMap {
    fn touch(&mut self, session_id: &str) -> Option<Arc<Mutex<SessionState>>> {
        self.clock += 1;
        let clock = self.clock;
        self.entries.get_mut(session_id).map(|entry| {
            entry.last_used = clock;
            entry.state.clone()
        })
    }

    /// Drop the least recently used session.
    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            info!("Evicting idle session {}", id);
            self.entries.remove(&id);
        }
    }
}

/// Owns the per-session conversations on top of a shared knowledge base.
///
/// At most `max_sessions` conversations are kept; the least recently used
/// one is dropped when a new session would exceed that.
pub struct ChatService {
    knowledge: Arc<KnowledgeBase>,
    composer: Arc<AugmentationComposer>,
    model: Arc<dyn ChatModel>,
    config: ChatConfig,
    sessions: RwLock<SessionMap>,
}

impl ChatService {
    pub fn new(
        knowledge: Arc<KnowledgeBase>,
        composer: AugmentationComposer,
        model: Arc<dyn ChatModel>,
        config: ChatConfig,
    ) -> Self {
        Self {
            knowledge,
            composer: Arc::new(composer),
            model,
            config,
            sessions: RwLock::new(SessionMap::default()),
        }
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge
    }

    async fn session(&self, session_id: &str) -> Arc<Mutex<SessionState>> {
        let mut sessions = self.sessions.write().await;
        if let Some(state) = sessions.touch(session_id) {
            return state;
        }

        while sessions.entries.len() >= self.config.max_sessions.max(1) {
            sessions.evict_oldest();
        }

        debug!("Creating session {}", session_id);
        let chat = ChatSession::new(
            session_id,
            self.knowledge.clone(),
            self.composer.clone(),
            self.model.clone(),
        )
        .with_max_history(self.config.max_history_messages);
        let state = Arc::new(Mutex::new(SessionState { chat, pending: None }));
        let last_used = sessions.clock;
        sessions.entries.insert(
            session_id.to_string(),
            SessionEntry {
                state: state.clone(),
                last_used,
            },
        );
        state
    }

    async fn existing_session(&self, session_id: &str) -> Option<Arc<Mutex<SessionState>>> {
        self.sessions.write().await.touch(session_id)
    }

    pub async fn has_session(&self, session_id: &str) -> bool {
        self.sessions.read().await.entries.contains_key(session_id)
    }

    /// Run a full turn. A missing `session_id` starts a new session.
    ///
    /// Chat model failures are reported through `upstream_error` with the
    /// fallback text as the response; retrieval failures are returned as errors.
    pub async fn send_message(&self, message: &str, session_id: Option<&str>) -> Result<TurnOutcome> {
        if message.trim().is_empty() {
            return Err(RagError::Validation("message must not be empty".to_string()));
        }

        let session_id = session_id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let session = self.session(&session_id).await;
        let mut state = session.lock().await;

        let turn = state.chat.prepare_turn(message).await?;
        self.run_turn(&mut state, &session_id, turn).await
    }

    /// Resend the turn whose model call failed last, without repeating retrieval.
    pub async fn retry_last(&self, session_id: &str) -> Result<TurnOutcome> {
        let session = self
            .existing_session(session_id)
            .await
            .ok_or_else(|| RagError::Validation(format!("unknown session '{}'", session_id)))?;
        let mut state = session.lock().await;

        let turn = state
            .pending
            .take()
            .ok_or_else(|| RagError::Validation("no failed turn to retry".to_string()))?;
        info!("Retrying last turn for session {}", session_id);
        self.run_turn(&mut state, session_id, turn).await
    }

    async fn run_turn(&self, state: &mut SessionState, session_id: &str, turn: PreparedTurn) -> Result<TurnOutcome> {
        let result = state.chat.complete_turn(&turn, |_| {}).await;
        match result {
            Ok(response) => {
                state.pending = None;
                Ok(TurnOutcome {
                    session_id: session_id.to_string(),
                    response,
                    retrieved: turn.retrieved,
                    upstream_error: None,
                })
            }
            Err(e) => {
                error!("Chat model failed for session {}: {}", session_id, e);
                let retrieved = turn.retrieved;
                state.pending = Some(turn);
                Ok(TurnOutcome {
                    session_id: session_id.to_string(),
                    response: self.config.fallback_response.clone(),
                    retrieved,
                    upstream_error: Some(e.to_string()),
                })
            }
        }
    }

    pub async fn attach_temporary(&self, session_id: &str, name: &str, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(RagError::Validation(format!("temporary file '{}' has no text", name)));
        }
        let session = self.session(session_id).await;
        session.lock().await.chat.attach_temporary(name, content);
        Ok(())
    }

    pub async fn clear_temporary(&self, session_id: &str) {
        if let Some(session) = self.existing_session(session_id).await {
            session.lock().await.chat.clear_temporary();
        }
    }

    pub async fn history(&self, session_id: &str) -> Vec<ChatMessage> {
        let session = self.sessions.read().await.entries.get(session_id).map(|e| e.state.clone());
        match session {
            Some(session) => session.lock().await.chat.history().to_vec(),
            None => Vec::new(),
        }
    }

    pub async fn clear_session(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.entries.remove(session_id).is_some();
        if !removed {
            warn!("Clear requested for unknown session {}", session_id);
        }
        removed
    }
}
