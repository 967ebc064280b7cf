//! Conversation layer: streaming chat model client, per-session history and
//! the service that ties retrieval and composition to each turn.

pub mod chat_client;
pub mod config;
pub mod service;
pub mod session;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use chat_client::{ChatModel, FragmentStream, OllamaChatClient};
pub use config::ChatConfig;
pub use service::{ChatService, TurnOutcome};
pub use session::{ChatSession, PreparedTurn, TemporaryContent};
