use ragchat_common::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub api_url: String,
    pub model: String,
    /// Upper bound for a whole streamed reply.
    pub timeout_secs: u64,
    /// Shown to the user when the model call fails.
    pub fallback_response: String,
    /// Oldest turns are dropped once a session holds more messages than this.
    pub max_history_messages: usize,
    /// Least recently used sessions are dropped beyond this many.
    pub max_sessions: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:11434/api/chat".to_string(),
            model: "qwen2.5vl:32b".to_string(),
            timeout_secs: 300,
            fallback_response: "Unable to get a response.".to_string(),
            max_history_messages: 100,
            max_sessions: 1000,
        }
    }
}

impl ChatConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(RagError::Configuration("chat model name is empty".to_string()));
        }
        if self.api_url.trim().is_empty() {
            return Err(RagError::Configuration("chat api_url is empty".to_string()));
        }
        if self.max_history_messages < 2 {
            return Err(RagError::Configuration(
                "max_history_messages must hold at least one exchange".to_string(),
            ));
        }
        if self.max_sessions == 0 {
            return Err(RagError::Configuration("max_sessions must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ChatConfig::default().validate().is_ok());
    }

    #[test]
    fn test_limits_are_validated() {
        let no_sessions = ChatConfig {
            max_sessions: 0,
            ..ChatConfig::default()
        };
        assert!(matches!(no_sessions.validate(), Err(RagError::Configuration(_))));

        let one_message = ChatConfig {
            max_history_messages: 1,
            ..ChatConfig::default()
        };
        assert!(one_message.validate().is_err());
    }
}
