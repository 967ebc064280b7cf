//! Scripted chat backend for tests in this and dependent crates.

use crate::chat_client::{ChatModel, FragmentStream};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use ragchat_common::{ChatMessage, RagError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Replies with fixed fragments and records every request it receives.
pub struct ScriptedChatModel {
    fragments: Vec<String>,
    failures_left: AtomicUsize,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChatModel {
    pub fn replying(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            failures_left: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fails the first call, then replies normally.
    pub fn failing_then_replying(fragments: &[&str]) -> Self {
        let model = Self::replying(fragments);
        model.failures_left.store(1, Ordering::SeqCst);
        model
    }

    /// Fails every call.
    pub fn always_failing() -> Self {
        let model = Self::replying(&[]);
        model.failures_left.store(usize::MAX, Ordering::SeqCst);
        model
    }

    pub fn last_request(&self) -> Option<Vec<ChatMessage>> {
        self.requests.lock().ok()?.last().cloned()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RagError::UpstreamModel("connection refused".to_string()));
        }

        let fragments: Vec<Result<String>> = self.fragments.iter().cloned().map(Ok).collect();
        Ok(stream::iter(fragments).boxed())
    }
}
