//! Bounded conversation window for chat bots backed by a stateless
//! completion API.
//!
//! `chatwin` keeps a rolling window of chat turns that is replayed as context
//! on every completion call. The window is held to a byte budget and a
//! maximum age: each append first sweeps out stale turns, then evicts the
//! oldest turns until the new one fits. Every snapshot is prefixed with the
//! current system prompt.
//!
//! # Getting started
//!
//! ```ignore
//! use chatwin::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let api_key = std::env::var("OPENROUTER_KEY").unwrap();
//!     let sink = OpenRouterSink::new(api_key, "openai/gpt-4o-mini")?;
//!
//!     let prompt = Arc::new(PromptStore::new("Your name is Bot.\n"));
//!     let buffer = Arc::new(ConversationBuffer::default());
//!     let responder = Responder::new(buffer, prompt, Arc::new(sink));
//!
//!     let reply = responder.respond("hello bot").await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`buffer`] | [`ConversationBuffer`](buffer::ConversationBuffer): size/age-bounded turn window |
//! | [`prompt`] | [`PromptStore`](prompt::PromptStore) and the sources it refreshes from |
//! | [`sink`] | [`CompletionSink`](sink::CompletionSink) trait and the OpenRouter client |
//! | [`retry`] | Transient-error detection and backoff for the sink |
//! | [`responder`] | Append → snapshot → complete → append orchestration |
//! | [`gate`] | Decides which inbound messages get a reply |
//! | [`config`] | [`ChatConfig`](config::ChatConfig) defaults and environment loading |
//!
//! # Locking
//!
//! The buffer has one exclusive lock covering a whole append or snapshot.
//! The prompt store has its own reader/writer lock. A snapshot takes the
//! buffer lock first and the prompt read lock second; a prompt refresh only
//! ever takes the prompt write lock. The completion call runs with neither
//! lock held.

pub mod buffer;
pub mod config;
pub mod gate;
pub mod prelude;
pub mod prompt;
pub mod responder;
pub mod retry;
pub mod sink;

use serde::{Deserialize, Serialize};

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for completion calls.
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A `{role, content}` pair as sent to the completion API.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}
