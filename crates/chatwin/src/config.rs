//! Bot configuration with sensible defaults.
//!
//! [`ChatConfig`] gathers the settings a deployment needs and converts them
//! into chatwin types via [`build_buffer`](ChatConfig::build_buffer),
//! [`build_gate`](ChatConfig::build_gate), and
//! [`build_sink`](ChatConfig::build_sink). Values come from
//! [`Default`], then [`from_env`](ChatConfig::from_env), then CLI flags in
//! the binaries.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::DEFAULT_MODEL;
use crate::buffer::{ConversationBuffer, DEFAULT_MAX_AGE, DEFAULT_MAX_BYTES};
use crate::gate::ChatGate;
use crate::sink::OpenRouterSink;

/// Configuration for one bot / one conversation.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Name used in the identity line and as the mention trigger. Default: `"bot"`.
    pub bot_name: String,
    /// Channel the bot listens in. Default: any.
    pub channel_id: Option<String>,
    pub admin_role_id: Option<String>,
    pub chat_role_id: Option<String>,
    /// File of pinned announcements for prompt refreshes.
    pub prompt_file: Option<PathBuf>,
    /// Model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,
    /// Byte budget for the buffer. Default: 131072.
    pub max_bytes: usize,
    /// Maximum age of a buffered turn. Default: 1 hour.
    pub max_age: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            bot_name: "bot".to_string(),
            channel_id: None,
            admin_role_id: None,
            chat_role_id: None,
            prompt_file: None,
            model: DEFAULT_MODEL.to_string(),
            max_bytes: DEFAULT_MAX_BYTES,
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

impl ChatConfig {
    /// Defaults overlaid with whatever is set in the process environment.
    ///
    /// Reads `BOT_NAME`, `CHANNEL_ID`, `ADMIN_ROLE_ID`,
    /// `CHAT_ALLOWED_ROLE_ID`, `PROMPT_FILE`, `CHATWIN_MODEL`,
    /// `CHATWIN_MAX_BYTES`, and `CHATWIN_MAX_AGE_SECS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(v) = get("BOT_NAME") {
            config.bot_name = v;
        }
        config.channel_id = get("CHANNEL_ID");
        config.admin_role_id = get("ADMIN_ROLE_ID");
        config.chat_role_id = get("CHAT_ALLOWED_ROLE_ID");
        config.prompt_file = get("PROMPT_FILE").map(PathBuf::from);
        if let Some(v) = get("CHATWIN_MODEL") {
            config.model = v;
        }
        if let Some(v) = get("CHATWIN_MAX_BYTES") {
            match v.parse() {
                Ok(n) => config.max_bytes = n,
                Err(_) => warn!("Ignoring invalid CHATWIN_MAX_BYTES={v}"),
            }
        }
        if let Some(v) = get("CHATWIN_MAX_AGE_SECS") {
            match v.parse() {
                Ok(n) => config.max_age = Duration::from_secs(n),
                Err(_) => warn!("Ignoring invalid CHATWIN_MAX_AGE_SECS={v}"),
            }
        }
        config
    }

    /// A fresh, empty buffer with this config's limits.
    pub fn build_buffer(&self) -> ConversationBuffer {
        ConversationBuffer::new(self.max_bytes, self.max_age)
    }

    pub fn build_gate(&self) -> ChatGate {
        ChatGate {
            channel_id: self.channel_id.clone(),
            admin_role_id: self.admin_role_id.clone(),
            chat_role_id: self.chat_role_id.clone(),
            bot_name: self.bot_name.clone(),
        }
    }

    pub fn build_sink(&self, api_key: impl Into<String>) -> Result<OpenRouterSink, String> {
        OpenRouterSink::new(api_key, self.model.clone())
    }
}
