//! Inbound admission: which messages the bot answers, and who may refresh
//! its prompt.
//!
//! A message gets a reply when it arrives in the bot's channel, its author
//! holds the admin or chat-allowed role, and it mentions the bot by name.
//! Everything that passes is treated the same by the buffer.

use serde::Deserialize;

/// A chat message as delivered by the platform.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundMessage {
    pub channel_id: String,
    /// Role IDs held by the author. Empty when the author is not a member.
    #[serde(default)]
    pub author_roles: Vec<String>,
    pub content: String,
}

/// Channel, role, and mention checks for inbound messages.
#[derive(Debug, Clone, Default)]
pub struct ChatGate {
    /// Only messages in this channel are considered. `None` allows all.
    pub channel_id: Option<String>,
    pub admin_role_id: Option<String>,
    pub chat_role_id: Option<String>,
    /// Name that must appear in a message (case-insensitive) to get a reply.
    pub bot_name: String,
}

impl ChatGate {
    pub fn new(bot_name: impl Into<String>) -> Self {
        Self {
            bot_name: bot_name.into(),
            ..Default::default()
        }
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn with_admin_role(mut self, role_id: impl Into<String>) -> Self {
        self.admin_role_id = Some(role_id.into());
        self
    }

    pub fn with_chat_role(mut self, role_id: impl Into<String>) -> Self {
        self.chat_role_id = Some(role_id.into());
        self
    }

    /// Whether someone holding `roles` may chat with the bot or refresh its
    /// prompt.
    pub fn can_chat(&self, roles: &[String]) -> bool {
        roles.iter().any(|r| {
            self.admin_role_id.as_deref() == Some(r.as_str())
                || self.chat_role_id.as_deref() == Some(r.as_str())
        })
    }

    /// Whether `msg` should get a reply.
    pub fn should_respond(&self, msg: &InboundMessage) -> bool {
        if let Some(ref channel) = self.channel_id
            && *channel != msg.channel_id
        {
            return false;
        }
        if !self.can_chat(&msg.author_roles) {
            return false;
        }
        msg.content
            .to_lowercase()
            .contains(&self.bot_name.to_lowercase())
    }
}
