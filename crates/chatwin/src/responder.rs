//! One conversational turn: record the user message, ask the model, record
//! the reply.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::MessageRole;
use crate::buffer::ConversationBuffer;
use crate::prompt::PromptStore;
use crate::sink::CompletionSink;

/// Drives a [`ConversationBuffer`] against a [`CompletionSink`].
///
/// Cheap to clone; clones share the same buffer, prompt, and sink. Several
/// turns may be in flight at once. Each touches the buffer lock only for the
/// two appends and the snapshot; the completion call itself holds no lock.
#[derive(Clone)]
pub struct Responder {
    buffer: Arc<ConversationBuffer>,
    prompt: Arc<PromptStore>,
    sink: Arc<dyn CompletionSink>,
}

impl Responder {
    pub fn new(
        buffer: Arc<ConversationBuffer>,
        prompt: Arc<PromptStore>,
        sink: Arc<dyn CompletionSink>,
    ) -> Self {
        Self {
            buffer,
            prompt,
            sink,
        }
    }

    pub fn buffer(&self) -> &Arc<ConversationBuffer> {
        &self.buffer
    }

    pub fn prompt(&self) -> &Arc<PromptStore> {
        &self.prompt
    }

    /// Run one turn for `text` and return the model's reply.
    ///
    /// The user message is always recorded. The reply is recorded only when
    /// the sink succeeds; on failure the sink's error is returned as-is and
    /// the buffer is left holding just the user message.
    pub async fn respond(&self, text: &str) -> Result<String, String> {
        self.buffer.append(MessageRole::User, text);
        let messages = self.buffer.snapshot_messages(&self.prompt);
        debug!("Sending {} message(s) to completion sink", messages.len());

        let reply = match self.sink.complete(&messages).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Completion failed: {e}");
                return Err(e);
            }
        };

        self.buffer.append(MessageRole::Assistant, reply.as_str());
        Ok(reply)
    }
}
