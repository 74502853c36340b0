//! Convenience re-exports for the common chatwin types.
//!
//! ```ignore
//! use chatwin::prelude::*;
//! ```

pub use crate::buffer::{BufferStats, ChatEntry, ConversationBuffer};
pub use crate::config::ChatConfig;
pub use crate::gate::{ChatGate, InboundMessage};
pub use crate::prompt::{FilePromptSource, PromptSource, PromptStore, StaticPromptSource};
pub use crate::responder::Responder;
pub use crate::retry::RetryPolicy;
pub use crate::sink::{CompletionFuture, CompletionSink, OpenRouterSink};
pub use crate::{Message, MessageRole};
