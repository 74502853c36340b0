//! Size- and age-bounded conversation window.
//!
//! [`ConversationBuffer`] holds the chat turns replayed to the model on every
//! completion call. Each [`append`](ConversationBuffer::append) runs two
//! maintenance passes before admitting the new turn:
//!
//! 1. **Expiry sweep** — scans newest to oldest for a turn older than
//!    `max_age` and drops it together with everything before it.
//! 2. **Size eviction** — pops the oldest turn until the new one fits within
//!    `max_size` bytes, or the window is empty.
//!
//! The byte ceiling is soft: a single turn larger than `max_size` is still
//! admitted, alone. Neither pass is an error; both only log at `debug`.
//!
//! [`snapshot`](ConversationBuffer::snapshot) never evicts. It returns an
//! owned copy prefixed with the current system prompt.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::prompt::PromptStore;
use crate::{Message, MessageRole};

/// Default byte budget for the retained turns (128 KiB).
pub const DEFAULT_MAX_BYTES: usize = 128 * 1024;

/// Default maximum age of a retained turn.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60);

// ── ChatEntry ──────────────────────────────────────────────────────

/// One conversational turn with its cached size and insertion time.
#[derive(Debug, Clone)]
pub struct ChatEntry {
    role: MessageRole,
    content: String,
    /// `content.len()`, stored so the running total is O(1) to maintain.
    byte_size: usize,
    inserted_at: Instant,
}

impl ChatEntry {
    fn new(role: MessageRole, content: String, inserted_at: Instant) -> Self {
        Self {
            role,
            byte_size: content.len(),
            content,
            inserted_at,
        }
    }

    pub fn role(&self) -> MessageRole {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Size of the content in bytes (not tokens).
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub fn inserted_at(&self) -> Instant {
        self.inserted_at
    }

    /// Convert into the wire form sent to the completion API.
    pub fn to_message(&self) -> Message {
        Message {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

// ── BufferStats ────────────────────────────────────────────────────

/// Point-in-time counters for a buffer, for logging and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    pub entries: usize,
    pub current_size: usize,
    pub max_size: usize,
    pub max_age_secs: u64,
}

// ── ConversationBuffer ─────────────────────────────────────────────

#[derive(Debug, Default)]
struct Window {
    /// Oldest first.
    entries: VecDeque<ChatEntry>,
    /// Always equal to the sum of `entries[..].byte_size`.
    current_size: usize,
}

impl Window {
    /// Drop everything up to and including the newest stale entry.
    fn expire(&mut self, now: Instant, max_age: Duration) {
        let cut = self
            .entries
            .iter()
            .rposition(|e| now.saturating_duration_since(e.inserted_at) > max_age);

        if let Some(idx) = cut {
            self.entries.drain(..=idx);
            let before = self.current_size;
            self.current_size = self.entries.iter().map(|e| e.byte_size).sum();
            debug!(
                "Expired {} stale entries ({} bytes freed, {} retained)",
                idx + 1,
                before - self.current_size,
                self.entries.len(),
            );
        }
    }

    /// Pop oldest entries until `incoming` more bytes fit under `max_size`.
    fn evict_for(&mut self, incoming: usize, max_size: usize) {
        let mut evicted = 0;
        while self.current_size + incoming > max_size {
            let Some(oldest) = self.entries.pop_front() else {
                break;
            };
            self.current_size -= oldest.byte_size;
            evicted += 1;
        }

        if evicted > 0 {
            debug!(
                "Evicted {} oldest entries to fit {} incoming bytes (now {}/{})",
                evicted, incoming, self.current_size, max_size,
            );
        }
        if self.entries.is_empty() && incoming > max_size {
            debug!(
                "Admitting oversized entry alone ({} bytes > {} max)",
                incoming, max_size
            );
        }
    }

    fn push(&mut self, entry: ChatEntry) {
        self.current_size += entry.byte_size;
        self.entries.push_back(entry);
    }
}

/// Rolling window of chat turns bounded by total bytes and by age.
///
/// One buffer is one logical conversation. It is meant to be shared behind an
/// `Arc`; every method takes `&self` and serializes on a single internal
/// mutex, so an append and a snapshot never interleave.
///
/// # Lock ordering
///
/// [`snapshot`](Self::snapshot) holds this buffer's lock and then takes a
/// shared read of the [`PromptStore`]. Code that writes the prompt store must
/// never do so while holding a buffer lock.
///
/// # Example
///
/// ```
/// use chatwin::buffer::ConversationBuffer;
/// use chatwin::prompt::PromptStore;
/// use chatwin::MessageRole;
/// use std::time::Duration;
///
/// let buffer = ConversationBuffer::new(100, Duration::from_secs(3600));
/// buffer.append(MessageRole::User, "a".repeat(60));
/// buffer.append(MessageRole::User, "b".repeat(60));
/// assert_eq!(buffer.len(), 1);
/// assert_eq!(buffer.current_size(), 60);
///
/// let prompt = PromptStore::new("You are Bot.");
/// let snapshot = buffer.snapshot(&prompt);
/// assert_eq!(snapshot[0].content(), "You are Bot.");
/// assert_eq!(snapshot.len(), 2);
/// ```
#[derive(Debug)]
pub struct ConversationBuffer {
    window: Mutex<Window>,
    max_size: usize,
    max_age: Duration,
}

impl Default for ConversationBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BYTES, DEFAULT_MAX_AGE)
    }
}

impl ConversationBuffer {
    /// Create an empty buffer. Both limits are fixed for its lifetime.
    pub fn new(max_size: usize, max_age: Duration) -> Self {
        Self {
            window: Mutex::new(Window::default()),
            max_size,
            max_age,
        }
    }

    /// Append a turn, expiring and evicting older turns as needed.
    ///
    /// Never fails. A turn whose content alone exceeds `max_size` empties the
    /// buffer and is then admitted by itself.
    pub fn append(&self, role: MessageRole, content: impl Into<String>) {
        self.append_with(role, content, Instant::now);
    }

    /// [`append`](Self::append) with an explicit clock reading.
    ///
    /// `now` is both the reference point for the expiry sweep and the
    /// insertion time recorded for the new turn.
    pub fn append_at(&self, role: MessageRole, content: impl Into<String>, now: Instant) {
        self.append_with(role, content, || now);
    }

    /// The clock is read only once the lock is held, so stored timestamps
    /// stay in insertion order under contention.
    fn append_with(
        &self,
        role: MessageRole,
        content: impl Into<String>,
        clock: impl FnOnce() -> Instant,
    ) {
        let content = content.into();
        let mut window = self.lock();
        let now = clock();
        let entry = ChatEntry::new(role, content, now);
        window.expire(now, self.max_age);
        window.evict_for(entry.byte_size, self.max_size);
        window.push(entry);
    }

    /// Copy out the window, prefixed with a system turn holding the current
    /// prompt. Read-only: no expiry or eviction happens here.
    pub fn snapshot(&self, prompt: &PromptStore) -> Vec<ChatEntry> {
        let window = self.lock();
        let system = prompt.with_prompt(|p| p.to_string());

        let mut out = Vec::with_capacity(window.entries.len() + 1);
        out.push(ChatEntry::new(MessageRole::System, system, Instant::now()));
        out.extend(window.entries.iter().cloned());
        out
    }

    /// [`snapshot`](Self::snapshot) in wire form, ready for a completion call.
    pub fn snapshot_messages(&self, prompt: &PromptStore) -> Vec<Message> {
        self.snapshot(prompt)
            .iter()
            .map(ChatEntry::to_message)
            .collect()
    }

    /// Number of retained turns.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Total bytes across retained turns.
    pub fn current_size(&self) -> usize {
        self.lock().current_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn stats(&self) -> BufferStats {
        self.stats_of(&self.lock())
    }

    /// [`snapshot_messages`](Self::snapshot_messages) and
    /// [`stats`](Self::stats) taken under one lock, so the counters describe
    /// exactly the returned turns.
    pub fn snapshot_with_stats(&self, prompt: &PromptStore) -> (Vec<Message>, BufferStats) {
        let window = self.lock();
        let mut messages = Vec::with_capacity(window.entries.len() + 1);
        messages.push(prompt.with_prompt(|p| Message::system(p)));
        messages.extend(window.entries.iter().map(ChatEntry::to_message));
        (messages, self.stats_of(&window))
    }

    fn stats_of(&self, window: &Window) -> BufferStats {
        BufferStats {
            entries: window.entries.len(),
            current_size: window.current_size,
            max_size: self.max_size,
            max_age_secs: self.max_age.as_secs(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Window> {
        self.window.lock().unwrap_or_else(|e| e.into_inner())
    }
}
