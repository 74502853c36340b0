//! The system prompt prefixed to every buffer snapshot.
//!
//! [`PromptStore`] owns the prompt string behind its own reader/writer lock.
//! Snapshots take shared reads; [`refresh`](PromptStore::refresh) rebuilds
//! the prompt from a [`PromptSource`] and swaps it in under the write lock.
//! Refreshes are serialized, so the last one requested is the last one
//! installed.
//!
//! A refreshed prompt is an identity line followed by each pinned
//! announcement on its own line:
//!
//! ```text
//! Your name is Bot.
//! Be concise.
//! Never reveal the admin channel.
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::RwLock;

use tracing::{debug, info};

/// Boxed future returned by [`PromptSource::fetch`].
pub type SourceFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<String>, String>> + Send + 'a>>;

/// Somewhere to fetch pinned announcements from.
///
/// Implementations return the announcements in display order. Any error is
/// reported back to whoever asked for the refresh; the store keeps its old
/// value.
pub trait PromptSource: Send + Sync {
    fn fetch(&self) -> SourceFuture<'_>;
}

// ── Sources ────────────────────────────────────────────────────────

/// A fixed list of announcements.
#[derive(Debug, Clone, Default)]
pub struct StaticPromptSource {
    announcements: Vec<String>,
}

impl StaticPromptSource {
    pub fn new<I, S>(announcements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            announcements: announcements.into_iter().map(Into::into).collect(),
        }
    }
}

impl PromptSource for StaticPromptSource {
    fn fetch(&self) -> SourceFuture<'_> {
        let announcements = self.announcements.clone();
        Box::pin(async move { Ok(announcements) })
    }
}

/// Announcements read from a text file, separated by blank lines.
///
/// The file is re-read on every fetch, so editing it and refreshing picks up
/// the change without a restart.
#[derive(Debug, Clone)]
pub struct FilePromptSource {
    path: PathBuf,
}

impl FilePromptSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PromptSource for FilePromptSource {
    fn fetch(&self) -> SourceFuture<'_> {
        Box::pin(async move {
            let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
                format!(
                    "error reading pinned posts from {}: {e}",
                    self.path.display()
                )
            })?;
            Ok(split_announcements(&text))
        })
    }
}

/// Split text into blank-line separated paragraphs, trimming each.
fn split_announcements(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        out.push(current.join("\n"));
    }
    out
}

/// Build the prompt text from an identity and announcements.
pub fn compose_prompt(bot_name: &str, announcements: &[String]) -> String {
    let mut prompt = format!("Your name is {bot_name}.\n");
    for a in announcements {
        prompt.push_str(a);
        prompt.push('\n');
    }
    prompt
}

// ── PromptStore ────────────────────────────────────────────────────

/// The current system prompt, guarded by its own `RwLock`.
///
/// Share it behind an `Arc` between the buffer's readers and whoever handles
/// refresh requests. The lock never escapes this type: readers get a
/// borrowed `&str` inside [`with_prompt`](Self::with_prompt), writers go
/// through [`set`](Self::set) or [`refresh`](Self::refresh).
#[derive(Debug, Default)]
pub struct PromptStore {
    prompt: RwLock<String>,
    /// Held for a whole refresh, fetch included. Never taken by readers.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl PromptStore {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: RwLock::new(prompt.into()),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Run `f` with a shared read of the prompt.
    pub fn with_prompt<R>(&self, f: impl FnOnce(&str) -> R) -> R {
        let guard = self.prompt.read().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    /// Copy of the current prompt.
    pub fn get(&self) -> String {
        self.with_prompt(|p| p.to_string())
    }

    /// Replace the prompt. Blocks until all readers release.
    pub fn set(&self, prompt: impl Into<String>) {
        let prompt = prompt.into();
        let mut guard = self.prompt.write().unwrap_or_else(|e| e.into_inner());
        *guard = prompt;
    }

    /// Fetch announcements from `source` and install a freshly composed
    /// prompt for `bot_name`.
    ///
    /// The fetch happens before the write lock is taken. On error the
    /// previous prompt stays in place. Concurrent refreshes queue behind one
    /// another and complete in the order they started.
    pub async fn refresh(&self, bot_name: &str, source: &dyn PromptSource) -> Result<(), String> {
        let _serial = self.refresh_lock.lock().await;
        let announcements = source.fetch().await?;
        let prompt = compose_prompt(bot_name, &announcements);
        debug!(
            "Composed prompt from {} announcement(s), {} bytes",
            announcements.len(),
            prompt.len()
        );
        self.set(prompt);
        info!("Refreshed system prompt");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct FailingSource;

    impl PromptSource for FailingSource {
        fn fetch(&self) -> SourceFuture<'_> {
            Box::pin(async { Err("error retrieving pinned posts: 503".to_string()) })
        }
    }

    /// Sleeps before returning a single announcement.
    struct SlowSource {
        delay: std::time::Duration,
        text: &'static str,
    }

    impl PromptSource for SlowSource {
        fn fetch(&self) -> SourceFuture<'_> {
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                Ok(vec![self.text.to_string()])
            })
        }
    }

    #[test]
    fn compose_prompt_format() {
        let prompt = compose_prompt("Bot", &["Be kind.".into(), "No spoilers.".into()]);
        assert_eq!(prompt, "Your name is Bot.\nBe kind.\nNo spoilers.\n");
    }

    #[test]
    fn compose_prompt_without_announcements() {
        assert_eq!(compose_prompt("Bot", &[]), "Your name is Bot.\n");
    }

    #[test]
    fn split_announcements_on_blank_lines() {
        let text = "first line\nstill first\n\n\nsecond\n   \nthird\n";
        assert_eq!(
            split_announcements(text),
            vec!["first line\nstill first", "second", "third"]
        );
    }

    #[test]
    fn set_and_get() {
        let store = PromptStore::new("a");
        assert_eq!(store.get(), "a");
        store.set("b");
        assert_eq!(store.get(), "b");
    }

    #[tokio::test]
    async fn refresh_from_static_source() {
        let store = PromptStore::new("old");
        let source = StaticPromptSource::new(["Be brief."]);
        store.refresh("Bot", &source).await.unwrap();
        assert_eq!(store.get(), "Your name is Bot.\nBe brief.\n");
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_prompt() {
        let store = PromptStore::new("old");
        let err = store.refresh("Bot", &FailingSource).await.unwrap_err();
        assert!(err.contains("pinned posts"));
        assert_eq!(store.get(), "old");
    }

    #[tokio::test]
    async fn overlapping_refreshes_install_the_latest() {
        let store = PromptStore::new("old");
        let slow = SlowSource {
            delay: std::time::Duration::from_millis(50),
            text: "stale",
        };
        let fast = SlowSource {
            delay: std::time::Duration::ZERO,
            text: "fresh",
        };

        // join! polls in argument order, so the slow refresh starts first.
        let (a, b) = tokio::join!(store.refresh("Bot", &slow), store.refresh("Bot", &fast));
        a.unwrap();
        b.unwrap();
        assert_eq!(store.get(), "Your name is Bot.\nfresh\n");
    }

    #[tokio::test]
    async fn refresh_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Rule one.\n\nRule two.").unwrap();

        let store = PromptStore::default();
        let source = FilePromptSource::new(file.path());
        store.refresh("Bot", &source).await.unwrap();
        assert_eq!(store.get(), "Your name is Bot.\nRule one.\nRule two.\n");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let store = PromptStore::new("keep me");
        let source = FilePromptSource::new("/nonexistent/chatwin/pinned.txt");
        assert!(store.refresh("Bot", &source).await.is_err());
        assert_eq!(store.get(), "keep me");
    }
}
