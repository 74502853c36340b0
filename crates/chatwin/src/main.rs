//! Chat with a bounded-window bot from the terminal.
//!
//! Each line read from stdin is one user turn. The reply is printed to
//! stdout; diagnostics go to stderr. Reads the API key from the
//! `OPENROUTER_KEY` environment variable and the rest of its settings from
//! the environment (see [`ChatConfig::from_env`]) overridden by flags.
//!
//! # Commands
//!
//! - `/refresh` — rebuild the system prompt from the prompt file
//! - `/context` — print the buffer's current size and entry count
//! - `/quit` — exit
//!
//! # Examples
//!
//! ```sh
//! OPENROUTER_KEY=sk-... chatwin --bot-name Ferris --prompt-file pinned.txt
//! OPENROUTER_KEY=sk-... chatwin --max-bytes 4096 --max-age-secs 600 -v
//! ```

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use chatwin::prelude::*;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{Level, info, warn};

/// Chat with a bounded-window bot from the terminal.
#[derive(Parser)]
#[command(name = "chatwin")]
struct Cli {
    /// Bot name used in the identity line of the system prompt
    #[arg(long)]
    bot_name: Option<String>,

    /// File of pinned announcements (blank-line separated)
    #[arg(long)]
    prompt_file: Option<PathBuf>,

    /// Model to use for completions
    #[arg(long)]
    model: Option<String>,

    /// Byte budget for the conversation window
    #[arg(long)]
    max_bytes: Option<usize>,

    /// Maximum age of a turn in the window, in seconds
    #[arg(long)]
    max_age_secs: Option<u64>,

    /// Maximum tokens per reply
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Log debug diagnostics to stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> ChatConfig {
        let mut config = ChatConfig::from_env();
        if let Some(v) = self.bot_name {
            config.bot_name = v;
        }
        if let Some(v) = self.prompt_file {
            config.prompt_file = Some(v);
        }
        if let Some(v) = self.model {
            config.model = v;
        }
        if let Some(v) = self.max_bytes {
            config.max_bytes = v;
        }
        if let Some(v) = self.max_age_secs {
            config.max_age = Duration::from_secs(v);
        }
        config
    }
}

async fn refresh_prompt(config: &ChatConfig, prompt: &PromptStore) -> Result<(), String> {
    match config.prompt_file {
        Some(ref path) => {
            prompt
                .refresh(&config.bot_name, &FilePromptSource::new(path))
                .await
        }
        None => {
            prompt
                .refresh(&config.bot_name, &StaticPromptSource::default())
                .await
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let max_tokens = cli.max_tokens;
    let config = cli.into_config();

    let api_key =
        std::env::var("OPENROUTER_KEY").map_err(|_| "OPENROUTER_KEY not set".to_string())?;
    let mut sink = config.build_sink(api_key)?;
    if let Some(n) = max_tokens {
        sink = sink.with_max_tokens(n);
    }

    let prompt = Arc::new(PromptStore::default());
    // A missing prompt file at startup is not fatal; the identity line still applies.
    if let Err(e) = refresh_prompt(&config, &prompt).await {
        warn!("Initial prompt load failed: {e}");
        prompt.set(chatwin::prompt::compose_prompt(&config.bot_name, &[]));
    }

    let buffer = Arc::new(config.build_buffer());
    let responder = Responder::new(buffer.clone(), prompt.clone(), Arc::new(sink));
    info!(
        "Ready: model={}, max_bytes={}, max_age={}s",
        config.model,
        config.max_bytes,
        config.max_age.as_secs()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| format!("failed to read stdin: {e}"))?
    {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/refresh" => match refresh_prompt(&config, &prompt).await {
                Ok(()) => println!("Refreshed prompt."),
                Err(e) => eprintln!("Error: {e}"),
            },
            "/context" => {
                let stats = buffer.stats();
                println!(
                    "{} entries, {}/{} bytes, max age {}s",
                    stats.entries, stats.current_size, stats.max_size, stats.max_age_secs
                );
            }
            text => match responder.respond(text).await {
                Ok(reply) => println!("{reply}"),
                Err(e) => eprintln!("Error: {e}"),
            },
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
