//! Serve a chatwin bot over HTTP.
//!
//! # Usage
//!
//! ```bash
//! OPENROUTER_KEY=sk-... BOT_NAME=ferris CHAT_ALLOWED_ROLE_ID=chatter \
//!   cargo run -p chatwin-web -- --prompt-file pinned.txt
//! ```
//!
//! Then deliver messages as the chat platform would:
//!
//! ```bash
//! curl -X POST localhost:3001/api/messages -H 'content-type: application/json' \
//!   -d '{"channel_id":"general","author_roles":["chatter"],"content":"hey ferris"}'
//! curl -X POST localhost:3001/api/refresh-prompt -H 'content-type: application/json' \
//!   -d '{"author_roles":["chatter"]}'
//! curl localhost:3001/api/context
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use chatwin::prelude::*;
use chatwin_web::{WebConfig, WebState, spawn_web};
use clap::Parser;
use tracing::{Level, warn};

/// Serve a chatwin bot over HTTP.
#[derive(Parser)]
#[command(about = "HTTP front end for a bounded-window chat bot")]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 3001)]
    port: u16,

    /// File of pinned announcements (overrides PROMPT_FILE).
    #[arg(long)]
    prompt_file: Option<PathBuf>,

    /// Model to use (overrides CHATWIN_MODEL).
    #[arg(long)]
    model: Option<String>,

    /// Log debug diagnostics.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut config = ChatConfig::from_env();
    if let Some(path) = args.prompt_file {
        config.prompt_file = Some(path);
    }
    if let Some(model) = args.model {
        config.model = model;
    }

    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "Set OPENROUTER_KEY env var to your OpenRouter API key")?;
    let sink = config.build_sink(api_key)?;

    let responder = Responder::new(
        Arc::new(config.build_buffer()),
        Arc::new(PromptStore::default()),
        Arc::new(sink),
    );
    let mut state = WebState::new(responder, config.build_gate(), config.bot_name.clone());
    if let Some(ref path) = config.prompt_file {
        state = state.with_prompt_source(Arc::new(FilePromptSource::new(path)));
    }

    // Initial load; a failure leaves only the identity line.
    if let Err(e) = state.refresh_prompt().await {
        warn!("Initial prompt load failed: {e}");
        state
            .responder()
            .prompt()
            .set(chatwin::prompt::compose_prompt(&config.bot_name, &[]));
    }

    let web_config = WebConfig {
        bind_addr: ([0, 0, 0, 0], args.port).into(),
    };
    let addr = spawn_web(state, web_config).await?;
    println!("Listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to listen for ctrl-c: {e}"))?;
    println!("exiting");
    Ok(())
}
