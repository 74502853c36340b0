//! HTTP front end for a chatwin conversation bot.
//!
//! `chatwin-web` exposes a small axum API that plays the role of the chat
//! platform: it delivers inbound messages, runs the prompt-refresh command,
//! and lets operators inspect the current context window.
//!
//! # Quick start
//!
//! ```ignore
//! use chatwin::prelude::*;
//! use chatwin_web::{WebConfig, WebState, spawn_web};
//! use std::sync::Arc;
//!
//! let config = ChatConfig::from_env();
//! let responder = Responder::new(
//!     Arc::new(config.build_buffer()),
//!     Arc::new(PromptStore::default()),
//!     Arc::new(config.build_sink(api_key)?),
//! );
//! let state = WebState::new(responder, config.build_gate(), config.bot_name.clone())
//!     .with_prompt_source(Arc::new(FilePromptSource::new("pinned.txt")));
//!
//! let addr = spawn_web(state, WebConfig::default()).await?;
//! println!("Listening on http://{addr}");
//! ```
//!
//! # Endpoints
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | `POST` | `/api/messages` | Inbound chat message; replies when the gate admits it |
//! | `POST` | `/api/refresh-prompt` | Rebuild the system prompt (role-gated) |
//! | `GET` | `/api/context` | Current snapshot and buffer stats |

mod api;
mod server;

pub use api::WebState;
pub use server::build_router;

use std::net::SocketAddr;

/// Configuration for the web server.
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:3001`.
    pub bind_addr: SocketAddr,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
        }
    }
}

/// Bind the server and serve it on a Tokio task.
///
/// Returns the bound address (useful with port 0). The server runs until the
/// Tokio runtime shuts down.
pub async fn spawn_web(state: WebState, config: WebConfig) -> Result<SocketAddr, String> {
    let router = server::build_router(state);
    server::start_server(router, config.bind_addr).await
}
