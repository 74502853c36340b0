//! REST endpoint handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chatwin::gate::{ChatGate, InboundMessage};
use chatwin::prompt::{PromptSource, StaticPromptSource};
use chatwin::responder::Responder;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct WebState {
    responder: Responder,
    gate: Arc<ChatGate>,
    bot_name: Arc<str>,
    prompt_source: Arc<dyn PromptSource>,
}

impl WebState {
    /// State with an empty prompt source; refreshes install just the
    /// identity line until [`with_prompt_source`](Self::with_prompt_source)
    /// is called.
    pub fn new(responder: Responder, gate: ChatGate, bot_name: impl Into<String>) -> Self {
        let bot_name: String = bot_name.into();
        Self {
            responder,
            gate: Arc::new(gate),
            bot_name: Arc::from(bot_name),
            prompt_source: Arc::new(StaticPromptSource::default()),
        }
    }

    pub fn with_prompt_source(mut self, source: Arc<dyn PromptSource>) -> Self {
        self.prompt_source = source;
        self
    }

    pub fn responder(&self) -> &Responder {
        &self.responder
    }

    /// Rebuild the system prompt from the configured source.
    pub async fn refresh_prompt(&self) -> Result<(), String> {
        self.responder
            .prompt()
            .refresh(&self.bot_name, self.prompt_source.as_ref())
            .await
    }
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(json!({ "error": error }))).into_response()
}

/// POST /api/messages — Deliver an inbound chat message.
///
/// Returns 200 with `{"reply": ...}` when the bot answers, 204 when the gate
/// ignores the message, and 502 when the completion call fails.
pub async fn post_message(
    State(app): State<WebState>,
    Json(msg): Json<InboundMessage>,
) -> Response {
    if !app.gate.should_respond(&msg) {
        debug!("Ignoring message in channel {}", msg.channel_id);
        return StatusCode::NO_CONTENT.into_response();
    }

    match app.responder.respond(&msg.content).await {
        Ok(reply) => Json(json!({ "reply": reply })).into_response(),
        Err(e) => {
            warn!("No reply sent: {e}");
            error_response(StatusCode::BAD_GATEWAY, e)
        }
    }
}

/// Request body for POST /api/refresh-prompt.
#[derive(Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub author_roles: Vec<String>,
}

/// POST /api/refresh-prompt — Rebuild the system prompt.
///
/// Only callers who may chat may refresh. Returns 403 otherwise, and 502
/// (with the previous prompt still in place) when the source fails.
pub async fn post_refresh_prompt(
    State(app): State<WebState>,
    Json(body): Json<RefreshRequest>,
) -> Response {
    if !app.gate.can_chat(&body.author_roles) {
        return error_response(StatusCode::FORBIDDEN, "not allowed".to_string());
    }

    match app.refresh_prompt().await {
        Ok(()) => Json(json!({ "status": "Refreshed prompt." })).into_response(),
        Err(e) => {
            warn!("Prompt refresh failed: {e}");
            error_response(StatusCode::BAD_GATEWAY, e)
        }
    }
}

/// GET /api/context — The snapshot that the next completion would see,
/// plus buffer counters.
pub async fn get_context(State(app): State<WebState>) -> Json<serde_json::Value> {
    let (messages, stats) = app
        .responder
        .buffer()
        .snapshot_with_stats(app.responder.prompt());
    Json(json!({ "messages": messages, "stats": stats }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_request_defaults_roles() {
        let req: RefreshRequest = serde_json::from_str("{}").unwrap();
        assert!(req.author_roles.is_empty());
    }

    #[test]
    fn refresh_request_deserializes_roles() {
        let req: RefreshRequest = serde_json::from_str(r#"{"author_roles":["a","b"]}"#).unwrap();
        assert_eq!(req.author_roles, vec!["a", "b"]);
    }
}
