//! HTTP surface: the Events API endpoint and the liveness probe.
//!
//! The events handler verifies the request signature, acks immediately, and
//! hands the actual work to a spawned task. Nothing that happens while
//! handling a message can take the process down: the task boundary catches
//! and logs every failure.

use crate::config::Config;
use crate::dispatch::DispatchEngine;
use crate::slack::{self, EventEnvelope};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: Arc<DispatchEngine>,
    pub client: reqwest::Client,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/slack/events", post(slack_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness probe for the hosting platform.
async fn health() -> &'static str {
    "OK"
}

async fn slack_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let timestamp = header_str(&headers, "x-slack-request-timestamp");
    let signature = header_str(&headers, "x-slack-signature");

    let verified = match (timestamp, signature) {
        (Some(ts), Some(sig)) => {
            slack::verify_signature(&state.config.slack_signing_secret, ts, &body, sig)
        }
        _ => false,
    };
    if !verified {
        warn!("Rejected event delivery with bad or missing signature");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let envelope: EventEnvelope = match serde_json::from_str(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Undecodable event payload: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match envelope.kind.as_str() {
        "url_verification" => {
            let challenge = envelope.challenge.unwrap_or_default();
            Json(serde_json::json!({ "challenge": challenge })).into_response()
        }
        "event_callback" => {
            if let Some(inbound) = envelope.event.as_ref().and_then(|e| e.to_inbound()) {
                let state = state.clone();
                // Ack before the work: Slack retries anything slower than 3s
                tokio::spawn(async move {
                    if let Err(e) = process_message(&state, inbound).await {
                        error!("Message handling failed: {:#}", e);
                    }
                });
            }
            StatusCode::OK.into_response()
        }
        other => {
            warn!("Ignoring envelope of type '{}'", other);
            StatusCode::OK.into_response()
        }
    }
}

async fn process_message(
    state: &AppState,
    inbound: crate::dispatch::InboundMessage,
) -> anyhow::Result<()> {
    if let Some(reply) = state.engine.handle(&inbound).await {
        slack::post_reply(
            &state.client,
            &state.config.slack_api_url,
            &state.config.slack_bot_token,
            &reply,
        )
        .await?;
    }
    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
