//! Slack gateway: event payload types, request signature verification, and
//! posting the rendered reply back in-thread.

use crate::dispatch::{InboundMessage, Reply};
use anyhow::{bail, Context, Result};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;
use tracing::info;

type HmacSha256 = Hmac<Sha256>;

/// Reject event deliveries whose timestamp drifts further than this; a stale
/// signed request could be a replay.
const MAX_SIGNATURE_AGE: Duration = Duration::from_secs(300);

/// A hung chat API must not pin the reply task; same bound as direct MT.
const POST_TIMEOUT: Duration = Duration::from_secs(10);

// ==================== Inbound event types ====================

/// Top-level Events API envelope.
#[derive(Debug, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    /// Present only on url_verification handshakes.
    pub challenge: Option<String>,
    pub event: Option<MessageEvent>,
}

/// The `message` event inside an event_callback envelope.
#[derive(Debug, Deserialize)]
pub struct MessageEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub subtype: Option<String>,
    pub channel: Option<String>,
    pub text: Option<String>,
    pub ts: Option<String>,
    pub thread_ts: Option<String>,
    pub bot_id: Option<String>,
}

impl MessageEvent {
    /// Lift the platform event into the engine's transport-free message type.
    /// Returns None for events that aren't plain channel messages.
    pub fn to_inbound(&self) -> Option<InboundMessage> {
        if self.kind != "message" {
            return None;
        }
        let channel = self.channel.clone()?;
        let ts = self.ts.clone()?;

        let from_bot =
            self.bot_id.is_some() || self.subtype.as_deref() == Some("bot_message");

        Some(InboundMessage {
            // channel-qualified, since ts values are only unique per channel
            id: format!("{}:{}", channel, ts),
            channel,
            text: self.text.clone(),
            thread_parent: self.thread_ts.clone().filter(|parent| *parent != ts),
            from_bot,
        })
    }
}

// ==================== Signature verification ====================

/// Constant-time string comparison, for signature checks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Verify a Slack request signature (`v0=` HMAC-SHA256 over
/// `v0:<timestamp>:<body>`), including timestamp freshness.
pub fn verify_signature(
    signing_secret: &str,
    timestamp: &str,
    body: &str,
    signature: &str,
) -> bool {
    let Ok(ts) = timestamp.parse::<u64>() else {
        return false;
    };
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    if now.abs_diff(ts) > MAX_SIGNATURE_AGE.as_secs() {
        return false;
    }

    let Ok(mut mac) = HmacSha256::new_from_slice(signing_secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("v0:{}:{}", timestamp, body).as_bytes());
    let expected = format!("v0={}", hex::encode(mac.finalize().into_bytes()));

    constant_time_compare(&expected, signature)
}

#[cfg(test)]
pub fn sign(signing_secret: &str, timestamp: &str, body: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes()).unwrap();
    mac.update(format!("v0:{}:{}", timestamp, body).as_bytes());
    format!("v0={}", hex::encode(mac.finalize().into_bytes()))
}

// ==================== Reply rendering ====================

/// Render a reply into Slack blocks plus a plain-text fallback for
/// notification surfaces that can't show blocks.
///
/// Sections appear in the order the dispatcher resolved them (routing order);
/// failed languages render their error message in italics instead of being
/// omitted.
pub fn render_reply(reply: &Reply) -> (String, Vec<serde_json::Value>) {
    let mut blocks = Vec::with_capacity(reply.sections.len() + 2);
    let mut fallback = String::from("Translations");

    blocks.push(serde_json::json!({
        "type": "section",
        "text": { "type": "mrkdwn", "text": "🌐 *Translations*" }
    }));

    for section in &reply.sections {
        let label = format!("{} {}", section.language.emoji, section.language.display_name);
        let body = match &section.body {
            Ok(text) => text.clone(),
            Err(message) => format!("_{}_", message),
        };
        blocks.push(serde_json::json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("*{}*\n{}", label, body) }
        }));

        let fallback_body = match &section.body {
            Ok(text) => text.as_str(),
            Err(message) => message,
        };
        fallback.push_str(&format!("\n{}: {}", label, fallback_body));
    }

    let origin = format!(
        "Original: {} {}",
        reply.source.emoji, reply.source.display_name
    );
    blocks.push(serde_json::json!({
        "type": "context",
        "elements": [ { "type": "mrkdwn", "text": origin } ]
    }));
    fallback.push_str(&format!("\n{}", origin));

    (fallback, blocks)
}

// ==================== Outbound ====================

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    error: Option<String>,
}

/// Post the reply as a threaded message under the original.
pub async fn post_reply(
    client: &reqwest::Client,
    api_url: &str,
    bot_token: &str,
    reply: &Reply,
) -> Result<()> {
    let (fallback, blocks) = render_reply(reply);

    // The dispatcher's idempotency key is "channel:ts"; the thread root is
    // the ts part
    let thread_ts = reply
        .thread_root
        .rsplit(':')
        .next()
        .unwrap_or(&reply.thread_root);

    let payload = serde_json::json!({
        "channel": reply.channel,
        "thread_ts": thread_ts,
        "text": fallback,
        "blocks": blocks,
    });

    let response = client
        .post(format!("{}/chat.postMessage", api_url))
        .header("Authorization", format!("Bearer {}", bot_token))
        .json(&payload)
        .timeout(POST_TIMEOUT)
        .send()
        .await
        .context("Failed to send chat.postMessage request")?;

    if !response.status().is_success() {
        bail!("chat.postMessage returned HTTP {}", response.status());
    }

    let body: PostMessageResponse = response
        .json()
        .await
        .context("Failed to parse chat.postMessage response")?;
    if !body.ok {
        bail!(
            "chat.postMessage rejected: {}",
            body.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }

    info!(
        "Posted translations for {} ({} sections)",
        reply.thread_root,
        reply.sections.len()
    );
    Ok(())
}
