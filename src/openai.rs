//! Generative strategy: prompt-driven translation through an OpenAI-style
//! chat-completions API.
//!
//! Unlike direct MT, a generative model can detect the source language and
//! produce every required target in one completion. The prompt carries the
//! whole routing policy; the parsed output is memoized by source text so
//! the per-target `translate` calls that follow the first one are served
//! without another round trip.
//!
//! Model output is parsed defensively: code fences are stripped before
//! structural parsing, and a parse failure or a non-"stop" finish reason is
//! a soft failure ([`ProviderError::MalformedOutput`]) rather than a crash.

use crate::i18n;
use crate::provider::{ProviderError, Translation, TranslationProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

/// Generative calls are slower than direct MT; allow a larger bound.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const LOGGED_BODY_LIMIT: usize = 256;

/// A parsed completion only needs to outlive the fan-out of the message
/// that triggered it.
const MEMO_TTL: Duration = Duration::from_secs(60);
const MEMO_MAX_ENTRIES: usize = 256;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_completion_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
    finish_reason: Option<String>,
}

/// The structured payload the model is asked to produce.
#[derive(Debug, Deserialize)]
struct StructuredOutput {
    detected_language: String,
    translations: Vec<LangText>,
}

#[derive(Debug, Deserialize)]
struct LangText {
    lang: String,
    text: String,
}

/// One parsed completion: the detected source plus every translation the
/// model returned, with language labels normalized.
#[derive(Debug)]
struct CompletionSet {
    detected: String,
    translations: Vec<(String, String)>,
    parsed_at: Instant,
}

fn build_system_prompt(requested: &str) -> String {
    let policy = i18n::policy()
        .iter()
        .map(|(source, targets)| format!("- {} -> {}", source, targets.join(", ")))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"You are a professional translator for a chat workspace.

Identify the language the user's message is written in, then translate it
into every target this policy names for that language:

{policy}
- any other language -> {requested}

Always include a translation into {requested}, even when the policy already
covers it.

Rules:
- Do NOT translate tokens of the form [[EMJ0]], [[EMJ1]], ...; copy them
  through exactly where they appear.
- Keep @mentions, URLs, and proper names unchanged.
- Preserve line breaks.

Respond with ONLY this JSON, no prose and no markdown fences, one entry per
target language:
{{"detected_language": "<ISO code of the source language>", "translations": [{{"lang": "<target code>", "text": "<translation>"}}]}}"#
    )
}

/// Strip a ``` or ```json fence wrapping the whole payload, if present.
/// Models add these despite instructions not to.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the fence's info string ("json") up to the first newline
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.trim().strip_suffix("```").unwrap_or(rest).trim()
}

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    memo: Mutex<HashMap<[u8; 32], CompletionSet>>,
}

impl OpenAiProvider {
    pub fn new(client: reqwest::Client, api_url: String, api_key: String, model: String) -> Self {
        Self {
            client,
            api_url,
            api_key,
            model,
            memo: Mutex::new(HashMap::new()),
        }
    }

    fn memo_key(text: &str) -> [u8; 32] {
        Sha256::digest(text.as_bytes()).into()
    }

    /// Decode the model's message content into a [`CompletionSet`].
    fn decode(content: &str) -> Result<CompletionSet, ProviderError> {
        let payload = strip_code_fences(content);
        let parsed: StructuredOutput = serde_json::from_str(payload).map_err(|e| {
            warn!("Model output was not valid structured JSON: {}", e);
            ProviderError::MalformedOutput
        })?;

        Ok(CompletionSet {
            detected: parsed.detected_language,
            translations: parsed
                .translations
                .into_iter()
                .map(|t| (i18n::normalize(&t.lang), t.text))
                .collect(),
            parsed_at: Instant::now(),
        })
    }

    /// Pull the translation for `wanted` (already normalized) out of a
    /// completion set.
    fn pick(set: &CompletionSet, wanted: &str) -> Option<Translation> {
        let text = set
            .translations
            .iter()
            .find(|(lang, _)| lang == wanted)
            .map(|(_, text)| text.clone())
            .or_else(|| {
                // A single unlabeled-but-lone entry is still usable
                match set.translations.as_slice() {
                    [(_, only)] => Some(only.clone()),
                    _ => None,
                }
            })?;
        Some(Translation {
            text,
            detected_source: set.detected.clone(),
        })
    }

    fn memo_get(&self, text: &str, wanted: &str) -> Option<Translation> {
        let key = Self::memo_key(text);
        let mut memo = self.memo.lock().expect("completion memo lock poisoned");
        match memo.get(&key) {
            Some(set) if set.parsed_at.elapsed() < MEMO_TTL => Self::pick(set, wanted),
            Some(_) => {
                memo.remove(&key);
                None
            }
            None => None,
        }
    }

    fn memo_put(&self, text: &str, set: CompletionSet) {
        let mut memo = self.memo.lock().expect("completion memo lock poisoned");
        if memo.len() >= MEMO_MAX_ENTRIES {
            memo.clear();
        }
        memo.insert(Self::memo_key(text), set);
    }
}

#[async_trait]
impl TranslationProvider for OpenAiProvider {
    async fn translate(&self, text: &str, target: &str) -> Result<Translation, ProviderError> {
        let wanted = i18n::normalize(target);
        if let Some(hit) = self.memo_get(text, &wanted) {
            return Ok(hit);
        }

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: build_system_prompt(&wanted),
                },
                Message {
                    role: "user".to_string(),
                    content: text.to_string(),
                },
            ],
            max_completion_tokens: 2000,
            temperature: 0.3,
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            let body: String = body.chars().take(LOGGED_BODY_LIMIT).collect();
            warn!("OpenAI API error ({}): {}", status, body);
            return Err(ProviderError::from_status(status));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            warn!("Failed to parse chat completion envelope: {}", e);
            ProviderError::MalformedOutput
        })?;

        let choice = chat.choices.first().ok_or(ProviderError::MalformedOutput)?;

        // Truncated or safety-blocked completions are unusable even when the
        // content parses
        let finish = choice.finish_reason.as_deref().unwrap_or("stop");
        if !finish.eq_ignore_ascii_case("stop") {
            warn!("Completion finished with reason '{}', discarding", finish);
            return Err(ProviderError::MalformedOutput);
        }

        let set = Self::decode(&choice.message.content)?;
        let result = Self::pick(&set, &wanted).ok_or_else(|| {
            warn!("Model output had no translation for {}", wanted);
            ProviderError::MalformedOutput
        });
        self.memo_put(text, set);
        result
    }
}
