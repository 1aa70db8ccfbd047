//! Translation provider abstraction.
//!
//! The dispatch engine only ever talks to the [`TranslationProvider`] trait;
//! the two concrete strategies (DeepL-style direct MT, OpenAI-style
//! generative) live in their own modules and can be swapped via
//! `TRANSLATOR_BACKEND` without touching dispatch logic.

use crate::config::{Backend, Config};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// A successful provider call: the translation plus the source language the
/// provider detected. Detection rides along on every call, which is what lets
/// the probe call double as the language detector.
#[derive(Debug, Clone)]
pub struct Translation {
    pub text: String,
    pub detected_source: String,
}

/// Provider failure taxonomy. Every variant maps to a fixed user-facing
/// message; raw response bodies only ever reach the logs.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider rejected the request as invalid")]
    InvalidRequest,

    #[error("provider authentication failed")]
    AuthenticationFailed,

    #[error("provider rate limit hit")]
    RateLimited,

    #[error("provider quota exhausted")]
    QuotaExceeded,

    #[error("provider unavailable")]
    ServiceUnavailable,

    #[error("provider returned output that could not be parsed")]
    MalformedOutput,

    #[error("network or unknown provider error: {0}")]
    NetworkOrUnknown(String),
}

impl ProviderError {
    /// Map an HTTP status to an error variant. 456 is the classical MT
    /// quota-exhausted code.
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        match status.as_u16() {
            400 => ProviderError::InvalidRequest,
            401 | 403 => ProviderError::AuthenticationFailed,
            429 => ProviderError::RateLimited,
            456 => ProviderError::QuotaExceeded,
            s if s >= 500 => ProviderError::ServiceUnavailable,
            s => ProviderError::NetworkOrUnknown(format!("unexpected status {}", s)),
        }
    }

    /// Fixed, user-safe message rendered inline for a failed target language.
    pub fn user_message(&self) -> &'static str {
        match self {
            ProviderError::InvalidRequest => "translation request was rejected",
            ProviderError::AuthenticationFailed => "translation service credentials are invalid",
            ProviderError::RateLimited => "translation service is busy, try again shortly",
            ProviderError::QuotaExceeded => "translation quota is exhausted",
            ProviderError::ServiceUnavailable => "translation service is temporarily unavailable",
            ProviderError::MalformedOutput => "translation could not be read",
            ProviderError::NetworkOrUnknown(_) => "translation failed unexpectedly",
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::NetworkOrUnknown(err.to_string())
    }
}

/// A backend capable of translating text into a target language while
/// reporting the detected source language.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    async fn translate(&self, text: &str, target: &str) -> Result<Translation, ProviderError>;
}

/// Construct the provider selected by configuration. Credential presence was
/// already validated in `Config::from_env`.
pub fn build(config: &Config, client: reqwest::Client) -> Arc<dyn TranslationProvider> {
    match config.backend {
        Backend::Deepl => Arc::new(crate::deepl::DeeplProvider::new(
            client,
            config.deepl_api_url.clone(),
            config.deepl_api_key.clone().unwrap_or_default(),
        )),
        Backend::OpenAi => Arc::new(crate::openai::OpenAiProvider::new(
            client,
            config.openai_api_url.clone(),
            config.openai_api_key.clone().unwrap_or_default(),
            config.openai_model.clone(),
        )),
    }
}
