use anyhow::{bail, Context, Result};
use std::str::FromStr;

/// Which translation backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Classical MT API (DeepL-style): one text/target pair per call.
    #[default]
    Deepl,
    /// Generative chat-completions API returning structured JSON.
    OpenAi,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "deepl" => Ok(Backend::Deepl),
            "openai" => Ok(Backend::OpenAi),
            other => bail!(
                "Unknown TRANSLATOR_BACKEND: '{}' (expected 'deepl' or 'openai')",
                other
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Slack
    pub slack_bot_token: String,
    pub slack_signing_secret: String,
    pub slack_api_url: String,

    // Translation provider
    pub backend: Backend,
    pub deepl_api_key: Option<String>,
    pub deepl_api_url: String,
    pub openai_api_key: Option<String>,
    pub openai_api_url: String,
    pub openai_model: String,

    // Dispatch
    pub probe_target: String,
    pub reuse_probe: bool,

    // Server
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let backend: Backend = std::env::var("TRANSLATOR_BACKEND")
            .unwrap_or_else(|_| "deepl".to_string())
            .parse()?;

        let config = Self {
            // Slack
            slack_bot_token: std::env::var("SLACK_BOT_TOKEN")
                .context("SLACK_BOT_TOKEN not set")?,
            slack_signing_secret: std::env::var("SLACK_SIGNING_SECRET")
                .context("SLACK_SIGNING_SECRET not set")?,
            slack_api_url: std::env::var("SLACK_API_URL")
                .unwrap_or_else(|_| "https://slack.com/api".to_string()),

            // Translation provider
            backend,
            deepl_api_key: std::env::var("DEEPL_API_KEY").ok(),
            deepl_api_url: std::env::var("DEEPL_API_URL")
                .unwrap_or_else(|_| "https://api-free.deepl.com/v2/translate".to_string()),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            openai_api_url: std::env::var("OPENAI_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string()),
            openai_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),

            // Dispatch
            probe_target: std::env::var("PROBE_TARGET").unwrap_or_else(|_| "EN".to_string()),
            reuse_probe: std::env::var("REUSE_PROBE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),

            // Server
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
        };

        // Fail fast at startup rather than at the first translation
        match config.backend {
            Backend::Deepl if config.deepl_api_key.is_none() => {
                bail!("DEEPL_API_KEY not set (required for TRANSLATOR_BACKEND=deepl)")
            }
            Backend::OpenAi if config.openai_api_key.is_none() => {
                bail!("OPENAI_API_KEY not set (required for TRANSLATOR_BACKEND=openai)")
            }
            _ => {}
        }

        Ok(config)
    }
}
