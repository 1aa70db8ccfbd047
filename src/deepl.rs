//! Direct MT strategy: DeepL-style translation API.
//!
//! One text/target pair per call. The response reports the detected source
//! language alongside the translation, so callers never need a separate
//! detect-only request.

use crate::provider::{ProviderError, Translation, TranslationProvider};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

/// Direct MT calls are fast; keep the bound tight.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How much of an error body is worth logging.
const LOGGED_BODY_LIMIT: usize = 256;

#[derive(Debug, Deserialize)]
struct DeeplResponse {
    translations: Vec<DeeplTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeeplTranslation {
    detected_source_language: String,
    text: String,
}

pub struct DeeplProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl DeeplProvider {
    pub fn new(client: reqwest::Client, api_url: String, api_key: String) -> Self {
        Self {
            client,
            api_url,
            api_key,
        }
    }
}

#[async_trait]
impl TranslationProvider for DeeplProvider {
    async fn translate(&self, text: &str, target: &str) -> Result<Translation, ProviderError> {
        let params = [("text", text), ("target_lang", target)];

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .form(&params)
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
            warn!("DeepL API error ({}): {}", status, body);
            return Err(ProviderError::from_status(status));
        }

        let parsed: DeeplResponse = response.json().await.map_err(|e| {
            warn!("Failed to parse DeepL response: {}", e);
            ProviderError::MalformedOutput
        })?;

        let first = parsed
            .translations
            .into_iter()
            .next()
            .ok_or(ProviderError::MalformedOutput)?;

        Ok(Translation {
            text: first.text,
            detected_source: first.detected_source_language,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> DeeplProvider {
        DeeplProvider::new(
            reqwest::Client::new(),
            format!("{}/v2/translate", server.uri()),
            "test-deepl-key".to_string(),
        )
    }

    fn deepl_response(detected: &str, text: &str) -> serde_json::Value {
        serde_json::json!({
            "translations": [
                { "detected_source_language": detected, "text": text }
            ]
        })
    }

    #[tokio::test]
    async fn test_translate_success_carries_detected_language() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/translate"))
            .and(header("Authorization", "DeepL-Auth-Key test-deepl-key"))
            .and(body_string_contains("target_lang=ES"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(deepl_response("EN", "Hola equipo")),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let result = provider.translate("Hello team", "ES").await.unwrap();

        assert_eq!(result.text, "Hola equipo");
        assert_eq!(result.detected_source, "EN");
    }

    #[tokio::test]
    async fn test_translate_maps_auth_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/translate"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Wrong key"))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider.translate("Hello", "ES").await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed));
    }

    #[tokio::test]
    async fn test_translate_maps_quota_exhausted() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/translate"))
            .respond_with(ResponseTemplate::new(456).set_body_string("Quota exceeded"))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider.translate("Hello", "ES").await.unwrap_err();
        assert!(matches!(err, ProviderError::QuotaExceeded));
    }

    #[tokio::test]
    async fn test_translate_maps_rate_limit() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/translate"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Slow down"))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider.translate("Hello", "ES").await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited));
    }

    #[tokio::test]
    async fn test_translate_server_error_is_unavailable() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/translate"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider.translate("Hello", "ES").await.unwrap_err();
        assert!(matches!(err, ProviderError::ServiceUnavailable));
    }

    #[tokio::test]
    async fn test_translate_empty_translations_is_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/translate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"translations": []})),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider.translate("Hello", "ES").await.unwrap_err();
        assert!(matches!(err, ProviderError::MalformedOutput));
    }

    #[tokio::test]
    async fn test_translate_network_error() {
        // Nothing listening on this port
        let provider = DeeplProvider::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1/v2/translate".to_string(),
            "key".to_string(),
        );
        let err = provider.translate("Hello", "ES").await.unwrap_err();
        assert!(matches!(err, ProviderError::NetworkOrUnknown(_)));
    }
}
