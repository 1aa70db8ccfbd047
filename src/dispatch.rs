//! The dispatch engine: everything between an inbound message and the reply
//! payload.
//!
//! Per message: filter, dedup, probe-translate (which doubles as language
//! detection), resolve the target set, fan out per-target translations
//! concurrently, then buffer every outcome and render sections in routing
//! order. Failures after the probe are contained to their own language
//! section; failures at or before the probe abort the reply silently.

use crate::cache::{EventDeduper, TranslationCache};
use crate::emoji;
use crate::i18n::{self, LanguageInfo};
use crate::provider::{Translation, TranslationProvider};
use futures::future::join_all;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Messages with fewer cleaned characters than this are ignored outright.
const MIN_MESSAGE_CHARS: usize = 5;

/// An inbound chat message, already lifted out of the transport envelope.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Platform-assigned unique id; doubles as the idempotency key and the
    /// thread root for the reply.
    pub id: String,
    pub channel: String,
    pub text: Option<String>,
    /// Set when the message is itself a threaded reply.
    pub thread_parent: Option<String>,
    pub from_bot: bool,
}

/// One rendered target language: either the translation or the fixed
/// user-facing error message for that branch.
#[derive(Debug, Clone)]
pub struct ReplySection {
    pub language: LanguageInfo,
    pub body: Result<String, &'static str>,
}

/// The assembled reply, ready for the gateway to post in-thread.
#[derive(Debug, Clone)]
pub struct Reply {
    pub channel: String,
    pub thread_root: String,
    pub source: LanguageInfo,
    pub sections: Vec<ReplySection>,
}

/// Strip platform mention/channel markup (`<@U…>`, `<#C…|name>`, `<!here>`)
/// and collapse the leftover whitespace.
pub fn clean_text(text: &str) -> String {
    static MARKUP: OnceLock<Regex> = OnceLock::new();
    let markup = MARKUP.get_or_init(|| {
        Regex::new(r"<[@#!][^>]*>").expect("markup pattern is valid")
    });

    let stripped = markup.replace_all(text, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct DispatchEngine {
    provider: Arc<dyn TranslationProvider>,
    cache: Arc<TranslationCache>,
    deduper: Arc<EventDeduper>,
    /// Normalized target language of the probe call.
    probe_target: String,
    /// Whether the probe result may stand in for a matching fan-out target.
    reuse_probe: bool,
}

impl DispatchEngine {
    pub fn new(
        provider: Arc<dyn TranslationProvider>,
        cache: Arc<TranslationCache>,
        deduper: Arc<EventDeduper>,
        probe_target: &str,
        reuse_probe: bool,
    ) -> Self {
        Self {
            provider,
            cache,
            deduper,
            probe_target: i18n::normalize(probe_target),
            reuse_probe,
        }
    }

    /// Process one inbound message end to end.
    ///
    /// `None` means "nothing to post": the message was filtered, a duplicate,
    /// already in a language with no configured targets, or detection failed.
    /// None of those are errors.
    pub async fn handle(&self, msg: &InboundMessage) -> Option<Reply> {
        // Filter: threaded replies, bot senders, empty or too-short text
        if msg.thread_parent.is_some() {
            return None;
        }
        if msg.from_bot {
            return None;
        }
        let text = msg.text.as_deref()?;
        let cleaned = clean_text(text);
        if cleaned.chars().count() < MIN_MESSAGE_CHARS {
            debug!("Skipping short message {}", msg.id);
            return None;
        }

        // At-least-once delivery: only the first arrival gets a reply
        if !self.deduper.first_delivery(&msg.id) {
            debug!("Duplicate delivery of {}, ignoring", msg.id);
            return None;
        }

        let (shielded, glyphs) = emoji::shield(&cleaned);

        // Probe: one translation call whose detected-language side effect is
        // the single source of truth. No separate detect-only call exists.
        let probe = match self.provider.translate(&shielded, &self.probe_target).await {
            Ok(t) => t,
            Err(e) => {
                warn!("Language detection failed for {}: {}", msg.id, e);
                return None;
            }
        };
        self.cache.put(&shielded, &self.probe_target, &probe.text);

        let source = i18n::normalize(&probe.detected_source);
        let targets = i18n::targets_for(&source);
        if targets.is_empty() {
            debug!(
                "No targets configured for source {} (message {})",
                source, msg.id
            );
            return None;
        }

        // Fan-out: one concurrent branch per target, each cache-checked.
        // join_all preserves input order, which is routing order.
        let branches = targets
            .iter()
            .map(|target| self.translate_branch(&shielded, target, &probe, &glyphs));
        let sections = join_all(branches).await;

        Some(Reply {
            channel: msg.channel.clone(),
            thread_root: msg.id.clone(),
            source: i18n::info(&source),
            sections,
        })
    }

    /// One fan-out branch. Failure stays inside the returned section.
    async fn translate_branch(
        &self,
        shielded: &str,
        target: &str,
        probe: &Translation,
        glyphs: &[String],
    ) -> ReplySection {
        let language = i18n::info(target);

        // The probe already translated into this target; a second request
        // would be a cache hit of size one
        if self.reuse_probe && *target == self.probe_target {
            return ReplySection {
                language,
                body: Ok(emoji::unshield(&probe.text, glyphs)),
            };
        }

        if let Some(hit) = self.cache.get(shielded, target) {
            debug!("Cache hit for target {}", target);
            return ReplySection {
                language,
                body: Ok(emoji::unshield(&hit, glyphs)),
            };
        }

        match self.provider.translate(shielded, target).await {
            Ok(translation) => {
                self.cache.put(shielded, target, &translation.text);
                ReplySection {
                    language,
                    body: Ok(emoji::unshield(&translation.text, glyphs)),
                }
            }
            Err(e) => {
                warn!("Translation to {} failed: {}", target, e);
                ReplySection {
                    language,
                    body: Err(e.user_message()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderError, TranslationProvider};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted provider: fixed detected language, per-target translations,
    /// optional per-target failures, and a call log.
    struct FakeProvider {
        detected: String,
        translations: HashMap<String, String>,
        failing: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeProvider {
        fn new(detected: &str, translations: &[(&str, &str)]) -> Self {
            Self {
                detected: detected.to_string(),
                translations: translations
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                failing: Vec::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing_on(mut self, target: &str) -> Self {
            self.failing.push(target.to_string());
            self
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn calls_for(&self, target: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|t| *t == target).count()
        }
    }

    #[async_trait]
    impl TranslationProvider for FakeProvider {
        async fn translate(&self, _text: &str, target: &str) -> Result<Translation, ProviderError> {
            self.calls.lock().unwrap().push(target.to_string());
            if self.failing.contains(&target.to_string()) {
                return Err(ProviderError::ServiceUnavailable);
            }
            let text = self
                .translations
                .get(target)
                .cloned()
                .unwrap_or_else(|| format!("<{}>", target));
            Ok(Translation {
                text,
                detected_source: self.detected.clone(),
            })
        }
    }

    fn engine_with(provider: Arc<FakeProvider>) -> DispatchEngine {
        DispatchEngine::new(
            provider,
            Arc::new(TranslationCache::new()),
            Arc::new(EventDeduper::new()),
            "EN",
            true,
        )
    }

    fn message(id: &str, text: &str) -> InboundMessage {
        InboundMessage {
            id: id.to_string(),
            channel: "C123".to_string(),
            text: Some(text.to_string()),
            thread_parent: None,
            from_bot: false,
        }
    }

    // ==================== clean_text Tests ====================

    #[test]
    fn test_clean_text_strips_mentions() {
        assert_eq!(clean_text("<@U123ABC> hello there"), "hello there");
    }

    #[test]
    fn test_clean_text_strips_channel_references() {
        assert_eq!(clean_text("see <#C042XYZ|general> please"), "see please");
    }

    #[test]
    fn test_clean_text_strips_broadcast_tokens() {
        assert_eq!(clean_text("<!here> standup now"), "standup now");
    }

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  hello   world  "), "hello world");
    }

    #[test]
    fn test_clean_text_plain_passthrough() {
        assert_eq!(clean_text("nothing to strip"), "nothing to strip");
    }

    // ==================== Filter Tests ====================

    #[tokio::test]
    async fn test_short_message_makes_no_calls() {
        let provider = Arc::new(FakeProvider::new("EN", &[]));
        let engine = engine_with(provider.clone());

        // Exactly 4 characters: below the threshold
        let reply = engine.handle(&message("1", "hola")).await;
        assert!(reply.is_none());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_mention_only_message_makes_no_calls() {
        let provider = Arc::new(FakeProvider::new("EN", &[]));
        let engine = engine_with(provider.clone());

        let reply = engine.handle(&message("1", "<@U123> <@U456>")).await;
        assert!(reply.is_none());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_threaded_reply_is_ignored() {
        let provider = Arc::new(FakeProvider::new("EN", &[]));
        let engine = engine_with(provider.clone());

        let mut msg = message("1", "a perfectly long message");
        msg.thread_parent = Some("1727.0001".to_string());
        assert!(engine.handle(&msg).await.is_none());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_bot_message_is_ignored() {
        let provider = Arc::new(FakeProvider::new("EN", &[]));
        let engine = engine_with(provider.clone());

        let mut msg = message("1", "a perfectly long message");
        msg.from_bot = true;
        assert!(engine.handle(&msg).await.is_none());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_textless_message_is_ignored() {
        let provider = Arc::new(FakeProvider::new("EN", &[]));
        let engine = engine_with(provider.clone());

        let mut msg = message("1", "");
        msg.text = None;
        assert!(engine.handle(&msg).await.is_none());
        assert_eq!(provider.call_count(), 0);
    }

    // ==================== Dedup Tests ====================

    #[tokio::test]
    async fn test_redelivered_message_replies_once() {
        let provider = Arc::new(FakeProvider::new(
            "EN",
            &[("EN", "same"), ("PT-BR", "Olá time"), ("ES", "Hola equipo")],
        ));
        let engine = engine_with(provider.clone());

        let msg = message("C123:1728.0001", "Hello team, great work today");
        assert!(engine.handle(&msg).await.is_some());
        assert!(engine.handle(&msg).await.is_none());
    }

    // ==================== Core Scenario Tests ====================

    #[tokio::test]
    async fn test_english_message_fans_out_in_routing_order() {
        let provider = Arc::new(FakeProvider::new(
            "EN",
            &[("PT-BR", "Olá time, ótimo trabalho hoje"), ("ES", "Hola equipo, gran trabajo hoy")],
        ));
        let engine = engine_with(provider.clone());

        let reply = engine
            .handle(&message("1", "Hello team, great work today"))
            .await
            .expect("should produce a reply");

        assert_eq!(reply.sections.len(), 2);
        assert_eq!(reply.sections[0].language.code, "PT-BR");
        assert_eq!(reply.sections[1].language.code, "ES");
        assert_eq!(
            reply.sections[0].body.as_deref(),
            Ok("Olá time, ótimo trabalho hoje")
        );
        assert_eq!(reply.source.display_name, "English");
        assert_eq!(reply.source.emoji, "🇺🇸");
        assert_eq!(reply.thread_root, "1");
    }

    #[tokio::test]
    async fn test_source_language_never_among_sections() {
        let provider = Arc::new(FakeProvider::new("ES", &[("EN", "Hi"), ("PT-BR", "Oi")]));
        let engine = engine_with(provider.clone());

        let reply = engine
            .handle(&message("1", "Hola equipo, gran trabajo"))
            .await
            .unwrap();

        assert!(reply.sections.iter().all(|s| s.language.code != "ES"));
        assert_eq!(reply.sections.len(), 2);
    }

    #[tokio::test]
    async fn test_probe_result_reused_for_matching_target() {
        // Spanish source, probe target EN. EN is also a fan-out target, so
        // the probe translation is reused instead of re-requested.
        let provider = Arc::new(FakeProvider::new(
            "ES",
            &[("EN", "Hello team"), ("PT-BR", "Olá time")],
        ));
        let engine = engine_with(provider.clone());

        let reply = engine
            .handle(&message("1", "Hola equipo, gran trabajo"))
            .await
            .unwrap();

        // One probe call to EN, one fan-out call to PT-BR
        assert_eq!(provider.calls_for("EN"), 1);
        assert_eq!(provider.calls_for("PT-BR"), 1);
        assert_eq!(reply.sections[0].body.as_deref(), Ok("Hello team"));
    }

    #[tokio::test]
    async fn test_probe_reuse_disabled_rerequests_target() {
        let provider = Arc::new(FakeProvider::new(
            "ES",
            &[("EN", "Hello team"), ("PT-BR", "Olá time")],
        ));
        let engine = DispatchEngine::new(
            provider.clone(),
            Arc::new(TranslationCache::new()),
            Arc::new(EventDeduper::new()),
            "EN",
            false,
        );

        engine
            .handle(&message("1", "Hola equipo, gran trabajo"))
            .await
            .unwrap();

        // Probe put its result in the generic cache, so the EN branch still
        // resolves without a second provider call
        assert_eq!(provider.calls_for("EN"), 1);
    }

    #[tokio::test]
    async fn test_unrouted_source_language_stops_silently() {
        let provider = Arc::new(FakeProvider::new("FR", &[]));
        let engine = engine_with(provider.clone());

        let reply = engine.handle(&message("1", "Bonjour à tous les amis")).await;
        assert!(reply.is_none());
        // Only the probe went out
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_detection_failure_aborts_silently() {
        let provider = Arc::new(FakeProvider::new("EN", &[]).failing_on("EN"));
        let engine = engine_with(provider.clone());

        let reply = engine.handle(&message("1", "Hello team, great work")).await;
        assert!(reply.is_none());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_isolated_to_its_section() {
        let provider = Arc::new(
            FakeProvider::new("EN", &[("ES", "Hola equipo, gran trabajo hoy")])
                .failing_on("PT-BR"),
        );
        let engine = engine_with(provider.clone());

        let reply = engine
            .handle(&message("1", "Hello team, great work today"))
            .await
            .unwrap();

        // Both sections present, in routing order, failure rendered inline
        assert_eq!(reply.sections.len(), 2);
        assert_eq!(reply.sections[0].language.code, "PT-BR");
        assert!(reply.sections[0].body.is_err());
        assert_eq!(
            reply.sections[1].body.as_deref(),
            Ok("Hola equipo, gran trabajo hoy")
        );
    }

    #[tokio::test]
    async fn test_portuguese_variant_detection_normalized() {
        // Provider reports bare "PT"; routing and rendering treat it as PT-BR
        let provider = Arc::new(FakeProvider::new(
            "PT",
            &[("EN", "Hello team"), ("ES", "Hola equipo")],
        ));
        let engine = engine_with(provider.clone());

        let reply = engine
            .handle(&message("1", "Olá time, ótimo trabalho"))
            .await
            .unwrap();

        assert_eq!(reply.source.code, "PT-BR");
        assert_eq!(reply.source.emoji, "🇧🇷");
        let codes: Vec<&str> = reply.sections.iter().map(|s| s.language.code.as_str()).collect();
        assert_eq!(codes, vec!["EN", "ES"]);
    }

    #[tokio::test]
    async fn test_second_identical_message_hits_cache() {
        let provider = Arc::new(FakeProvider::new(
            "EN",
            &[("PT-BR", "Olá time"), ("ES", "Hola equipo")],
        ));
        let engine = engine_with(provider.clone());

        engine
            .handle(&message("1", "Hello team, great work today"))
            .await
            .unwrap();
        let calls_after_first = provider.call_count();

        let reply = engine
            .handle(&message("2", "Hello team, great work today"))
            .await
            .unwrap();

        // Second message: probe call only; both fan-out targets were cached
        // (EN probe result reused, PT-BR and ES from the generic cache)
        assert_eq!(provider.call_count(), calls_after_first + 1);
        assert_eq!(reply.sections[0].body.as_deref(), Ok("Olá time"));
        assert_eq!(reply.sections[1].body.as_deref(), Ok("Hola equipo"));
    }

    #[tokio::test]
    async fn test_emoji_survive_translation() {
        // FakeProvider echoes the placeholder token back, as a well-behaved
        // provider would
        struct EchoProvider;

        #[async_trait]
        impl TranslationProvider for EchoProvider {
            async fn translate(
                &self,
                text: &str,
                _target: &str,
            ) -> Result<Translation, ProviderError> {
                Ok(Translation {
                    text: format!("xlat: {}", text),
                    detected_source: "EN".to_string(),
                })
            }
        }

        let engine = DispatchEngine::new(
            Arc::new(EchoProvider),
            Arc::new(TranslationCache::new()),
            Arc::new(EventDeduper::new()),
            "EN",
            true,
        );

        let reply = engine
            .handle(&message("1", "great work today 🎉"))
            .await
            .unwrap();

        for section in &reply.sections {
            let body = section.body.as_deref().unwrap();
            assert!(body.contains('🎉'), "emoji missing from '{}'", body);
            assert!(!body.contains("[[EMJ"), "placeholder leaked: '{}'", body);
        }
    }
}
