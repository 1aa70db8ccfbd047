//! Language registry: single source of truth for supported languages.
//!
//! Lookup is a total function: unknown codes fall back to generic metadata
//! instead of erroring, so a surprising detection result from a provider can
//! never break reply rendering.

/// Display metadata for a language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageInfo {
    /// Normalized language code (e.g., "EN", "ES", "PT-BR")
    pub code: String,

    /// Flag emoji shown next to the language in replies
    pub emoji: String,

    /// English display name (e.g., "English", "Spanish")
    pub display_name: String,
}

/// Known languages: (code, emoji, display name).
const LANGUAGES: &[(&str, &str, &str)] = &[
    ("EN", "🇺🇸", "English"),
    ("ES", "🇪🇸", "Spanish"),
    ("PT-BR", "🇧🇷", "Portuguese"),
    ("FR", "🇫🇷", "French"),
    ("DE", "🇩🇪", "German"),
    ("IT", "🇮🇹", "Italian"),
    ("JA", "🇯🇵", "Japanese"),
];

/// Fallback emoji for codes the catalog doesn't know.
const FALLBACK_EMOJI: &str = "🏳️";

/// Normalize a language code for lookups and cache keys.
///
/// Codes are upper-cased, and all regional Portuguese variants (PT, PT-BR,
/// PT-PT) collapse to the single canonical "PT-BR" code.
pub fn normalize(code: &str) -> String {
    let upper = code.trim().to_uppercase();
    if upper == "PT" || upper.starts_with("PT-") {
        "PT-BR".to_string()
    } else {
        upper
    }
}

/// Look up display metadata for a language code.
///
/// Never fails: unmapped codes get a generic flag and the code itself as the
/// display name.
pub fn info(code: &str) -> LanguageInfo {
    let normalized = normalize(code);
    match LANGUAGES.iter().find(|(c, _, _)| *c == normalized) {
        Some((code, emoji, name)) => LanguageInfo {
            code: code.to_string(),
            emoji: emoji.to_string(),
            display_name: name.to_string(),
        },
        None => LanguageInfo {
            code: normalized.clone(),
            emoji: FALLBACK_EMOJI.to_string(),
            display_name: normalized,
        },
    }
}
