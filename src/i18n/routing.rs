//! Translation routing: which target languages each source fans out to.

use crate::i18n::registry::normalize;

/// Routing table: normalized source code -> ordered target codes.
///
/// Reply sections render in this order regardless of which concurrent
/// translation finishes first.
const ROUTES: &[(&str, &[&str])] = &[
    ("EN", &["PT-BR", "ES"]),
    ("PT-BR", &["EN", "ES"]),
    ("ES", &["EN", "PT-BR"]),
];

/// The whole routing table as (source, targets) pairs, for providers that
/// take the complete policy in a single instruction.
pub fn policy() -> &'static [(&'static str, &'static [&'static str])] {
    ROUTES
}

/// Resolve the target-language set for a detected source language.
///
/// The source itself is filtered out of its own targets even if the table
/// (or a provider echoing the source) would include it. An unknown source
/// yields an empty set, which the dispatcher treats as "no reply".
pub fn targets_for(source: &str) -> Vec<String> {
    let source = normalize(source);
    ROUTES
        .iter()
        .find(|(s, _)| *s == source)
        .map(|(_, targets)| {
            targets
                .iter()
                .map(|t| normalize(t))
                .filter(|t| *t != source)
                .collect()
        })
        .unwrap_or_default()
}
