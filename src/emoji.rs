//! Reversible emoji shielding.
//!
//! MT backends are unreliable at preserving pictographic glyphs: they get
//! translated into descriptions, dropped, or moved. Before a provider call we
//! swap each glyph run for an indexed placeholder token, and swap the originals
//! back in afterwards. Translation engines occasionally mangle the tokens
//! themselves (case changes, inserted spaces), so restoration tolerates that.

use regex::Regex;
use unicode_properties::UnicodeEmoji;

/// Placeholder for glyph run `i` looks like `[[EMJ0]]`, `[[EMJ1]]`, ...
fn placeholder(index: usize) -> String {
    format!("[[EMJ{}]]", index)
}

/// True for characters a translation engine should never see: emoji with
/// presentation or pictographic properties. ASCII is excluded because the
/// Unicode Emoji property covers digits, '#' and '*'.
fn is_pictographic(c: char) -> bool {
    !c.is_ascii() && c.is_emoji_char()
}

/// True for characters that extend a glyph run already in progress:
/// zero-width joiners, variation selectors, skin-tone modifiers and the
/// other emoji-component code points (tag characters, regional indicators).
fn extends_run(c: char) -> bool {
    matches!(c, '\u{200D}' | '\u{FE0E}' | '\u{FE0F}')
        || (!c.is_ascii() && c.is_emoji_char_or_emoji_component())
}

/// Replace each emoji/pictograph run with an indexed placeholder.
///
/// Returns the rewritten text plus the original glyph runs in order. Texts
/// without glyphs come back unchanged with an empty list, so the caller can
/// skip any provider-side directives entirely.
pub fn shield(text: &str) -> (String, Vec<String>) {
    let mut out = String::with_capacity(text.len());
    let mut glyphs: Vec<String> = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if is_pictographic(c) {
            let mut run = String::new();
            run.push(c);
            while let Some(&next) = chars.peek() {
                if is_pictographic(next) || extends_run(next) {
                    run.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            out.push_str(&placeholder(glyphs.len()));
            glyphs.push(run);
        } else {
            out.push(c);
        }
    }

    (out, glyphs)
}

/// Put the original glyphs back in place of their placeholders.
///
/// Tries the exact token first, then a tolerant pattern that accepts case
/// changes and inserted spaces around the token. A placeholder the provider
/// destroyed beyond that is left as literal text rather than guessed at.
pub fn unshield(text: &str, glyphs: &[String]) -> String {
    let mut result = text.to_string();

    for (index, glyph) in glyphs.iter().enumerate() {
        let exact = placeholder(index);
        if let Some(pos) = result.find(&exact) {
            result.replace_range(pos..pos + exact.len(), glyph);
            continue;
        }

        // Tolerate "[[ emj0 ]]", "[[EMJ 0]]" and similar corruption
        let pattern = format!(r"(?i)\[\[\s*EMJ\s*{}\s*\]\]", index);
        let tolerant = Regex::new(&pattern).expect("placeholder pattern is valid");
        if tolerant.is_match(&result) {
            result = tolerant.replace(&result, glyph.as_str()).into_owned();
        }
        // Otherwise: give up on this index, leave whatever the provider sent
    }

    result
}
