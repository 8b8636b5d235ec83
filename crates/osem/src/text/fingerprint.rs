//! Body fingerprinting and bigram similarity.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// Maximum fingerprint length, in characters.
pub const FINGERPRINT_LEN: usize = 512;

/// Prefix length used by the baseline equality check, in characters.
const BASELINE_PREFIX_LEN: usize = 256;

/// Dice-similarity acceptance threshold.
pub const SIMILARITY_THRESHOLD: f64 = 0.7;

fn quoted_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*>.*$").unwrap())
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").unwrap())
}

/// Derives the first 512 meaningful upper-case characters of a message body.
///
/// Plain text is preferred; the HTML body is used tag-stripped only when no
/// plain text is available. Quoted reply lines are removed first.
pub fn body_fingerprint(plain: &str, html: &str) -> String {
    let source = if !plain.trim().is_empty() {
        plain.to_string()
    } else if !html.trim().is_empty() {
        tag_regex().replace_all(html, " ").into_owned()
    } else {
        return String::new();
    };

    let unquoted = quoted_line_regex().replace_all(&source, "");

    let mut out = String::with_capacity(FINGERPRINT_LEN);
    let mut in_ws = false;
    for ch in unquoted.chars() {
        if ch.is_whitespace() {
            in_ws = true;
            continue;
        }
        if in_ws && !out.is_empty() {
            out.push(' ');
        }
        in_ws = false;
        for upper in ch.to_uppercase() {
            out.push(upper);
        }
        if out.chars().count() >= FINGERPRINT_LEN {
            break;
        }
    }
    out.chars().take(FINGERPRINT_LEN).collect()
}

fn bigrams(input: &str) -> HashSet<(char, char)> {
    let chars: Vec<char> = input.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Dice coefficient over character bigrams, symmetric and bounded in [0, 1].
pub fn dice_similarity(a: &str, b: &str) -> f64 {
    let ba = bigrams(a);
    let bb = bigrams(b);
    if ba.is_empty() && bb.is_empty() {
        return if a == b { 1.0 } else { 0.0 };
    }
    let shared = ba.intersection(&bb).count();
    2.0 * shared as f64 / (ba.len() + bb.len()) as f64
}

/// Baseline check: under a 256-character prefix, either side is a prefix of
/// the other.
fn matches_baseline(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let a: String = a.chars().take(BASELINE_PREFIX_LEN).collect();
    let b: String = b.chars().take(BASELINE_PREFIX_LEN).collect();
    a.starts_with(&b) || b.starts_with(&a)
}

/// Two fingerprints are similar when their Dice similarity clears the
/// threshold or the baseline prefix check passes.
pub fn fingerprints_similar(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    matches_baseline(a, b) || dice_similarity(a, b) >= SIMILARITY_THRESHOLD
}
