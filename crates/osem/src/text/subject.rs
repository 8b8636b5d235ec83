//! Subject canonicalisation and historical-subject mining.

use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use super::mojibake::repair_mojibake;

/// Reply/forward markers stripped from the front of a subject. Entries ending
/// in `:` are header-style prefixes; bracketed entries are transport tags.
const SUBJECT_PREFIXES: &[&str] = &[
    "RE:",
    "FW:",
    "FWD:",
    "AW:",
    "SV:",
    "VS:",
    "转发:",
    "转发：",
    "回复:",
    "回复：",
    "回覆:",
    "回覆：",
    "轉寄:",
    "轉寄：",
    "[External]",
    "[EXT]",
    "[Pre-Alert]",
];

fn starts_with_ci(haystack: &str, prefix: &str) -> bool {
    haystack.len() >= prefix.len()
        && haystack
            .chars()
            .zip(prefix.chars())
            .take(prefix.chars().count())
            .all(|(a, b)| a.eq_ignore_ascii_case(&b) || a == b)
}

fn collapse_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_ws = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            in_ws = true;
        } else {
            if in_ws && !out.is_empty() {
                out.push(' ');
            }
            in_ws = false;
            out.push(ch);
        }
    }
    out
}

/// Strips every leading reply/forward prefix. Returns the remainder and
/// whether anything was stripped.
fn strip_prefixes(subject: &str) -> (String, bool) {
    let mut rest = subject.trim().to_string();
    let mut stripped = false;
    loop {
        let mut advanced = false;
        for prefix in SUBJECT_PREFIXES {
            if starts_with_ci(&rest, prefix) {
                let cut: String = rest.chars().skip(prefix.chars().count()).collect();
                rest = cut.trim_start().to_string();
                stripped = true;
                advanced = true;
                break;
            }
        }
        if !advanced {
            break;
        }
    }
    (rest, stripped)
}

/// Whether the string opens with any known reply/forward prefix.
pub(crate) fn has_reply_prefix(subject: &str) -> bool {
    let trimmed = subject.trim_start();
    SUBJECT_PREFIXES.iter().any(|p| starts_with_ci(trimmed, p))
}

/// Canonicalises a subject line: NFKC, whitespace collapse, repeated
/// reply/forward prefix stripping. When nothing strips, a mojibake repair
/// pass is attempted with the prefix list as validator and the result
/// re-normalised. Case is preserved for display; comparisons elsewhere are
/// case-insensitive.
pub fn normalize_subject(subject: &str) -> String {
    let normalized: String = subject.nfkc().collect();
    let collapsed = collapse_whitespace(&normalized);

    let (rest, stripped) = strip_prefixes(&collapsed);
    if stripped {
        return rest;
    }

    let repaired = repair_mojibake(&collapsed, &has_reply_prefix);
    if repaired != collapsed {
        let (rest, _) = strip_prefixes(&collapse_whitespace(&repaired.nfkc().collect::<String>()));
        return rest;
    }

    rest
}

fn header_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[ \t]*(?:Subject|主题|主旨|標題|제목|件名)[ \t]*[:：][ \t]*(.*)$").unwrap()
    })
}

fn mine_historical(body: &str) -> Vec<String> {
    let re = header_line_regex();
    let mut found: Vec<String> = Vec::new();
    let mut lines = body.lines().peekable();

    while let Some(line) = lines.next() {
        let Some(caps) = re.captures(line) else {
            continue;
        };
        let mut value = caps[1].trim().to_string();
        // Folded continuation lines start with whitespace.
        while let Some(next) = lines.peek() {
            if next.starts_with(' ') || next.starts_with('\t') {
                value.push(' ');
                value.push_str(next.trim());
                lines.next();
            } else {
                break;
            }
        }
        let value = value.trim().to_string();
        if !value.is_empty() && !found.iter().any(|s| s.eq_ignore_ascii_case(&value)) {
            found.push(value);
        }
    }
    found
}

/// Mines quoted-reply subject headers out of a message body. Retries once on
/// the mojibake-repaired body when the first pass finds nothing.
pub fn extract_historical_subjects(body: &str) -> Vec<String> {
    let found = mine_historical(body);
    if !found.is_empty() {
        return found;
    }

    let matches_header =
        |candidate: &str| candidate.lines().any(|l| header_line_regex().is_match(l));
    let repaired = repair_mojibake(body, &matches_header);
    if repaired != body {
        return mine_historical(&repaired);
    }
    Vec::new()
}
