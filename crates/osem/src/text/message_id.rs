//! Message-id extraction and normalisation.

use std::sync::OnceLock;

use regex::Regex;

fn angle_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<([^<>\s]+)>").unwrap())
}

/// Strips enclosing angle brackets and surrounding whitespace. Message-id
/// equality is case-insensitive throughout the engine.
pub fn normalize_message_id(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('<').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix('>').unwrap_or(trimmed);
    trimmed.trim().to_string()
}

/// Pulls message-ids out of a raw header value (References, In-Reply-To, or
/// a transport header). Angle-bracketed tokens are preferred; without any,
/// the value is split on whitespace, commas and semicolons.
pub fn extract_message_ids(raw: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    let mut push = |candidate: String| {
        if !candidate.is_empty() && !ids.iter().any(|i| i.eq_ignore_ascii_case(&candidate)) {
            ids.push(candidate);
        }
    };

    let mut matched = false;
    for caps in angle_regex().captures_iter(raw) {
        matched = true;
        push(normalize_message_id(&caps[1]));
    }
    if matched {
        return ids;
    }

    for token in raw.split(|c: char| c.is_whitespace() || c == ',' || c == ';') {
        push(normalize_message_id(token));
    }
    ids
}
