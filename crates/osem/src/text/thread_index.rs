//! Thread-index tokens.
//!
//! The raw thread-index is a base64 blob whose first 27 bytes anchor the
//! conversation root; replies append suffix bytes. The 44-character base64
//! prefix of the raw token covers those root bytes and is used as a cheap
//! string-level root key.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Number of raw bytes anchoring the conversation root.
const ROOT_ANCHOR_BYTES: usize = 27;

/// Number of base64 characters covering the root anchor.
const ROOT_ANCHOR_CHARS: usize = 44;

/// Base64 of the first 27 decoded bytes of the thread-index. Empty or
/// undecodable input yields an empty prefix.
pub fn thread_index_prefix(thread_index: &str) -> String {
    if thread_index.is_empty() {
        return String::new();
    }
    let Ok(bytes) = STANDARD.decode(thread_index.trim()) else {
        return String::new();
    };
    let take = bytes.len().min(ROOT_ANCHOR_BYTES);
    STANDARD.encode(&bytes[..take])
}

/// First 44 characters of the raw base64 token; shorter tokens are returned
/// whole.
pub fn thread_root(thread_index: &str) -> &str {
    let trimmed = thread_index.trim();
    match trimmed.char_indices().nth(ROOT_ANCHOR_CHARS) {
        Some((idx, _)) => &trimmed[..idx],
        None => trimmed,
    }
}
