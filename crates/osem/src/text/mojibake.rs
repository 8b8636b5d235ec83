//! Repair of encoding misinterpretations in header text.
//!
//! A subject that was UTF-8 on the wire but decoded under a legacy code page
//! round-trips back: encode the garbled text under the suspected code page,
//! reinterpret the bytes as UTF-8, and let the caller's validator decide
//! whether the result looks right.

use encoding_rs::{Encoding, BIG5, EUC_KR, GB18030, GBK, SHIFT_JIS};

fn candidate_code_pages() -> [&'static Encoding; 5] {
    [GBK, GB18030, SHIFT_JIS, EUC_KR, BIG5]
}

/// Tries each legacy code page in order; the first candidate accepted by the
/// validator wins. When no candidate validates, the input is returned
/// unchanged.
pub fn repair_mojibake(input: &str, validator: &dyn Fn(&str) -> bool) -> String {
    if input.is_empty() {
        return input.to_string();
    }

    for encoding in candidate_code_pages() {
        let (bytes, _, had_errors) = encoding.encode(input);
        if had_errors {
            continue;
        }
        let Ok(candidate) = String::from_utf8(bytes.into_owned()) else {
            continue;
        };
        if candidate != input && validator(&candidate) {
            return candidate;
        }
    }

    input.to_string()
}
