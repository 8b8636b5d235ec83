//! Participant (address/display-name) normalisation.

const ADDRESS_PREFIXES: &[&str] = &["SMTP:", "EX:", "MAILTO:"];

/// Canonicalises one participant string for set membership: trims quoting
/// characters, strips transport prefixes, upper-cases. Returns `None` when
/// nothing usable remains.
pub fn normalize_participant(raw: &str) -> Option<String> {
    let mut value = raw
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '<' | '>' | ';'))
        .to_string();

    for prefix in ADDRESS_PREFIXES {
        let matches = value
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
        if matches {
            value = value[prefix.len()..].trim_start().to_string();
            break;
        }
    }

    let value = value.to_uppercase();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Normalises a batch, discarding empties and duplicates, preserving first
/// appearance order.
pub fn normalize_participants<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for item in raw {
        if let Some(normalized) = normalize_participant(item.as_ref()) {
            if !out.contains(&normalized) {
                out.push(normalized);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uppercases_and_trims() {
        assert_eq!(
            normalize_participant("  alice@acme.com "),
            Some("ALICE@ACME.COM".to_string())
        );
    }

    #[test]
    fn test_strips_quoting() {
        assert_eq!(
            normalize_participant("\"<alice@acme.com>\";"),
            Some("ALICE@ACME.COM".to_string())
        );
    }

    #[test]
    fn test_strips_transport_prefixes() {
        assert_eq!(
            normalize_participant("smtp:alice@acme.com"),
            Some("ALICE@ACME.COM".to_string())
        );
        assert_eq!(
            normalize_participant("EX:/o=corp/cn=bob"),
            Some("/O=CORP/CN=BOB".to_string())
        );
        assert_eq!(
            normalize_participant("mailto:carol@corp"),
            Some("CAROL@CORP".to_string())
        );
    }

    #[test]
    fn test_empty_discarded() {
        assert_eq!(normalize_participant("  \"\" "), None);
        assert_eq!(normalize_participant("smtp:"), None);
    }

    #[test]
    fn test_batch_dedupes() {
        let out = normalize_participants(["alice@acme", "ALICE@ACME", "bob@corp"]);
        assert_eq!(out, vec!["ALICE@ACME", "BOB@CORP"]);
    }
}
