//! Predicate tree for mail-source queries.
//!
//! Rendered to a DASL-style string for sources that take one; adapters over
//! other protocols can walk the tree directly.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    /// `ReceivedTime >= instant`.
    ReceivedSince(DateTime<Utc>),
    /// `PR_CREATION_TIME >= instant`.
    CreatedSince(DateTime<Utc>),
    /// `ConversationID = value`.
    ConversationId(String),
    /// `ci_phrasematch` on the subject; `wildcard` allows a trailing `*`.
    SubjectPhrase { phrase: String, wildcard: bool },
    All(Vec<FilterExpr>),
    Any(Vec<FilterExpr>),
}

impl FilterExpr {
    pub fn and(terms: Vec<FilterExpr>) -> FilterExpr {
        FilterExpr::All(terms)
    }

    pub fn or(terms: Vec<FilterExpr>) -> FilterExpr {
        FilterExpr::Any(terms)
    }

    /// Builds the subject filter for one related subject: up to five tokens
    /// phrase-matched, with a trailing wildcard on the last token when the
    /// subject yields at most three (tolerating stored truncation).
    pub fn subject_tokens(subject: &str) -> Option<FilterExpr> {
        let tokens: Vec<&str> = subject
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .take(5)
            .collect();
        if tokens.is_empty() {
            return None;
        }

        let allow_wildcard = tokens.len() <= 3;
        let last = tokens.len() - 1;
        let terms: Vec<FilterExpr> = tokens
            .iter()
            .enumerate()
            .map(|(i, token)| FilterExpr::SubjectPhrase {
                phrase: (*token).to_string(),
                wildcard: allow_wildcard && i == last,
            })
            .collect();

        Some(if terms.len() == 1 {
            terms.into_iter().next().unwrap()
        } else {
            FilterExpr::All(terms)
        })
    }

    fn render(&self, out: &mut String) {
        match self {
            FilterExpr::ReceivedSince(instant) => {
                out.push_str(&format!(
                    "\"urn:schemas:httpmail:datereceived\" >= '{}'",
                    instant.format("%Y-%m-%d %H:%M")
                ));
            }
            FilterExpr::CreatedSince(instant) => {
                out.push_str(&format!(
                    "\"http://schemas.microsoft.com/mapi/proptag/0x30070040\" >= '{}'",
                    instant.format("%Y-%m-%d %H:%M")
                ));
            }
            FilterExpr::ConversationId(id) => {
                out.push_str(&format!(
                    "\"http://schemas.microsoft.com/mapi/proptag/0x30130102\" = '{}'",
                    id.replace('\'', "''")
                ));
            }
            FilterExpr::SubjectPhrase { phrase, wildcard } => {
                let phrase = phrase.replace('\'', "''");
                if *wildcard {
                    out.push_str(&format!(
                        "\"urn:schemas:httpmail:subject\" ci_phrasematch '{phrase}*'"
                    ));
                } else {
                    out.push_str(&format!(
                        "\"urn:schemas:httpmail:subject\" ci_phrasematch '{phrase}'"
                    ));
                }
            }
            FilterExpr::All(terms) => render_joined(terms, " AND ", out),
            FilterExpr::Any(terms) => render_joined(terms, " OR ", out),
        }
    }
}

fn render_joined(terms: &[FilterExpr], separator: &str, out: &mut String) {
    if terms.is_empty() {
        return;
    }
    out.push('(');
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        term.render(out);
    }
    out.push(')');
}

impl std::fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = String::new();
        self.render(&mut out);
        let out = if out.starts_with('(') {
            format!("@SQL={out}")
        } else {
            format!("@SQL=({out})")
        };
        write!(f, "{out}")
    }
}
