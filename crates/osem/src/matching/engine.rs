//! Turns a mail snapshot into *accept into event E* or *reject*.
//!
//! Scoring is additive; each signal contributes its weight at most once.
//! Thread-level signals (conversation-id, reference-id, thread-index,
//! fingerprint) are always computed into the diagnostic trail but only enter
//! the score when explicitly enabled; the production ruleset classifies on
//! subject and participants alone.

use serde::{Deserialize, Serialize};

use crate::model::{contains_ci, Event};
use crate::snapshot::MailSnapshot;
use crate::text;

const WEIGHT_SUBJECT_PARTICIPANT: f64 = 70.0;
const WEIGHT_TRUNCATED_HISTORICAL: f64 = 70.0;
const WEIGHT_HISTORICAL_SUBJECT: f64 = 70.0;
const WEIGHT_PREFERRED: f64 = 40.0;

const WEIGHT_CONVERSATION: f64 = 50.0;
const WEIGHT_REFERENCE: f64 = 50.0;
const WEIGHT_THREAD_PREFIX: f64 = 30.0;
const WEIGHT_FINGERPRINT: f64 = 20.0;

/// Minimum number of characters for a truncated-subject prefix to count.
const TRUNCATED_MIN_LEN: usize = 4;

const SCORE_EPSILON: f64 = 0.01;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Acceptance threshold; candidates below it are rejected.
    #[serde(default = "default_accept_threshold")]
    pub accept_threshold: f64,
    /// Scores conversation/reference/thread/fingerprint signals too. Off in
    /// the production ruleset; the catch-up engine still uses those signals
    /// for search.
    #[serde(default)]
    pub enable_thread_signals: bool,
}

fn default_accept_threshold() -> f64 {
    25.0
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            accept_threshold: default_accept_threshold(),
            enable_thread_signals: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchReason {
    SubjectParticipant,
    TruncatedSubjectHistorical,
    HistoricalSubject,
    PreferredEvent,
    ConversationId,
    ReferenceMessageId,
    ThreadIndexPrefix,
    BodyFingerprint,
}

impl std::fmt::Display for MatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            MatchReason::SubjectParticipant => "subject+participant",
            MatchReason::TruncatedSubjectHistorical => "truncated-subject+historical",
            MatchReason::HistoricalSubject => "historical-subject",
            MatchReason::PreferredEvent => "preferred-event",
            MatchReason::ConversationId => "conversation-id",
            MatchReason::ReferenceMessageId => "reference-message-id",
            MatchReason::ThreadIndexPrefix => "thread-index-prefix",
            MatchReason::BodyFingerprint => "body-fingerprint",
        };
        write!(f, "{label}")
    }
}

/// One scored open event.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub event_id: String,
    pub score: f64,
    pub reasons: Vec<MatchReason>,
    pub details: Vec<String>,
    pub preferred_applied: bool,
    /// Tie-break key: recency of the event.
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Selection result plus the diagnostic trail, which is populated even on
/// rejection.
#[derive(Debug)]
pub struct MatchOutcome {
    pub candidate: Option<Candidate>,
    pub diagnostics: Vec<String>,
}

/// Standard subject match: equal after normalisation, or the header value
/// extends the stored one.
fn standard_subject_match(header: &str, stored: &str) -> bool {
    if header.is_empty() || stored.is_empty() {
        return false;
    }
    let header = header.to_uppercase();
    let stored = stored.to_uppercase();
    header == stored || header.starts_with(&stored)
}

/// Truncated match: the stored form is the longer one and the header value is
/// a prefix of at least four characters.
fn truncated_subject_match(header: &str, stored: &str) -> bool {
    if header.chars().count() < TRUNCATED_MIN_LEN {
        return false;
    }
    let header = header.to_uppercase();
    let stored = stored.to_uppercase();
    stored.starts_with(&header) && stored != header
}

/// Subjects an event can be recognised by: title, first member subject,
/// every related subject. All normalised.
fn candidate_subjects(event: &Event) -> Vec<String> {
    let mut subjects: Vec<String> = Vec::new();
    let mut push = |value: String| {
        if !value.is_empty() && !subjects.iter().any(|s| s.eq_ignore_ascii_case(&value)) {
            subjects.push(value);
        }
    };
    push(text::normalize_subject(&event.title));
    if let Some(first) = event.first_email_subject() {
        push(text::normalize_subject(first));
    }
    for subject in &event.related_subjects {
        push(subject.clone());
    }
    subjects
}

fn participants_intersect(event: &Event, snapshot: &MailSnapshot) -> bool {
    snapshot
        .participants
        .iter()
        .any(|p| contains_ci(&event.participants, p))
}

fn score_event(
    event: &Event,
    snapshot: &MailSnapshot,
    subject: &str,
    historical: &[String],
    config: &MatchConfig,
) -> Candidate {
    let mut candidate = Candidate {
        event_id: event.event_id.clone(),
        score: 0.0,
        reasons: Vec::new(),
        details: Vec::new(),
        preferred_applied: false,
        updated_at: event.updated_at,
    };

    let subjects = candidate_subjects(event);
    let participants_ok = participants_intersect(event, snapshot);

    let standard_hit = subjects.iter().find(|s| standard_subject_match(subject, s));
    let truncated_hit = subjects.iter().find(|s| truncated_subject_match(subject, s));
    let historical_hit = historical
        .iter()
        .find(|h| subjects.iter().any(|s| standard_subject_match(h, s)));

    if participants_ok {
        if let Some(hit) = standard_hit {
            candidate.score += WEIGHT_SUBJECT_PARTICIPANT;
            candidate.reasons.push(MatchReason::SubjectParticipant);
            candidate
                .details
                .push(format!("subject '{subject}' matches '{hit}'"));
        }
        if let (Some(_), Some(confirmed)) = (truncated_hit, historical_hit) {
            candidate.score += WEIGHT_TRUNCATED_HISTORICAL;
            candidate
                .reasons
                .push(MatchReason::TruncatedSubjectHistorical);
            candidate.details.push(format!(
                "truncated subject '{subject}' confirmed by historical '{confirmed}'"
            ));
        }
        if let Some(historical) = historical_hit {
            candidate.score += WEIGHT_HISTORICAL_SUBJECT;
            candidate.reasons.push(MatchReason::HistoricalSubject);
            candidate
                .details
                .push(format!("historical subject '{historical}' matches"));
        }
    } else if standard_hit.is_some() || truncated_hit.is_some() || historical_hit.is_some() {
        candidate
            .details
            .push("subject matched but no participant overlap".to_string());
    }

    // Thread-level signals: always computed, scored only when enabled.
    let conversation_hit = !snapshot.conversation_id.is_empty()
        && contains_ci(&event.conversation_ids, &snapshot.conversation_id);
    if conversation_hit {
        candidate
            .details
            .push(format!("conversation '{}' known", snapshot.conversation_id));
        if config.enable_thread_signals {
            candidate.score += WEIGHT_CONVERSATION;
            candidate.reasons.push(MatchReason::ConversationId);
        }
    }

    let known_ids = event.known_message_ids();
    let reference_hit = snapshot
        .reference_message_ids
        .iter()
        .any(|r| contains_ci(&known_ids, r));
    if reference_hit {
        candidate
            .details
            .push("reference message-id points into event".to_string());
        if config.enable_thread_signals {
            candidate.score += WEIGHT_REFERENCE;
            candidate.reasons.push(MatchReason::ReferenceMessageId);
        }
    }

    let snapshot_prefix = snapshot.thread_index_prefix();
    let thread_hit = !snapshot_prefix.is_empty()
        && event
            .active_emails()
            .any(|e| e.thread_index_prefix == snapshot_prefix);
    if thread_hit {
        candidate
            .details
            .push("thread-index prefix shared".to_string());
        if config.enable_thread_signals {
            candidate.score += WEIGHT_THREAD_PREFIX;
            candidate.reasons.push(MatchReason::ThreadIndexPrefix);
        }
    }

    let fingerprint_hit = !snapshot.body_fingerprint.is_empty()
        && event
            .active_emails()
            .any(|e| text::fingerprints_similar(&e.body_fingerprint, &snapshot.body_fingerprint));
    if fingerprint_hit {
        candidate
            .details
            .push("body fingerprint similar to a member".to_string());
        if config.enable_thread_signals {
            candidate.score += WEIGHT_FINGERPRINT;
            candidate.reasons.push(MatchReason::BodyFingerprint);
        }
    }

    candidate
}

/// Ordering per the disambiguation rules: score, preferred flag, reason
/// count, recency.
fn better(a: &Candidate, b: &Candidate) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    if (a.score - b.score).abs() > SCORE_EPSILON {
        return a
            .score
            .partial_cmp(&b.score)
            .unwrap_or(Ordering::Equal);
    }
    match (a.preferred_applied, b.preferred_applied) {
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }
    match a.reasons.len().cmp(&b.reasons.len()) {
        Ordering::Equal => {}
        other => return other,
    }
    a.updated_at.cmp(&b.updated_at)
}

/// Chooses at most one open event for the snapshot.
pub fn select_candidate(
    events: &[Event],
    snapshot: &MailSnapshot,
    preferred_event_id: Option<&str>,
    config: &MatchConfig,
) -> MatchOutcome {
    let subject = snapshot.normalized_subject();
    let historical: Vec<String> = snapshot
        .historical_subjects
        .iter()
        .map(|h| text::normalize_subject(h))
        .filter(|h| !h.is_empty())
        .collect();

    let mut diagnostics = vec![format!(
        "matching '{}' (subject '{}', {} historical, {} participants)",
        snapshot.entry_id,
        subject,
        historical.len(),
        snapshot.participants.len()
    )];

    let mut best: Option<Candidate> = None;
    for event in events.iter().filter(|e| e.is_open()) {
        let mut candidate = score_event(event, snapshot, &subject, &historical, config);

        if candidate.score > 0.0
            && preferred_event_id.is_some_and(|p| p.eq_ignore_ascii_case(&event.event_id))
        {
            candidate.score += WEIGHT_PREFERRED;
            candidate.reasons.push(MatchReason::PreferredEvent);
            candidate.preferred_applied = true;
        }

        if candidate.score > 0.0 || !candidate.details.is_empty() {
            let reasons: Vec<String> =
                candidate.reasons.iter().map(|r| r.to_string()).collect();
            diagnostics.push(format!(
                "  {} score {:.0} [{}] {}",
                candidate.event_id,
                candidate.score,
                reasons.join(", "),
                candidate.details.join("; ")
            ));
        }

        if candidate.score <= 0.0 {
            continue;
        }
        let replace = match &best {
            None => true,
            Some(current) => better(&candidate, current) == std::cmp::Ordering::Greater,
        };
        if replace {
            best = Some(candidate);
        }
    }

    let accepted = best.filter(|c| c.score >= config.accept_threshold);
    match &accepted {
        Some(c) => diagnostics.push(format!(
            "accepted {} with score {:.0}",
            c.event_id, c.score
        )),
        None => diagnostics.push("no candidate reached the acceptance threshold".to_string()),
    }

    MatchOutcome {
        candidate: accepted,
        diagnostics,
    }
}
