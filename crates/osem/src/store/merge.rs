//! Mail identity and upsert rules for a mail snapshot entering an event.

use crate::model::{insert_ci, Attachment, Email, Event};
use crate::snapshot::MailSnapshot;
use crate::text;

/// Window within which rule 3 treats two partial-metadata mails as the same.
const SAME_MAIL_RECEIVED_SLACK_SECS: i64 = 30;

/// Result of upserting a snapshot into an already-chosen event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpsertOutcome {
    /// No matching member existed; a new one was appended.
    Appended,
    /// An existing member was merged and something changed.
    Updated,
    /// An existing member matched but nothing differed.
    Unchanged,
    /// The matching member is a tombstone and restore was not allowed.
    RefusedTombstone,
}

/// Ordered identity rules between a stored member and an incoming snapshot.
pub(crate) fn is_same_mail(existing: &Email, snapshot: &MailSnapshot) -> bool {
    // 1. Entry-id equality.
    if !existing.entry_id.is_empty()
        && !snapshot.entry_id.is_empty()
        && existing.entry_id.eq_ignore_ascii_case(&snapshot.entry_id)
    {
        return true;
    }

    // 2. Internet message-id equality.
    let snapshot_mid = text::normalize_message_id(&snapshot.internet_message_id);
    if !existing.internet_message_id.is_empty()
        && !snapshot_mid.is_empty()
        && existing.internet_message_id.eq_ignore_ascii_case(&snapshot_mid)
    {
        return true;
    }

    // 3. Partial metadata: same conversation, no ids on either side, same
    // sender and subject, received within the slack window.
    if !existing.conversation_id.is_empty()
        && existing
            .conversation_id
            .eq_ignore_ascii_case(&snapshot.conversation_id)
        && existing.entry_id.is_empty()
        && snapshot.entry_id.is_empty()
        && existing.internet_message_id.is_empty()
        && snapshot_mid.is_empty()
        && existing.sender.eq_ignore_ascii_case(&snapshot.sender)
        && existing.subject.eq_ignore_ascii_case(&snapshot.subject)
    {
        let delta = (existing.received_on - snapshot.received_on).num_seconds().abs();
        if delta <= SAME_MAIL_RECEIVED_SLACK_SECS {
            return true;
        }
    }

    // 4. Shared thread root with a similar body.
    let existing_root = existing.thread_root();
    if !existing_root.is_empty()
        && existing_root == snapshot.thread_root()
        && text::fingerprints_similar(&existing.body_fingerprint, &snapshot.body_fingerprint)
    {
        return true;
    }

    false
}

/// Applies §upsert semantics: appends a new member or merges into the
/// matching one. The caller owns `updated_at` bumping, persistence and
/// change notification based on the outcome.
pub(crate) fn upsert_mail(
    event: &mut Event,
    snapshot: &MailSnapshot,
    allow_restore: bool,
) -> UpsertOutcome {
    let position = event
        .emails
        .iter()
        .position(|existing| is_same_mail(existing, snapshot));

    let Some(position) = position else {
        append_member(event, snapshot);
        return UpsertOutcome::Appended;
    };

    let mut restored = false;
    if event.emails[position].is_removed {
        if !allow_restore {
            return UpsertOutcome::RefusedTombstone;
        }
        event.emails[position].is_removed = false;
        restored = true;
    }

    merge_member(event, position, snapshot, restored)
}

fn append_member(event: &mut Event, snapshot: &MailSnapshot) {
    let mut email = Email::from_snapshot(snapshot);
    if event.is_processed(&email.internet_message_id) {
        email.is_new_or_updated = false;
    }

    insert_ci(&mut event.conversation_ids, &snapshot.conversation_id);
    insert_ci(&mut event.related_subjects, &snapshot.normalized_subject());
    for participant in &snapshot.participants {
        insert_ci(&mut event.participants, participant);
    }
    event.attachments.extend(Attachment::from_snapshot(snapshot));
    event.emails.push(email);
}

fn merge_member(
    event: &mut Event,
    position: usize,
    snapshot: &MailSnapshot,
    restored: bool,
) -> UpsertOutcome {
    let mut changed = restored;
    let mut content_changed = restored;

    let snapshot_mid = text::normalize_message_id(&snapshot.internet_message_id);
    let mut entry_id_changed = false;

    {
        let email = &mut event.emails[position];

        // Metadata fields: a change iff the incoming value is non-empty and
        // differs.
        if !snapshot.entry_id.is_empty()
            && !email.entry_id.eq_ignore_ascii_case(&snapshot.entry_id)
        {
            entry_id_changed = !email.entry_id.is_empty();
            email.entry_id = snapshot.entry_id.clone();
            changed = true;
        }
        if !snapshot.store_id.is_empty() && email.store_id != snapshot.store_id {
            email.store_id = snapshot.store_id.clone();
            changed = true;
        }
        if !snapshot.conversation_id.is_empty()
            && !email
                .conversation_id
                .eq_ignore_ascii_case(&snapshot.conversation_id)
        {
            email.conversation_id = snapshot.conversation_id.clone();
            changed = true;
        }
        if !snapshot_mid.is_empty()
            && !email.internet_message_id.eq_ignore_ascii_case(&snapshot_mid)
        {
            email.internet_message_id = snapshot_mid.clone();
            changed = true;
        }
        if !snapshot.to.is_empty() && email.to != snapshot.to {
            email.to = snapshot.to.clone();
            changed = true;
        }
        if !snapshot.thread_index.is_empty() && email.thread_index != snapshot.thread_index {
            email.thread_index = snapshot.thread_index.clone();
            email.thread_index_prefix = snapshot.thread_index_prefix();
            changed = true;
        }

        // Content fields.
        if !snapshot.sender.is_empty() && !email.sender.eq_ignore_ascii_case(&snapshot.sender) {
            email.sender = snapshot.sender.clone();
            changed = true;
            content_changed = true;
        }
        if !snapshot.subject.is_empty() && email.subject != snapshot.subject {
            email.subject = snapshot.subject.clone();
            changed = true;
            content_changed = true;
        }
        if !snapshot.body_fingerprint.is_empty()
            && email.body_fingerprint != snapshot.body_fingerprint
        {
            email.body_fingerprint = snapshot.body_fingerprint.clone();
            changed = true;
            content_changed = true;
        }

        // Participant set: compared as a set, merged as a union.
        for participant in &snapshot.participants {
            if insert_ci(&mut email.participants, participant) {
                changed = true;
                content_changed = true;
            }
        }

        // Reference ids are union-merged; metadata only.
        for reference in &snapshot.reference_message_ids {
            if insert_ci(&mut email.reference_message_ids, reference) {
                changed = true;
            }
        }
    }

    if content_changed {
        let email = &mut event.emails[position];
        if !event
            .processed_message_ids
            .iter()
            .any(|p| p.eq_ignore_ascii_case(&email.internet_message_id))
        {
            email.is_new_or_updated = true;
        }
    }

    if entry_id_changed {
        // The message moved in the source; attachments keyed by the old
        // entry-id are stale.
        let old_ids: Vec<String> = event
            .attachments
            .iter()
            .map(|a| a.source_mail_entry_id.clone())
            .filter(|id| !id.eq_ignore_ascii_case(&snapshot.entry_id))
            .collect();
        for old in old_ids {
            let keeps_other_member = event
                .emails
                .iter()
                .any(|e| e.entry_id.eq_ignore_ascii_case(&old));
            if !keeps_other_member {
                event.strip_attachments_of(&old);
            }
        }
        event.attachments.extend(Attachment::from_snapshot(snapshot));
    }

    if changed {
        insert_ci(&mut event.conversation_ids, &snapshot.conversation_id);
        insert_ci(&mut event.related_subjects, &snapshot.normalized_subject());
        for participant in &snapshot.participants {
            insert_ci(&mut event.participants, participant);
        }
        UpsertOutcome::Updated
    } else {
        UpsertOutcome::Unchanged
    }
}
