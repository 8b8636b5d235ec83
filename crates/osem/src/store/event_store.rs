//! The event collection behind a single exclusive lock.
//!
//! Every read hands out deep-cloned copies; callers never hold a live
//! reference into the store. Mutations enqueue a persist of the whole
//! document and emit a change notification before the lock is released, so
//! per-event notification order equals mutation order.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::StoreError;
use crate::matching::{self, MatchConfig};
use crate::model::{insert_ci, Attachment, Email, Event, EventStatus};
use crate::snapshot::MailSnapshot;
use crate::store::change::{ChangeBroadcaster, ChangeReason, EventChange};
use crate::store::merge::{self, UpsertOutcome};
use crate::store::persist::{self, Persister};
use crate::text;

/// Cached per-event view consumed by the catch-up engine.
#[derive(Debug, Clone)]
pub struct CatchupMetadata {
    pub event_id: String,
    pub conversation_ids: Vec<String>,
    pub known_message_ids: Vec<String>,
    pub referenced_message_ids: Vec<String>,
    pub not_found_message_ids: Vec<String>,
    /// Entry-ids of members, keyed by upper-cased conversation-id.
    pub tracked_entry_ids: HashMap<String, Vec<String>>,
    pub earliest_received: Option<DateTime<Utc>>,
    pub related_subjects: Vec<String>,
}

pub struct EventStore {
    events: Mutex<Vec<Event>>,
    changes: ChangeBroadcaster,
    persister: Persister,
    match_config: MatchConfig,
}

impl EventStore {
    /// Opens the store at `path`, loading any existing document. A missing
    /// file is an empty store; unreadable JSON is a hard error.
    pub fn open(path: PathBuf, match_config: MatchConfig) -> Result<Self, StoreError> {
        let events = persist::load_document(&path)?;
        info!("Loaded {} events from {}", events.len(), path.display());

        Ok(Self {
            events: Mutex::new(events),
            changes: ChangeBroadcaster::default(),
            persister: Persister::spawn(path),
            match_config,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventChange> {
        self.changes.subscribe()
    }

    /// Blocks until all queued persist writes have reached disk.
    pub fn flush(&self) {
        self.persister.flush();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Event store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn commit(&self, events: &[Event], changed: &Event, reason: ChangeReason) {
        self.persister.enqueue(events.to_vec());
        self.changes.emit(changed, reason);
    }

    // ----- reads ---------------------------------------------------------

    /// Deep-cloned snapshot of every event.
    pub fn list_all(&self) -> Vec<Event> {
        self.lock().clone()
    }

    /// Alias used by the backup exporter.
    pub fn export_all(&self) -> Vec<Event> {
        self.list_all()
    }

    pub fn get_by_id(&self, event_id: &str) -> Option<Event> {
        self.lock()
            .iter()
            .find(|e| e.event_id.eq_ignore_ascii_case(event_id))
            .cloned()
    }

    /// The catch-up engine's cached view of one open event. Archived and
    /// deleted events yield `None` so a queued request can never strand a
    /// worker on them.
    pub fn catchup_metadata(&self, event_id: &str) -> Option<CatchupMetadata> {
        let guard = self.lock();
        let event = guard
            .iter()
            .find(|e| e.event_id.eq_ignore_ascii_case(event_id) && e.is_open())?;

        let mut tracked: HashMap<String, Vec<String>> = HashMap::new();
        for email in event.active_emails() {
            if email.conversation_id.is_empty() || email.entry_id.is_empty() {
                continue;
            }
            tracked
                .entry(email.conversation_id.to_uppercase())
                .or_default()
                .push(email.entry_id.clone());
        }

        Some(CatchupMetadata {
            event_id: event.event_id.clone(),
            conversation_ids: event.conversation_ids.clone(),
            known_message_ids: event.known_message_ids(),
            referenced_message_ids: event.referenced_message_ids(),
            not_found_message_ids: event.not_found_message_ids.clone(),
            tracked_entry_ids: tracked,
            earliest_received: event.earliest_received(),
            related_subjects: event.related_subjects.clone(),
        })
    }

    // ----- lifecycle -----------------------------------------------------

    /// Creates a new event seeded from a mail. `known_participants` lets the
    /// caller pre-populate the participant set beyond the mail's own.
    pub fn create_from_mail(
        &self,
        snapshot: &MailSnapshot,
        template_id: Option<String>,
        known_participants: Option<&[String]>,
    ) -> Event {
        let now = Utc::now();
        let subject = snapshot.normalized_subject();
        let title = if subject.is_empty() {
            "(no subject)".to_string()
        } else {
            subject.clone()
        };

        let mut event = Event {
            event_id: new_event_id(now),
            title,
            template_id,
            status: EventStatus::Open,
            priority: 0,
            created_at: now,
            updated_at: now,
            conversation_ids: Vec::new(),
            related_subjects: Vec::new(),
            participants: Vec::new(),
            not_found_message_ids: Vec::new(),
            processed_message_ids: Vec::new(),
            emails: vec![Email::from_snapshot(snapshot)],
            attachments: Attachment::from_snapshot(snapshot),
            dashboard_items: Vec::new(),
            display_column_source: String::new(),
            display_column_custom: String::new(),
            additional_files: Vec::new(),
        };

        insert_ci(&mut event.conversation_ids, &snapshot.conversation_id);
        insert_ci(&mut event.related_subjects, &subject);
        for historical in &snapshot.historical_subjects {
            insert_ci(
                &mut event.related_subjects,
                &text::normalize_subject(historical),
            );
        }
        for participant in &snapshot.participants {
            insert_ci(&mut event.participants, participant);
        }
        if let Some(known) = known_participants {
            for participant in known {
                insert_ci(&mut event.participants, participant);
            }
        }

        let mut guard = self.lock();
        guard.push(event.clone());
        self.commit(&guard, &event, ChangeReason::Created);
        info!("Created event {} '{}'", event.event_id, event.title);
        event
    }

    /// Replaces the stored record by id.
    pub fn update(&self, mut event: Event) -> Result<Event, StoreError> {
        let mut guard = self.lock();
        let position = guard
            .iter()
            .position(|e| e.event_id.eq_ignore_ascii_case(&event.event_id))
            .ok_or_else(|| StoreError::NotFound {
                event_id: event.event_id.clone(),
            })?;

        event.updated_at = bump(guard[position].updated_at);
        guard[position] = event.clone();
        self.commit(&guard, &event, ChangeReason::Updated);
        Ok(event)
    }

    /// Upsert by id, used by backup restore.
    pub fn import(&self, event: Event) -> Event {
        let mut guard = self.lock();
        match guard
            .iter()
            .position(|e| e.event_id.eq_ignore_ascii_case(&event.event_id))
        {
            Some(position) => guard[position] = event.clone(),
            None => guard.push(event.clone()),
        }
        self.commit(&guard, &event, ChangeReason::Imported);
        event
    }

    /// Archives every listed event that is currently open.
    pub fn archive(&self, event_ids: &[String]) -> Vec<Event> {
        let mut guard = self.lock();
        let mut archived = Vec::new();
        for id in event_ids {
            if let Some(event) = guard
                .iter_mut()
                .find(|e| e.event_id.eq_ignore_ascii_case(id) && e.status == EventStatus::Open)
            {
                event.status = EventStatus::Archived;
                event.updated_at = bump(event.updated_at);
                archived.push(event.clone());
            }
        }
        for event in &archived {
            self.commit(&guard, event, ChangeReason::Archived);
        }
        archived
    }

    pub fn reopen(&self, event_id: &str) -> Result<Event, StoreError> {
        let mut guard = self.lock();
        let event = guard
            .iter_mut()
            .find(|e| e.event_id.eq_ignore_ascii_case(event_id))
            .ok_or_else(|| StoreError::NotFound {
                event_id: event_id.to_string(),
            })?;
        event.status = EventStatus::Open;
        event.updated_at = bump(event.updated_at);
        let snapshot = event.clone();
        self.commit(&guard, &snapshot, ChangeReason::Reopened);
        Ok(snapshot)
    }

    /// Irreversibly removes the listed events.
    pub fn delete(&self, event_ids: &[String]) -> Vec<Event> {
        let mut guard = self.lock();
        let mut deleted = Vec::new();
        guard.retain(|event| {
            if event_ids
                .iter()
                .any(|id| id.eq_ignore_ascii_case(&event.event_id))
            {
                deleted.push(event.clone());
                false
            } else {
                true
            }
        });
        for event in &deleted {
            self.commit(&guard, event, ChangeReason::Deleted);
        }
        deleted
    }

    /// Renames an event.
    pub fn rename(&self, event_id: &str, title: &str) -> Result<Event, StoreError> {
        self.mutate(event_id, |event| event.title = title.to_string())
    }

    /// Sets the user priority (0..3, clamped).
    pub fn set_priority(&self, event_id: &str, priority: u8) -> Result<Event, StoreError> {
        self.mutate(event_id, |event| event.priority = priority.min(3))
    }

    /// Points the event at a different dashboard template.
    pub fn set_template(
        &self,
        event_id: &str,
        template_id: Option<String>,
    ) -> Result<Event, StoreError> {
        self.mutate(event_id, |event| event.template_id = template_id)
    }

    /// Replaces the extraction output shown on the dashboard. The engine
    /// treats the items as opaque.
    pub fn set_dashboard_items(
        &self,
        event_id: &str,
        items: Vec<crate::model::DashboardItem>,
    ) -> Result<Event, StoreError> {
        self.mutate(event_id, |event| event.dashboard_items = items)
    }

    /// Associates a local file with the event.
    pub fn add_additional_file(&self, event_id: &str, path: &str) -> Result<Event, StoreError> {
        self.mutate(event_id, |event| {
            if !event.additional_files.iter().any(|p| p == path) {
                event.additional_files.push(path.to_string());
            }
        })
    }

    pub fn remove_additional_file(
        &self,
        event_id: &str,
        path: &str,
    ) -> Result<Event, StoreError> {
        self.mutate(event_id, |event| {
            event.additional_files.retain(|p| p != path);
        })
    }

    fn mutate(
        &self,
        event_id: &str,
        apply: impl FnOnce(&mut Event),
    ) -> Result<Event, StoreError> {
        let mut guard = self.lock();
        let event = guard
            .iter_mut()
            .find(|e| e.event_id.eq_ignore_ascii_case(event_id))
            .ok_or_else(|| StoreError::NotFound {
                event_id: event_id.to_string(),
            })?;
        apply(event);
        event.updated_at = bump(event.updated_at);
        let snapshot = event.clone();
        self.commit(&guard, &snapshot, ChangeReason::Updated);
        Ok(snapshot)
    }

    // ----- mail ingestion ------------------------------------------------

    /// The hot path: classify the snapshot against open events and, on
    /// acceptance, upsert it. Returns `None` when the mail is rejected or the
    /// matching member is a tombstone.
    pub fn try_add_mail(
        &self,
        snapshot: &MailSnapshot,
        preferred_event_id: Option<&str>,
    ) -> Result<Option<Event>, StoreError> {
        if snapshot.conversation_id.trim().is_empty() {
            return Err(StoreError::InvalidSnapshot(
                "snapshot has no conversation id".to_string(),
            ));
        }

        let mut guard = self.lock();
        let outcome =
            matching::select_candidate(&guard, snapshot, preferred_event_id, &self.match_config);
        for line in &outcome.diagnostics {
            debug!("{}", line);
        }

        let Some(candidate) = outcome.candidate else {
            return Ok(None);
        };

        let Some(position) = guard.iter().position(|e| e.event_id == candidate.event_id) else {
            return Ok(None);
        };

        Ok(self.apply_snapshot(&mut guard, position, snapshot, false))
    }

    /// Bypasses matching; always targets the named event and may restore a
    /// soft-deleted member.
    pub fn add_mail_to_event(
        &self,
        event_id: &str,
        snapshot: &MailSnapshot,
    ) -> Result<Option<Event>, StoreError> {
        let mut guard = self.lock();
        let position = guard
            .iter()
            .position(|e| e.event_id.eq_ignore_ascii_case(event_id))
            .ok_or_else(|| StoreError::NotFound {
                event_id: event_id.to_string(),
            })?;

        Ok(self.apply_snapshot(&mut guard, position, snapshot, true))
    }

    /// Shared upsert tail: merge, bump, persist, notify.
    fn apply_snapshot(
        &self,
        guard: &mut MutexGuard<'_, Vec<Event>>,
        position: usize,
        snapshot: &MailSnapshot,
        allow_restore: bool,
    ) -> Option<Event> {
        let event = &mut guard[position];
        let outcome = merge::upsert_mail(event, snapshot, allow_restore);

        let reason = match outcome {
            UpsertOutcome::Appended => ChangeReason::MailAppended,
            UpsertOutcome::Updated => ChangeReason::MailUpdated,
            UpsertOutcome::Unchanged => return Some(event.clone()),
            UpsertOutcome::RefusedTombstone => {
                debug!(
                    "Refusing re-ingest of removed mail '{}' into {}",
                    snapshot.entry_id, event.event_id
                );
                return None;
            }
        };

        for historical in &snapshot.historical_subjects {
            insert_ci(
                &mut event.related_subjects,
                &text::normalize_subject(historical),
            );
        }
        event.updated_at = bump(event.updated_at);
        let snapshot_event = event.clone();
        self.commit(guard.as_slice(), &snapshot_event, reason);
        Some(snapshot_event)
    }

    /// Soft-deletes a member found by entry-id or message-id.
    pub fn remove_mail(
        &self,
        event_id: &str,
        entry_id: Option<&str>,
        message_id: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut guard = self.lock();
        let event = guard
            .iter_mut()
            .find(|e| e.event_id.eq_ignore_ascii_case(event_id))
            .ok_or_else(|| StoreError::NotFound {
                event_id: event_id.to_string(),
            })?;

        let normalized_mid = message_id.map(text::normalize_message_id);
        let position = event.emails.iter().position(|email| {
            if email.is_removed {
                return false;
            }
            if let Some(entry) = entry_id {
                if !entry.is_empty() && email.entry_id.eq_ignore_ascii_case(entry) {
                    return true;
                }
            }
            if let Some(mid) = &normalized_mid {
                if !mid.is_empty() && email.internet_message_id.eq_ignore_ascii_case(mid) {
                    return true;
                }
            }
            false
        });

        let Some(position) = position else {
            return Ok(false);
        };

        event.emails[position].is_removed = true;
        event.emails[position].is_new_or_updated = false;

        let removed_entry = event.emails[position].entry_id.clone();
        event.strip_attachments_of(&removed_entry);

        // Drop the subject from related_subjects unless another active
        // member still uses it.
        let removed_subject = text::normalize_subject(&event.emails[position].subject);
        let still_used = event
            .active_emails()
            .any(|e| text::normalize_subject(&e.subject).eq_ignore_ascii_case(&removed_subject));
        if !still_used {
            event
                .related_subjects
                .retain(|s| !s.eq_ignore_ascii_case(&removed_subject));
        }

        event.updated_at = bump(event.updated_at);
        let snapshot_event = event.clone();
        self.commit(&guard, &snapshot_event, ChangeReason::MailRemoved);
        Ok(true)
    }

    /// Records message-ids the catch-up engine could not locate. Idempotent.
    pub fn mark_message_ids_not_found(
        &self,
        event_id: &str,
        message_ids: &[String],
    ) -> Result<(), StoreError> {
        let mut guard = self.lock();
        let event = guard
            .iter_mut()
            .find(|e| e.event_id.eq_ignore_ascii_case(event_id))
            .ok_or_else(|| StoreError::NotFound {
                event_id: event_id.to_string(),
            })?;

        let mut changed = false;
        for id in message_ids {
            let normalized = text::normalize_message_id(id);
            if insert_ci(&mut event.not_found_message_ids, &normalized) {
                changed = true;
            }
        }

        if changed {
            event.updated_at = bump(event.updated_at);
            let snapshot_event = event.clone();
            self.commit(&guard, &snapshot_event, ChangeReason::Updated);
        }
        Ok(())
    }

    /// Acknowledges message-ids, clearing the new-mail highlight and
    /// suppressing it on future re-ingests.
    pub fn mark_processed(
        &self,
        event_id: &str,
        message_ids: &[String],
    ) -> Result<(), StoreError> {
        let mut guard = self.lock();
        let event = guard
            .iter_mut()
            .find(|e| e.event_id.eq_ignore_ascii_case(event_id))
            .ok_or_else(|| StoreError::NotFound {
                event_id: event_id.to_string(),
            })?;

        let mut changed = false;
        for id in message_ids {
            let normalized = text::normalize_message_id(id);
            if insert_ci(&mut event.processed_message_ids, &normalized) {
                changed = true;
            }
            for email in &mut event.emails {
                if email.internet_message_id.eq_ignore_ascii_case(&normalized)
                    && email.is_new_or_updated
                {
                    email.is_new_or_updated = false;
                    changed = true;
                }
            }
        }

        if changed {
            event.updated_at = bump(event.updated_at);
            let snapshot_event = event.clone();
            self.commit(&guard, &snapshot_event, ChangeReason::Updated);
        }
        Ok(())
    }
}

/// `updated_at` must be monotonically non-decreasing even under clock skew.
fn bump(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous)
}

/// `EVT-YYYYMMDD-HHMMSS-<6 hex>`, never reused.
fn new_event_id(now: DateTime<Utc>) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string()[..6].to_string();
    format!("EVT-{}-{}", now.format("%Y%m%d-%H%M%S"), suffix)
}
