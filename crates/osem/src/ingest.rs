//! Public ingestion facade: the thin, stateless surface the host calls.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::catchup::CatchupEngine;
use crate::error::{Result, StoreError};
use crate::model::Event;
use crate::prefs::TemplatePreferences;
use crate::snapshot::MailSnapshot;
use crate::store::EventStore;

/// Default deadline for immediate catch-up processing.
const DEFAULT_IMMEDIATE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Ingestor {
    store: Arc<EventStore>,
    prefs: Arc<TemplatePreferences>,
    catchup: Arc<CatchupEngine>,
}

impl Ingestor {
    pub fn new(
        store: Arc<EventStore>,
        prefs: Arc<TemplatePreferences>,
        catchup: Arc<CatchupEngine>,
    ) -> Self {
        Self {
            store,
            prefs,
            catchup,
        }
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn catchup(&self) -> &Arc<CatchupEngine> {
        &self.catchup
    }

    /// The live-mail hot path: classify and, on acceptance, upsert. A mail
    /// without a conversation id, a rejected mail, and a tombstoned member
    /// all yield `None`; unmatched mail is dropped, never auto-created.
    pub fn try_add_mail(
        &self,
        snapshot: &MailSnapshot,
        preferred_event_id: Option<&str>,
    ) -> Result<Option<Event>> {
        if snapshot.conversation_id.trim().is_empty() {
            debug!(
                "Dropping mail '{}' without a conversation id",
                snapshot.entry_id
            );
            return Ok(None);
        }

        match self.store.try_add_mail(snapshot, preferred_event_id) {
            Ok(Some(event)) => {
                info!(
                    "Mail '{}' accepted into {} '{}'",
                    snapshot.entry_id, event.event_id, event.title
                );
                Ok(Some(event))
            }
            Ok(None) => {
                debug!("Mail '{}' dropped: no event matched", snapshot.entry_id);
                Ok(None)
            }
            Err(StoreError::InvalidSnapshot(reason)) => {
                debug!("Dropping invalid mail '{}': {}", snapshot.entry_id, reason);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The manual "Add to event" path: bypasses matching and may restore a
    /// soft-deleted member.
    pub fn add_mail_to_event(
        &self,
        event_id: &str,
        snapshot: &MailSnapshot,
    ) -> Result<Option<Event>> {
        Ok(self.store.add_mail_to_event(event_id, snapshot)?)
    }

    /// Explicit event creation (user action). Without an explicit template
    /// the participant preferences supply the default.
    pub fn create_event_from_mail(
        &self,
        snapshot: &MailSnapshot,
        template_id: Option<String>,
    ) -> Event {
        let template_id =
            template_id.or_else(|| self.prefs.get_preferred(&snapshot.participants));
        let event = self
            .store
            .create_from_mail(snapshot, template_id, None);

        // Backfill the conversation's history for the new event.
        if !snapshot.conversation_id.is_empty() {
            match self
                .catchup
                .enqueue(&event.event_id, &snapshot.conversation_id, true)
            {
                Ok(true) => self.catchup.trigger(),
                Ok(false) => {}
                Err(e) => warn!("Could not enqueue backfill for {}: {}", event.event_id, e),
            }
        }
        event
    }

    /// Soft-deletes a member by entry-id or message-id.
    pub fn remove_mail(
        &self,
        event_id: &str,
        entry_id: Option<&str>,
        message_id: Option<&str>,
    ) -> Result<bool> {
        Ok(self.store.remove_mail(event_id, entry_id, message_id)?)
    }

    pub fn mark_message_ids_not_found(
        &self,
        event_id: &str,
        message_ids: &[String],
    ) -> Result<()> {
        Ok(self.store.mark_message_ids_not_found(event_id, message_ids)?)
    }

    /// Acknowledges message-ids, clearing and suppressing the new-mail
    /// highlight.
    pub fn mark_processed(&self, event_id: &str, message_ids: &[String]) -> Result<()> {
        Ok(self.store.mark_processed(event_id, message_ids)?)
    }

    /// Enqueues conversation re-scans for an event. With `immediate` the
    /// newly added requests are processed on the calling thread until
    /// drained or `timeout` elapses; leftovers stay queued for the regular
    /// tick. Returns the number of conversations newly enqueued.
    pub fn trigger_catchup(
        &self,
        event_id: &str,
        conversation_ids: &[String],
        immediate: bool,
        timeout: Option<Duration>,
        full_history: bool,
    ) -> Result<usize> {
        let mut added = 0;
        for conversation_id in conversation_ids {
            if conversation_id.trim().is_empty() {
                continue;
            }
            match self.catchup.enqueue(event_id, conversation_id, full_history) {
                Ok(true) => added += 1,
                Ok(false) => debug!(
                    "Conversation {} already tracked for {}",
                    conversation_id, event_id
                ),
                Err(e) => {
                    warn!("Catch-up queue rejected {}: {}", conversation_id, e);
                    return Err(e.into());
                }
            }
        }

        if immediate {
            let timeout = timeout.unwrap_or(DEFAULT_IMMEDIATE_TIMEOUT);
            let processed = self.catchup.process_immediate(event_id, timeout);
            debug!(
                "Immediate catch-up for {} processed {} requests",
                event_id, processed
            );
        } else if added > 0 {
            self.catchup.trigger();
        }
        Ok(added)
    }
}
