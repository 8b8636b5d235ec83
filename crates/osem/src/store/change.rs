//! Change notifications published after store mutations commit.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::Event;

/// Why an event changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    Created,
    Updated,
    Imported,
    Archived,
    Reopened,
    Deleted,
    MailAppended,
    MailUpdated,
    MailRemoved,
}

/// A committed mutation, carrying a deep-cloned snapshot of the event.
#[derive(Debug, Clone)]
pub struct EventChange {
    pub event: Event,
    pub reason: ChangeReason,
}

/// Fan-out of store changes to any number of subscribers. Lagging or absent
/// subscribers never block a mutation.
pub struct ChangeBroadcaster {
    sender: broadcast::Sender<EventChange>,
}

impl ChangeBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventChange> {
        self.sender.subscribe()
    }

    /// Sends a change; a send with no subscribers is not an error.
    pub fn emit(&self, event: &Event, reason: ChangeReason) {
        let _ = self.sender.send(EventChange {
            event: event.clone(),
            reason,
        });
    }
}

impl Default for ChangeBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(id: &str) -> Event {
        Event {
            event_id: id.to_string(),
            title: "Test".to_string(),
            template_id: None,
            status: crate::model::EventStatus::Open,
            priority: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            conversation_ids: vec![],
            related_subjects: vec![],
            participants: vec![],
            not_found_message_ids: vec![],
            processed_message_ids: vec![],
            emails: vec![],
            attachments: vec![],
            dashboard_items: vec![],
            display_column_source: String::new(),
            display_column_custom: String::new(),
            additional_files: vec![],
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let broadcaster = ChangeBroadcaster::default();
        broadcaster.emit(&event("EVT-1"), ChangeReason::Created);
    }

    #[test]
    fn test_subscriber_receives_in_order() {
        let broadcaster = ChangeBroadcaster::default();
        let mut rx = broadcaster.subscribe();

        broadcaster.emit(&event("EVT-1"), ChangeReason::Created);
        broadcaster.emit(&event("EVT-1"), ChangeReason::MailAppended);

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.reason, ChangeReason::Created);
        assert_eq!(second.reason, ChangeReason::MailAppended);
        assert_eq!(second.event.event_id, "EVT-1");
    }
}
