//! Per-conversation re-scan: asks the mail source for historical or missing
//! messages and feeds them back through the normal ingestion path.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use log::{debug, info, warn};
use tracing::info_span;

use crate::adapter::{FilterExpr, FolderKind, MailSource};
use crate::catchup::queue::CatchupRequest;
use crate::config::CatchupConfig;
use crate::store::EventStore;

const SCAN_FOLDERS: &[FolderKind] = &[FolderKind::Inbox, FolderKind::Sent, FolderKind::Deleted];

/// Outcome of one `(event, conversation)` scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub event_id: String,
    pub conversation_id: String,
    /// Conversation completeness verdict.
    pub complete: bool,
    /// Snapshots accepted into the event by this scan.
    pub ingested: usize,
    /// Entry-ids the source failed to resolve; candidates for the
    /// sync-aware search.
    pub pending_entry_ids: Vec<String>,
}

pub(crate) struct CatchupWorker {
    store: Arc<EventStore>,
    source: Arc<dyn MailSource>,
    config: CatchupConfig,
}

impl CatchupWorker {
    pub fn new(store: Arc<EventStore>, source: Arc<dyn MailSource>, config: CatchupConfig) -> Self {
        Self {
            store,
            source,
            config,
        }
    }

    /// Runs one scan. Returns `None` when the event is gone or archived.
    pub fn process(&self, request: &CatchupRequest) -> Option<ScanReport> {
        let _span = info_span!(
            "catchup_scan",
            event = %request.event_id,
            conversation = %request.conversation_id
        )
        .entered();

        let meta = self.store.catchup_metadata(&request.event_id)?;
        let missing_refs_before: Vec<String> = meta
            .referenced_message_ids
            .iter()
            .filter(|r| {
                !meta
                    .known_message_ids
                    .iter()
                    .any(|k| k.eq_ignore_ascii_case(r))
                    && !meta
                        .not_found_message_ids
                        .iter()
                        .any(|n| n.eq_ignore_ascii_case(r))
            })
            .cloned()
            .collect();

        let lookback_days = if request.full_history {
            self.config.full_history_days
        } else {
            self.config.lookback_days
        };
        let mut since = Utc::now() - Duration::days(lookback_days);
        if let Some(earliest) = meta.earliest_received {
            let padded = earliest - Duration::hours(self.config.lookback_pad_hours);
            if padded < since {
                since = padded;
            }
        }

        let mut report = ScanReport {
            event_id: request.event_id.clone(),
            conversation_id: request.conversation_id.clone(),
            ..Default::default()
        };

        let conversation_key = request.conversation_id.to_uppercase();
        let tracked_in_conversation = meta
            .tracked_entry_ids
            .get(&conversation_key)
            .cloned()
            .unwrap_or_default();
        let tracked_everywhere: HashSet<String> = meta
            .tracked_entry_ids
            .values()
            .flatten()
            .map(|id| id.to_uppercase())
            .collect();

        // Pass 1: the source's native conversation walk, seeded from a
        // member we already track.
        let mut candidates: Vec<String> = Vec::new();
        let mut conversation_entries: Vec<String> = Vec::new();
        let seed = tracked_in_conversation.first().cloned().unwrap_or_default();
        match self
            .source
            .enumerate_conversation(&seed, &request.conversation_id, since)
        {
            Ok(scan) => {
                conversation_entries = scan
                    .entries
                    .iter()
                    .map(|entry| entry.entry_id.clone())
                    .collect();
                if let Some(total) = scan.total_size {
                    if total <= tracked_in_conversation.len() {
                        debug!(
                            "Conversation {} complete: size {} <= {} tracked",
                            request.conversation_id,
                            total,
                            tracked_in_conversation.len()
                        );
                        report.complete = true;
                        info!(
                            "ConversationCompleteness OK for {} / {}",
                            request.event_id, request.conversation_id
                        );
                        return Some(report);
                    }
                }
                candidates.extend(conversation_entries.iter().cloned());
            }
            Err(e) => warn!(
                "Conversation enumeration failed for {}: {}",
                request.conversation_id, e
            ),
        }

        // Pass 2: restricted folder queries, conversation-filtered when the
        // source supports it.
        let folder_filter = if self.source.supports_conversation_filter() {
            FilterExpr::and(vec![
                FilterExpr::ConversationId(request.conversation_id.clone()),
                FilterExpr::ReceivedSince(since),
            ])
        } else {
            FilterExpr::ReceivedSince(since)
        };
        for folder in SCAN_FOLDERS {
            match self.source.restrict_folder(*folder, &folder_filter) {
                Ok(ids) => candidates.extend(ids),
                Err(e) => warn!("Restrict on {} failed: {}", folder, e),
            }
        }

        // Pass 3: subject-token filters built from the event's related
        // subjects.
        let subject_terms: Vec<FilterExpr> = meta
            .related_subjects
            .iter()
            .filter_map(|subject| FilterExpr::subject_tokens(subject))
            .collect();
        if !subject_terms.is_empty() {
            let subject_filter = FilterExpr::and(vec![
                FilterExpr::ReceivedSince(since),
                FilterExpr::or(subject_terms),
            ]);
            for folder in SCAN_FOLDERS {
                match self.source.restrict_folder(*folder, &subject_filter) {
                    Ok(ids) => candidates.extend(ids),
                    Err(e) => warn!("Subject restrict on {} failed: {}", folder, e),
                }
            }
        }

        // Resolve and ingest every candidate we do not already track.
        let mut seen: HashSet<String> = HashSet::new();
        for entry_id in candidates {
            let upper = entry_id.to_uppercase();
            if upper.is_empty() || !seen.insert(upper.clone()) {
                continue;
            }
            if tracked_everywhere.contains(&upper) {
                continue;
            }
            match self.source.resolve_by_id(&entry_id, None) {
                Ok(Some(snapshot)) => {
                    match self
                        .store
                        .try_add_mail(&snapshot, Some(&request.event_id))
                    {
                        Ok(Some(_)) => report.ingested += 1,
                        Ok(None) => debug!(
                            "Catch-up candidate '{}' not accepted into {}",
                            entry_id, request.event_id
                        ),
                        Err(e) => warn!("Catch-up ingest of '{}' failed: {}", entry_id, e),
                    }
                }
                Ok(None) => {
                    debug!("Entry '{}' no longer resolvable", entry_id);
                    report.pending_entry_ids.push(entry_id);
                }
                Err(e) if e.is_transient() => {
                    debug!("Transient resolve failure for '{}': {}", entry_id, e);
                    report.pending_entry_ids.push(entry_id);
                }
                Err(e) => warn!("Resolve of '{}' failed: {}", entry_id, e),
            }
        }

        // Completeness verdict over what the conversation walk enumerated.
        if !conversation_entries.is_empty() {
            let after = self.store.catchup_metadata(&request.event_id);
            let now_tracked: HashSet<String> = after
                .as_ref()
                .map(|m| {
                    m.tracked_entry_ids
                        .values()
                        .flatten()
                        .map(|id| id.to_uppercase())
                        .collect()
                })
                .unwrap_or_default();
            let outstanding: Vec<&String> = conversation_entries
                .iter()
                .filter(|id| !now_tracked.contains(&id.to_uppercase()))
                .collect();
            if outstanding.is_empty() {
                report.complete = true;
                info!(
                    "ConversationCompleteness OK for {} / {}",
                    request.event_id, request.conversation_id
                );
            } else {
                debug!(
                    "Conversation {} still missing {} entries",
                    request.conversation_id,
                    outstanding.len()
                );
            }
        }

        // Referenced message-ids that the scan did not surface are recorded
        // as not-found, suppressing future searches.
        if !missing_refs_before.is_empty() {
            let known_after: Vec<String> = self
                .store
                .catchup_metadata(&request.event_id)
                .map(|m| m.known_message_ids)
                .unwrap_or_default();
            let still_missing: Vec<String> = missing_refs_before
                .into_iter()
                .filter(|r| !known_after.iter().any(|k| k.eq_ignore_ascii_case(r)))
                .collect();
            if !still_missing.is_empty() {
                debug!(
                    "Marking {} referenced message-ids not found on {}",
                    still_missing.len(),
                    request.event_id
                );
                if let Err(e) = self
                    .store
                    .mark_message_ids_not_found(&request.event_id, &still_missing)
                {
                    warn!("Failed to record not-found ids: {}", e);
                }
            }
        }

        Some(report)
    }
}
