//! Journal entry read model, including reversal cross-links.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use thiserror::Error;

use groupledger_core::{AggregateId, TenantId};
use groupledger_events::EventEnvelope;
use groupledger_journal::{
    CompanyId, EntryStatus, JournalEntryEvent, JournalEntryId, JournalLine, PeriodRef,
};

use crate::read_model::TenantStore;

/// Queryable view of one journal entry.
///
/// `reversed_entry_id` is set on a reversing entry (pointing at the entry it
/// undoes); `reversing_entry_id` is set on a reversed original. The links
/// are mutually exclusive: no entry carries both.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntryView {
    pub entry_id: JournalEntryId,
    pub company_id: CompanyId,
    pub period: PeriodRef,
    pub entry_date: NaiveDate,
    pub status: EntryStatus,
    pub description: Option<String>,
    pub lines: Vec<JournalLine>,
    pub entry_number: Option<u64>,
    pub reversed_entry_id: Option<JournalEntryId>,
    pub reversing_entry_id: Option<JournalEntryId>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum EntriesProjectionError {
    #[error("failed to deserialize journal event: {0}")]
    Deserialize(String),

    #[error("view not found for entry {0}")]
    MissingView(JournalEntryId),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Materializes entry views from the journal stream, including the
/// reversing entry carried inside a reversal event.
#[derive(Debug)]
pub struct JournalEntriesProjection<S>
where
    S: TenantStore<JournalEntryId, JournalEntryView>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> JournalEntriesProjection<S>
where
    S: TenantStore<JournalEntryId, JournalEntryView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: TenantId, entry_id: &JournalEntryId) -> Option<JournalEntryView> {
        self.store.get(tenant_id, entry_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<JournalEntryView> {
        self.store.list(tenant_id)
    }

    fn cursor(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        match self.cursors.read() {
            Ok(cursors) => *cursors
                .get(&CursorKey {
                    tenant_id,
                    aggregate_id,
                })
                .unwrap_or(&0),
            Err(_) => 0,
        }
    }

    fn advance_cursor(&self, tenant_id: TenantId, aggregate_id: AggregateId, seq: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(
                CursorKey {
                    tenant_id,
                    aggregate_id,
                },
                seq,
            );
        }
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), EntriesProjectionError> {
        if envelope.aggregate_type() != "journal.entry" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        let last = self.cursor(tenant_id, aggregate_id);

        if seq == 0 {
            return Err(EntriesProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if last != 0 && seq != last + 1 {
            return Err(EntriesProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: JournalEntryEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| EntriesProjectionError::Deserialize(e.to_string()))?;

        match ev {
            JournalEntryEvent::DraftCreated(e) => {
                self.store.upsert(
                    tenant_id,
                    e.entry_id,
                    JournalEntryView {
                        entry_id: e.entry_id,
                        company_id: e.company_id,
                        period: e.period,
                        entry_date: e.entry_date,
                        status: EntryStatus::Draft,
                        description: e.description,
                        lines: e.lines,
                        entry_number: None,
                        reversed_entry_id: None,
                        reversing_entry_id: None,
                    },
                );
            }
            JournalEntryEvent::DraftAmended(e) => {
                let mut view = self.view(tenant_id, e.entry_id)?;
                view.description = e.description;
                view.lines = e.lines;
                self.store.upsert(tenant_id, e.entry_id, view);
            }
            JournalEntryEvent::EntrySubmitted(e) => {
                self.set_status(tenant_id, e.entry_id, EntryStatus::PendingApproval)?;
            }
            JournalEntryEvent::EntryApproved(e) => {
                self.set_status(tenant_id, e.entry_id, EntryStatus::Approved)?;
            }
            JournalEntryEvent::EntryRejected(e) => {
                self.set_status(tenant_id, e.entry_id, EntryStatus::Draft)?;
            }
            JournalEntryEvent::DraftDiscarded(e) => {
                self.store.remove(tenant_id, &e.entry_id);
            }
            JournalEntryEvent::EntryPosted(e) => {
                let mut view = self.view(tenant_id, e.entry_id)?;
                view.status = EntryStatus::Posted;
                view.entry_number = Some(e.entry_number);
                self.store.upsert(tenant_id, e.entry_id, view);
            }
            JournalEntryEvent::EntryReversed(e) => {
                let mut original = self.view(tenant_id, e.entry_id)?;
                original.status = EntryStatus::Reversed;
                original.reversing_entry_id = Some(e.reversing_entry_id);

                // Materialize the reversing entry from the same event; a
                // single append produced both sides.
                let reversing = JournalEntryView {
                    entry_id: e.reversing_entry_id,
                    company_id: e.company_id,
                    period: e.period,
                    entry_date: e.occurred_at.date_naive(),
                    status: EntryStatus::Posted,
                    description: e.reason,
                    lines: e.reversing_lines,
                    entry_number: Some(e.reversing_entry_number),
                    reversed_entry_id: Some(e.entry_id),
                    reversing_entry_id: None,
                };

                self.store.upsert(tenant_id, e.entry_id, original);
                self.store.upsert(tenant_id, e.reversing_entry_id, reversing);
            }
        }

        self.advance_cursor(tenant_id, aggregate_id, seq);
        Ok(())
    }

    fn view(
        &self,
        tenant_id: TenantId,
        entry_id: JournalEntryId,
    ) -> Result<JournalEntryView, EntriesProjectionError> {
        self.store
            .get(tenant_id, &entry_id)
            .ok_or(EntriesProjectionError::MissingView(entry_id))
    }

    fn set_status(
        &self,
        tenant_id: TenantId,
        entry_id: JournalEntryId,
        status: EntryStatus,
    ) -> Result<(), EntriesProjectionError> {
        let mut view = self.view(tenant_id, entry_id)?;
        view.status = status;
        self.store.upsert(tenant_id, entry_id, view);
        Ok(())
    }
}
