//! Journal posting orchestration.
//!
//! Wraps the command dispatcher with the validations that need reference
//! data (open period, known accounts) and with per-company entry-number
//! allocation. Allocation dispatches against the company's sequence stream,
//! so concurrent posts collide on the optimistic version check and retry;
//! the store's single-stream atomic append keeps each post and reversal
//! all-or-nothing.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

use groupledger_core::{AggregateId, DomainError, TenantId, UserId};
use groupledger_events::{EventBus, EventEnvelope};
use groupledger_journal::{
    ChartOfAccounts, CompanyId, EntryNumberSequence, JournalEntry, JournalEntryCommand,
    JournalEntryId, JournalLine, PeriodCalendar, PeriodRef, SequenceCommand, SequenceEvent,
    entry::{AmendDraft, Approve, CreateDraft, Discard, Post, Reject, Reverse, Submit},
    sequence::AllocateNumber,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;

#[derive(Debug, Error)]
pub enum PostingError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("command dispatch failed: {0:?}")]
    Dispatch(DispatchError),

    /// The per-company sequence stayed contended for every attempt.
    #[error("entry number allocation exhausted after {attempts} attempts")]
    AllocationContention { attempts: u32 },
}

impl From<DispatchError> for PostingError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::NotFound => PostingError::Domain(DomainError::NotFound),
            DispatchError::Validation(msg) => PostingError::Domain(DomainError::Validation(msg)),
            DispatchError::BusinessRule(msg) => {
                PostingError::Domain(DomainError::BusinessRule(msg))
            }
            other => PostingError::Dispatch(other),
        }
    }
}

/// Drives the journal entry lifecycle end to end.
pub struct PostingService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    chart: Arc<ChartOfAccounts>,
    calendar: Arc<PeriodCalendar>,
    allocation_attempts: u32,
}

impl<S, B> PostingService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B, chart: Arc<ChartOfAccounts>, calendar: Arc<PeriodCalendar>) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            chart,
            calendar,
            allocation_attempts: 16,
        }
    }

    pub fn with_allocation_attempts(mut self, attempts: u32) -> Self {
        self.allocation_attempts = attempts.max(1);
        self
    }

    pub fn create_draft(
        &self,
        tenant_id: TenantId,
        company_id: CompanyId,
        period: PeriodRef,
        entry_date: NaiveDate,
        description: Option<String>,
        lines: Vec<JournalLine>,
        created_by: UserId,
    ) -> Result<JournalEntryId, PostingError> {
        let entry_id = JournalEntryId::new(AggregateId::new());
        self.dispatch_entry(
            tenant_id,
            entry_id,
            JournalEntryCommand::CreateDraft(CreateDraft {
                tenant_id,
                entry_id,
                company_id,
                period,
                entry_date,
                description,
                lines,
                created_by,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(entry_id)
    }

    pub fn amend(
        &self,
        tenant_id: TenantId,
        entry_id: JournalEntryId,
        description: Option<String>,
        lines: Vec<JournalLine>,
    ) -> Result<(), PostingError> {
        self.dispatch_entry(
            tenant_id,
            entry_id,
            JournalEntryCommand::AmendDraft(AmendDraft {
                tenant_id,
                entry_id,
                description,
                lines,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    pub fn submit(&self, tenant_id: TenantId, entry_id: JournalEntryId) -> Result<(), PostingError> {
        self.dispatch_entry(
            tenant_id,
            entry_id,
            JournalEntryCommand::Submit(Submit {
                tenant_id,
                entry_id,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    pub fn approve(
        &self,
        tenant_id: TenantId,
        entry_id: JournalEntryId,
        approved_by: UserId,
    ) -> Result<(), PostingError> {
        self.dispatch_entry(
            tenant_id,
            entry_id,
            JournalEntryCommand::Approve(Approve {
                tenant_id,
                entry_id,
                approved_by,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    pub fn reject(
        &self,
        tenant_id: TenantId,
        entry_id: JournalEntryId,
        reason: Option<String>,
    ) -> Result<(), PostingError> {
        self.dispatch_entry(
            tenant_id,
            entry_id,
            JournalEntryCommand::Reject(Reject {
                tenant_id,
                entry_id,
                reason,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    /// Delete a draft. Rejected for any entry past Draft status.
    pub fn discard(&self, tenant_id: TenantId, entry_id: JournalEntryId) -> Result<(), PostingError> {
        self.dispatch_entry(
            tenant_id,
            entry_id,
            JournalEntryCommand::Discard(Discard {
                tenant_id,
                entry_id,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    /// Post an Approved entry: validate the period and accounts, allocate
    /// the company's next entry number, then dispatch the posting command.
    /// Returns the assigned entry number.
    pub fn post(&self, tenant_id: TenantId, entry_id: JournalEntryId) -> Result<u64, PostingError> {
        let entry = self.get(tenant_id, entry_id)?;
        let (company_id, period) = entry_origin(&entry)?;

        if !self.calendar.is_open(period) {
            return Err(
                DomainError::business_rule(format!("period {period} is not open for posting"))
                    .into(),
            );
        }
        for line in entry.lines() {
            if !self.chart.contains(line.account_id) {
                return Err(DomainError::validation(format!(
                    "line references account {} missing from the chart of accounts",
                    line.account_id
                ))
                .into());
            }
        }

        let entry_number = self.allocate_number(tenant_id, company_id)?;
        self.dispatch_entry(
            tenant_id,
            entry_id,
            JournalEntryCommand::Post(Post {
                tenant_id,
                entry_id,
                entry_number,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(entry_number)
    }

    /// Reverse a Posted entry. Allocates a number for the reversing entry
    /// and dispatches the single reversal command; the one appended event
    /// carries the full reversing entry, so the pair persists atomically.
    /// Returns the reversing entry's id.
    pub fn reverse(
        &self,
        tenant_id: TenantId,
        entry_id: JournalEntryId,
        reason: Option<String>,
    ) -> Result<JournalEntryId, PostingError> {
        let entry = self.get(tenant_id, entry_id)?;
        let (company_id, _) = entry_origin(&entry)?;

        let reversing_entry_number = self.allocate_number(tenant_id, company_id)?;
        let reversing_entry_id = JournalEntryId::new(AggregateId::new());

        self.dispatch_entry(
            tenant_id,
            entry_id,
            JournalEntryCommand::Reverse(Reverse {
                tenant_id,
                entry_id,
                reversing_entry_id,
                reversing_entry_number,
                reason,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(reversing_entry_id)
    }

    /// Rehydrate an entry from its stream.
    pub fn get(
        &self,
        tenant_id: TenantId,
        entry_id: JournalEntryId,
    ) -> Result<JournalEntry, PostingError> {
        let entry = self
            .dispatcher
            .load(tenant_id, entry_id.0, |_, id| {
                JournalEntry::empty(JournalEntryId::new(id))
            })?;
        if !entry.exists() {
            return Err(DomainError::NotFound.into());
        }
        Ok(entry)
    }

    fn dispatch_entry(
        &self,
        tenant_id: TenantId,
        entry_id: JournalEntryId,
        command: JournalEntryCommand,
    ) -> Result<(), PostingError> {
        self.dispatcher
            .dispatch::<JournalEntry>(tenant_id, entry_id.0, "journal.entry", command, |_, id| {
                JournalEntry::empty(JournalEntryId::new(id))
            })?;
        Ok(())
    }

    /// Optimistic-retry allocation against the company's sequence stream.
    fn allocate_number(
        &self,
        tenant_id: TenantId,
        company_id: CompanyId,
    ) -> Result<u64, PostingError> {
        let stream_id = EntryNumberSequence::stream_id(company_id);

        for attempt in 1..=self.allocation_attempts {
            let result = self.dispatcher.dispatch::<EntryNumberSequence>(
                tenant_id,
                stream_id,
                "journal.sequence",
                SequenceCommand::AllocateNumber(AllocateNumber {
                    tenant_id,
                    company_id,
                    occurred_at: Utc::now(),
                }),
                |_, id| EntryNumberSequence::empty(id),
            );

            match result {
                Ok(events) => {
                    let stored = events.first().ok_or_else(|| {
                        PostingError::Domain(DomainError::business_rule(
                            "sequence allocation produced no event",
                        ))
                    })?;
                    let SequenceEvent::NumberAllocated(allocated) =
                        serde_json::from_value(stored.payload.clone())
                            .map_err(|e| PostingError::Dispatch(DispatchError::Deserialize(e.to_string())))?;
                    return Ok(allocated.number);
                }
                Err(DispatchError::Concurrency(_)) => {
                    // Another poster took this number; reload and try the next.
                    debug!(%company_id, attempt, "entry number contention, retrying");
                    continue;
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(PostingError::AllocationContention {
            attempts: self.allocation_attempts,
        })
    }
}

fn entry_origin(entry: &JournalEntry) -> Result<(CompanyId, PeriodRef), PostingError> {
    match (entry.company_id(), entry.period()) {
        (Some(company_id), Some(period)) => Ok((company_id, period)),
        _ => Err(DomainError::business_rule("entry has no company/period").into()),
    }
}
