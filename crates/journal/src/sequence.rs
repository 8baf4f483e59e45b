//! Per-company entry-number sequence.
//!
//! Each company has one dedicated sequence stream; allocating a number
//! appends an event, so the event store's optimistic concurrency check
//! serializes concurrent allocations. The posting service retries on
//! conflict. Numbers are strictly increasing and never reused; a number
//! allocated for a post that subsequently fails leaves a gap.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use groupledger_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use groupledger_events::Event;

use crate::company::CompanyId;

/// Command: allocate the next entry number for a company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocateNumber {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SequenceCommand {
    AllocateNumber(AllocateNumber),
}

/// Event: a number was taken from the sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberAllocated {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub number: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SequenceEvent {
    NumberAllocated(NumberAllocated),
}

impl Event for SequenceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SequenceEvent::NumberAllocated(_) => "journal.sequence.number_allocated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SequenceEvent::NumberAllocated(e) => e.occurred_at,
        }
    }
}

/// Aggregate root: the entry-number counter for one company.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryNumberSequence {
    id: AggregateId,
    last: u64,
    version: u64,
}

impl EntryNumberSequence {
    /// Empty counter for rehydration.
    pub fn empty(id: AggregateId) -> Self {
        Self {
            id,
            last: 0,
            version: 0,
        }
    }

    /// Deterministic stream id for a company's sequence: the company uuid
    /// itself. Companies are not event-sourced, so the id space is free.
    pub fn stream_id(company_id: CompanyId) -> AggregateId {
        AggregateId::from_uuid(company_id.0)
    }

    pub fn last_allocated(&self) -> u64 {
        self.last
    }
}

impl AggregateRoot for EntryNumberSequence {
    type Id = AggregateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for EntryNumberSequence {
    type Command = SequenceCommand;
    type Event = SequenceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SequenceEvent::NumberAllocated(e) => {
                self.last = e.number;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SequenceCommand::AllocateNumber(cmd) => {
                Ok(vec![SequenceEvent::NumberAllocated(NumberAllocated {
                    tenant_id: cmd.tenant_id,
                    company_id: cmd.company_id,
                    number: self.last + 1,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}
