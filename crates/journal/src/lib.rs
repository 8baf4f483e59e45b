//! `groupledger-journal`: the double-entry journal ledger domain.
//!
//! Chart of accounts, companies, fiscal periods, and the event-sourced
//! [`JournalEntry`] aggregate with its posting state machine. Pure domain
//! logic only: no IO, no persistence concerns.

pub mod account;
pub mod company;
pub mod entry;
pub mod period;
pub mod sequence;

pub use account::{Account, AccountId, AccountType, ChartOfAccounts, NormalBalance};
pub use company::{Company, CompanyId};
pub use entry::{
    EntryStatus, JournalEntry, JournalEntryCommand, JournalEntryEvent, JournalEntryId, JournalLine,
};
pub use period::{FiscalPeriod, PeriodCalendar, PeriodRef, PeriodStatus};
pub use sequence::{EntryNumberSequence, SequenceCommand, SequenceEvent};
