//! Event-driven read models over the journal.

pub mod balances;
pub mod entries;

pub use balances::{AccountBalance, AccountBalancesProjection, BalancesProjectionError};
pub use entries::{EntriesProjectionError, JournalEntriesProjection, JournalEntryView};
