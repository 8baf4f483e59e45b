//! Infrastructure layer: event store, command dispatch, read models,
//! posting orchestration, run persistence and background workers.

pub mod command_dispatcher;
pub mod event_store;
pub mod posting;
pub mod projections;
pub mod read_model;
pub mod run_store;
pub mod sources;
pub mod workers;

mod integration_tests;

pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent};
pub use posting::{PostingError, PostingService};
pub use projections::{AccountBalance, AccountBalancesProjection, JournalEntriesProjection, JournalEntryView};
pub use read_model::{InMemoryTenantStore, TenantStore};
pub use run_store::InMemoryRunStore;
pub use sources::{
    InMemoryCompanyDirectory, InMemoryGroupSource, InMemoryIntercompanySource, InMemoryRuleSource,
    ProjectionLedgerReader,
};
pub use workers::{RunWorker, RunWorkerConfig, RunWorkerHandle};
