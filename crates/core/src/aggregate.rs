//! Aggregate contract for event-sourced domain models.

use crate::error::{DomainError, DomainResult};

/// Minimal aggregate-root interface.
///
/// Deliberately small: domain crates decide how state transitions are
/// modeled; nothing infrastructural leaks in here.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Monotonically increasing state version. For event-sourced aggregates
    /// this is the number of events applied (the stream revision).
    fn version(&self) -> u64;
}

/// Optimistic-concurrency expectation when appending to a stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// No version check (idempotent commands, migrations).
    Any,
    /// The stream must currently be at exactly this version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "version check failed (expected {self:?}, stream at {actual})"
            )))
        }
    }
}

/// Pure decide/evolve semantics.
///
/// `handle` decides which events a command produces without mutating state;
/// `apply` evolves state from a single event. Neither performs IO; side
/// effects happen in infrastructure after events are decided.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Evolve in-memory state from one event. Must be deterministic and bump
    /// `version()` by one per applied event.
    fn apply(&mut self, event: &Self::Event);

    /// Decide which events to emit for a command against current state.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}
