//! `groupledger-events`: event mechanics shared by domain and infra.
//!
//! Events are immutable facts, versioned for schema evolution, appended to
//! tenant-scoped streams and distributed to consumers over a bus.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod tenant;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::InMemoryEventBus;
pub use tenant::TenantScoped;
