//! Disposable read-model storage.

mod tenant_store;

pub use tenant_store::{InMemoryTenantStore, TenantStore};
