use groupledger_core::TenantId;

use crate::EventEnvelope;

/// Marker for messages carrying a tenant id, so infrastructure (workers,
/// filters) can enforce tenant scoping without knowing the payload type.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;
}

impl<E> TenantScoped for EventEnvelope<E> {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id()
    }
}
