//! Persistence port for consolidation runs.

use std::sync::Arc;

use thiserror::Error;

use groupledger_core::TenantId;
use groupledger_journal::PeriodRef;

use crate::group::ConsolidationGroupId;
use crate::run::{ConsolidationRun, ConsolidationRunId};

/// Run store failure.
#[derive(Debug, Clone, Error)]
pub enum RunStoreError {
    #[error("run not found: {0}")]
    NotFound(ConsolidationRunId),

    /// A Pending/InProgress run already exists for the (group, period).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("tenant isolation violation")]
    TenantIsolation,

    /// Terminal runs are immutable audit records.
    #[error("run {0} is terminal and cannot be modified")]
    TerminalRun(ConsolidationRunId),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Tenant-scoped run persistence.
///
/// `create` is the mutual-exclusion point for a (group, period): it must
/// atomically reject a new run while another is Pending/InProgress for the
/// same pair. `update` must refuse to modify a run whose stored status is
/// terminal, and must preserve a cancellation request already recorded on
/// the stored run (cancel and executor updates race; the request wins).
pub trait RunStore: Send + Sync {
    fn create(&self, run: ConsolidationRun) -> Result<ConsolidationRunId, RunStoreError>;

    fn get(
        &self,
        tenant_id: TenantId,
        run_id: ConsolidationRunId,
    ) -> Result<Option<ConsolidationRun>, RunStoreError>;

    fn update(&self, run: &ConsolidationRun) -> Result<(), RunStoreError>;

    /// The Pending/InProgress run for a (group, period), if any.
    fn find_active(
        &self,
        tenant_id: TenantId,
        group_id: ConsolidationGroupId,
        period: PeriodRef,
    ) -> Result<Option<ConsolidationRun>, RunStoreError>;

    /// Most recently completed run for the exact (group, period).
    fn latest_completed_for_period(
        &self,
        tenant_id: TenantId,
        group_id: ConsolidationGroupId,
        period: PeriodRef,
    ) -> Result<Option<ConsolidationRun>, RunStoreError>;

    /// Most recently completed run for the group across all periods.
    fn latest_completed(
        &self,
        tenant_id: TenantId,
        group_id: ConsolidationGroupId,
    ) -> Result<Option<ConsolidationRun>, RunStoreError>;

    /// Atomically claim the oldest ready Pending run (marking it
    /// InProgress). Workers poll this.
    fn claim_next_pending(
        &self,
        tenant_id: Option<TenantId>,
    ) -> Result<Option<ConsolidationRun>, RunStoreError>;

    /// Runs currently InProgress (crash-recovery sweep).
    fn list_in_progress(&self, tenant_id: TenantId)
    -> Result<Vec<ConsolidationRun>, RunStoreError>;
}

impl<S> RunStore for Arc<S>
where
    S: RunStore + ?Sized,
{
    fn create(&self, run: ConsolidationRun) -> Result<ConsolidationRunId, RunStoreError> {
        (**self).create(run)
    }

    fn get(
        &self,
        tenant_id: TenantId,
        run_id: ConsolidationRunId,
    ) -> Result<Option<ConsolidationRun>, RunStoreError> {
        (**self).get(tenant_id, run_id)
    }

    fn update(&self, run: &ConsolidationRun) -> Result<(), RunStoreError> {
        (**self).update(run)
    }

    fn find_active(
        &self,
        tenant_id: TenantId,
        group_id: ConsolidationGroupId,
        period: PeriodRef,
    ) -> Result<Option<ConsolidationRun>, RunStoreError> {
        (**self).find_active(tenant_id, group_id, period)
    }

    fn latest_completed_for_period(
        &self,
        tenant_id: TenantId,
        group_id: ConsolidationGroupId,
        period: PeriodRef,
    ) -> Result<Option<ConsolidationRun>, RunStoreError> {
        (**self).latest_completed_for_period(tenant_id, group_id, period)
    }

    fn latest_completed(
        &self,
        tenant_id: TenantId,
        group_id: ConsolidationGroupId,
    ) -> Result<Option<ConsolidationRun>, RunStoreError> {
        (**self).latest_completed(tenant_id, group_id)
    }

    fn claim_next_pending(
        &self,
        tenant_id: Option<TenantId>,
    ) -> Result<Option<ConsolidationRun>, RunStoreError> {
        (**self).claim_next_pending(tenant_id)
    }

    fn list_in_progress(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<ConsolidationRun>, RunStoreError> {
        (**self).list_in_progress(tenant_id)
    }
}
