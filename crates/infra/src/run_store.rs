//! In-memory consolidation run store.

use std::collections::HashMap;
use std::sync::RwLock;

use groupledger_core::TenantId;
use groupledger_journal::PeriodRef;

use groupledger_consolidation::{
    ConsolidationGroupId, ConsolidationRun, ConsolidationRunId, RunStatus, RunStore, RunStoreError,
};

/// HashMap-backed [`RunStore`] for tests/dev.
///
/// `create` holds the write lock across the active-run check and the
/// insert, which is what makes the (group, period) conflict check atomic.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<ConsolidationRunId, ConsolidationRun>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_active(run: &ConsolidationRun) -> bool {
        matches!(run.status, RunStatus::Pending | RunStatus::InProgress)
    }
}

impl RunStore for InMemoryRunStore {
    fn create(&self, run: ConsolidationRun) -> Result<ConsolidationRunId, RunStoreError> {
        let mut runs = self
            .runs
            .write()
            .map_err(|_| RunStoreError::Storage("lock poisoned".to_string()))?;

        if runs.contains_key(&run.id) {
            return Err(RunStoreError::Conflict(format!("run {} already exists", run.id)));
        }

        if let Some(active) = runs.values().find(|r| {
            r.tenant_id == run.tenant_id
                && r.group_id == run.group_id
                && r.period == run.period
                && Self::is_active(r)
        }) {
            return Err(RunStoreError::Conflict(format!(
                "run {} is already {} for group {} period {}",
                active.id,
                match active.status {
                    RunStatus::Pending => "pending",
                    _ => "in progress",
                },
                run.group_id,
                run.period
            )));
        }

        let id = run.id;
        runs.insert(id, run);
        Ok(id)
    }

    fn get(
        &self,
        tenant_id: TenantId,
        run_id: ConsolidationRunId,
    ) -> Result<Option<ConsolidationRun>, RunStoreError> {
        let runs = self
            .runs
            .read()
            .map_err(|_| RunStoreError::Storage("lock poisoned".to_string()))?;

        match runs.get(&run_id) {
            Some(run) if run.tenant_id == tenant_id => Ok(Some(run.clone())),
            Some(_) => Err(RunStoreError::TenantIsolation),
            None => Ok(None),
        }
    }

    fn update(&self, run: &ConsolidationRun) -> Result<(), RunStoreError> {
        let mut runs = self
            .runs
            .write()
            .map_err(|_| RunStoreError::Storage("lock poisoned".to_string()))?;

        let stored = runs.get(&run.id).ok_or(RunStoreError::NotFound(run.id))?;
        if stored.tenant_id != run.tenant_id {
            return Err(RunStoreError::TenantIsolation);
        }
        if stored.status.is_terminal() {
            return Err(RunStoreError::TerminalRun(run.id));
        }

        // A cancellation request recorded on the stored run survives an
        // executor writing from a copy taken before the request landed.
        let mut updated = run.clone();
        if stored.cancel_requested {
            updated.cancel_requested = true;
        }
        runs.insert(run.id, updated);
        Ok(())
    }

    fn find_active(
        &self,
        tenant_id: TenantId,
        group_id: ConsolidationGroupId,
        period: PeriodRef,
    ) -> Result<Option<ConsolidationRun>, RunStoreError> {
        let runs = self
            .runs
            .read()
            .map_err(|_| RunStoreError::Storage("lock poisoned".to_string()))?;

        Ok(runs
            .values()
            .find(|r| {
                r.tenant_id == tenant_id
                    && r.group_id == group_id
                    && r.period == period
                    && Self::is_active(r)
            })
            .cloned())
    }

    fn latest_completed_for_period(
        &self,
        tenant_id: TenantId,
        group_id: ConsolidationGroupId,
        period: PeriodRef,
    ) -> Result<Option<ConsolidationRun>, RunStoreError> {
        let runs = self
            .runs
            .read()
            .map_err(|_| RunStoreError::Storage("lock poisoned".to_string()))?;

        Ok(runs
            .values()
            .filter(|r| {
                r.tenant_id == tenant_id
                    && r.group_id == group_id
                    && r.period == period
                    && r.status == RunStatus::Completed
            })
            .max_by_key(|r| r.finished_at)
            .cloned())
    }

    fn latest_completed(
        &self,
        tenant_id: TenantId,
        group_id: ConsolidationGroupId,
    ) -> Result<Option<ConsolidationRun>, RunStoreError> {
        let runs = self
            .runs
            .read()
            .map_err(|_| RunStoreError::Storage("lock poisoned".to_string()))?;

        Ok(runs
            .values()
            .filter(|r| {
                r.tenant_id == tenant_id
                    && r.group_id == group_id
                    && r.status == RunStatus::Completed
            })
            .max_by_key(|r| r.finished_at)
            .cloned())
    }

    fn claim_next_pending(
        &self,
        tenant_id: Option<TenantId>,
    ) -> Result<Option<ConsolidationRun>, RunStoreError> {
        let mut runs = self
            .runs
            .write()
            .map_err(|_| RunStoreError::Storage("lock poisoned".to_string()))?;

        // Oldest pending first (FIFO).
        let next_id = runs
            .values()
            .filter(|r| {
                r.status == RunStatus::Pending
                    && tenant_id.map_or(true, |t| r.tenant_id == t)
            })
            .min_by_key(|r| r.created_at)
            .map(|r| r.id);

        if let Some(id) = next_id {
            if let Some(run) = runs.get_mut(&id) {
                run.mark_in_progress()
                    .map_err(|e| RunStoreError::Storage(e.to_string()))?;
                return Ok(Some(run.clone()));
            }
        }

        Ok(None)
    }

    fn list_in_progress(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<ConsolidationRun>, RunStoreError> {
        let runs = self
            .runs
            .read()
            .map_err(|_| RunStoreError::Storage("lock poisoned".to_string()))?;

        let mut in_progress: Vec<ConsolidationRun> = runs
            .values()
            .filter(|r| r.tenant_id == tenant_id && r.status == RunStatus::InProgress)
            .cloned()
            .collect();
        in_progress.sort_by_key(|r| r.created_at);
        Ok(in_progress)
    }
}
