//! The consolidation run orchestrator.
//!
//! Drives the fixed step sequence for one run at a time, persisting each
//! step transition through the [`RunStore`] before advancing. Runs for
//! distinct (group, period) pairs may execute concurrently; the store's
//! create-time conflict check keeps a single pair mutually exclusive.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use groupledger_core::{DomainError, DomainResult, TenantId};
use groupledger_fx::RateProvider;
use groupledger_journal::{ChartOfAccounts, PeriodRef};

use crate::group::ConsolidationGroupId;
use crate::intercompany::{IntercompanyMatcher, MatcherConfig};
use crate::ports::{CompanyDirectory, GroupSource, IntercompanySource, LedgerReader, RuleSource};
use crate::run::{ConsolidationRun, ConsolidationRunId, RunOptions, RunStatus, StepType};
use crate::run_store::{RunStore, RunStoreError};
use crate::steps::{RunArtifacts, StepExecution, StepOutcome, step_handler};
use crate::trial_balance::ConsolidatedTrialBalance;
use crate::validation::summarize;

/// The collaborator ports an orchestrator needs.
pub struct Collaborators {
    pub groups: Arc<dyn GroupSource>,
    pub companies: Arc<dyn CompanyDirectory>,
    pub ledger: Arc<dyn LedgerReader>,
    pub rates: Arc<dyn RateProvider>,
    pub rules: Arc<dyn RuleSource>,
    pub intercompany: Arc<dyn IntercompanySource>,
}

/// Orchestrates consolidation runs over a [`RunStore`].
pub struct ConsolidationService<S> {
    store: S,
    chart: Arc<ChartOfAccounts>,
    collaborators: Collaborators,
    matcher: IntercompanyMatcher,
}

impl<S: RunStore> ConsolidationService<S> {
    pub fn new(
        store: S,
        chart: Arc<ChartOfAccounts>,
        collaborators: Collaborators,
        matcher_config: MatcherConfig,
    ) -> Self {
        Self {
            store,
            chart,
            collaborators,
            matcher: IntercompanyMatcher::new(matcher_config),
        }
    }

    /// Create a run for (group, period). Conflicts when another run is
    /// Pending/InProgress for the pair, or when a Completed run exists and
    /// `force_regeneration` is not set.
    pub fn initiate(
        &self,
        tenant_id: TenantId,
        group_id: ConsolidationGroupId,
        period: PeriodRef,
        as_of_date: NaiveDate,
        options: RunOptions,
    ) -> DomainResult<ConsolidationRun> {
        if self.collaborators.groups.group(tenant_id, group_id).is_none() {
            return Err(DomainError::not_found());
        }

        if !options.force_regeneration
            && self
                .store
                .latest_completed_for_period(tenant_id, group_id, period)
                .map_err(store_err)?
                .is_some()
        {
            return Err(DomainError::conflict(format!(
                "consolidation for group {group_id} period {period} already completed; \
                 set force_regeneration to run again"
            )));
        }

        let run = ConsolidationRun::new(tenant_id, group_id, period, as_of_date, options);
        self.store.create(run.clone()).map_err(store_err)?;

        info!(run_id = %run.id, group_id = %group_id, period = %period, "consolidation run initiated");
        Ok(run)
    }

    /// Claim a Pending run and execute its pipeline to a terminal state.
    pub fn execute(
        &self,
        tenant_id: TenantId,
        run_id: ConsolidationRunId,
    ) -> DomainResult<ConsolidationRun> {
        let mut run = self
            .store
            .get(tenant_id, run_id)
            .map_err(store_err)?
            .ok_or(DomainError::NotFound)?;

        run.mark_in_progress()?;
        self.store.update(&run).map_err(store_err)?;

        self.run_pipeline(run)
    }

    /// Execute a run already claimed (marked InProgress) by a worker.
    pub fn execute_claimed(&self, run: ConsolidationRun) -> DomainResult<ConsolidationRun> {
        if run.status != RunStatus::InProgress {
            return Err(DomainError::business_rule(format!(
                "expected a claimed InProgress run, got {:?}",
                run.status
            )));
        }
        self.run_pipeline(run)
    }

    fn run_pipeline(&self, mut run: ConsolidationRun) -> DomainResult<ConsolidationRun> {
        let Some(group) = self.collaborators.groups.group(run.tenant_id, run.group_id) else {
            run.mark_failed("consolidation group no longer exists")?;
            self.store.update(&run).map_err(store_err)?;
            return Ok(run);
        };

        let mut exec = StepExecution {
            tenant_id: run.tenant_id,
            group: &group,
            period: run.period,
            as_of_date: run.as_of_date,
            options: run.options,
            chart: self.chart.as_ref(),
            ledger: self.collaborators.ledger.as_ref(),
            rates: self.collaborators.rates.as_ref(),
            rules: self.collaborators.rules.as_ref(),
            intercompany: self.collaborators.intercompany.as_ref(),
            companies: self.collaborators.companies.as_ref(),
            matcher: &self.matcher,
            artifacts: RunArtifacts::default(),
        };

        for step_type in StepType::SEQUENCE {
            // Cancellation is cooperative and only honored here, between
            // steps, never mid-step.
            let cancel_requested = self
                .store
                .get(run.tenant_id, run.id)
                .map_err(store_err)?
                .map(|latest| latest.cancel_requested)
                .unwrap_or(false);
            if cancel_requested {
                run.cancel_requested = true;
                run.mark_cancelled()?;
                self.store.update(&run).map_err(store_err)?;
                info!(run_id = %run.id, step = %step_type, "run cancelled at step boundary");
                return Ok(run);
            }

            run.step_mut(step_type).mark_running();
            self.store.update(&run).map_err(store_err)?;

            match step_handler(step_type)(&mut exec) {
                StepOutcome::Completed { warnings } => {
                    run.warnings.extend(warnings);
                    run.step_mut(step_type).mark_completed();
                    self.store.update(&run).map_err(store_err)?;
                    debug!(run_id = %run.id, step = %step_type, "step completed");
                }
                StepOutcome::Skipped { reason } => {
                    run.step_mut(step_type).mark_skipped();
                    self.store.update(&run).map_err(store_err)?;
                    debug!(run_id = %run.id, step = %step_type, %reason, "step skipped");
                }
                StepOutcome::Failed { issues } => {
                    let summary = summarize(&issues);
                    run.step_mut(step_type).mark_failed(summary.clone());
                    run.mark_failed(format!("step {step_type} failed: {summary}"))?;
                    self.store.update(&run).map_err(store_err)?;
                    warn!(run_id = %run.id, step = %step_type, error = %summary, "run failed");
                    return Ok(run);
                }
            }
        }

        let Some(trial_balance) = exec.artifacts.trial_balance.take() else {
            run.mark_failed("pipeline finished without producing a trial balance")?;
            self.store.update(&run).map_err(store_err)?;
            return Ok(run);
        };

        run.mark_completed(trial_balance)?;
        self.store.update(&run).map_err(store_err)?;
        info!(run_id = %run.id, group_id = %run.group_id, period = %run.period, "run completed");
        Ok(run)
    }

    /// Fetch a run, including its step statuses.
    pub fn get(
        &self,
        tenant_id: TenantId,
        run_id: ConsolidationRunId,
    ) -> DomainResult<ConsolidationRun> {
        self.store
            .get(tenant_id, run_id)
            .map_err(store_err)?
            .ok_or(DomainError::NotFound)
    }

    /// Cancel a run: Pending cancels immediately, InProgress at the next
    /// step boundary; terminal runs reject cancellation.
    pub fn cancel(
        &self,
        tenant_id: TenantId,
        run_id: ConsolidationRunId,
    ) -> DomainResult<ConsolidationRun> {
        let mut run = self.get(tenant_id, run_id)?;

        match run.status {
            RunStatus::Pending => {
                run.mark_cancelled()?;
            }
            RunStatus::InProgress => {
                run.request_cancel()?;
            }
            _ => {
                return Err(DomainError::business_rule(format!(
                    "cannot cancel a run in {:?} status",
                    run.status
                )));
            }
        }

        self.store.update(&run).map_err(store_err)?;
        info!(run_id = %run.id, status = ?run.status, "cancellation recorded");
        Ok(run)
    }

    /// The trial balance of a Completed run.
    pub fn trial_balance(
        &self,
        tenant_id: TenantId,
        run_id: ConsolidationRunId,
    ) -> DomainResult<ConsolidatedTrialBalance> {
        let run = self.get(tenant_id, run_id)?;
        run.trial_balance.ok_or(DomainError::NotFound)
    }

    /// Most recently completed run for a group.
    pub fn latest_completed(
        &self,
        tenant_id: TenantId,
        group_id: ConsolidationGroupId,
    ) -> DomainResult<Option<ConsolidationRun>> {
        self.store.latest_completed(tenant_id, group_id).map_err(store_err)
    }

    /// Crash-recovery sweep: any run found InProgress with no live executor
    /// is forced Failed. Step artifacts live only in executor memory, so a
    /// resume would run on missing state; operators re-initiate with
    /// `force_regeneration` instead.
    pub fn recover_interrupted(&self, tenant_id: TenantId) -> DomainResult<Vec<ConsolidationRun>> {
        let mut recovered = Vec::new();
        for mut run in self.store.list_in_progress(tenant_id).map_err(store_err)? {
            run.mark_failed("interrupted: process restarted mid-run")?;
            self.store.update(&run).map_err(store_err)?;
            warn!(run_id = %run.id, "interrupted run marked failed");
            recovered.push(run);
        }
        Ok(recovered)
    }
}

fn store_err(err: RunStoreError) -> DomainError {
    match err {
        RunStoreError::NotFound(_) => DomainError::NotFound,
        RunStoreError::Conflict(msg) => DomainError::Conflict(msg),
        RunStoreError::TenantIsolation => {
            DomainError::business_rule("tenant isolation violation in run store")
        }
        RunStoreError::TerminalRun(id) => {
            DomainError::business_rule(format!("run {id} is terminal and immutable"))
        }
        RunStoreError::Storage(msg) => DomainError::business_rule(format!("run store failure: {msg}")),
    }
}
