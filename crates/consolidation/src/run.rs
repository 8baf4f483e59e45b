//! Consolidation run and step state machines.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use groupledger_core::{DomainError, DomainResult, TenantId};
use groupledger_journal::PeriodRef;

use crate::group::ConsolidationGroupId;
use crate::trial_balance::ConsolidatedTrialBalance;
use crate::validation::ValidationIssue;

/// Consolidation run identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsolidationRunId(pub Uuid);

impl ConsolidationRunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ConsolidationRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ConsolidationRunId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Run lifecycle status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Terminal runs are immutable audit records.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

/// Pipeline step kinds, in execution order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Validate,
    Translate,
    Aggregate,
    MatchIntercompany,
    Eliminate,
    Nci,
    GenerateTrialBalance,
}

impl StepType {
    /// The fixed pipeline. Steps always execute in this order; each consumes
    /// the previous step's output, so the sequence is never parallelized.
    pub const SEQUENCE: [StepType; 7] = [
        StepType::Validate,
        StepType::Translate,
        StepType::Aggregate,
        StepType::MatchIntercompany,
        StepType::Eliminate,
        StepType::Nci,
        StepType::GenerateTrialBalance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StepType::Validate => "validate",
            StepType::Translate => "translate",
            StepType::Aggregate => "aggregate",
            StepType::MatchIntercompany => "match_intercompany",
            StepType::Eliminate => "eliminate",
            StepType::Nci => "nci",
            StepType::GenerateTrialBalance => "generate_trial_balance",
        }
    }
}

impl core::fmt::Display for StepType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

/// Execution record for one pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationStep {
    pub step_type: StepType,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error_message: Option<String>,
}

impl ConsolidationStep {
    pub fn new(step_type: StepType) -> Self {
        Self {
            step_type,
            status: StepStatus::Pending,
            started_at: None,
            finished_at: None,
            duration_ms: None,
            error_message: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = StepStatus::InProgress;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        let now = Utc::now();
        self.status = StepStatus::Completed;
        self.finished_at = Some(now);
        self.duration_ms = self.elapsed_ms(now);
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        let now = Utc::now();
        self.status = StepStatus::Failed;
        self.finished_at = Some(now);
        self.duration_ms = self.elapsed_ms(now);
        self.error_message = Some(error.into());
    }

    pub fn mark_skipped(&mut self) {
        self.status = StepStatus::Skipped;
    }

    fn elapsed_ms(&self, now: DateTime<Utc>) -> Option<u64> {
        self.started_at
            .map(|s| (now - s).num_milliseconds().max(0) as u64)
    }
}

/// Options supplied when initiating a run.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Skip the structural Validate step entirely (marked Skipped).
    pub skip_validation: bool,
    /// Keep going when intercompany matching only produced warnings.
    pub continue_on_warnings: bool,
    /// Allow equity/cost-method members without flagging them.
    pub include_equity_method_investments: bool,
    /// Permit re-running a (group, period) that already completed.
    pub force_regeneration: bool,
}

/// One consolidation invocation for a (group, period) pair.
///
/// Created Pending, claimed into InProgress by an executor, and finished as
/// Completed (with its trial balance attached), Failed or Cancelled. A
/// terminal run is an immutable audit record: completed step records and the
/// trial balance snapshot are never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationRun {
    pub id: ConsolidationRunId,
    pub tenant_id: TenantId,
    pub group_id: ConsolidationGroupId,
    pub period: PeriodRef,
    pub as_of_date: NaiveDate,
    pub status: RunStatus,
    pub steps: Vec<ConsolidationStep>,
    pub options: RunOptions,
    pub warnings: Vec<ValidationIssue>,
    pub trial_balance: Option<ConsolidatedTrialBalance>,
    pub error_message: Option<String>,
    /// Cooperative cancellation flag, honored at step boundaries only.
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ConsolidationRun {
    pub fn new(
        tenant_id: TenantId,
        group_id: ConsolidationGroupId,
        period: PeriodRef,
        as_of_date: NaiveDate,
        options: RunOptions,
    ) -> Self {
        Self {
            id: ConsolidationRunId::new(),
            tenant_id,
            group_id,
            period,
            as_of_date,
            status: RunStatus::Pending,
            steps: StepType::SEQUENCE.iter().map(|s| ConsolidationStep::new(*s)).collect(),
            options,
            warnings: Vec::new(),
            trial_balance: None,
            error_message: None,
            cancel_requested: false,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn step(&self, step_type: StepType) -> &ConsolidationStep {
        self.steps
            .iter()
            .find(|s| s.step_type == step_type)
            .unwrap_or_else(|| unreachable!("run always carries all steps"))
    }

    pub fn step_mut(&mut self, step_type: StepType) -> &mut ConsolidationStep {
        self.steps
            .iter_mut()
            .find(|s| s.step_type == step_type)
            .unwrap_or_else(|| unreachable!("run always carries all steps"))
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn ensure_not_terminal(&self, action: &str) -> DomainResult<()> {
        if self.is_terminal() {
            return Err(DomainError::business_rule(format!(
                "cannot {action}: run is {:?} (terminal)",
                self.status
            )));
        }
        Ok(())
    }

    /// Pending → InProgress (an executor claimed the run).
    pub fn mark_in_progress(&mut self) -> DomainResult<()> {
        if self.status != RunStatus::Pending {
            return Err(DomainError::business_rule(format!(
                "cannot start a run in {:?} status",
                self.status
            )));
        }
        self.status = RunStatus::InProgress;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// InProgress → Completed, attaching the trial-balance snapshot.
    pub fn mark_completed(&mut self, trial_balance: ConsolidatedTrialBalance) -> DomainResult<()> {
        self.ensure_in_progress("complete")?;
        self.status = RunStatus::Completed;
        self.trial_balance = Some(trial_balance);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// InProgress → Failed. Remaining pending steps become Skipped; records
    /// of already-finished steps are preserved for diagnosis.
    pub fn mark_failed(&mut self, error: impl Into<String>) -> DomainResult<()> {
        self.ensure_in_progress("fail")?;
        self.status = RunStatus::Failed;
        self.error_message = Some(error.into());
        self.finished_at = Some(Utc::now());
        self.skip_remaining_steps();
        Ok(())
    }

    /// Pending/InProgress → Cancelled. Remaining steps become Skipped.
    pub fn mark_cancelled(&mut self) -> DomainResult<()> {
        self.ensure_not_terminal("cancel")?;
        self.status = RunStatus::Cancelled;
        self.finished_at = Some(Utc::now());
        self.skip_remaining_steps();
        Ok(())
    }

    /// Request cooperative cancellation; the executor honors it at the next
    /// step boundary, never mid-step.
    pub fn request_cancel(&mut self) -> DomainResult<()> {
        self.ensure_not_terminal("request cancellation of")?;
        self.cancel_requested = true;
        Ok(())
    }

    fn ensure_in_progress(&self, action: &str) -> DomainResult<()> {
        if self.status != RunStatus::InProgress {
            return Err(DomainError::business_rule(format!(
                "cannot {action} a run in {:?} status",
                self.status
            )));
        }
        Ok(())
    }

    fn skip_remaining_steps(&mut self) {
        for step in &mut self.steps {
            if !step.status.is_terminal() {
                step.mark_skipped();
            }
        }
    }
}
