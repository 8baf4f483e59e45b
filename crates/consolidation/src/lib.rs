//! `groupledger-consolidation`: the consolidation and elimination engine.
//!
//! Aggregates member-company balances into group currency, reconciles
//! intercompany activity, applies ordered elimination rules, allocates
//! non-controlling interest and produces the consolidated trial balance,
//! all driven by a fixed seven-step pipeline with per-step status persisted
//! through the [`RunStore`] port.

pub mod aggregation;
pub mod elimination;
pub mod group;
pub mod intercompany;
pub mod nci;
pub mod ports;
pub mod run;
pub mod run_store;
pub mod service;
pub mod steps;
pub mod trial_balance;
pub mod validation;

pub use aggregation::{AggregatedBalances, AggregatedLine, TrialBalanceAggregator};
pub use elimination::{
    AccountSelector, EliminationEngine, EliminationEntry, EliminationOutcome, EliminationRule,
    EliminationRuleId, EliminationType, TriggerConditions,
};
pub use group::{
    ConsolidationGroup, ConsolidationGroupId, ConsolidationMethod, GroupMember, VieDetermination,
};
pub use intercompany::{
    IntercompanyMatcher, IntercompanyTransaction, IntercompanyTransactionId, MatchReport,
    MatchedPair, MatcherConfig, MatchingStatus,
};
pub use nci::{NciCalculator, NciResult};
pub use ports::{
    AccountBalanceTotals, CompanyDirectory, GroupSource, IntercompanySource, LedgerReader,
    RuleSource,
};
pub use run::{
    ConsolidationRun, ConsolidationRunId, ConsolidationStep, RunOptions, RunStatus, StepStatus,
    StepType,
};
pub use run_store::{RunStore, RunStoreError};
pub use service::{Collaborators, ConsolidationService};
pub use steps::{RunArtifacts, StepExecution, StepOutcome, step_handler};
pub use trial_balance::{ConsolidatedTrialBalance, TrialBalanceLine};
pub use validation::{Severity, ValidationIssue};
