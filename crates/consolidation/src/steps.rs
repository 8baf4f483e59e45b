//! The pipeline's step handlers.
//!
//! The step sequence is data ([`StepType::SEQUENCE`]) processed by a table
//! of plain functions keyed by step type, not a polymorphic step hierarchy.
//! Each handler reads and extends [`RunArtifacts`], the working state that
//! flows from one step to the next inside a single executor.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use groupledger_core::TenantId;
use groupledger_fx::{RateProvider, translate};
use groupledger_journal::{ChartOfAccounts, CompanyId, PeriodRef};

use crate::aggregation::{AggregatedBalances, TrialBalanceAggregator};
use crate::elimination::{EliminationEngine, EliminationOutcome};
use crate::group::{ConsolidationGroup, ConsolidationMethod};
use crate::intercompany::{IntercompanyMatcher, MatchReport};
use crate::nci::{NciCalculator, NciResult};
use crate::ports::{
    AccountBalanceTotals, CompanyDirectory, IntercompanySource, LedgerReader, RuleSource,
};
use crate::run::{RunOptions, StepType};
use crate::trial_balance::ConsolidatedTrialBalance;
use crate::validation::{ValidationIssue, has_errors};

/// Intermediate outputs accumulated across the pipeline. Lives only in the
/// executor's memory; the run record persists statuses, warnings and the
/// final trial balance.
#[derive(Debug, Default)]
pub struct RunArtifacts {
    /// Per member: balances translated to group currency.
    pub translated: Vec<(CompanyId, Vec<AccountBalanceTotals>)>,
    pub aggregated: Option<AggregatedBalances>,
    pub match_report: Option<MatchReport>,
    pub eliminations: Option<EliminationOutcome>,
    pub nci: Option<NciResult>,
    pub trial_balance: Option<ConsolidatedTrialBalance>,
}

/// Everything a step handler may touch.
pub struct StepExecution<'a> {
    pub tenant_id: TenantId,
    pub group: &'a ConsolidationGroup,
    pub period: PeriodRef,
    pub as_of_date: NaiveDate,
    pub options: RunOptions,
    pub chart: &'a ChartOfAccounts,
    pub ledger: &'a dyn LedgerReader,
    pub rates: &'a dyn RateProvider,
    pub rules: &'a dyn RuleSource,
    pub intercompany: &'a dyn IntercompanySource,
    pub companies: &'a dyn CompanyDirectory,
    pub matcher: &'a IntercompanyMatcher,
    pub artifacts: RunArtifacts,
}

/// How a step finished.
#[derive(Debug)]
pub enum StepOutcome {
    Completed { warnings: Vec<ValidationIssue> },
    Skipped { reason: String },
    Failed { issues: Vec<ValidationIssue> },
}

pub type StepHandler = fn(&mut StepExecution<'_>) -> StepOutcome;

/// Handler table, keyed by step type.
pub fn step_handler(step: StepType) -> StepHandler {
    match step {
        StepType::Validate => validate_step,
        StepType::Translate => translate_step,
        StepType::Aggregate => aggregate_step,
        StepType::MatchIntercompany => match_intercompany_step,
        StepType::Eliminate => eliminate_step,
        StepType::Nci => nci_step,
        StepType::GenerateTrialBalance => generate_trial_balance_step,
    }
}

fn split_issues(issues: Vec<ValidationIssue>) -> StepOutcome {
    if has_errors(&issues) {
        StepOutcome::Failed { issues }
    } else {
        StepOutcome::Completed { warnings: issues }
    }
}

/// Structural checks over the group configuration.
fn validate_step(exec: &mut StepExecution<'_>) -> StepOutcome {
    if exec.options.skip_validation {
        return StepOutcome::Skipped {
            reason: "skip_validation option set".to_string(),
        };
    }

    let mut issues = Vec::new();
    let group = exec.group;

    if group.members.is_empty() {
        issues.push(
            ValidationIssue::error("GROUP_EMPTY", "consolidation group has no members")
                .with_reference(group.id.to_string()),
        );
    } else if group.line_consolidated_members().next().is_none() {
        issues.push(
            ValidationIssue::error(
                "GROUP_NO_CONSOLIDATED_MEMBERS",
                "no member consolidates line-by-line",
            )
            .with_reference(group.id.to_string()),
        );
    }

    let hundred = Decimal::from(100);
    for member in &group.members {
        let reference = member.company_id.to_string();

        if member.ownership <= Decimal::ZERO || member.ownership > hundred {
            issues.push(
                ValidationIssue::error(
                    "MEMBER_OWNERSHIP_INVALID",
                    format!("ownership {}% is outside (0, 100]", member.ownership),
                )
                .with_reference(reference.clone()),
            );
        }

        if exec.companies.company(exec.tenant_id, member.company_id).is_none() {
            issues.push(
                ValidationIssue::error("COMPANY_UNKNOWN", "member company is not registered")
                    .with_reference(reference.clone()),
            );
        }

        match member.method {
            ConsolidationMethod::VariableInterestEntity if member.vie_determination.is_none() => {
                issues.push(
                    ValidationIssue::warning(
                        "VIE_DETERMINATION_MISSING",
                        "VIE member has no determination and will be excluded from aggregation",
                    )
                    .with_reference(reference),
                );
            }
            ConsolidationMethod::EquityMethod | ConsolidationMethod::CostMethod
                if !exec.options.include_equity_method_investments =>
            {
                issues.push(
                    ValidationIssue::warning(
                        "EQUITY_METHOD_SKIPPED",
                        "member uses an investment method and is excluded from line aggregation",
                    )
                    .with_reference(reference),
                );
            }
            _ => {}
        }
    }

    split_issues(issues)
}

/// Fetch each member's posted balances and translate them into the group's
/// reporting currency.
fn translate_step(exec: &mut StepExecution<'_>) -> StepOutcome {
    let mut issues = Vec::new();
    let mut translated = Vec::new();

    for member in exec.group.line_consolidated_members() {
        let Some(company) = exec.companies.company(exec.tenant_id, member.company_id) else {
            issues.push(
                ValidationIssue::error("COMPANY_UNKNOWN", "member company is not registered")
                    .with_reference(member.company_id.to_string()),
            );
            continue;
        };

        let balances = exec
            .ledger
            .posted_balances(exec.tenant_id, member.company_id, exec.period);

        if company.functional_currency == exec.group.reporting_currency {
            translated.push((member.company_id, balances));
            continue;
        }

        let mut converted = Vec::with_capacity(balances.len());
        for totals in balances {
            let Some(account) = exec.chart.get(totals.account_id) else {
                issues.push(
                    ValidationIssue::error(
                        "ACCOUNT_UNKNOWN",
                        format!("posted balance references unknown account {}", totals.account_id),
                    )
                    .with_reference(member.company_id.to_string()),
                );
                continue;
            };

            let class = account.account_type.balance_class();
            let from = company.functional_currency;
            let to = exec.group.reporting_currency;

            let debit = translate(totals.debit_total, from, to, exec.as_of_date, class, exec.rates);
            let credit =
                translate(totals.credit_total, from, to, exec.as_of_date, class, exec.rates);

            match (debit, credit) {
                (Ok(debit_total), Ok(credit_total)) => converted.push(AccountBalanceTotals {
                    account_id: totals.account_id,
                    debit_total,
                    credit_total,
                }),
                (Err(missing), _) | (_, Err(missing)) => {
                    issues.push(
                        ValidationIssue::error("FX_RATE_MISSING", missing.to_string())
                            .with_reference(member.company_id.to_string()),
                    );
                }
            }
        }
        translated.push((member.company_id, converted));
    }

    if has_errors(&issues) {
        return StepOutcome::Failed { issues };
    }
    exec.artifacts.translated = translated;
    StepOutcome::Completed { warnings: issues }
}

/// Roll translated member balances into one unvalidated trial balance.
fn aggregate_step(exec: &mut StepExecution<'_>) -> StepOutcome {
    let aggregator = TrialBalanceAggregator::new(exec.chart);
    let (aggregated, mut issues) = aggregator.aggregate(&exec.artifacts.translated);

    // skip_validation is the caller explicitly accepting degraded output:
    // the out-of-balance check demotes to a warning and the run continues.
    // Data corruption (unknown accounts) stays fatal either way.
    if exec.options.skip_validation {
        for issue in &mut issues {
            if issue.code == "TB_OUT_OF_BALANCE" {
                *issue = issue.clone().demoted();
            }
        }
    }

    if has_errors(&issues) {
        return StepOutcome::Failed { issues };
    }
    exec.artifacts.aggregated = Some(aggregated);
    StepOutcome::Completed { warnings: issues }
}

/// Reconcile intercompany activity for the period.
fn match_intercompany_step(exec: &mut StepExecution<'_>) -> StepOutcome {
    let transactions =
        exec.intercompany
            .transactions(exec.tenant_id, exec.group.id, exec.period);
    let report = exec
        .matcher
        .match_transactions(transactions, !exec.options.continue_on_warnings);

    let issues = report.issues.clone();
    exec.artifacts.match_report = Some(report);
    split_issues(issues)
}

/// Apply the group's active elimination rules in priority order.
fn eliminate_step(exec: &mut StepExecution<'_>) -> StepOutcome {
    let Some(aggregated) = exec.artifacts.aggregated.as_ref() else {
        return missing_artifact("aggregated balances");
    };

    // No intercompany records for the period means no reconciled cap; rules
    // then eliminate from aggregated balances alone.
    let candidates = exec
        .artifacts
        .match_report
        .as_ref()
        .filter(|r| !r.transactions.is_empty())
        .map(MatchReport::total_matched);

    let rules = exec.rules.active_rules(exec.tenant_id, exec.group.id);
    let outcome = EliminationEngine::new(exec.chart).apply(rules, aggregated, candidates);

    exec.artifacts.eliminations = Some(outcome);
    StepOutcome::Completed { warnings: Vec::new() }
}

/// Allocate the outside shareholders' interest.
fn nci_step(exec: &mut StepExecution<'_>) -> StepOutcome {
    let Some(aggregated) = exec.artifacts.aggregated.as_ref() else {
        return missing_artifact("aggregated balances");
    };
    let Some(eliminations) = exec.artifacts.eliminations.as_ref() else {
        return missing_artifact("elimination outcome");
    };

    let nci = NciCalculator::new().calculate(
        exec.group,
        exec.chart,
        aggregated,
        &eliminations.by_account,
    );
    exec.artifacts.nci = Some(nci);
    StepOutcome::Completed { warnings: Vec::new() }
}

/// Assemble and check the consolidated trial balance.
fn generate_trial_balance_step(exec: &mut StepExecution<'_>) -> StepOutcome {
    let Some(aggregated) = exec.artifacts.aggregated.as_ref() else {
        return missing_artifact("aggregated balances");
    };
    let Some(eliminations) = exec.artifacts.eliminations.as_ref() else {
        return missing_artifact("elimination outcome");
    };
    let Some(nci) = exec.artifacts.nci.as_ref() else {
        return missing_artifact("nci result");
    };

    let tb = match ConsolidatedTrialBalance::build(
        exec.group,
        exec.chart,
        exec.period,
        aggregated,
        eliminations,
        nci,
    ) {
        Ok(tb) => tb,
        Err(issues) => return StepOutcome::Failed { issues },
    };

    if !tb.is_balanced {
        let issue = ValidationIssue::error(
            "TB_NOT_BALANCED",
            format!(
                "consolidated debits {} != credits {}",
                tb.total_debits, tb.total_credits
            ),
        );
        if !exec.options.skip_validation {
            return StepOutcome::Failed { issues: vec![issue] };
        }
        // Degraded output accepted: the snapshot records is_balanced = false.
        exec.artifacts.trial_balance = Some(tb);
        return StepOutcome::Completed {
            warnings: vec![issue.demoted()],
        };
    }

    exec.artifacts.trial_balance = Some(tb);
    StepOutcome::Completed { warnings: Vec::new() }
}

fn missing_artifact(what: &str) -> StepOutcome {
    StepOutcome::Failed {
        issues: vec![ValidationIssue::error(
            "PIPELINE_ARTIFACT_MISSING",
            format!("{what} not produced by an earlier step"),
        )],
    }
}
