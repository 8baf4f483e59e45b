//! The consolidated trial balance snapshot.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use groupledger_fx::CurrencyCode;
use groupledger_journal::{AccountId, AccountType, ChartOfAccounts, NormalBalance, PeriodRef};

use crate::aggregation::AggregatedBalances;
use crate::elimination::{EliminationEntry, EliminationOutcome};
use crate::group::{ConsolidationGroup, ConsolidationGroupId};
use crate::nci::NciResult;
use crate::validation::ValidationIssue;

/// One account's consolidated position:
/// `consolidated = aggregated - elimination - nci`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBalanceLine {
    pub account_id: AccountId,
    pub account_code: String,
    pub account_name: String,
    pub account_type: AccountType,
    pub normal_balance: NormalBalance,
    pub aggregated_balance: Decimal,
    pub elimination_amount: Decimal,
    pub nci_amount: Decimal,
    pub consolidated_balance: Decimal,
}

/// Immutable result of a completed consolidation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedTrialBalance {
    pub group_id: ConsolidationGroupId,
    pub period: PeriodRef,
    pub currency: CurrencyCode,
    /// Sorted by account code.
    pub lines: Vec<TrialBalanceLine>,
    /// Manual-rule eliminations awaiting action; never applied to balances.
    pub pending_eliminations: Vec<EliminationEntry>,
    pub total_debits: Decimal,
    pub total_credits: Decimal,
    pub total_eliminations: Decimal,
    pub total_nci: Decimal,
    pub is_balanced: bool,
}

impl ConsolidatedTrialBalance {
    /// Assemble the trial balance from the pipeline artifacts.
    ///
    /// The net non-controlling interest lands on the group's configured NCI
    /// equity account; producing NCI without that account configured is an
    /// error, never a silent drop.
    pub fn build(
        group: &ConsolidationGroup,
        chart: &ChartOfAccounts,
        period: PeriodRef,
        aggregated: &AggregatedBalances,
        eliminations: &EliminationOutcome,
        nci: &NciResult,
    ) -> Result<Self, Vec<ValidationIssue>> {
        let mut lines: Vec<TrialBalanceLine> = Vec::with_capacity(aggregated.lines.len() + 1);

        for (account_id, agg_line) in &aggregated.lines {
            // Unknown accounts already failed the Aggregate step.
            let Some(account) = chart.get(*account_id) else {
                continue;
            };

            let elimination_amount = eliminations.elimination_for(*account_id);
            let nci_amount = nci.nci_for(*account_id);
            lines.push(TrialBalanceLine {
                account_id: *account_id,
                account_code: account.code.clone(),
                account_name: account.name.clone(),
                account_type: account.account_type,
                normal_balance: account.normal_balance,
                aggregated_balance: agg_line.balance,
                elimination_amount,
                nci_amount,
                consolidated_balance: agg_line.balance - elimination_amount - nci_amount,
            });
        }

        if !nci.total.is_zero() {
            match group.nci_equity_account.and_then(|id| chart.get(id)) {
                Some(account) => {
                    // The outside interest moves onto the NCI equity line:
                    // a negative nci column yields a positive consolidated
                    // balance of `total`.
                    if let Some(line) = lines.iter_mut().find(|l| l.account_id == account.id) {
                        line.nci_amount -= nci.total;
                        line.consolidated_balance =
                            line.aggregated_balance - line.elimination_amount - line.nci_amount;
                    } else {
                        lines.push(TrialBalanceLine {
                            account_id: account.id,
                            account_code: account.code.clone(),
                            account_name: account.name.clone(),
                            account_type: account.account_type,
                            normal_balance: account.normal_balance,
                            aggregated_balance: Decimal::ZERO,
                            elimination_amount: Decimal::ZERO,
                            nci_amount: -nci.total,
                            consolidated_balance: nci.total,
                        });
                    }
                }
                None => {
                    return Err(vec![
                        ValidationIssue::error(
                            "NCI_ACCOUNT_MISSING",
                            format!(
                                "group produced non-controlling interest of {} but has no NCI \
                                 equity account configured",
                                nci.total
                            ),
                        )
                        .with_reference(group.id.to_string()),
                    ]);
                }
            }
        }

        lines.sort_by(|a, b| a.account_code.cmp(&b.account_code));

        let mut total_debits = Decimal::ZERO;
        let mut total_credits = Decimal::ZERO;
        for line in &lines {
            let value = line.consolidated_balance;
            // Present each net balance on its natural side; a negative
            // balance flips to the opposite column.
            match (line.normal_balance, value >= Decimal::ZERO) {
                (NormalBalance::Debit, true) => total_debits += value,
                (NormalBalance::Debit, false) => total_credits += -value,
                (NormalBalance::Credit, true) => total_credits += value,
                (NormalBalance::Credit, false) => total_debits += -value,
            }
        }

        Ok(Self {
            group_id: group.id,
            period,
            currency: group.reporting_currency,
            lines,
            pending_eliminations: eliminations.pending_entries().cloned().collect(),
            total_debits,
            total_credits,
            total_eliminations: eliminations.total_eliminations,
            total_nci: nci.total,
            is_balanced: total_debits == total_credits,
        })
    }

    pub fn line(&self, account_id: AccountId) -> Option<&TrialBalanceLine> {
        self.lines.iter().find(|l| l.account_id == account_id)
    }
}
