//! Non-controlling interest allocation.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use groupledger_journal::{AccountId, ChartOfAccounts, NormalBalance};

use crate::aggregation::AggregatedBalances;
use crate::group::ConsolidationGroup;

/// Outside shareholders' share per account, plus the net interest that
/// belongs on the NCI equity line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NciResult {
    pub by_account: BTreeMap<AccountId, Decimal>,
    /// Net non-controlling interest: credit-normal allocations less
    /// debit-normal allocations (revenue share minus expense share nets to
    /// the NCI slice of income).
    pub total: Decimal,
}

impl NciResult {
    pub fn nci_for(&self, account_id: AccountId) -> Decimal {
        self.by_account.get(&account_id).copied().unwrap_or(Decimal::ZERO)
    }
}

/// Computes each partially-owned member's outside share on equity and
/// income-statement lines.
#[derive(Debug, Default)]
pub struct NciCalculator;

impl NciCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Allocate NCI over the post-elimination balances. Contributions are
    /// scaled pro-rata when eliminations reduced a line, so the outside
    /// share is taken from what actually consolidates.
    pub fn calculate(
        &self,
        group: &ConsolidationGroup,
        chart: &ChartOfAccounts,
        aggregated: &AggregatedBalances,
        eliminations: &BTreeMap<AccountId, Decimal>,
    ) -> NciResult {
        let mut result = NciResult::default();

        for (account_id, line) in &aggregated.lines {
            let Some(account) = chart.get(*account_id) else {
                continue;
            };
            if !account.account_type.attracts_nci() {
                continue;
            }

            let pre = line.balance;
            let elim = eliminations.get(account_id).copied().unwrap_or(Decimal::ZERO);
            let post = pre - elim;
            let scale = if pre.is_zero() { Decimal::ONE } else { post / pre };

            let mut line_nci = Decimal::ZERO;
            for (company_id, contribution) in &line.contributions {
                let Some(member) = group.member(*company_id) else {
                    continue;
                };
                if !member.is_line_consolidated() {
                    continue;
                }
                let fraction = member.nci_fraction();
                if fraction.is_zero() {
                    continue;
                }
                line_nci += fraction * contribution * scale;
            }

            if !line_nci.is_zero() {
                result.by_account.insert(*account_id, line_nci);
                match account.normal_balance {
                    NormalBalance::Credit => result.total += line_nci,
                    NormalBalance::Debit => result.total -= line_nci,
                }
            }
        }

        result
    }
}
