//! Trial-balance aggregation across line-consolidated members.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use groupledger_journal::{AccountId, ChartOfAccounts, CompanyId};

use crate::ports::AccountBalanceTotals;
use crate::validation::ValidationIssue;

/// One account's aggregated position in group currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedLine {
    pub account_id: AccountId,
    pub debit_total: Decimal,
    pub credit_total: Decimal,
    /// Net balance signed by the account's normal side.
    pub balance: Decimal,
    /// Each member company's share of `balance` (same sign convention);
    /// consumed by the NCI calculator.
    pub contributions: BTreeMap<CompanyId, Decimal>,
}

/// Unvalidated aggregate of all member balances, keyed by account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedBalances {
    pub lines: BTreeMap<AccountId, AggregatedLine>,
    pub total_debits: Decimal,
    pub total_credits: Decimal,
}

impl AggregatedBalances {
    pub fn line(&self, account_id: AccountId) -> Option<&AggregatedLine> {
        self.lines.get(&account_id)
    }

    pub fn is_balanced(&self) -> bool {
        self.total_debits == self.total_credits
    }
}

/// Rolls member balances (already translated to group currency) into one
/// trial balance, applying each account's normal balance for signing.
#[derive(Debug)]
pub struct TrialBalanceAggregator<'a> {
    chart: &'a ChartOfAccounts,
}

impl<'a> TrialBalanceAggregator<'a> {
    pub fn new(chart: &'a ChartOfAccounts) -> Self {
        Self { chart }
    }

    /// Aggregate per-member balances. Issues carry both hard failures
    /// (unknown account, out-of-balance aggregate) and nothing else; the
    /// caller decides whether any error halts the run.
    pub fn aggregate(
        &self,
        member_balances: &[(CompanyId, Vec<AccountBalanceTotals>)],
    ) -> (AggregatedBalances, Vec<ValidationIssue>) {
        let mut aggregated = AggregatedBalances::default();
        let mut issues = Vec::new();

        for (company_id, balances) in member_balances {
            for totals in balances {
                let Some(account) = self.chart.get(totals.account_id) else {
                    issues.push(
                        ValidationIssue::error(
                            "ACCOUNT_UNKNOWN",
                            format!(
                                "posted balance references account {} not in the chart",
                                totals.account_id
                            ),
                        )
                        .with_reference(company_id.to_string()),
                    );
                    continue;
                };

                let signed = account
                    .normal_balance
                    .signed(totals.debit_total, totals.credit_total);

                let line = aggregated
                    .lines
                    .entry(totals.account_id)
                    .or_insert_with(|| AggregatedLine {
                        account_id: totals.account_id,
                        debit_total: Decimal::ZERO,
                        credit_total: Decimal::ZERO,
                        balance: Decimal::ZERO,
                        contributions: BTreeMap::new(),
                    });

                line.debit_total += totals.debit_total;
                line.credit_total += totals.credit_total;
                line.balance += signed;
                *line.contributions.entry(*company_id).or_insert(Decimal::ZERO) += signed;

                aggregated.total_debits += totals.debit_total;
                aggregated.total_credits += totals.credit_total;
            }
        }

        if !aggregated.is_balanced() {
            issues.push(ValidationIssue::error(
                "TB_OUT_OF_BALANCE",
                format!(
                    "aggregated debits {} != credits {} before elimination",
                    aggregated.total_debits, aggregated.total_credits
                ),
            ));
        }

        (aggregated, issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groupledger_journal::{Account, AccountType};
    use rust_decimal_macros::dec;

    fn chart_with(accounts: &[Account]) -> ChartOfAccounts {
        let mut chart = ChartOfAccounts::new();
        for a in accounts {
            chart.insert(a.clone());
        }
        chart
    }

    #[test]
    fn sums_across_members_with_normal_balance_signing() {
        let cash = Account::new("1000", "Cash", AccountType::Asset);
        let revenue = Account::new("4000", "Revenue", AccountType::Revenue);
        let chart = chart_with(&[cash.clone(), revenue.clone()]);

        let a = CompanyId::new();
        let b = CompanyId::new();
        let member_balances = vec![
            (
                a,
                vec![
                    AccountBalanceTotals {
                        account_id: cash.id,
                        debit_total: dec!(100),
                        credit_total: Decimal::ZERO,
                    },
                    AccountBalanceTotals {
                        account_id: revenue.id,
                        debit_total: Decimal::ZERO,
                        credit_total: dec!(100),
                    },
                ],
            ),
            (
                b,
                vec![
                    AccountBalanceTotals {
                        account_id: cash.id,
                        debit_total: dec!(40),
                        credit_total: dec!(10),
                    },
                    AccountBalanceTotals {
                        account_id: revenue.id,
                        debit_total: Decimal::ZERO,
                        credit_total: dec!(30),
                    },
                ],
            ),
        ];

        let (aggregated, issues) = TrialBalanceAggregator::new(&chart).aggregate(&member_balances);
        assert!(issues.is_empty(), "{issues:?}");
        assert!(aggregated.is_balanced());

        let cash_line = aggregated.line(cash.id).unwrap();
        assert_eq!(cash_line.balance, dec!(130));
        assert_eq!(cash_line.contributions[&a], dec!(100));
        assert_eq!(cash_line.contributions[&b], dec!(30));

        let revenue_line = aggregated.line(revenue.id).unwrap();
        assert_eq!(revenue_line.balance, dec!(130));
    }

    #[test]
    fn out_of_balance_aggregate_is_an_error() {
        let cash = Account::new("1000", "Cash", AccountType::Asset);
        let chart = chart_with(&[cash.clone()]);

        let member_balances = vec![(
            CompanyId::new(),
            vec![AccountBalanceTotals {
                account_id: cash.id,
                debit_total: dec!(100),
                credit_total: Decimal::ZERO,
            }],
        )];

        let (aggregated, issues) = TrialBalanceAggregator::new(&chart).aggregate(&member_balances);
        assert!(!aggregated.is_balanced());
        assert!(issues.iter().any(|i| i.code == "TB_OUT_OF_BALANCE" && i.is_error()));
    }

    #[test]
    fn unknown_account_is_an_error() {
        let chart = ChartOfAccounts::new();
        let member_balances = vec![(
            CompanyId::new(),
            vec![AccountBalanceTotals {
                account_id: AccountId::new(),
                debit_total: dec!(10),
                credit_total: dec!(10),
            }],
        )];

        let (_, issues) = TrialBalanceAggregator::new(&chart).aggregate(&member_balances);
        assert!(issues.iter().any(|i| i.code == "ACCOUNT_UNKNOWN"));
    }

    use proptest::prelude::*;

    proptest! {
        /// Members whose books balance individually always aggregate into a
        /// balanced trial balance, whatever the member count and amounts.
        #[test]
        fn balanced_members_aggregate_balanced(
            amounts in prop::collection::vec((1i64..1_000_000i64, 1u32..=2u32), 1..10)
        ) {
            let cash = Account::new("1000", "Cash", AccountType::Asset);
            let revenue = Account::new("4000", "Revenue", AccountType::Revenue);
            let chart = chart_with(&[cash.clone(), revenue.clone()]);

            let member_balances: Vec<_> = amounts
                .iter()
                .map(|(units, scale)| {
                    let amount = Decimal::new(*units, *scale);
                    (
                        CompanyId::new(),
                        vec![
                            AccountBalanceTotals {
                                account_id: cash.id,
                                debit_total: amount,
                                credit_total: Decimal::ZERO,
                            },
                            AccountBalanceTotals {
                                account_id: revenue.id,
                                debit_total: Decimal::ZERO,
                                credit_total: amount,
                            },
                        ],
                    )
                })
                .collect();

            let (aggregated, issues) =
                TrialBalanceAggregator::new(&chart).aggregate(&member_balances);
            prop_assert!(issues.is_empty());
            prop_assert!(aggregated.is_balanced());
            prop_assert_eq!(aggregated.lines.len(), 2);
        }
    }
}
