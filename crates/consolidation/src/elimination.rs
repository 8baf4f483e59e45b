//! Elimination rules and the ordered rule engine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use groupledger_core::ValueObject;
use groupledger_journal::{Account, AccountId, AccountType, ChartOfAccounts};

use crate::aggregation::AggregatedBalances;
use crate::group::ConsolidationGroupId;

/// Elimination rule identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EliminationRuleId(pub Uuid);

impl EliminationRuleId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for EliminationRuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for EliminationRuleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Account selection, dispatched by exhaustive match in the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccountSelector {
    ById { account_id: AccountId },
    /// Inclusive lexicographic range over account codes.
    ByRange { from_code: String, to_code: String },
    ByCategory { account_type: AccountType },
}

impl AccountSelector {
    pub fn matches(&self, account: &Account) -> bool {
        match self {
            AccountSelector::ById { account_id } => account.id == *account_id,
            AccountSelector::ByRange { from_code, to_code } => {
                account.code.as_str() >= from_code.as_str()
                    && account.code.as_str() <= to_code.as_str()
            }
            AccountSelector::ByCategory { account_type } => account.account_type == *account_type,
        }
    }
}

impl ValueObject for AccountSelector {}

/// What kind of intragroup effect a rule removes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EliminationType {
    ReceivablePayable,
    RevenueExpense,
    InventoryProfit,
    InvestmentEquity,
    Custom,
}

impl EliminationType {
    /// Whether reconciled intercompany totals cap the eliminable amount for
    /// this rule type.
    fn capped_by_matched_candidates(self) -> bool {
        matches!(
            self,
            EliminationType::ReceivablePayable | EliminationType::RevenueExpense
        )
    }
}

/// When a rule fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConditions {
    /// Selectors over the balances whose sum is the candidate amount.
    pub source_accounts: Vec<AccountSelector>,
    /// Amounts strictly below this gate do not trigger the rule.
    pub minimum_amount: Option<Decimal>,
}

/// A configured elimination rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EliminationRule {
    pub id: EliminationRuleId,
    pub group_id: ConsolidationGroupId,
    pub name: String,
    pub elimination_type: EliminationType,
    pub trigger: TriggerConditions,
    pub source_accounts: Vec<AccountSelector>,
    /// Where the adjustment is expected to land. When non-empty, the
    /// configured debit/credit accounts must match one of these selectors
    /// or the rule does not fire.
    pub target_accounts: Vec<AccountSelector>,
    pub debit_account_id: AccountId,
    pub credit_account_id: AccountId,
    /// Manual rules compute their entry but never apply it.
    pub is_automatic: bool,
    /// Ascending priority executes earlier.
    pub priority: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// The journal-shaped adjustment a rule produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EliminationEntry {
    pub rule_id: EliminationRuleId,
    pub rule_name: String,
    pub debit_account_id: AccountId,
    pub credit_account_id: AccountId,
    pub amount: Decimal,
    /// False for manual rules: surfaced in the run output pending action.
    pub applied: bool,
}

/// Engine output. `by_account` is the elimination column of the trial
/// balance: positive amounts reduce the account's consolidated balance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EliminationOutcome {
    pub entries: Vec<EliminationEntry>,
    pub by_account: BTreeMap<AccountId, Decimal>,
    pub total_eliminations: Decimal,
}

impl EliminationOutcome {
    pub fn elimination_for(&self, account_id: AccountId) -> Decimal {
        self.by_account.get(&account_id).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn pending_entries(&self) -> impl Iterator<Item = &EliminationEntry> {
        self.entries.iter().filter(|e| !e.applied)
    }
}

/// Applies the group's active rules to aggregated balances.
///
/// Rules run in ascending priority; ties break deterministically on
/// `created_at` then rule id. Deactivated rules never run, and historical
/// completed runs are immutable so deactivation only affects future runs.
#[derive(Debug)]
pub struct EliminationEngine<'a> {
    chart: &'a ChartOfAccounts,
}

impl<'a> EliminationEngine<'a> {
    pub fn new(chart: &'a ChartOfAccounts) -> Self {
        Self { chart }
    }

    /// Evaluate rules against the aggregate. `matched_candidates` is the
    /// reconciled intercompany total; for receivable/payable and
    /// revenue/expense rules the eliminable amount cannot exceed it.
    pub fn apply(
        &self,
        mut rules: Vec<EliminationRule>,
        aggregated: &AggregatedBalances,
        matched_candidates: Option<Decimal>,
    ) -> EliminationOutcome {
        rules.retain(|r| r.is_active);
        rules.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut outcome = EliminationOutcome::default();

        for rule in &rules {
            let Some(amount) = self.candidate_amount(rule, aggregated, matched_candidates) else {
                continue;
            };

            let entry = EliminationEntry {
                rule_id: rule.id,
                rule_name: rule.name.clone(),
                debit_account_id: rule.debit_account_id,
                credit_account_id: rule.credit_account_id,
                amount,
                applied: rule.is_automatic,
            };

            if rule.is_automatic {
                self.accumulate(&mut outcome, &entry);
                outcome.total_eliminations += amount;
            }

            outcome.entries.push(entry);
        }

        outcome
    }

    fn candidate_amount(
        &self,
        rule: &EliminationRule,
        aggregated: &AggregatedBalances,
        matched_candidates: Option<Decimal>,
    ) -> Option<Decimal> {
        let trigger_amount = self.selected_balance(&rule.trigger.source_accounts, aggregated);
        if trigger_amount <= Decimal::ZERO {
            return None;
        }
        if let Some(gate) = rule.trigger.minimum_amount {
            if trigger_amount < gate {
                return None;
            }
        }

        // Configured target selectors must admit both adjustment accounts.
        if !rule.target_accounts.is_empty() {
            let admits = |account_id: AccountId| {
                self.chart
                    .get(account_id)
                    .map(|a| rule.target_accounts.iter().any(|s| s.matches(a)))
                    .unwrap_or(false)
            };
            if !admits(rule.debit_account_id) || !admits(rule.credit_account_id) {
                return None;
            }
        }

        // The eliminated balance: the rule's own source selection, or the
        // trigger selection when the rule does not narrow it.
        let mut amount = if rule.source_accounts.is_empty() {
            trigger_amount
        } else {
            self.selected_balance(&rule.source_accounts, aggregated)
        };

        if rule.elimination_type.capped_by_matched_candidates() {
            if let Some(cap) = matched_candidates {
                amount = amount.min(cap);
            }
        }

        if amount <= Decimal::ZERO { None } else { Some(amount) }
    }

    fn selected_balance(
        &self,
        selectors: &[AccountSelector],
        aggregated: &AggregatedBalances,
    ) -> Decimal {
        let mut amount = Decimal::ZERO;
        for account in self.chart.iter() {
            if !selectors.iter().any(|s| s.matches(account)) {
                continue;
            }
            if let Some(line) = aggregated.line(account.id) {
                amount += line.balance.abs();
            }
        }
        amount
    }

    /// Fold an applied entry into the per-account elimination column.
    ///
    /// A side that opposes the account's normal balance reduces it
    /// (positive elimination); a side that reinforces it is negative.
    fn accumulate(&self, outcome: &mut EliminationOutcome, entry: &EliminationEntry) {
        use groupledger_journal::NormalBalance;

        if let Some(debited) = self.chart.get(entry.debit_account_id) {
            let signed = match debited.normal_balance {
                NormalBalance::Credit => entry.amount,
                NormalBalance::Debit => -entry.amount,
            };
            *outcome
                .by_account
                .entry(entry.debit_account_id)
                .or_insert(Decimal::ZERO) += signed;
        }

        if let Some(credited) = self.chart.get(entry.credit_account_id) {
            let signed = match credited.normal_balance {
                NormalBalance::Debit => entry.amount,
                NormalBalance::Credit => -entry.amount,
            };
            *outcome
                .by_account
                .entry(entry.credit_account_id)
                .or_insert(Decimal::ZERO) += signed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::TrialBalanceAggregator;
    use crate::ports::AccountBalanceTotals;
    use groupledger_journal::CompanyId;
    use rust_decimal_macros::dec;

    struct Fixture {
        chart: ChartOfAccounts,
        receivable: AccountId,
        payable: AccountId,
        aggregated: AggregatedBalances,
    }

    fn fixture() -> Fixture {
        let mut chart = ChartOfAccounts::new();
        let receivable = chart.insert(
            Account::new("1200", "IC Receivable", AccountType::Asset).intercompany(),
        );
        let payable = chart.insert(
            Account::new("2200", "IC Payable", AccountType::Liability).intercompany(),
        );
        let cash = chart.insert(Account::new("1000", "Cash", AccountType::Asset));
        let equity = chart.insert(Account::new("3000", "Equity", AccountType::Equity));

        // Seller holds a 300 receivable; buyer holds the mirror payable.
        let member_balances = vec![
            (
                CompanyId::new(),
                vec![
                    AccountBalanceTotals {
                        account_id: receivable,
                        debit_total: dec!(300),
                        credit_total: Decimal::ZERO,
                    },
                    AccountBalanceTotals {
                        account_id: equity,
                        debit_total: Decimal::ZERO,
                        credit_total: dec!(300),
                    },
                ],
            ),
            (
                CompanyId::new(),
                vec![
                    AccountBalanceTotals {
                        account_id: cash,
                        debit_total: dec!(300),
                        credit_total: Decimal::ZERO,
                    },
                    AccountBalanceTotals {
                        account_id: payable,
                        debit_total: Decimal::ZERO,
                        credit_total: dec!(300),
                    },
                ],
            ),
        ];

        let (aggregated, issues) = TrialBalanceAggregator::new(&chart).aggregate(&member_balances);
        assert!(issues.is_empty(), "{issues:?}");

        Fixture {
            chart,
            receivable,
            payable,
            aggregated,
        }
    }

    fn rule(f: &Fixture, priority: i32, name: &str) -> EliminationRule {
        EliminationRule {
            id: EliminationRuleId::new(),
            group_id: ConsolidationGroupId::new(),
            name: name.to_string(),
            elimination_type: EliminationType::ReceivablePayable,
            trigger: TriggerConditions {
                source_accounts: vec![AccountSelector::ById {
                    account_id: f.receivable,
                }],
                minimum_amount: None,
            },
            source_accounts: Vec::new(),
            target_accounts: Vec::new(),
            debit_account_id: f.payable,
            credit_account_id: f.receivable,
            is_automatic: true,
            priority,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn automatic_rule_eliminates_both_sides() {
        let f = fixture();
        let outcome =
            EliminationEngine::new(&f.chart).apply(vec![rule(&f, 10, "AR/AP")], &f.aggregated, None);

        assert_eq!(outcome.entries.len(), 1);
        assert!(outcome.entries[0].applied);
        assert_eq!(outcome.total_eliminations, dec!(300));
        // Debiting the payable and crediting the receivable reduces both.
        assert_eq!(outcome.elimination_for(f.payable), dec!(300));
        assert_eq!(outcome.elimination_for(f.receivable), dec!(300));
    }

    #[test]
    fn manual_rule_surfaces_pending_entry_without_applying() {
        let f = fixture();
        let mut r = rule(&f, 10, "manual AR/AP");
        r.is_automatic = false;

        let outcome = EliminationEngine::new(&f.chart).apply(vec![r], &f.aggregated, None);

        assert_eq!(outcome.pending_entries().count(), 1);
        assert_eq!(outcome.total_eliminations, Decimal::ZERO);
        assert!(outcome.by_account.is_empty());
    }

    #[test]
    fn rules_run_in_priority_order_with_created_at_tiebreak() {
        let f = fixture();
        let mut first = rule(&f, 5, "first");
        let mut second = rule(&f, 10, "second");
        let mut tied_older = rule(&f, 10, "tied-older");
        first.created_at = Utc::now();
        second.created_at = Utc::now() + chrono::Duration::seconds(10);
        tied_older.created_at = Utc::now() - chrono::Duration::seconds(10);

        let outcome = EliminationEngine::new(&f.chart).apply(
            vec![second.clone(), tied_older.clone(), first.clone()],
            &f.aggregated,
            None,
        );

        let order: Vec<&str> = outcome.entries.iter().map(|e| e.rule_name.as_str()).collect();
        assert_eq!(order, vec!["first", "tied-older", "second"]);
    }

    #[test]
    fn inactive_rules_are_excluded() {
        let f = fixture();
        let mut r = rule(&f, 10, "inactive");
        r.is_active = false;

        let outcome = EliminationEngine::new(&f.chart).apply(vec![r], &f.aggregated, None);
        assert!(outcome.entries.is_empty());
    }

    #[test]
    fn minimum_amount_gates_the_rule() {
        let f = fixture();
        let mut r = rule(&f, 10, "gated");
        r.trigger.minimum_amount = Some(dec!(500));

        let outcome = EliminationEngine::new(&f.chart).apply(vec![r], &f.aggregated, None);
        assert!(outcome.entries.is_empty());
    }

    #[test]
    fn target_selectors_must_admit_the_adjustment_accounts() {
        let f = fixture();
        let mut r = rule(&f, 10, "mis-targeted");
        r.target_accounts = vec![AccountSelector::ByCategory {
            account_type: AccountType::Equity,
        }];

        let outcome = EliminationEngine::new(&f.chart).apply(vec![r], &f.aggregated, None);
        assert!(outcome.entries.is_empty());

        let mut r = rule(&f, 10, "targeted");
        r.target_accounts = vec![AccountSelector::ByRange {
            from_code: "1000".to_string(),
            to_code: "2999".to_string(),
        }];
        let outcome = EliminationEngine::new(&f.chart).apply(vec![r], &f.aggregated, None);
        assert_eq!(outcome.entries.len(), 1);
    }

    #[test]
    fn matched_candidates_cap_intercompany_rules() {
        let f = fixture();
        let outcome = EliminationEngine::new(&f.chart).apply(
            vec![rule(&f, 10, "capped")],
            &f.aggregated,
            Some(dec!(250)),
        );

        assert_eq!(outcome.entries[0].amount, dec!(250));
    }

    #[test]
    fn selector_variants_dispatch_exhaustively() {
        let f = fixture();
        let account = f.chart.get(f.receivable).unwrap();

        assert!(
            AccountSelector::ById {
                account_id: f.receivable
            }
            .matches(account)
        );
        assert!(
            AccountSelector::ByRange {
                from_code: "1000".to_string(),
                to_code: "1299".to_string()
            }
            .matches(account)
        );
        assert!(
            !AccountSelector::ByRange {
                from_code: "2000".to_string(),
                to_code: "2999".to_string()
            }
            .matches(account)
        );
        assert!(
            AccountSelector::ByCategory {
                account_type: AccountType::Asset
            }
            .matches(account)
        );
    }
}
