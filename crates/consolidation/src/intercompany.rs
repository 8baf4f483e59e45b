//! Intercompany transaction matching.
//!
//! Each side of an intercompany transaction is recorded by one company; the
//! matcher pairs a record from company X to Y with the mirror record from Y
//! to X, amount-equal within a configured tolerance. Matched totals feed the
//! elimination engine as candidate amounts.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use groupledger_fx::CurrencyCode;
use groupledger_journal::{CompanyId, JournalEntryId};

use crate::validation::ValidationIssue;

/// Intercompany transaction identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntercompanyTransactionId(pub Uuid);

impl IntercompanyTransactionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for IntercompanyTransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for IntercompanyTransactionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingStatus {
    Matched,
    Unmatched,
    PartiallyMatched,
    /// A reviewer accepted the variance; treated as matched downstream.
    VarianceApproved,
}

/// One side of an intercompany transaction, as recorded by `from_company`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntercompanyTransaction {
    pub id: IntercompanyTransactionId,
    pub from_company: CompanyId,
    pub to_company: CompanyId,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub status: MatchingStatus,
    pub variance_amount: Option<Decimal>,
    pub variance_explanation: Option<String>,
    pub from_entry_id: Option<JournalEntryId>,
    pub to_entry_id: Option<JournalEntryId>,
}

impl IntercompanyTransaction {
    pub fn new(
        from_company: CompanyId,
        to_company: CompanyId,
        amount: Decimal,
        currency: CurrencyCode,
    ) -> Self {
        Self {
            id: IntercompanyTransactionId::new(),
            from_company,
            to_company,
            amount,
            currency,
            status: MatchingStatus::Unmatched,
            variance_amount: None,
            variance_explanation: None,
            from_entry_id: None,
            to_entry_id: None,
        }
    }
}

/// A reconciled pair of mirror records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub left: IntercompanyTransactionId,
    pub right: IntercompanyTransactionId,
    pub from_company: CompanyId,
    pub to_company: CompanyId,
    /// Reconciled amount: the smaller of the two sides.
    pub amount: Decimal,
    pub variance: Decimal,
}

/// Matching outcome for a group/period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    pub pairs: Vec<MatchedPair>,
    /// Input transactions with their resolved statuses.
    pub transactions: Vec<IntercompanyTransaction>,
    pub issues: Vec<ValidationIssue>,
    /// Reconciled totals keyed by unordered company pair.
    matched_totals: BTreeMap<(CompanyId, CompanyId), Decimal>,
}

impl MatchReport {
    fn pair_key(a: CompanyId, b: CompanyId) -> (CompanyId, CompanyId) {
        if a <= b { (a, b) } else { (b, a) }
    }

    /// Reconciled total between two companies (direction-insensitive).
    pub fn matched_total(&self, a: CompanyId, b: CompanyId) -> Decimal {
        self.matched_totals
            .get(&Self::pair_key(a, b))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Reconciled total across the whole group: the elimination engine's
    /// candidate amount for intercompany rule types.
    pub fn total_matched(&self) -> Decimal {
        self.matched_totals.values().copied().sum()
    }
}

/// Matcher tolerances.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Absolute amount difference still considered the same transaction.
    pub tolerance: Decimal,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            tolerance: Decimal::new(1, 2), // 0.01
        }
    }
}

/// Pairs intercompany records and classifies each side.
#[derive(Debug, Default)]
pub struct IntercompanyMatcher {
    config: MatcherConfig,
}

impl IntercompanyMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Match transactions for a period. `escalate_warnings` turns unmatched/
    /// variance findings into errors (continue_on_warnings == false).
    pub fn match_transactions(
        &self,
        transactions: Vec<IntercompanyTransaction>,
        escalate_warnings: bool,
    ) -> MatchReport {
        let mut report = MatchReport::default();
        let mut remaining: Vec<IntercompanyTransaction> = Vec::new();

        // Pre-approved variances pass through untouched and still count as
        // reconciled candidates.
        for txn in transactions {
            if txn.status == MatchingStatus::VarianceApproved {
                let key = MatchReport::pair_key(txn.from_company, txn.to_company);
                *report.matched_totals.entry(key).or_insert(Decimal::ZERO) += txn.amount;
                report.transactions.push(txn);
            } else {
                remaining.push(txn);
            }
        }

        let mut consumed = vec![false; remaining.len()];

        for i in 0..remaining.len() {
            if consumed[i] {
                continue;
            }

            // Best counterpart: mirror direction, smallest amount difference
            // within tolerance.
            let mut best: Option<(usize, Decimal)> = None;
            for (j, candidate) in remaining.iter().enumerate() {
                if j == i || consumed[j] {
                    continue;
                }
                if candidate.from_company != remaining[i].to_company
                    || candidate.to_company != remaining[i].from_company
                {
                    continue;
                }
                let diff = (candidate.amount - remaining[i].amount).abs();
                if diff > self.config.tolerance {
                    continue;
                }
                if best.map(|(_, d)| diff < d).unwrap_or(true) {
                    best = Some((j, diff));
                }
            }

            match best {
                Some((j, variance)) => {
                    consumed[i] = true;
                    consumed[j] = true;

                    let exact = variance.is_zero();
                    let status = if exact {
                        MatchingStatus::Matched
                    } else {
                        MatchingStatus::PartiallyMatched
                    };

                    let mut left = remaining[i].clone();
                    let mut right = remaining[j].clone();
                    left.status = status;
                    right.status = status;
                    if !exact {
                        left.variance_amount = Some(variance);
                        right.variance_amount = Some(variance);

                        let issue = ValidationIssue::warning(
                            "IC_VARIANCE",
                            format!(
                                "intercompany pair {} / {} differs by {variance}",
                                left.id, right.id
                            ),
                        )
                        .with_reference(left.id.to_string());
                        report
                            .issues
                            .push(if escalate_warnings { issue.escalated() } else { issue });
                    }

                    let amount = left.amount.min(right.amount);
                    let key = MatchReport::pair_key(left.from_company, left.to_company);
                    *report.matched_totals.entry(key).or_insert(Decimal::ZERO) += amount;

                    report.pairs.push(MatchedPair {
                        left: left.id,
                        right: right.id,
                        from_company: left.from_company,
                        to_company: left.to_company,
                        amount,
                        variance,
                    });
                    report.transactions.push(left);
                    report.transactions.push(right);
                }
                None => {
                    consumed[i] = true;
                    let mut txn = remaining[i].clone();
                    txn.status = MatchingStatus::Unmatched;

                    let issue = ValidationIssue::warning(
                        "IC_UNMATCHED",
                        format!(
                            "no counterpart for intercompany transaction {} ({} -> {}, {})",
                            txn.id, txn.from_company, txn.to_company, txn.amount
                        ),
                    )
                    .with_reference(txn.id.to_string());
                    report
                        .issues
                        .push(if escalate_warnings { issue.escalated() } else { issue });

                    report.transactions.push(txn);
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn usd() -> CurrencyCode {
        CurrencyCode::new("USD").unwrap()
    }

    #[test]
    fn mirror_records_match_exactly() {
        let a = CompanyId::new();
        let b = CompanyId::new();
        let txns = vec![
            IntercompanyTransaction::new(a, b, dec!(500), usd()),
            IntercompanyTransaction::new(b, a, dec!(500), usd()),
        ];

        let report = IntercompanyMatcher::default().match_transactions(txns, false);

        assert_eq!(report.pairs.len(), 1);
        assert!(report.issues.is_empty());
        assert!(
            report
                .transactions
                .iter()
                .all(|t| t.status == MatchingStatus::Matched)
        );
        assert_eq!(report.matched_total(a, b), dec!(500));
        assert_eq!(report.matched_total(b, a), dec!(500));
    }

    #[test]
    fn within_tolerance_is_partially_matched_with_warning() {
        let a = CompanyId::new();
        let b = CompanyId::new();
        let matcher = IntercompanyMatcher::new(MatcherConfig { tolerance: dec!(1) });
        let txns = vec![
            IntercompanyTransaction::new(a, b, dec!(500.00), usd()),
            IntercompanyTransaction::new(b, a, dec!(499.40), usd()),
        ];

        let report = matcher.match_transactions(txns, false);

        assert_eq!(report.pairs.len(), 1);
        assert_eq!(report.pairs[0].variance, dec!(0.60));
        assert_eq!(report.pairs[0].amount, dec!(499.40));
        assert!(
            report
                .transactions
                .iter()
                .all(|t| t.status == MatchingStatus::PartiallyMatched)
        );
        assert!(report.issues.iter().any(|i| i.code == "IC_VARIANCE" && !i.is_error()));
    }

    #[test]
    fn outside_tolerance_is_unmatched() {
        let a = CompanyId::new();
        let b = CompanyId::new();
        let txns = vec![
            IntercompanyTransaction::new(a, b, dec!(500), usd()),
            IntercompanyTransaction::new(b, a, dec!(450), usd()),
        ];

        let report = IntercompanyMatcher::default().match_transactions(txns, false);

        assert!(report.pairs.is_empty());
        assert_eq!(
            report
                .issues
                .iter()
                .filter(|i| i.code == "IC_UNMATCHED")
                .count(),
            2
        );
        assert_eq!(report.total_matched(), Decimal::ZERO);
    }

    #[test]
    fn warnings_escalate_to_errors_when_requested() {
        let a = CompanyId::new();
        let b = CompanyId::new();
        let txns = vec![IntercompanyTransaction::new(a, b, dec!(500), usd())];

        let report = IntercompanyMatcher::default().match_transactions(txns, true);
        assert!(report.issues.iter().all(ValidationIssue::is_error));
    }

    #[test]
    fn approved_variances_pass_through_and_count_as_candidates() {
        let a = CompanyId::new();
        let b = CompanyId::new();
        let mut txn = IntercompanyTransaction::new(a, b, dec!(200), usd());
        txn.status = MatchingStatus::VarianceApproved;
        txn.variance_amount = Some(dec!(3));
        txn.variance_explanation = Some("freight surcharge".to_string());

        let report = IntercompanyMatcher::default().match_transactions(vec![txn], false);

        assert!(report.issues.is_empty());
        assert_eq!(report.matched_total(a, b), dec!(200));
        assert_eq!(
            report.transactions[0].status,
            MatchingStatus::VarianceApproved
        );
    }
}
