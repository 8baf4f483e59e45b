//! Exchange-rate records and date-effective rate selection.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::currency::{BalanceClass, CurrencyCode};

/// Which published rate a lookup wants.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateType {
    /// Day rate for transaction translation.
    Spot,
    /// Rate at the close of a fiscal period (balance-sheet translation).
    PeriodClosing,
    /// Average rate over a fiscal period (income-statement translation).
    PeriodAverage,
}

impl RateType {
    /// Standard FX translation practice: balance-sheet accounts at the
    /// closing rate, income-statement accounts at the period average.
    pub fn for_class(class: BalanceClass) -> Self {
        match class {
            BalanceClass::BalanceSheet => RateType::PeriodClosing,
            BalanceClass::IncomeStatement => RateType::PeriodAverage,
        }
    }
}

/// A published exchange rate, effective from a date onward (until a newer
/// record for the same pair/type supersedes it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    pub rate_type: RateType,
    pub effective_date: NaiveDate,
    pub rate: Decimal,
}

/// Rate lookup port.
///
/// Selection rule: the record with the greatest effective date that is on or
/// before the target date, for the exact pair and rate type. `None` when no
/// such record exists; callers must treat that as a hard failure, never as
/// an implicit rate of 1.
pub trait RateProvider: Send + Sync {
    fn rate(
        &self,
        from: CurrencyCode,
        to: CurrencyCode,
        on: NaiveDate,
        rate_type: RateType,
    ) -> Option<Decimal>;
}

impl<P> RateProvider for Arc<P>
where
    P: RateProvider + ?Sized,
{
    fn rate(
        &self,
        from: CurrencyCode,
        to: CurrencyCode,
        on: NaiveDate,
        rate_type: RateType,
    ) -> Option<Decimal> {
        (**self).rate(from, to, on, rate_type)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct PairKey {
    from: CurrencyCode,
    to: CurrencyCode,
    rate_type: RateType,
}

// BTreeMap over PairKey needs a total order; RateType has no natural one, so
// key ordering goes through the discriminant.
impl RateType {
    fn ordinal(self) -> u8 {
        match self {
            RateType::Spot => 0,
            RateType::PeriodClosing => 1,
            RateType::PeriodAverage => 2,
        }
    }
}

impl PartialOrd for RateType {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RateType {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.ordinal().cmp(&other.ordinal())
    }
}

/// In-memory [`RateProvider`].
///
/// Identity pairs resolve to 1 without a lookup. When only the opposite
/// direction of a pair is stored, the inverse (1/rate) is derived.
#[derive(Debug, Default)]
pub struct RateTable {
    // (pair, type) -> effective date -> rate
    rates: BTreeMap<PairKey, BTreeMap<NaiveDate, Decimal>>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: ExchangeRate) {
        let key = PairKey {
            from: record.from,
            to: record.to,
            rate_type: record.rate_type,
        };
        self.rates
            .entry(key)
            .or_default()
            .insert(record.effective_date, record.rate);
    }

    fn lookup(&self, key: PairKey, on: NaiveDate) -> Option<Decimal> {
        self.rates
            .get(&key)?
            .range(..=on)
            .next_back()
            .map(|(_, rate)| *rate)
    }
}

impl RateProvider for RateTable {
    fn rate(
        &self,
        from: CurrencyCode,
        to: CurrencyCode,
        on: NaiveDate,
        rate_type: RateType,
    ) -> Option<Decimal> {
        if from == to {
            return Some(Decimal::ONE);
        }

        if let Some(rate) = self.lookup(PairKey { from, to, rate_type }, on) {
            return Some(rate);
        }

        // Derive from the opposite direction when available.
        self.lookup(
            PairKey {
                from: to,
                to: from,
                rate_type,
            },
            on,
        )
        .filter(|r| !r.is_zero())
        .map(|r| Decimal::ONE / r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn usd() -> CurrencyCode {
        CurrencyCode::new("USD").unwrap()
    }

    fn eur() -> CurrencyCode {
        CurrencyCode::new("EUR").unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn table() -> RateTable {
        let mut t = RateTable::new();
        t.insert(ExchangeRate {
            from: eur(),
            to: usd(),
            rate_type: RateType::PeriodClosing,
            effective_date: date(2025, 1, 31),
            rate: dec!(1.05),
        });
        t.insert(ExchangeRate {
            from: eur(),
            to: usd(),
            rate_type: RateType::PeriodClosing,
            effective_date: date(2025, 2, 28),
            rate: dec!(1.08),
        });
        t
    }

    #[test]
    fn picks_greatest_effective_date_on_or_before_target() {
        let t = table();
        assert_eq!(
            t.rate(eur(), usd(), date(2025, 2, 15), RateType::PeriodClosing),
            Some(dec!(1.05))
        );
        assert_eq!(
            t.rate(eur(), usd(), date(2025, 2, 28), RateType::PeriodClosing),
            Some(dec!(1.08))
        );
        assert_eq!(
            t.rate(eur(), usd(), date(2025, 6, 30), RateType::PeriodClosing),
            Some(dec!(1.08))
        );
    }

    #[test]
    fn no_record_before_target_is_none() {
        let t = table();
        assert_eq!(
            t.rate(eur(), usd(), date(2025, 1, 30), RateType::PeriodClosing),
            None
        );
    }

    #[test]
    fn rate_type_is_not_interchangeable() {
        let t = table();
        assert_eq!(
            t.rate(eur(), usd(), date(2025, 3, 1), RateType::PeriodAverage),
            None
        );
    }

    #[test]
    fn identity_pair_is_one() {
        let t = RateTable::new();
        assert_eq!(
            t.rate(usd(), usd(), date(2025, 1, 1), RateType::Spot),
            Some(Decimal::ONE)
        );
    }

    #[test]
    fn derives_inverse_pair() {
        let t = table();
        let inverse = t
            .rate(usd(), eur(), date(2025, 3, 1), RateType::PeriodClosing)
            .unwrap();
        assert_eq!(inverse, Decimal::ONE / dec!(1.08));
    }
}
