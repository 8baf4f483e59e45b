//! Balance translation into a reporting currency.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::currency::{BalanceClass, CurrencyCode};
use crate::rate::{RateProvider, RateType};

/// No usable rate record for the pair/date/type.
///
/// This is a hard failure: translation never falls back to 1.0.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no {rate_type:?} rate for {from}->{to} on or before {on}")]
pub struct MissingRate {
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    pub on: NaiveDate,
    pub rate_type: RateType,
}

/// Rate type used to translate a balance of the given class.
pub fn translation_rate_type(class: BalanceClass) -> RateType {
    RateType::for_class(class)
}

/// Translate an amount between currencies for the given balance class.
pub fn translate<P: RateProvider + ?Sized>(
    amount: Decimal,
    from: CurrencyCode,
    to: CurrencyCode,
    on: NaiveDate,
    class: BalanceClass,
    provider: &P,
) -> Result<Decimal, MissingRate> {
    let rate_type = translation_rate_type(class);
    let rate = provider.rate(from, to, on, rate_type).ok_or(MissingRate {
        from,
        to,
        on,
        rate_type,
    })?;
    Ok(amount * rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate::{ExchangeRate, RateTable};
    use rust_decimal_macros::dec;

    fn code(s: &str) -> CurrencyCode {
        CurrencyCode::new(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn balance_sheet_uses_closing_income_uses_average() {
        let mut t = RateTable::new();
        t.insert(ExchangeRate {
            from: code("GBP"),
            to: code("USD"),
            rate_type: RateType::PeriodClosing,
            effective_date: date(2025, 3, 31),
            rate: dec!(1.30),
        });
        t.insert(ExchangeRate {
            from: code("GBP"),
            to: code("USD"),
            rate_type: RateType::PeriodAverage,
            effective_date: date(2025, 3, 31),
            rate: dec!(1.25),
        });

        let on = date(2025, 3, 31);
        let bs = translate(
            dec!(100),
            code("GBP"),
            code("USD"),
            on,
            BalanceClass::BalanceSheet,
            &t,
        )
        .unwrap();
        let is = translate(
            dec!(100),
            code("GBP"),
            code("USD"),
            on,
            BalanceClass::IncomeStatement,
            &t,
        )
        .unwrap();

        assert_eq!(bs, dec!(130.00));
        assert_eq!(is, dec!(125.00));
    }

    #[test]
    fn missing_rate_names_the_pair_and_date() {
        let t = RateTable::new();
        let err = translate(
            dec!(50),
            code("JPY"),
            code("USD"),
            date(2025, 1, 31),
            BalanceClass::BalanceSheet,
            &t,
        )
        .unwrap_err();

        assert_eq!(err.from, code("JPY"));
        assert_eq!(err.to, code("USD"));
        assert_eq!(err.rate_type, RateType::PeriodClosing);
        let msg = err.to_string();
        assert!(msg.contains("JPY->USD"), "{msg}");
    }
}
