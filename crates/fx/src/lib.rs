//! `groupledger-fx`: currency codes, exchange rates and balance translation.
//!
//! Pure domain logic: rate records, date-effective rate selection and the
//! closing/average translation policy. No IO; callers supply rates through
//! the [`RateProvider`] port.

pub mod currency;
pub mod rate;
pub mod translate;

pub use currency::{BalanceClass, CurrencyCode};
pub use rate::{ExchangeRate, RateProvider, RateTable, RateType};
pub use translate::{MissingRate, translate, translation_rate_type};
