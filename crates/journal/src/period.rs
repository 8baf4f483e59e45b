//! Fiscal periods and the posting calendar.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use groupledger_core::DomainError;

/// Reference to a fiscal period: year plus period number (1-12, 13 for the
/// year-end adjustment period).
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PeriodRef {
    pub year: i32,
    pub period: u8,
}

impl PeriodRef {
    pub fn new(year: i32, period: u8) -> Result<Self, DomainError> {
        if !(1..=13).contains(&period) {
            return Err(DomainError::validation(format!(
                "fiscal period number must be 1-13, got {period}"
            )));
        }
        Ok(Self { year, period })
    }
}

impl core::fmt::Display for PeriodRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}-{:02}", self.year, self.period)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodStatus {
    Open,
    Closed,
}

/// A fiscal period with its date range and posting status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiscalPeriod {
    pub reference: PeriodRef,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub status: PeriodStatus,
}

/// Period registry. Posting requires the target period to exist and be Open.
#[derive(Debug, Default, Clone)]
pub struct PeriodCalendar {
    periods: BTreeMap<PeriodRef, FiscalPeriod>,
}

impl PeriodCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, period: FiscalPeriod) {
        self.periods.insert(period.reference, period);
    }

    pub fn get(&self, reference: PeriodRef) -> Option<&FiscalPeriod> {
        self.periods.get(&reference)
    }

    pub fn is_open(&self, reference: PeriodRef) -> bool {
        matches!(
            self.periods.get(&reference).map(|p| p.status),
            Some(PeriodStatus::Open)
        )
    }

    /// Last calendar day of the period: the as-of date for closing-rate
    /// lookups and balance cutoffs.
    pub fn closing_date(&self, reference: PeriodRef) -> Option<NaiveDate> {
        self.periods.get(&reference).map(|p| p.end)
    }

    pub fn close(&mut self, reference: PeriodRef) {
        if let Some(p) = self.periods.get_mut(&reference) {
            p.status = PeriodStatus::Closed;
        }
    }
}
