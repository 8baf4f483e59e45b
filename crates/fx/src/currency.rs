//! Currency code value type.

use core::str::FromStr;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use groupledger_core::{DomainError, ValueObject};

/// ISO-4217 currency code: exactly three ASCII uppercase letters.
///
/// Stored inline so the code is `Copy` and cheap to compare in hot
/// aggregation paths.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CurrencyCode([u8; 3]);

impl CurrencyCode {
    pub fn new(code: &str) -> Result<Self, DomainError> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_uppercase()) {
            return Err(DomainError::validation(format!(
                "currency must be 3 uppercase ASCII letters (ISO 4217): {code:?}"
            )));
        }
        Ok(Self([bytes[0], bytes[1], bytes[2]]))
    }

    pub fn as_str(&self) -> &str {
        // Invariant: constructed from ASCII uppercase only.
        core::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl ValueObject for CurrencyCode {}

impl core::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurrencyCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for CurrencyCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CurrencyCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CurrencyCode::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Which side of the financial statements an account lives on; drives the
/// translation rate choice (closing vs. average).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceClass {
    BalanceSheet,
    IncomeStatement,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_iso_codes() {
        assert_eq!(CurrencyCode::new("USD").unwrap().as_str(), "USD");
        assert_eq!(CurrencyCode::new("EUR").unwrap().to_string(), "EUR");
    }

    #[test]
    fn rejects_malformed_codes() {
        for bad in ["usd", "US", "USDX", "U$D", ""] {
            assert!(CurrencyCode::new(bad).is_err(), "{bad:?} should be rejected");
        }
    }
}
