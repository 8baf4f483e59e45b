//! Companies (legal entities that keep their own books).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use groupledger_core::Entity;
use groupledger_fx::CurrencyCode;

/// Company identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(pub Uuid);

impl CompanyId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for CompanyId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for CompanyId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A legal entity posting journal entries in its functional currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub code: String,
    pub name: String,
    /// Primary currency of the company's economic environment.
    pub functional_currency: CurrencyCode,
}

impl Company {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        functional_currency: CurrencyCode,
    ) -> Self {
        Self {
            id: CompanyId::new(),
            code: code.into(),
            name: name.into(),
            functional_currency,
        }
    }
}

impl Entity for Company {
    type Id = CompanyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
