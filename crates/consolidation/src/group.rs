//! Consolidation groups and their members.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use groupledger_core::Entity;
use groupledger_fx::CurrencyCode;
use groupledger_journal::{AccountId, CompanyId};

use crate::elimination::EliminationRuleId;

/// Consolidation group identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsolidationGroupId(pub Uuid);

impl ConsolidationGroupId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ConsolidationGroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ConsolidationGroupId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// How a member's balances roll up into the group.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsolidationMethod {
    FullConsolidation,
    EquityMethod,
    CostMethod,
    VariableInterestEntity,
}

/// VIE consolidation test. A VIE member consolidates line-by-line only when
/// both determinations hold.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VieDetermination {
    pub is_primary_beneficiary: bool,
    pub has_controlling_financial_interest: bool,
}

impl VieDetermination {
    pub fn consolidates(&self) -> bool {
        self.is_primary_beneficiary && self.has_controlling_financial_interest
    }
}

/// One company's membership in a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub company_id: CompanyId,
    /// Ownership percentage in (0, 100].
    pub ownership: Decimal,
    pub method: ConsolidationMethod,
    pub vie_determination: Option<VieDetermination>,
}

impl GroupMember {
    pub fn full(company_id: CompanyId, ownership: Decimal) -> Self {
        Self {
            company_id,
            ownership,
            method: ConsolidationMethod::FullConsolidation,
            vie_determination: None,
        }
    }

    /// Whether this member's balances aggregate line-by-line.
    pub fn is_line_consolidated(&self) -> bool {
        match self.method {
            ConsolidationMethod::FullConsolidation => true,
            ConsolidationMethod::VariableInterestEntity => self
                .vie_determination
                .map(|d| d.consolidates())
                .unwrap_or(false),
            ConsolidationMethod::EquityMethod | ConsolidationMethod::CostMethod => false,
        }
    }

    /// The outside shareholders' fraction (0 for wholly owned members).
    pub fn nci_fraction(&self) -> Decimal {
        let hundred = Decimal::from(100);
        if self.ownership >= hundred {
            Decimal::ZERO
        } else {
            (hundred - self.ownership) / hundred
        }
    }
}

/// A set of related companies consolidated into one reporting entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationGroup {
    pub id: ConsolidationGroupId,
    pub name: String,
    pub reporting_currency: CurrencyCode,
    pub members: Vec<GroupMember>,
    pub elimination_rule_ids: Vec<EliminationRuleId>,
    /// Equity account that carries the non-controlling interest balancing
    /// line. Explicitly optional: a run that produces NCI without this
    /// configured fails with a named issue rather than guessing.
    pub nci_equity_account: Option<AccountId>,
}

impl ConsolidationGroup {
    pub fn new(
        name: impl Into<String>,
        reporting_currency: CurrencyCode,
        members: Vec<GroupMember>,
    ) -> Self {
        Self {
            id: ConsolidationGroupId::new(),
            name: name.into(),
            reporting_currency,
            members,
            elimination_rule_ids: Vec::new(),
            nci_equity_account: None,
        }
    }

    pub fn member(&self, company_id: CompanyId) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.company_id == company_id)
    }

    pub fn line_consolidated_members(&self) -> impl Iterator<Item = &GroupMember> {
        self.members.iter().filter(|m| m.is_line_consolidated())
    }
}

impl Entity for ConsolidationGroup {
    type Id = ConsolidationGroupId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
