//! Collaborator ports consumed by the pipeline.
//!
//! Narrow read-only interfaces over external subsystems (ledger balances,
//! elimination rules, intercompany records, reference data). Infrastructure
//! provides the implementations; the engine only sees these traits.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use groupledger_core::TenantId;
use groupledger_journal::{AccountId, Company, CompanyId, PeriodRef};

use crate::elimination::EliminationRule;
use crate::group::{ConsolidationGroup, ConsolidationGroupId};
use crate::intercompany::IntercompanyTransaction;

/// Per-account posted totals in a company's functional currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalanceTotals {
    pub account_id: AccountId,
    pub debit_total: Decimal,
    pub credit_total: Decimal,
}

/// Posted-balance lookup over the journal ledger.
pub trait LedgerReader: Send + Sync {
    fn posted_balances(
        &self,
        tenant_id: TenantId,
        company_id: CompanyId,
        period: PeriodRef,
    ) -> Vec<AccountBalanceTotals>;
}

/// Elimination-rule repository. Implementations return rules ordered by
/// ascending priority; the engine re-sorts defensively either way.
pub trait RuleSource: Send + Sync {
    fn active_rules(
        &self,
        tenant_id: TenantId,
        group_id: ConsolidationGroupId,
    ) -> Vec<EliminationRule>;
}

/// Intercompany transaction repository for a group/period.
pub trait IntercompanySource: Send + Sync {
    fn transactions(
        &self,
        tenant_id: TenantId,
        group_id: ConsolidationGroupId,
        period: PeriodRef,
    ) -> Vec<IntercompanyTransaction>;
}

/// Consolidation group lookup.
pub trait GroupSource: Send + Sync {
    fn group(
        &self,
        tenant_id: TenantId,
        group_id: ConsolidationGroupId,
    ) -> Option<ConsolidationGroup>;
}

/// Company reference-data lookup (functional currencies).
pub trait CompanyDirectory: Send + Sync {
    fn company(&self, tenant_id: TenantId, company_id: CompanyId) -> Option<Company>;
}

impl<T> LedgerReader for Arc<T>
where
    T: LedgerReader + ?Sized,
{
    fn posted_balances(
        &self,
        tenant_id: TenantId,
        company_id: CompanyId,
        period: PeriodRef,
    ) -> Vec<AccountBalanceTotals> {
        (**self).posted_balances(tenant_id, company_id, period)
    }
}

impl<T> RuleSource for Arc<T>
where
    T: RuleSource + ?Sized,
{
    fn active_rules(
        &self,
        tenant_id: TenantId,
        group_id: ConsolidationGroupId,
    ) -> Vec<EliminationRule> {
        (**self).active_rules(tenant_id, group_id)
    }
}

impl<T> IntercompanySource for Arc<T>
where
    T: IntercompanySource + ?Sized,
{
    fn transactions(
        &self,
        tenant_id: TenantId,
        group_id: ConsolidationGroupId,
        period: PeriodRef,
    ) -> Vec<IntercompanyTransaction> {
        (**self).transactions(tenant_id, group_id, period)
    }
}

impl<T> GroupSource for Arc<T>
where
    T: GroupSource + ?Sized,
{
    fn group(
        &self,
        tenant_id: TenantId,
        group_id: ConsolidationGroupId,
    ) -> Option<ConsolidationGroup> {
        (**self).group(tenant_id, group_id)
    }
}

impl<T> CompanyDirectory for Arc<T>
where
    T: CompanyDirectory + ?Sized,
{
    fn company(&self, tenant_id: TenantId, company_id: CompanyId) -> Option<Company> {
        (**self).company(tenant_id, company_id)
    }
}
