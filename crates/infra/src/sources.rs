//! In-memory adapters for the consolidation collaborator ports.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use groupledger_core::TenantId;
use groupledger_journal::{Company, CompanyId, PeriodRef};

use groupledger_consolidation::{
    AccountBalanceTotals, CompanyDirectory, ConsolidationGroup, ConsolidationGroupId,
    EliminationRule, GroupSource, IntercompanySource, IntercompanyTransaction, LedgerReader,
    RuleSource,
};

use crate::projections::balances::{AccountBalance, AccountBalancesProjection, BalanceKey};
use crate::read_model::TenantStore;

/// [`LedgerReader`] backed by the posted-balances projection; the journal
/// ledger is the sole writer of the balances the pipeline consumes.
pub struct ProjectionLedgerReader<S>
where
    S: TenantStore<BalanceKey, AccountBalance>,
{
    projection: Arc<AccountBalancesProjection<S>>,
}

impl<S> ProjectionLedgerReader<S>
where
    S: TenantStore<BalanceKey, AccountBalance>,
{
    pub fn new(projection: Arc<AccountBalancesProjection<S>>) -> Self {
        Self { projection }
    }
}

impl<S> LedgerReader for ProjectionLedgerReader<S>
where
    S: TenantStore<BalanceKey, AccountBalance>,
{
    fn posted_balances(
        &self,
        tenant_id: TenantId,
        company_id: CompanyId,
        period: PeriodRef,
    ) -> Vec<AccountBalanceTotals> {
        self.projection
            .balances_for(tenant_id, company_id, period)
            .into_iter()
            .map(|b| AccountBalanceTotals {
                account_id: b.account_id,
                debit_total: b.debit_total,
                credit_total: b.credit_total,
            })
            .collect()
    }
}

/// Group registry.
#[derive(Debug, Default)]
pub struct InMemoryGroupSource {
    groups: RwLock<HashMap<(TenantId, ConsolidationGroupId), ConsolidationGroup>>,
}

impl InMemoryGroupSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant_id: TenantId, group: ConsolidationGroup) {
        if let Ok(mut groups) = self.groups.write() {
            groups.insert((tenant_id, group.id), group);
        }
    }
}

impl GroupSource for InMemoryGroupSource {
    fn group(
        &self,
        tenant_id: TenantId,
        group_id: ConsolidationGroupId,
    ) -> Option<ConsolidationGroup> {
        self.groups.read().ok()?.get(&(tenant_id, group_id)).cloned()
    }
}

/// Company registry.
#[derive(Debug, Default)]
pub struct InMemoryCompanyDirectory {
    companies: RwLock<HashMap<(TenantId, CompanyId), Company>>,
}

impl InMemoryCompanyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant_id: TenantId, company: Company) {
        if let Ok(mut companies) = self.companies.write() {
            companies.insert((tenant_id, company.id), company);
        }
    }
}

impl CompanyDirectory for InMemoryCompanyDirectory {
    fn company(&self, tenant_id: TenantId, company_id: CompanyId) -> Option<Company> {
        self.companies.read().ok()?.get(&(tenant_id, company_id)).cloned()
    }
}

/// Elimination rule repository.
#[derive(Debug, Default)]
pub struct InMemoryRuleSource {
    rules: RwLock<Vec<(TenantId, EliminationRule)>>,
}

impl InMemoryRuleSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant_id: TenantId, rule: EliminationRule) {
        if let Ok(mut rules) = self.rules.write() {
            rules.push((tenant_id, rule));
        }
    }

    /// Flip a rule's active flag (takes effect on future runs only).
    pub fn set_active(&self, tenant_id: TenantId, rule_id: groupledger_consolidation::EliminationRuleId, active: bool) {
        if let Ok(mut rules) = self.rules.write() {
            for (t, rule) in rules.iter_mut() {
                if *t == tenant_id && rule.id == rule_id {
                    rule.is_active = active;
                }
            }
        }
    }
}

impl RuleSource for InMemoryRuleSource {
    fn active_rules(
        &self,
        tenant_id: TenantId,
        group_id: ConsolidationGroupId,
    ) -> Vec<EliminationRule> {
        let Ok(rules) = self.rules.read() else {
            return Vec::new();
        };
        let mut active: Vec<EliminationRule> = rules
            .iter()
            .filter(|(t, r)| *t == tenant_id && r.group_id == group_id && r.is_active)
            .map(|(_, r)| r.clone())
            .collect();
        active.sort_by_key(|r| r.priority);
        active
    }
}

/// Intercompany transaction repository.
#[derive(Debug, Default)]
pub struct InMemoryIntercompanySource {
    transactions:
        RwLock<HashMap<(TenantId, ConsolidationGroupId, PeriodRef), Vec<IntercompanyTransaction>>>,
}

impl InMemoryIntercompanySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        tenant_id: TenantId,
        group_id: ConsolidationGroupId,
        period: PeriodRef,
        transaction: IntercompanyTransaction,
    ) {
        if let Ok(mut transactions) = self.transactions.write() {
            transactions
                .entry((tenant_id, group_id, period))
                .or_default()
                .push(transaction);
        }
    }
}

impl IntercompanySource for InMemoryIntercompanySource {
    fn transactions(
        &self,
        tenant_id: TenantId,
        group_id: ConsolidationGroupId,
        period: PeriodRef,
    ) -> Vec<IntercompanyTransaction> {
        self.transactions
            .read()
            .ok()
            .and_then(|m| m.get(&(tenant_id, group_id, period)).cloned())
            .unwrap_or_default()
    }
}
