//! Posted-balance read model: (company, period, account) totals.

use std::collections::HashMap;
use std::sync::RwLock;

use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use thiserror::Error;

use groupledger_core::{AggregateId, TenantId};
use groupledger_events::EventEnvelope;
use groupledger_journal::{AccountId, CompanyId, JournalEntryEvent, JournalLine, PeriodRef};

use crate::read_model::TenantStore;

/// Functional-currency totals for one account of one company in one period.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountBalance {
    pub company_id: CompanyId,
    pub period: PeriodRef,
    pub account_id: AccountId,
    pub debit_total: Decimal,
    pub credit_total: Decimal,
}

/// Read-model key.
pub type BalanceKey = (CompanyId, PeriodRef, AccountId);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum BalancesProjectionError {
    #[error("failed to deserialize journal event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Folds posted and reversed entries into per-account totals.
///
/// Only `EntryPosted`/`EntryReversed` move balances; draft lifecycle events
/// are ignored. Idempotent via per-stream sequence cursors (at-least-once
/// bus delivery is safe).
#[derive(Debug)]
pub struct AccountBalancesProjection<S>
where
    S: TenantStore<BalanceKey, AccountBalance>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> AccountBalancesProjection<S>
where
    S: TenantStore<BalanceKey, AccountBalance>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    fn cursor(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        match self.cursors.read() {
            Ok(cursors) => *cursors
                .get(&CursorKey {
                    tenant_id,
                    aggregate_id,
                })
                .unwrap_or(&0),
            Err(_) => 0,
        }
    }

    fn advance_cursor(&self, tenant_id: TenantId, aggregate_id: AggregateId, seq: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(
                CursorKey {
                    tenant_id,
                    aggregate_id,
                },
                seq,
            );
        }
    }

    /// All balances for one company and period.
    pub fn balances_for(
        &self,
        tenant_id: TenantId,
        company_id: CompanyId,
        period: PeriodRef,
    ) -> Vec<AccountBalance> {
        let mut balances: Vec<AccountBalance> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|b| b.company_id == company_id && b.period == period)
            .collect();
        balances.sort_by_key(|b| b.account_id);
        balances
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), BalancesProjectionError> {
        if envelope.aggregate_type() != "journal.entry" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        let last = self.cursor(tenant_id, aggregate_id);

        if seq == 0 {
            return Err(BalancesProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            // Duplicate delivery: already folded.
            return Ok(());
        }
        if last != 0 && seq != last + 1 {
            return Err(BalancesProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: JournalEntryEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| BalancesProjectionError::Deserialize(e.to_string()))?;

        match &ev {
            JournalEntryEvent::EntryPosted(e) => {
                if e.tenant_id != tenant_id {
                    return Err(BalancesProjectionError::TenantIsolation(
                        "event tenant_id does not match envelope".to_string(),
                    ));
                }
                self.fold_lines(tenant_id, e.company_id, e.period, &e.lines);
            }
            JournalEntryEvent::EntryReversed(e) => {
                if e.tenant_id != tenant_id {
                    return Err(BalancesProjectionError::TenantIsolation(
                        "event tenant_id does not match envelope".to_string(),
                    ));
                }
                self.fold_lines(tenant_id, e.company_id, e.period, &e.reversing_lines);
            }
            _ => {}
        }

        self.advance_cursor(tenant_id, aggregate_id, seq);
        Ok(())
    }

    fn fold_lines(
        &self,
        tenant_id: TenantId,
        company_id: CompanyId,
        period: PeriodRef,
        lines: &[JournalLine],
    ) {
        for line in lines {
            let key = (company_id, period, line.account_id);
            let mut balance = self.store.get(tenant_id, &key).unwrap_or(AccountBalance {
                company_id,
                period,
                account_id: line.account_id,
                debit_total: Decimal::ZERO,
                credit_total: Decimal::ZERO,
            });

            balance.debit_total += line.functional_debit();
            balance.credit_total += line.functional_credit();
            self.store.upsert(tenant_id, key, balance);
        }
    }
}
