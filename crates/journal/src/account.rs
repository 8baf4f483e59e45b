//! Chart of accounts.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use groupledger_core::Entity;
use groupledger_fx::BalanceClass;

/// Account identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub Uuid);

impl AccountId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for AccountId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// High-level account classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountType {
    /// Conventional normal balance side for this classification.
    pub fn default_normal_balance(self) -> NormalBalance {
        match self {
            AccountType::Asset | AccountType::Expense => NormalBalance::Debit,
            AccountType::Liability | AccountType::Equity | AccountType::Revenue => {
                NormalBalance::Credit
            }
        }
    }

    /// Statement side, which drives the FX translation rate choice.
    pub fn balance_class(self) -> BalanceClass {
        match self {
            AccountType::Asset | AccountType::Liability | AccountType::Equity => {
                BalanceClass::BalanceSheet
            }
            AccountType::Revenue | AccountType::Expense => BalanceClass::IncomeStatement,
        }
    }

    /// Equity and income-statement lines attract non-controlling interest.
    pub fn attracts_nci(self) -> bool {
        matches!(
            self,
            AccountType::Equity | AccountType::Revenue | AccountType::Expense
        )
    }
}

/// Which side increases an account's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalBalance {
    Debit,
    Credit,
}

impl NormalBalance {
    /// Net balance signed by this convention: positive when the balance sits
    /// on the account's normal side.
    pub fn signed(self, debit_total: Decimal, credit_total: Decimal) -> Decimal {
        match self {
            NormalBalance::Debit => debit_total - credit_total,
            NormalBalance::Credit => credit_total - debit_total,
        }
    }
}

/// A ledger account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub normal_balance: NormalBalance,
    /// Hierarchy parent (None for top-level accounts).
    pub parent: Option<AccountId>,
    /// Marks accounts used for transactions between group members.
    pub intercompany: bool,
}

impl Account {
    pub fn new(code: impl Into<String>, name: impl Into<String>, account_type: AccountType) -> Self {
        Self {
            id: AccountId::new(),
            code: code.into(),
            name: name.into(),
            account_type,
            normal_balance: account_type.default_normal_balance(),
            parent: None,
            intercompany: false,
        }
    }

    pub fn with_parent(mut self, parent: AccountId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn intercompany(mut self) -> Self {
        self.intercompany = true;
        self
    }
}

impl Entity for Account {
    type Id = AccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// In-memory account registry with lookup by id and by code.
#[derive(Debug, Default, Clone)]
pub struct ChartOfAccounts {
    by_id: HashMap<AccountId, Account>,
    by_code: HashMap<String, AccountId>,
}

impl ChartOfAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, account: Account) -> AccountId {
        let id = account.id;
        self.by_code.insert(account.code.clone(), id);
        self.by_id.insert(id, account);
        id
    }

    pub fn get(&self, id: AccountId) -> Option<&Account> {
        self.by_id.get(&id)
    }

    pub fn get_by_code(&self, code: &str) -> Option<&Account> {
        self.by_code.get(code).and_then(|id| self.by_id.get(id))
    }

    pub fn contains(&self, id: AccountId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn normal_balance_follows_account_type() {
        assert_eq!(
            AccountType::Asset.default_normal_balance(),
            NormalBalance::Debit
        );
        assert_eq!(
            AccountType::Expense.default_normal_balance(),
            NormalBalance::Debit
        );
        assert_eq!(
            AccountType::Liability.default_normal_balance(),
            NormalBalance::Credit
        );
        assert_eq!(
            AccountType::Revenue.default_normal_balance(),
            NormalBalance::Credit
        );
    }

    #[test]
    fn signed_balance_respects_normal_side() {
        assert_eq!(NormalBalance::Debit.signed(dec!(150), dec!(50)), dec!(100));
        assert_eq!(NormalBalance::Credit.signed(dec!(50), dec!(150)), dec!(100));
        assert_eq!(NormalBalance::Credit.signed(dec!(150), dec!(50)), dec!(-100));
    }

    #[test]
    fn chart_lookup_by_id_and_code() {
        let mut chart = ChartOfAccounts::new();
        let cash = Account::new("1000", "Cash", AccountType::Asset);
        let id = chart.insert(cash);

        assert!(chart.contains(id));
        assert_eq!(chart.get_by_code("1000").unwrap().id, id);
        assert!(chart.get_by_code("9999").is_none());
    }
}
