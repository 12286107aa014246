use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stockwise_core::{DomainError, DomainResult};

/// High-level account kind (determines normal balance side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountKind {
    pub fn is_debit_normal(&self) -> bool {
        matches!(self, AccountKind::Asset | AccountKind::Expense)
    }
}

/// Account identifier + metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Account {
    pub code: String, // e.g. "1300"
    pub name: String, // e.g. "Inventory"
    pub kind: AccountKind,
}

impl Account {
    pub fn new(code: &str, name: &str, kind: AccountKind) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            kind,
        }
    }
}

/// The part an account plays in derived postings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    Bank,
    UndepositedFunds,
    AccountsReceivable,
    PurchaseTax,
    Inventory,
    AccountsPayable,
    SalesTax,
    SalesRevenue,
    CostOfGoodsSold,
    InventoryAdjustments,
    OperatingExpenses,
    PaymentProcessingFees,
}

/// Fixed mapping from posting roles to chart-of-accounts entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingRules {
    accounts: BTreeMap<AccountRole, Account>,
}

impl Default for PostingRules {
    fn default() -> Self {
        use AccountKind::*;
        use AccountRole::*;

        let accounts = [
            (Bank, Account::new("1000", "Bank", Asset)),
            (UndepositedFunds, Account::new("1050", "Undeposited Funds", Asset)),
            (AccountsReceivable, Account::new("1200", "Accounts Receivable", Asset)),
            (PurchaseTax, Account::new("1250", "Purchase Tax Receivable", Asset)),
            (Inventory, Account::new("1300", "Inventory", Asset)),
            (AccountsPayable, Account::new("2000", "Accounts Payable", Liability)),
            (SalesTax, Account::new("2100", "Sales Tax Payable", Liability)),
            (SalesRevenue, Account::new("4000", "Sales Revenue", Revenue)),
            (CostOfGoodsSold, Account::new("5000", "Cost of Goods Sold", Expense)),
            (
                InventoryAdjustments,
                Account::new("5200", "Inventory Adjustments", Expense),
            ),
            (OperatingExpenses, Account::new("6000", "Operating Expenses", Expense)),
            (
                PaymentProcessingFees,
                Account::new("6100", "Payment Processing Fees", Expense),
            ),
        ]
        .into_iter()
        .collect();

        Self { accounts }
    }
}

impl PostingRules {
    /// Replace the account used for `role`.
    pub fn with_account(mut self, role: AccountRole, account: Account) -> Self {
        self.accounts.insert(role, account);
        self
    }

    pub fn account(&self, role: AccountRole) -> DomainResult<&Account> {
        self.accounts
            .get(&role)
            .ok_or_else(|| DomainError::invariant(format!("no account mapped for {role:?}")))
    }

    pub fn by_code(&self, code: &str) -> DomainResult<&Account> {
        self.accounts
            .values()
            .find(|a| a.code == code)
            .ok_or_else(|| DomainError::not_found(format!("account {code}")))
    }

    pub fn chart(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chart_covers_every_role() {
        let rules = PostingRules::default();
        assert_eq!(rules.account(AccountRole::Inventory).unwrap().code, "1300");
        assert_eq!(rules.account(AccountRole::CostOfGoodsSold).unwrap().code, "5000");
        assert_eq!(rules.chart().count(), 12);
    }

    #[test]
    fn lookup_by_code() {
        let rules = PostingRules::default();
        assert_eq!(rules.by_code("2000").unwrap().kind, AccountKind::Liability);
        assert!(matches!(rules.by_code("9999"), Err(DomainError::NotFound(_))));
    }
}
