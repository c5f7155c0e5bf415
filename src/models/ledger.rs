//! Double-entry ledger types.
//!
//! Every business event is recorded as a [`Posting`]: a set of lines sharing one
//! transaction id whose debits and credits sum to the same amount.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Account {
    Cash,
    Inventory,
    AccountsReceivable,
    AccountsPayable,
    SalesRevenue,
    SalesReturns,
    CostOfGoodsSold,
    InventoryAdjustment,
}

impl Account {
    pub const ALL: [Account; 8] = [
        Account::Cash,
        Account::Inventory,
        Account::AccountsReceivable,
        Account::AccountsPayable,
        Account::SalesRevenue,
        Account::SalesReturns,
        Account::CostOfGoodsSold,
        Account::InventoryAdjustment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Account::Cash => "cash",
            Account::Inventory => "inventory",
            Account::AccountsReceivable => "accounts_receivable",
            Account::AccountsPayable => "accounts_payable",
            Account::SalesRevenue => "sales_revenue",
            Account::SalesReturns => "sales_returns",
            Account::CostOfGoodsSold => "cost_of_goods_sold",
            Account::InventoryAdjustment => "inventory_adjustment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Account::ALL.into_iter().find(|a| a.as_str() == s)
    }
}

/// What kind of document a posting belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Purchase,
    Sale,
    SaleReturn,
    PurchaseReturn,
    Payment,
    Adjustment,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::Purchase => "purchase",
            ReferenceType::Sale => "sale",
            ReferenceType::SaleReturn => "sale_return",
            ReferenceType::PurchaseReturn => "purchase_return",
            ReferenceType::Payment => "payment",
            ReferenceType::Adjustment => "adjustment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "purchase" => Some(ReferenceType::Purchase),
            "sale" => Some(ReferenceType::Sale),
            "sale_return" => Some(ReferenceType::SaleReturn),
            "purchase_return" => Some(ReferenceType::PurchaseReturn),
            "payment" => Some(ReferenceType::Payment),
            "adjustment" => Some(ReferenceType::Adjustment),
            _ => None,
        }
    }
}

/// A persisted ledger line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub transaction_id: String,
    pub account: Account,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party_id: Option<String>,
    pub debit: i64,
    pub credit: i64,
    pub reference_type: ReferenceType,
    pub reference_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    pub created_at: String,
}

/// One side of a posting before it is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingLine {
    pub account: Account,
    pub party_id: Option<String>,
    pub debit: i64,
    pub credit: i64,
}

/// A balanced group of ledger lines for one business event.
#[derive(Debug, Clone)]
pub struct Posting {
    pub reference_type: ReferenceType,
    pub reference_id: String,
    pub memo: Option<String>,
    pub lines: Vec<PostingLine>,
}

impl Posting {
    pub fn new(reference_type: ReferenceType, reference_id: impl Into<String>) -> Self {
        Self {
            reference_type,
            reference_id: reference_id.into(),
            memo: None,
            lines: Vec::new(),
        }
    }

    pub fn memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    /// Debit `debit` and credit `credit` by `amount`.
    ///
    /// A negative amount swaps the sides; zero adds nothing.
    pub fn transfer(
        mut self,
        debit: (Account, Option<&str>),
        credit: (Account, Option<&str>),
        amount: i64,
    ) -> Self {
        if amount == 0 {
            return self;
        }
        let (debit, credit, amount) = if amount < 0 {
            (credit, debit, -amount)
        } else {
            (debit, credit, amount)
        };
        self.lines.push(PostingLine {
            account: debit.0,
            party_id: debit.1.map(str::to_string),
            debit: amount,
            credit: 0,
        });
        self.lines.push(PostingLine {
            account: credit.0,
            party_id: credit.1.map(str::to_string),
            debit: 0,
            credit: amount,
        });
        self
    }

    /// Sum of (debits, credits) across all lines.
    pub fn totals(&self) -> (i64, i64) {
        self.lines
            .iter()
            .fold((0, 0), |(d, c), line| (d + line.debit, c + line.credit))
    }

    pub fn is_balanced(&self) -> bool {
        let (debit, credit) = self.totals();
        debit == credit
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Totals for one account in the trial balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    pub account: Account,
    pub debit: i64,
    pub credit: i64,
    /// Debit minus credit
    pub balance: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialBalance {
    pub accounts: Vec<AccountBalance>,
    pub total_debit: i64,
    pub total_credit: i64,
    pub balanced: bool,
}

impl TrialBalance {
    /// Assemble from per-account (debit, credit) sums; accounts with no activity show zero.
    pub fn from_sums(sums: &[(Account, i64, i64)]) -> Self {
        let accounts: Vec<AccountBalance> = Account::ALL
            .into_iter()
            .map(|account| {
                let (debit, credit) = sums
                    .iter()
                    .find(|(a, _, _)| *a == account)
                    .map(|(_, d, c)| (*d, *c))
                    .unwrap_or((0, 0));
                AccountBalance {
                    account,
                    debit,
                    credit,
                    balance: debit - credit,
                }
            })
            .collect();
        let total_debit = accounts.iter().map(|a| a.debit).sum();
        let total_credit = accounts.iter().map(|a| a.credit).sum();
        Self {
            accounts,
            total_debit,
            total_credit,
            balanced: total_debit == total_credit,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerFilter {
    #[serde(default)]
    pub account: Option<Account>,
    #[serde(default)]
    pub party_id: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_is_balanced() {
        let posting = Posting::new(ReferenceType::Sale, "s1")
            .transfer(
                (Account::AccountsReceivable, Some("c1")),
                (Account::SalesRevenue, None),
                1_000,
            )
            .transfer((Account::CostOfGoodsSold, None), (Account::Inventory, None), 600)
            .transfer(
                (Account::Cash, None),
                (Account::AccountsReceivable, Some("c1")),
                0,
            );
        assert_eq!(posting.lines.len(), 4);
        assert_eq!(posting.totals(), (1_600, 1_600));
        assert!(posting.is_balanced());
    }

    #[test]
    fn test_negative_amount_swaps_sides() {
        let posting = Posting::new(ReferenceType::Adjustment, "a1").transfer(
            (Account::Inventory, None),
            (Account::InventoryAdjustment, None),
            -250,
        );
        assert_eq!(posting.lines[0].account, Account::InventoryAdjustment);
        assert_eq!(posting.lines[0].debit, 250);
        assert_eq!(posting.lines[1].account, Account::Inventory);
        assert_eq!(posting.lines[1].credit, 250);
    }

    #[test]
    fn test_trial_balance_fills_missing_accounts() {
        let tb = TrialBalance::from_sums(&[(Account::Cash, 500, 0), (Account::SalesRevenue, 0, 500)]);
        assert_eq!(tb.accounts.len(), Account::ALL.len());
        assert!(tb.balanced);
        let revenue = tb
            .accounts
            .iter()
            .find(|a| a.account == Account::SalesRevenue)
            .unwrap();
        assert_eq!(revenue.balance, -500);
    }

    #[test]
    fn test_account_parse() {
        assert_eq!(Account::parse("accounts_payable"), Some(Account::AccountsPayable));
        assert_eq!(Account::parse("equity"), None);
    }
}
