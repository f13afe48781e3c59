use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type AccountId = i64;

/// Amount in the smallest currency unit.
pub type Amount = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner: String,
    pub balance: Amount,
    pub created_at: DateTime<Utc>,
}

/// Immutable ledger entry for one committed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: i64,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

/// Row of an account seed file, used for out-of-band provisioning.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub id: AccountId,
    #[serde(default)]
    pub owner: String,
    pub balance: Amount,
}

/// Transfer request as it arrives on the wire or in a batch file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
}

#[derive(Debug, Serialize)]
pub struct BalanceOutput {
    pub id: AccountId,
    pub owner: String,
    pub balance: Amount,
}

impl From<&Account> for BalanceOutput {
    fn from(acc: &Account) -> Self {
        Self {
            id: acc.id,
            owner: acc.owner.clone(),
            balance: acc.balance,
        }
    }
}

/// Sum of balances, widened so a large account set cannot overflow.
pub fn total_balance(accounts: &[Account]) -> i128 {
    accounts.iter().map(|a| a.balance as i128).sum()
}
