//! Accounts a card can be linked to

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Funding account owned by the accounts subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub account_type: String,
    pub currency: String,
    pub balance: Decimal,
}

/// Find an account by id
pub fn find_account(accounts: &[Account], id: Uuid) -> Option<&Account> {
    accounts.iter().find(|account| account.id == id)
}
