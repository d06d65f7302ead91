use rand::Rng;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Upper bound (exclusive) for randomly assigned account numbers.
pub const ACCOUNT_NUMBER_BOUND: i64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Account {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub number: i64,
    pub balance: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// An account which has not yet been persisted and hence has no ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub first_name: String,
    pub last_name: String,
    pub number: i64,
    pub balance: i64,
    pub created_at: OffsetDateTime,
}

impl NewAccount {
    /// Create a new account with a random number below [ACCOUNT_NUMBER_BOUND], zero balance and
    /// the current UTC time. Account numbers are not guaranteed to be unique.
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            number: rand::thread_rng().gen_range(0..ACCOUNT_NUMBER_BOUND),
            balance: 0,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

impl From<CreateAccountRequest> for NewAccount {
    fn from(CreateAccountRequest { first_name, last_name }: CreateAccountRequest) -> Self {
        NewAccount::new(first_name, last_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateAccountRequest {
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateAccountRequest {
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct DepositRequest {
    pub amount: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct TransferRequest {
    pub to_account: i32,
    pub amount: i64,
}

/// Outcome of a transfer: both accounts with their balances after the transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Transfer {
    pub from: Account,
    pub to: Account,
}

#[cfg(test)]
mod tests {
    use crate::domain::{CreateAccountRequest, NewAccount, ACCOUNT_NUMBER_BOUND};
    use time::{Duration, OffsetDateTime, UtcOffset};

    #[test]
    fn test_new_account() {
        let before = OffsetDateTime::now_utc();

        for _ in 0..1_000 {
            let account = NewAccount::new("Ana", "Silva");
            assert_eq!(account.first_name, "Ana");
            assert_eq!(account.last_name, "Silva");
            assert_eq!(account.balance, 0);
            assert!((0..ACCOUNT_NUMBER_BOUND).contains(&account.number));
            assert_eq!(account.created_at.offset(), UtcOffset::UTC);
            assert!(account.created_at >= before);
            assert!(account.created_at - before < Duration::minutes(1));
        }
    }

    #[test]
    fn test_new_account_accepts_empty_names() {
        let account = NewAccount::from(CreateAccountRequest {
            first_name: String::new(),
            last_name: String::new(),
        });
        assert!(account.first_name.is_empty());
        assert!(account.last_name.is_empty());
        assert_eq!(account.balance, 0);
    }
}
