use crate::domain::{Account, NewAccount, Transfer, TransferRequest, UpdateAccountRequest};
use futures::Stream;
use std::error::Error as StdError;
use thiserror::Error;

#[trait_variant::make(Send)]
pub trait AccountRepository
where
    Self: Clone + Send + Sync + 'static,
{
    type Error: StdError + Send + Sync + 'static;

    /// Persist the given account and return it as stored, i.e. with the assigned ID and
    /// creation timestamp.
    async fn create_account(&self, account: NewAccount) -> Result<Account, Self::Error>;

    /// All accounts in no particular order.
    async fn accounts(
        &self,
    ) -> Result<impl Stream<Item = Result<Account, Self::Error>> + Send, Self::Error>;

    async fn account_by_id(&self, id: i32) -> Result<Option<Account>, Self::Error>;

    async fn update_account(
        &self,
        id: i32,
        update: UpdateAccountRequest,
    ) -> Result<Account, AccountError<Self::Error>>;

    async fn delete_account(&self, id: i32) -> Result<(), AccountError<Self::Error>>;

    async fn deposit(&self, id: i32, amount: i64) -> Result<Account, AccountError<Self::Error>>;

    /// Atomically move `amount` from the account with ID `from` to `request.to_account`.
    async fn transfer(
        &self,
        from: i32,
        request: TransferRequest,
    ) -> Result<Transfer, AccountError<Self::Error>>;
}

#[derive(Debug, Error)]
pub enum AccountError<E> {
    #[error("account with ID {0} not found")]
    NotFound(i32),

    #[error("amount must be positive, but was {0}")]
    InvalidAmount(i64),

    #[error("account with ID {0} cannot transfer to itself")]
    SelfTransfer(i32),

    #[error("account with ID {0} has insufficient balance for transfer")]
    InsufficientBalance(i32),

    #[error("balance of account with ID {0} would exceed the maximum")]
    BalanceOverflow(i32),

    #[error("account repository error")]
    Repository(#[source] E),
}

/// Check the preconditions of a deposit which do not need any stored state.
pub fn validate_deposit<E>(amount: i64) -> Result<(), AccountError<E>> {
    if amount <= 0 {
        return Err(AccountError::InvalidAmount(amount));
    }
    Ok(())
}

/// Check the preconditions of a transfer which do not need any stored state.
pub fn validate_transfer<E>(from: i32, request: &TransferRequest) -> Result<(), AccountError<E>> {
    validate_deposit(request.amount)?;
    if from == request.to_account {
        return Err(AccountError::SelfTransfer(from));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::domain::{validate_deposit, validate_transfer, AccountError, TransferRequest};
    use assert_matches::assert_matches;
    use std::convert::Infallible;

    #[test]
    fn test_validate_deposit() {
        assert_matches!(validate_deposit::<Infallible>(1), Ok(()));
        assert_matches!(
            validate_deposit::<Infallible>(0),
            Err(AccountError::InvalidAmount(0))
        );
        assert_matches!(
            validate_deposit::<Infallible>(-5),
            Err(AccountError::InvalidAmount(-5))
        );
    }

    #[test]
    fn test_validate_transfer() {
        let request = TransferRequest {
            to_account: 2,
            amount: 10,
        };
        assert_matches!(validate_transfer::<Infallible>(1, &request), Ok(()));
        assert_matches!(
            validate_transfer::<Infallible>(2, &request),
            Err(AccountError::SelfTransfer(2))
        );

        let request = TransferRequest {
            to_account: 2,
            amount: 0,
        };
        assert_matches!(
            validate_transfer::<Infallible>(1, &request),
            Err(AccountError::InvalidAmount(0))
        );
    }
}
