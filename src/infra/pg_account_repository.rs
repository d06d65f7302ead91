use crate::{
    config::PgConfig,
    domain::{
        self, validate_deposit, validate_transfer, AccountError, AccountRepository, NewAccount,
        Transfer, TransferRequest, UpdateAccountRequest,
    },
};
use futures::{Stream, TryStreamExt};
use sqlx::{
    migrate::MigrateError, postgres::PgPoolOptions, prelude::FromRow, Connection, PgPool, Postgres,
    QueryBuilder, Transaction,
};
use time::OffsetDateTime;
use tracing::{debug, info, instrument};

const COLUMNS: &str = "id, first_name, last_name, number, balance, created_at";

#[derive(Debug, Clone)]
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a connection pool for the given configuration and verify that the database is
    /// reachable.
    pub async fn connect(config: PgConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new().connect_with(config.into()).await?;
        pool.acquire().await?.ping().await?;
        debug!("database reachable");
        Ok(Self::new(pool))
    }

    /// Ensure the `accounts` table exists. Idempotent; concurrent runs are serialized by the
    /// migrator's advisory lock.
    pub async fn init(&self) -> Result<(), MigrateError> {
        sqlx::migrate!().run(&self.pool).await
    }
}

impl AccountRepository for PgAccountRepository {
    type Error = sqlx::Error;

    #[instrument(skip(self))]
    async fn create_account(&self, account: NewAccount) -> Result<domain::Account, Self::Error> {
        let NewAccount {
            first_name,
            last_name,
            number,
            balance,
            created_at,
        } = account;

        let account = QueryBuilder::new(
            "INSERT INTO accounts (first_name, last_name, number, balance, created_at) ",
        )
        .push_values([(first_name, last_name)], |mut q, (first_name, last_name)| {
            q.push_bind(first_name)
                .push_bind(last_name)
                .push_bind(number)
                .push_bind(balance)
                .push_bind(created_at);
        })
        .push(" RETURNING ")
        .push(COLUMNS)
        .build_query_as::<Account>()
        .fetch_one(&self.pool)
        .await?;

        info!(id = account.id, number, "inserted account");
        Ok(account.into())
    }

    #[instrument(skip(self))]
    async fn accounts(
        &self,
    ) -> Result<impl Stream<Item = Result<domain::Account, Self::Error>> + Send, Self::Error> {
        let accounts = sqlx::query_as::<_, Account>("SELECT * FROM accounts")
            .fetch(&self.pool)
            .map_ok(domain::Account::from);
        Ok(accounts)
    }

    #[instrument(skip(self))]
    async fn account_by_id(&self, id: i32) -> Result<Option<domain::Account>, Self::Error> {
        let account = QueryBuilder::new("SELECT * FROM accounts WHERE id = ")
            .push_bind(id)
            .build_query_as::<Account>()
            .fetch_optional(&self.pool)
            .await?;
        let account = account.map(domain::Account::from);
        Ok(account)
    }

    #[instrument(skip(self))]
    async fn update_account(
        &self,
        id: i32,
        update: UpdateAccountRequest,
    ) -> Result<domain::Account, AccountError<Self::Error>> {
        let UpdateAccountRequest {
            first_name,
            last_name,
        } = update;

        let account = QueryBuilder::new("UPDATE accounts SET first_name = ")
            .push_bind(first_name)
            .push(", last_name = ")
            .push_bind(last_name)
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" RETURNING ")
            .push(COLUMNS)
            .build_query_as::<Account>()
            .fetch_optional(&self.pool)
            .await
            .map_err(AccountError::Repository)?
            .ok_or(AccountError::<Self::Error>::NotFound(id))?;

        info!(id, "updated account");
        Ok(account.into())
    }

    #[instrument(skip(self))]
    async fn delete_account(&self, id: i32) -> Result<(), AccountError<Self::Error>> {
        let result = QueryBuilder::new("DELETE FROM accounts WHERE id = ")
            .push_bind(id)
            .build()
            .execute(&self.pool)
            .await
            .map_err(AccountError::Repository)?;

        if result.rows_affected() == 0 {
            return Err(AccountError::NotFound(id));
        }

        info!(id, "deleted account");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn deposit(
        &self,
        id: i32,
        amount: i64,
    ) -> Result<domain::Account, AccountError<Self::Error>> {
        validate_deposit::<Self::Error>(amount)?;

        let account = QueryBuilder::new("UPDATE accounts SET balance = balance + ")
            .push_bind(amount)
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" RETURNING ")
            .push(COLUMNS)
            .build_query_as::<Account>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| match error {
                error if is_numeric_overflow(&error) => AccountError::BalanceOverflow(id),
                error => AccountError::Repository(error),
            })?
            .ok_or(AccountError::<Self::Error>::NotFound(id))?;

        info!(id, amount, balance = account.balance, "deposited amount");
        Ok(account.into())
    }

    #[instrument(skip(self))]
    async fn transfer(
        &self,
        from: i32,
        request: TransferRequest,
    ) -> Result<Transfer, AccountError<Self::Error>> {
        validate_transfer::<Self::Error>(from, &request)?;
        let TransferRequest { to_account, amount } = request;

        let mut tx = self.pool.begin().await.map_err(AccountError::Repository)?;

        // Lock both rows in ascending ID order, so opposite transfers cannot deadlock.
        let balances = QueryBuilder::new("SELECT id, balance FROM accounts WHERE id IN (")
            .push_bind(from)
            .push(", ")
            .push_bind(to_account)
            .push(") ORDER BY id FOR UPDATE")
            .build_query_as::<(i32, i64)>()
            .fetch_all(&mut *tx)
            .await
            .map_err(AccountError::Repository)?;

        let balance_of = |id| {
            balances
                .iter()
                .find_map(|&(i, balance)| (i == id).then_some(balance))
                .ok_or(AccountError::<Self::Error>::NotFound(id))
        };
        let from_balance = balance_of(from)?;
        let to_balance = balance_of(to_account)?;
        if from_balance < amount {
            return Err(AccountError::InsufficientBalance(from));
        }
        if to_balance.checked_add(amount).is_none() {
            return Err(AccountError::BalanceOverflow(to_account));
        }

        let from_account = add_to_balance(from, -amount, &mut tx)
            .await
            .map_err(AccountError::Repository)?;
        let to_account = add_to_balance(to_account, amount, &mut tx)
            .await
            .map_err(AccountError::Repository)?;

        tx.commit().await.map_err(AccountError::Repository)?;

        info!(from, to = to_account.id, amount, "transferred amount");
        Ok(Transfer {
            from: from_account.into(),
            to: to_account.into(),
        })
    }
}

/// Whether the error is Postgres' `numeric_value_out_of_range`, e.g. a BIGINT overflow.
fn is_numeric_overflow(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|error| error.code())
        .is_some_and(|code| code == "22003")
}

#[instrument(skip(tx))]
async fn add_to_balance(
    id: i32,
    amount: i64,
    tx: &mut Transaction<'static, Postgres>,
) -> Result<Account, sqlx::Error> {
    QueryBuilder::new("UPDATE accounts SET balance = balance + ")
        .push_bind(amount)
        .push(" WHERE id = ")
        .push_bind(id)
        .push(" RETURNING ")
        .push(COLUMNS)
        .build_query_as::<Account>()
        .fetch_one(&mut **tx)
        .await
}

#[derive(Debug, FromRow)]
struct Account {
    id: i32,
    first_name: String,
    last_name: String,
    number: i64,
    balance: i64,
    created_at: OffsetDateTime,
}

impl From<Account> for domain::Account {
    fn from(
        Account {
            id,
            first_name,
            last_name,
            number,
            balance,
            created_at,
        }: Account,
    ) -> Self {
        domain::Account {
            id,
            first_name,
            last_name,
            number,
            balance,
            created_at,
        }
    }
}
