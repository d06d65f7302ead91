use crate::{
    api::{AppState, Error},
    domain::{
        Account, AccountError, AccountRepository, CreateAccountRequest, DepositRequest,
        NewAccount, Transfer, TransferRequest, UpdateAccountRequest,
    },
};
use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use error_ext::StdErrorExt;
use futures::TryStreamExt;
use std::error::Error as StdError;
use tracing::{error, instrument};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(components(schemas(
    Account,
    CreateAccountRequest,
    UpdateAccountRequest,
    DepositRequest,
    TransferRequest,
    Transfer
)))]
pub struct ApiDoc;

pub fn app<R>() -> Router<AppState<R>>
where
    R: AccountRepository,
{
    Router::new()
        .route("/accounts", get(list_accounts::<R>).post(create_account::<R>))
        .route(
            "/accounts/:id",
            get(get_account::<R>)
                .put(update_account::<R>)
                .delete(delete_account::<R>),
        )
        .route("/accounts/:id/deposit", post(deposit::<R>))
        .route("/accounts/:id/transfer", post(transfer::<R>))
}

#[instrument(skip(state))]
async fn list_accounts<R>(State(state): State<AppState<R>>) -> Result<Json<Vec<Account>>, Error>
where
    R: AccountRepository,
{
    let accounts = state
        .account_repository
        .accounts()
        .await
        .map_err(internal_error)?
        .try_collect::<Vec<_>>()
        .await
        .map_err(internal_error)?;
    Ok(Json(accounts))
}

#[instrument(skip(state))]
async fn create_account<R>(
    State(state): State<AppState<R>>,
    request: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Account>), Error>
where
    R: AccountRepository,
{
    let Json(request) = request.map_err(bad_request)?;
    let account = state
        .account_repository
        .create_account(NewAccount::from(request))
        .await
        .map_err(internal_error)?;
    Ok((StatusCode::CREATED, Json(account)))
}

#[instrument(skip(state))]
async fn get_account<R>(
    State(state): State<AppState<R>>,
    id: Result<Path<i32>, PathRejection>,
) -> Result<Json<Account>, Error>
where
    R: AccountRepository,
{
    let Path(id) = id.map_err(bad_request)?;
    state
        .account_repository
        .account_by_id(id)
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| Error::NotFound(AccountError::<R::Error>::NotFound(id).to_string()))
}

#[instrument(skip(state))]
async fn update_account<R>(
    State(state): State<AppState<R>>,
    id: Result<Path<i32>, PathRejection>,
    request: Result<Json<UpdateAccountRequest>, JsonRejection>,
) -> Result<Json<Account>, Error>
where
    R: AccountRepository,
{
    let Path(id) = id.map_err(bad_request)?;
    let Json(request) = request.map_err(bad_request)?;
    let account = state
        .account_repository
        .update_account(id, request)
        .await
        .map_err(account_error)?;
    Ok(Json(account))
}

#[instrument(skip(state))]
async fn delete_account<R>(
    State(state): State<AppState<R>>,
    id: Result<Path<i32>, PathRejection>,
) -> Result<StatusCode, Error>
where
    R: AccountRepository,
{
    let Path(id) = id.map_err(bad_request)?;
    state
        .account_repository
        .delete_account(id)
        .await
        .map_err(account_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
async fn deposit<R>(
    State(state): State<AppState<R>>,
    id: Result<Path<i32>, PathRejection>,
    request: Result<Json<DepositRequest>, JsonRejection>,
) -> Result<Json<Account>, Error>
where
    R: AccountRepository,
{
    let Path(id) = id.map_err(bad_request)?;
    let Json(DepositRequest { amount }) = request.map_err(bad_request)?;
    let account = state
        .account_repository
        .deposit(id, amount)
        .await
        .map_err(account_error)?;
    Ok(Json(account))
}

#[instrument(skip(state))]
async fn transfer<R>(
    State(state): State<AppState<R>>,
    id: Result<Path<i32>, PathRejection>,
    request: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<Json<Transfer>, Error>
where
    R: AccountRepository,
{
    let Path(id) = id.map_err(bad_request)?;
    let Json(request) = request.map_err(bad_request)?;
    let transfer = state
        .account_repository
        .transfer(id, request)
        .await
        .map_err(account_error)?;
    Ok(Json(transfer))
}

fn bad_request(rejection: impl ToString) -> Error {
    Error::BadRequest(rejection.to_string())
}

fn internal_error<E>(error: E) -> Error
where
    E: StdError + Send + Sync + 'static,
{
    error!(error = error.as_chain(), "account repository error");
    Error::Internal
}

fn account_error<E>(error: AccountError<E>) -> Error
where
    E: StdError + Send + Sync + 'static,
{
    match error {
        AccountError::NotFound(_) => Error::NotFound(error.to_string()),

        AccountError::InvalidAmount(_)
        | AccountError::SelfTransfer(_)
        | AccountError::InsufficientBalance(_)
        | AccountError::BalanceOverflow(_) => Error::UnprocessableEntity(error.to_string()),

        AccountError::Repository(error) => internal_error(error),
    }
}
