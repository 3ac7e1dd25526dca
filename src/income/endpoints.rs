//! Route handlers for income.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
};
use axum_extra::extract::WithRejection;
use rusqlite::Connection;

use crate::{
    AppState, Error,
    auth::UserID,
    income::core::{
        Income, IncomeFilter, IncomeForm, IncomeId, create_income, delete_income, get_income,
        get_incomes, update_income,
    },
};

/// The state needed by the income routes.
#[derive(Debug, Clone)]
pub struct IncomeState {
    /// The database connection for managing income.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for IncomeState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// List the user's income, optionally filtered by `mes`, `ano` and `categoria`.
pub async fn list_income_endpoint(
    State(state): State<IncomeState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Query(filter), _): WithRejection<Query<IncomeFilter>, Error>,
) -> Result<Json<Vec<Income>>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    get_incomes(user_id, &filter, &connection).map(Json)
}

/// Create an income entry, responding with 201 and the new entry.
pub async fn create_income_endpoint(
    State(state): State<IncomeState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Json(form), _): WithRejection<Json<IncomeForm>, Error>,
) -> Result<(StatusCode, Json<Income>), Error> {
    form.validate()?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let income = create_income(user_id, &form, &connection)?;

    Ok((StatusCode::CREATED, Json(income)))
}

/// Get a single income entry.
pub async fn get_income_endpoint(
    State(state): State<IncomeState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Path(income_id), _): WithRejection<Path<IncomeId>, Error>,
) -> Result<Json<Income>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    get_income(income_id, user_id, &connection).map(Json)
}

/// Replace an income entry.
pub async fn update_income_endpoint(
    State(state): State<IncomeState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Path(income_id), _): WithRejection<Path<IncomeId>, Error>,
    WithRejection(Json(form), _): WithRejection<Json<IncomeForm>, Error>,
) -> Result<Json<Income>, Error> {
    form.validate()?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    update_income(income_id, user_id, &form, &connection).map(Json)
}

/// Delete an income entry.
pub async fn delete_income_endpoint(
    State(state): State<IncomeState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Path(income_id), _): WithRejection<Path<IncomeId>, Error>,
) -> Result<StatusCode, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    delete_income(income_id, user_id, &connection)?;

    Ok(StatusCode::NO_CONTENT)
}
