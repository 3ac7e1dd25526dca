//! Investments and the estimate of their monthly yield.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Path, State},
    http::StatusCode,
};
use axum_extra::extract::WithRejection;
use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};

use crate::{AppState, Error, auth::UserID, database_id::DatabaseId, money::round_to_cents};

/// The ID of an investment in the database.
pub type InvestmentId = DatabaseId;

/// Money a user has invested.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Investment {
    /// The ID of the investment.
    pub id: InvestmentId,
    /// The owner of the investment.
    #[serde(rename = "userId")]
    pub user_id: UserID,
    /// The kind of investment, e.g. "CDB" or "Tesouro Direto".
    pub tipo: String,
    /// A name to identify the investment.
    pub nome: String,
    /// The amount invested.
    pub valor_aplicado: f64,
    /// The expected yield per month, as a percentage.
    pub rendimento_mensal: f64,
}

/// The request body for creating or replacing an investment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InvestmentForm {
    /// The kind of investment.
    pub tipo: String,
    /// A name to identify the investment.
    pub nome: String,
    /// The amount invested.
    pub valor_aplicado: f64,
    /// The expected yield per month, as a percentage.
    pub rendimento_mensal: f64,
}

impl InvestmentForm {
    /// Check the fields of the form.
    ///
    /// # Errors
    /// Returns [Error::Validation] describing the first invalid field.
    pub fn validate(&self) -> Result<(), Error> {
        if self.tipo.trim().is_empty() {
            return Err(Error::Validation(
                "O tipo do investimento é obrigatório".to_owned(),
            ));
        }

        if self.nome.trim().is_empty() {
            return Err(Error::Validation(
                "O nome do investimento é obrigatório".to_owned(),
            ));
        }

        if !self.valor_aplicado.is_finite() || self.valor_aplicado < 0.0 {
            return Err(Error::Validation(
                "O valor aplicado não pode ser negativo".to_owned(),
            ));
        }

        if !self.rendimento_mensal.is_finite() || self.rendimento_mensal < -100.0 {
            return Err(Error::Validation(
                "O rendimento mensal é inválido".to_owned(),
            ));
        }

        Ok(())
    }
}

/// The totals across all of a user's investments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvestmentSummary {
    /// The sum of the amounts invested.
    pub total_aplicado: f64,
    /// The sum of each investment's amount times its monthly yield.
    pub rendimento_mensal_estimado: f64,
    /// The investments the totals were computed from.
    pub investimentos: Vec<Investment>,
}

/// Create the investment table.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_investment_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS investimentos (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            tipo TEXT NOT NULL,
            nome TEXT NOT NULL,
            valor_aplicado REAL NOT NULL,
            rendimento_mensal REAL NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        (),
    )?;

    Ok(())
}

const INVESTMENT_COLUMNS: &str = "id, user_id, tipo, nome, valor_aplicado, rendimento_mensal";

fn map_investment_row(row: &Row) -> Result<Investment, rusqlite::Error> {
    Ok(Investment {
        id: row.get(0)?,
        user_id: UserID::new(row.get(1)?),
        tipo: row.get(2)?,
        nome: row.get(3)?,
        valor_aplicado: row.get(4)?,
        rendimento_mensal: row.get(5)?,
    })
}

/// Insert an investment for `user_id`.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn create_investment(
    user_id: UserID,
    form: &InvestmentForm,
    connection: &Connection,
) -> Result<Investment, Error> {
    let investment = connection
        .prepare(&format!(
            "INSERT INTO investimentos (user_id, tipo, nome, valor_aplicado, rendimento_mensal)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING {INVESTMENT_COLUMNS}"
        ))?
        .query_row(
            params![
                user_id.as_i64(),
                form.tipo.trim(),
                form.nome.trim(),
                form.valor_aplicado,
                form.rendimento_mensal
            ],
            map_investment_row,
        )?;

    Ok(investment)
}

/// Get the investment `id` owned by `user_id`.
///
/// # Errors
/// Returns [Error::NotFound] if the investment does not exist or belongs to another user.
pub fn get_investment(
    id: InvestmentId,
    user_id: UserID,
    connection: &Connection,
) -> Result<Investment, Error> {
    let investment = connection
        .prepare(&format!(
            "SELECT {INVESTMENT_COLUMNS} FROM investimentos WHERE id = ?1 AND user_id = ?2"
        ))?
        .query_one((id, user_id.as_i64()), map_investment_row)?;

    Ok(investment)
}

/// Get all of the user's investments, largest first.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn get_investments(user_id: UserID, connection: &Connection) -> Result<Vec<Investment>, Error> {
    connection
        .prepare(&format!(
            "SELECT {INVESTMENT_COLUMNS} FROM investimentos WHERE user_id = ?1
             ORDER BY valor_aplicado DESC, id ASC"
        ))?
        .query_map([user_id.as_i64()], map_investment_row)?
        .map(|maybe_investment| maybe_investment.map_err(Error::from))
        .collect()
}

/// Replace the investment `id`.
///
/// # Errors
/// Returns [Error::NotFound] if the investment does not exist or belongs to another user.
pub fn update_investment(
    id: InvestmentId,
    user_id: UserID,
    form: &InvestmentForm,
    connection: &Connection,
) -> Result<Investment, Error> {
    let investment = connection
        .prepare(&format!(
            "UPDATE investimentos SET tipo = ?1, nome = ?2, valor_aplicado = ?3, rendimento_mensal = ?4
             WHERE id = ?5 AND user_id = ?6
             RETURNING {INVESTMENT_COLUMNS}"
        ))?
        .query_one(
            params![
                form.tipo.trim(),
                form.nome.trim(),
                form.valor_aplicado,
                form.rendimento_mensal,
                id,
                user_id.as_i64()
            ],
            map_investment_row,
        )?;

    Ok(investment)
}

/// Delete the investment `id`.
///
/// # Errors
/// Returns [Error::NotFound] if the investment does not exist or belongs to another user.
pub fn delete_investment(
    id: InvestmentId,
    user_id: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM investimentos WHERE id = ?1 AND user_id = ?2",
        (id, user_id.as_i64()),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Total the user's investments and estimate their combined monthly yield.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn get_investment_summary(
    user_id: UserID,
    connection: &Connection,
) -> Result<InvestmentSummary, Error> {
    let investments = get_investments(user_id, connection)?;

    let total_aplicado: f64 = investments.iter().map(|i| i.valor_aplicado).sum();
    let rendimento_mensal_estimado: f64 = investments
        .iter()
        .map(|i| i.valor_aplicado * i.rendimento_mensal / 100.0)
        .sum();

    Ok(InvestmentSummary {
        total_aplicado: round_to_cents(total_aplicado),
        rendimento_mensal_estimado: round_to_cents(rendimento_mensal_estimado),
        investimentos: investments,
    })
}

/// The state needed by the investment routes.
#[derive(Debug, Clone)]
pub struct InvestmentState {
    /// The database connection for managing investments.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for InvestmentState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// List the user's investments.
pub async fn list_investments_endpoint(
    State(state): State<InvestmentState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Json<Vec<Investment>>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    get_investments(user_id, &connection).map(Json)
}

/// Create an investment, responding with 201 and the new investment.
pub async fn create_investment_endpoint(
    State(state): State<InvestmentState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Json(form), _): WithRejection<Json<InvestmentForm>, Error>,
) -> Result<(StatusCode, Json<Investment>), Error> {
    form.validate()?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let investment = create_investment(user_id, &form, &connection)?;

    Ok((StatusCode::CREATED, Json(investment)))
}

/// Get a single investment.
pub async fn get_investment_endpoint(
    State(state): State<InvestmentState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Path(investment_id), _): WithRejection<Path<InvestmentId>, Error>,
) -> Result<Json<Investment>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    get_investment(investment_id, user_id, &connection).map(Json)
}

/// Replace an investment.
pub async fn update_investment_endpoint(
    State(state): State<InvestmentState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Path(investment_id), _): WithRejection<Path<InvestmentId>, Error>,
    WithRejection(Json(form), _): WithRejection<Json<InvestmentForm>, Error>,
) -> Result<Json<Investment>, Error> {
    form.validate()?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    update_investment(investment_id, user_id, &form, &connection).map(Json)
}

/// Delete an investment.
pub async fn delete_investment_endpoint(
    State(state): State<InvestmentState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Path(investment_id), _): WithRejection<Path<InvestmentId>, Error>,
) -> Result<StatusCode, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    delete_investment(investment_id, user_id, &connection)?;

    Ok(StatusCode::NO_CONTENT)
}

/// The totals across all of the user's investments.
pub async fn get_investment_summary_endpoint(
    State(state): State<InvestmentState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Json<InvestmentSummary>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    get_investment_summary(user_id, &connection).map(Json)
}


#[cfg(test)]
mod endpoint_tests {
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    use crate::{
        endpoints::{self, format_endpoint},
        test_utils::get_test_app,
    };

    #[tokio::test]
    async fn create_list_and_summarise() {
        let app = get_test_app();

        let response = app
            .server
            .post(endpoints::INVESTMENTS)
            .authorization_bearer(&app.token)
            .json(&json!({
                "tipo": "CDB",
                "nome": "CDB 110%",
                "valor_aplicado": 2000.0,
                "rendimento_mensal": 1.5,
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let investment = response.json::<Value>();

        let response = app
            .server
            .get(endpoints::INVESTMENT_SUMMARY)
            .authorization_bearer(&app.token)
            .await;
        response.assert_status_ok();
        response.assert_json(&json!({
            "total_aplicado": 2000.0,
            "rendimento_mensal_estimado": 30.0,
            "investimentos": [investment],
        }));

        app.server
            .get(&format_endpoint(endpoints::INVESTMENT, &investment["id"]))
            .authorization_bearer(&app.token)
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn other_users_investment_is_not_found() {
        let app = get_test_app();
        let investment = app
            .server
            .post(endpoints::INVESTMENTS)
            .authorization_bearer(&app.token)
            .json(&json!({
                "tipo": "CDB",
                "nome": "CDB 110%",
                "valor_aplicado": 2000.0,
                "rendimento_mensal": 1.5,
            }))
            .await
            .json::<Value>();
        let (_, other_token) = app.add_user("outro@email.com");

        app.server
            .put(&format_endpoint(endpoints::INVESTMENT, &investment["id"]))
            .authorization_bearer(&other_token)
            .json(&json!({
                "tipo": "CDB",
                "nome": "Roubado",
                "valor_aplicado": 1.0,
                "rendimento_mensal": 1.0,
            }))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
