//! The card summary: how much of the limit is used and the card's invoices.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Path, State},
};
use axum_extra::extract::WithRejection;
use rusqlite::Connection;
use serde::Serialize;

use crate::{
    AppState, Error,
    auth::UserID,
    card::core::{Card, CardId, get_card},
    invoice::{Invoice, InvoiceStatus, get_card_invoices},
    money::round_to_cents,
};

/// A card with its used and available limit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardSummary {
    /// The card.
    pub cartao: Card,
    /// The sum of the card's unpaid invoices.
    pub limite_utilizado: f64,
    /// The limit minus the used limit, may be negative.
    pub limite_disponivel: f64,
    /// All of the card's invoices, newest first.
    pub faturas: Vec<Invoice>,
}

/// The sum of the totals of the card's invoices that have not been paid.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn get_used_limit(card_id: CardId, connection: &Connection) -> Result<f64, Error> {
    let used_limit = connection
        .prepare(
            "SELECT ROUND(COALESCE(SUM(valor_total), 0), 2) FROM faturas
             WHERE cartao_id = ?1 AND status != ?2",
        )?
        .query_one((card_id, InvoiceStatus::Paga), |row| row.get(0))?;

    Ok(used_limit)
}

/// Summarise one of the user's cards.
///
/// # Errors
/// Returns [Error::NotFound] if the card does not exist or belongs to another user.
pub fn get_card_summary(
    card_id: CardId,
    user_id: UserID,
    connection: &Connection,
) -> Result<CardSummary, Error> {
    let card = get_card(card_id, user_id, connection)?;
    let limite_utilizado = get_used_limit(card.id, connection)?;
    let faturas = get_card_invoices(card.id, user_id, connection)?;

    Ok(CardSummary {
        limite_disponivel: round_to_cents(card.limite - limite_utilizado),
        cartao: card,
        limite_utilizado,
        faturas,
    })
}

/// The state needed for the card summary.
#[derive(Debug, Clone)]
pub struct CardSummaryState {
    /// The database connection for reading cards and invoices.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for CardSummaryState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Route handler for the card summary.
pub async fn get_card_summary_endpoint(
    State(state): State<CardSummaryState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Path(card_id), _): WithRejection<Path<CardId>, Error>,
) -> Result<Json<CardSummary>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    get_card_summary(card_id, user_id, &connection).map(Json)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use rusqlite::Connection;
    use serde_json::Value;

    use crate::{
        Error, PasswordHash,
        auth::create_user,
        card::core::{create_card, test_card_form},
        db::initialize,
        endpoints::{self, format_endpoint},
        invoice::{InvoiceStatus, InvoiceUpdate, add_to_invoice_total, find_or_create_invoice, update_invoice},
        test_utils::get_test_app,
    };

    use super::{get_card_summary, get_used_limit};

    #[test]
    fn used_limit_ignores_paid_invoices() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        let user = create_user("Ana", "ana@email.com", PasswordHash::new_unchecked("x"), &conn)
            .unwrap();
        let card = create_card(user.id, &test_card_form(), &conn).unwrap();
        let open = find_or_create_invoice(user.id, card.id, 1, 2025, &conn).unwrap();
        let paid = find_or_create_invoice(user.id, card.id, 2, 2025, &conn).unwrap();
        add_to_invoice_total(open.id, 300.0, &conn).unwrap();
        add_to_invoice_total(paid.id, 200.0, &conn).unwrap();
        update_invoice(
            paid.id,
            user.id,
            &InvoiceUpdate {
                valor_total: None,
                status: Some(InvoiceStatus::Paga),
            },
            &conn,
        )
        .unwrap();

        assert_eq!(get_used_limit(card.id, &conn).unwrap(), 300.0);

        let summary = get_card_summary(card.id, user.id, &conn).unwrap();
        assert_eq!(summary.limite_utilizado, 300.0);
        assert_eq!(summary.limite_disponivel, 4700.0);
        assert_eq!(summary.faturas.len(), 2);
    }

    #[test]
    fn summary_of_missing_card_is_not_found() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        let user = create_user("Ana", "ana@email.com", PasswordHash::new_unchecked("x"), &conn)
            .unwrap();

        assert_eq!(get_card_summary(1, user.id, &conn), Err(Error::NotFound));
    }

    #[tokio::test]
    async fn summary_endpoint_returns_card_and_limits() {
        let app = get_test_app();
        let card = app
            .server
            .post(endpoints::CARDS)
            .authorization_bearer(&app.token)
            .json(&test_card_form())
            .await
            .json::<Value>();

        let response = app
            .server
            .get(&format_endpoint(endpoints::CARD_SUMMARY, &card["id"]))
            .authorization_bearer(&app.token)
            .await;

        response.assert_status(StatusCode::OK);
        let summary = response.json::<Value>();
        assert_eq!(summary["cartao"], card);
        assert_eq!(summary["limite_utilizado"], 0.0);
        assert_eq!(summary["limite_disponivel"], 5000.0);
        assert_eq!(summary["faturas"], Value::Array(vec![]));
    }
}
