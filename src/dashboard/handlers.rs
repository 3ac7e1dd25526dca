//! Dashboard HTTP handlers.
//!
//! The monthly dashboard summarises a single month's income, expenses and
//! pending invoices, and the history endpoint lays out a whole year month by
//! month.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Query, State},
};
use axum_extra::extract::WithRejection;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    auth::UserID,
    dashboard::aggregation::{
        CategoryTotal, DailyTotal, Ledger, pending_invoice_total, sum_in_range,
        totals_by_category, totals_by_day, totals_by_month,
    },
    money::round_to_cents,
    period::{MonthQuery, month_bounds, resolve_month, year_bounds},
    timezone::local_today,
};

/// The state needed for the dashboards.
#[derive(Debug, Clone)]
pub struct DashboardState {
    /// The database connection for reading income, expenses and invoices.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The local timezone as a canonical timezone name, e.g. "America/Sao_Paulo".
    pub local_timezone: String,
}

impl FromRef<AppState> for DashboardState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

/// The summary of a single month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    /// The month number.
    pub mes: u8,
    /// The year.
    pub ano: i32,
    /// Income received in the month.
    pub receitas: f64,
    /// Money spent in the month.
    pub despesas: f64,
    /// The total of the month's invoices that are still pending.
    pub faturas_pendentes: f64,
    /// Income minus expenses.
    pub saldo: f64,
    /// Expenses per category, largest first.
    pub categorias_despesas: Vec<CategoryTotal>,
    /// Income per category, largest first.
    pub categorias_receitas: Vec<CategoryTotal>,
    /// Expenses per day of the month.
    pub despesas_diarias: Vec<DailyTotal>,
    /// Income per day of the month.
    pub receitas_diarias: Vec<DailyTotal>,
}

/// A year laid out month by month, January first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct History {
    /// The year.
    pub ano: i32,
    /// Income per month.
    pub receitas_mensais: [f64; 12],
    /// Expenses per month.
    pub despesas_mensais: [f64; 12],
    /// Income minus expenses per month.
    pub saldo_mensal: [f64; 12],
}

/// The query string for [get_history_endpoint].
#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct HistoryQuery {
    /// The year, defaults to the current local year.
    pub ano: Option<i32>,
}

pub(super) fn build_dashboard(
    user_id: UserID,
    month: u8,
    year: i32,
    connection: &Connection,
) -> Result<Dashboard, Error> {
    let range = month_bounds(year, month)?;

    let receitas = sum_in_range(Ledger::Income, user_id, range, connection)?;
    let despesas = sum_in_range(Ledger::Expenses, user_id, range, connection)?;

    Ok(Dashboard {
        mes: month,
        ano: year,
        receitas,
        despesas,
        faturas_pendentes: pending_invoice_total(user_id, month, year, connection)?,
        saldo: round_to_cents(receitas - despesas),
        categorias_despesas: totals_by_category(Ledger::Expenses, user_id, range, connection)?,
        categorias_receitas: totals_by_category(Ledger::Income, user_id, range, connection)?,
        despesas_diarias: totals_by_day(Ledger::Expenses, user_id, range, connection)?,
        receitas_diarias: totals_by_day(Ledger::Income, user_id, range, connection)?,
    })
}

pub(super) fn build_history(
    user_id: UserID,
    year: i32,
    connection: &Connection,
) -> Result<History, Error> {
    let range = year_bounds(year)?;

    let receitas_mensais = totals_by_month(Ledger::Income, user_id, range, connection)?;
    let despesas_mensais = totals_by_month(Ledger::Expenses, user_id, range, connection)?;

    let mut saldo_mensal = [0.0; 12];
    for (i, saldo) in saldo_mensal.iter_mut().enumerate() {
        *saldo = round_to_cents(receitas_mensais[i] - despesas_mensais[i]);
    }

    Ok(History {
        ano: year,
        receitas_mensais,
        despesas_mensais,
        saldo_mensal,
    })
}

/// Summarise a month, the current local month when `mes` or `ano` are omitted.
pub async fn get_dashboard_endpoint(
    State(state): State<DashboardState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Query(query), _): WithRejection<Query<MonthQuery>, Error>,
) -> Result<Json<Dashboard>, Error> {
    let today = local_today(&state.local_timezone)?;
    let (month, year) = resolve_month(query, today)?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    build_dashboard(user_id, month, year, &connection).map(Json)
}

/// Lay out a year month by month, the current local year when `ano` is omitted.
pub async fn get_history_endpoint(
    State(state): State<DashboardState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Query(query), _): WithRejection<Query<HistoryQuery>, Error>,
) -> Result<Json<History>, Error> {
    let year = match query.ano {
        Some(year) => year,
        None => local_today(&state.local_timezone)?.year(),
    };

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    build_history(user_id, year, &connection).map(Json)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{Value, json};
    use time::macros::date;

    use crate::{
        card::{create_card, test_card_form},
        endpoints,
        expense::{create_expense, test_expense_form},
        income::{create_income, test_income_form},
        invoice::{InvoiceStatus, InvoiceUpdate, find_or_create_invoice, update_invoice},
        test_utils::get_test_app,
    };

    use super::{build_dashboard, build_history};

    #[test]
    fn dashboard_counts_only_pending_invoices() {
        let app = get_test_app();
        let connection = app.state.db_connection.lock().unwrap();
        let card = create_card(app.user_id, &test_card_form(), &connection).unwrap();
        let march = find_or_create_invoice(app.user_id, card.id, 3, 2025, &connection).unwrap();
        let april = find_or_create_invoice(app.user_id, card.id, 4, 2025, &connection).unwrap();
        for (invoice, total) in [(march.id, 300.0), (april.id, 50.0)] {
            update_invoice(
                invoice,
                app.user_id,
                &InvoiceUpdate {
                    valor_total: Some(total),
                    status: Some(InvoiceStatus::Pendente),
                },
                &connection,
            )
            .unwrap();
        }
        // Open invoices are not pending.
        let other_card = create_card(app.user_id, &test_card_form(), &connection).unwrap();
        let open = find_or_create_invoice(app.user_id, other_card.id, 3, 2025, &connection).unwrap();
        update_invoice(
            open.id,
            app.user_id,
            &InvoiceUpdate {
                valor_total: Some(1000.0),
                status: None,
            },
            &connection,
        )
        .unwrap();

        let dashboard = build_dashboard(app.user_id, 3, 2025, &connection).unwrap();

        assert_eq!(dashboard.faturas_pendentes, 300.0);
    }

    #[test]
    fn dashboard_balance_is_income_minus_expenses() {
        let app = get_test_app();
        let connection = app.state.db_connection.lock().unwrap();
        create_income(
            app.user_id,
            &test_income_form(5000.0, date!(2025 - 03 - 05)),
            &connection,
        )
        .unwrap();
        create_expense(
            app.user_id,
            &test_expense_form(1234.56, date!(2025 - 03 - 10)),
            &connection,
        )
        .unwrap();

        let dashboard = build_dashboard(app.user_id, 3, 2025, &connection).unwrap();

        assert_eq!(dashboard.receitas, 5000.0);
        assert_eq!(dashboard.despesas, 1234.56);
        assert_eq!(dashboard.saldo, 3765.44);
        assert_eq!(dashboard.despesas_diarias.len(), 1);
        assert_eq!(dashboard.despesas_diarias[0].dia, 10);
    }

    #[test]
    fn history_has_twelve_months() {
        let app = get_test_app();
        let connection = app.state.db_connection.lock().unwrap();
        create_income(
            app.user_id,
            &test_income_form(100.0, date!(2025 - 06 - 01)),
            &connection,
        )
        .unwrap();
        create_expense(
            app.user_id,
            &test_expense_form(40.0, date!(2025 - 06 - 15)),
            &connection,
        )
        .unwrap();

        let history = build_history(app.user_id, 2025, &connection).unwrap();

        assert_eq!(history.receitas_mensais[5], 100.0);
        assert_eq!(history.despesas_mensais[5], 40.0);
        assert_eq!(history.saldo_mensal[5], 60.0);
        assert_eq!(history.saldo_mensal.iter().filter(|&&s| s != 0.0).count(), 1);
    }

    #[tokio::test]
    async fn dashboard_endpoint_for_empty_month() {
        let app = get_test_app();

        let response = app
            .server
            .get(endpoints::DASHBOARD)
            .add_query_param("mes", 2)
            .add_query_param("ano", 2024)
            .authorization_bearer(&app.token)
            .await;

        response.assert_status_ok();
        response.assert_json(&json!({
            "mes": 2,
            "ano": 2024,
            "receitas": 0.0,
            "despesas": 0.0,
            "faturas_pendentes": 0.0,
            "saldo": 0.0,
            "categorias_despesas": [],
            "categorias_receitas": [],
            "despesas_diarias": [],
            "receitas_diarias": [],
        }));
    }

    #[tokio::test]
    async fn dashboard_defaults_to_current_month() {
        let app = get_test_app();

        let response = app
            .server
            .get(endpoints::DASHBOARD)
            .authorization_bearer(&app.token)
            .await;

        response.assert_status_ok();
        let body = response.json::<Value>();
        let month = body["mes"].as_u64().unwrap();
        assert!((1..=12).contains(&month));
    }

    #[tokio::test]
    async fn invalid_month_is_bad_request() {
        let app = get_test_app();

        app.server
            .get(endpoints::DASHBOARD)
            .add_query_param("mes", 13)
            .authorization_bearer(&app.token)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn non_numeric_month_is_a_json_bad_request() {
        let app = get_test_app();

        let response = app
            .server
            .get(endpoints::DASHBOARD)
            .add_query_param("mes", "abc")
            .authorization_bearer(&app.token)
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.json::<Value>()["error"].is_string());
    }

    #[tokio::test]
    async fn history_endpoint_returns_twelve_months() {
        let app = get_test_app();

        let response = app
            .server
            .get(endpoints::DASHBOARD_HISTORY)
            .add_query_param("ano", 2025)
            .authorization_bearer(&app.token)
            .await;

        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["ano"], 2025);
        assert_eq!(body["receitas_mensais"].as_array().unwrap().len(), 12);
        assert_eq!(body["saldo_mensal"].as_array().unwrap().len(), 12);
    }
}
