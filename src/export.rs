//! Exports expenses and income as CSV files.

use std::sync::{Arc, Mutex};

use axum::{
    Extension,
    extract::{FromRef, Path, Query, State},
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use axum_extra::extract::WithRejection;
use csv::Writer;
use rusqlite::Connection;

use crate::{
    AppState, Error,
    auth::UserID,
    csv_import::RecordKind,
    expense::{Expense, ExpenseFilter, get_expenses},
    income::{Income, IncomeFilter, get_incomes},
    period::MonthQuery,
};

/// The state needed for exporting records.
#[derive(Debug, Clone)]
pub struct ExportState {
    /// The database connection for reading records.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for ExportState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Write expenses as CSV with the columns `descricao,valor,data,categoria,tipo`.
///
/// # Errors
/// Returns [Error::CsvWriteError] if the CSV cannot be written.
pub fn expenses_to_csv(expenses: &[Expense]) -> Result<String, Error> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(["descricao", "valor", "data", "categoria", "tipo"])?;

    for expense in expenses {
        let valor = format!("{:.2}", expense.valor);
        let data = expense.data.to_string();

        writer.write_record([
            expense.descricao.as_str(),
            valor.as_str(),
            data.as_str(),
            expense.categoria.as_str(),
            expense.tipo.as_str(),
        ])?;
    }

    finish(writer)
}

/// Write income as CSV with the columns `descricao,valor,data,categoria`.
///
/// # Errors
/// Returns [Error::CsvWriteError] if the CSV cannot be written.
pub fn income_to_csv(incomes: &[Income]) -> Result<String, Error> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(["descricao", "valor", "data", "categoria"])?;

    for income in incomes {
        let valor = format!("{:.2}", income.valor);
        let data = income.data.to_string();

        writer.write_record([
            income.descricao.as_str(),
            valor.as_str(),
            data.as_str(),
            income.categoria.as_str(),
        ])?;
    }

    finish(writer)
}

fn finish(writer: Writer<Vec<u8>>) -> Result<String, Error> {
    let bytes = writer
        .into_inner()
        .map_err(|error| Error::CsvWriteError(error.to_string()))?;

    String::from_utf8(bytes).map_err(|error| Error::CsvWriteError(error.to_string()))
}

fn file_name(kind: RecordKind, query: MonthQuery) -> String {
    match (query.mes, query.ano) {
        (Some(month), Some(year)) => format!("{kind}-{year}-{month:02}.csv"),
        (None, Some(year)) => format!("{kind}-{year}.csv"),
        _ => format!("{kind}.csv"),
    }
}

/// Download the user's expenses or income as a CSV attachment, optionally
/// limited to the month and/or year in the query string.
pub async fn export_records_endpoint(
    State(state): State<ExportState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Path(kind), _): WithRejection<Path<String>, Error>,
    WithRejection(Query(query), _): WithRejection<Query<MonthQuery>, Error>,
) -> Result<Response, Error> {
    let kind: RecordKind = kind.parse()?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let body = match kind {
        RecordKind::Despesas => {
            let filter = ExpenseFilter {
                mes: query.mes,
                ano: query.ano,
                categoria: None,
            };
            expenses_to_csv(&get_expenses(user_id, &filter, &connection)?)?
        }
        RecordKind::Receitas => {
            let filter = IncomeFilter {
                mes: query.mes,
                ano: query.ano,
                categoria: None,
            };
            income_to_csv(&get_incomes(user_id, &filter, &connection)?)?
        }
    };

    Ok((
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8".to_owned()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name(kind, query)),
            ),
        ],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use axum::http::{StatusCode, header::CONTENT_DISPOSITION};
    use time::macros::date;

    use crate::{
        endpoints::{self, format_endpoint},
        expense::{create_expense, test_expense_form},
        income::{create_income, test_income_form},
        test_utils::get_test_app,
    };

    #[tokio::test]
    async fn exports_expenses_for_the_month() {
        let app = get_test_app();
        {
            let connection = app.state.db_connection.lock().unwrap();
            let mut form = test_expense_form(1234.5, date!(2025 - 03 - 10));
            form.descricao = "Mercado, \"atacado\"".to_owned();
            create_expense(app.user_id, &form, &connection).unwrap();
            create_expense(
                app.user_id,
                &test_expense_form(10.0, date!(2025 - 04 - 10)),
                &connection,
            )
            .unwrap();
        }

        let response = app
            .server
            .get(&format_endpoint(endpoints::EXPORT, "despesas"))
            .add_query_param("mes", 3)
            .add_query_param("ano", 2025)
            .authorization_bearer(&app.token)
            .await;

        response.assert_status_ok();
        assert_eq!(
            response.header(CONTENT_DISPOSITION),
            "attachment; filename=\"despesas-2025-03.csv\""
        );
        assert_eq!(
            response.text(),
            "descricao,valor,data,categoria,tipo\n\
             \"Mercado, \"\"atacado\"\"\",1234.50,2025-03-10,Alimentação,conta\n"
        );
    }

    #[tokio::test]
    async fn exports_all_income_without_filters() {
        let app = get_test_app();
        {
            let connection = app.state.db_connection.lock().unwrap();
            create_income(
                app.user_id,
                &test_income_form(5000.0, date!(2024 - 12 - 05)),
                &connection,
            )
            .unwrap();
            create_income(
                app.user_id,
                &test_income_form(5100.0, date!(2025 - 01 - 05)),
                &connection,
            )
            .unwrap();
        }

        let response = app
            .server
            .get(&format_endpoint(endpoints::EXPORT, "receitas"))
            .authorization_bearer(&app.token)
            .await;

        response.assert_status_ok();
        assert_eq!(
            response.text(),
            "descricao,valor,data,categoria\n\
             Salário,5100.00,2025-01-05,Salário\n\
             Salário,5000.00,2024-12-05,Salário\n"
        );
    }

    #[tokio::test]
    async fn unknown_kind_is_bad_request() {
        let app = get_test_app();

        app.server
            .get(&format_endpoint(endpoints::EXPORT, "cartoes"))
            .authorization_bearer(&app.token)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}
