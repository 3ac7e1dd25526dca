use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Multipart, Path, State, multipart::Field},
    http::StatusCode,
};
use axum_extra::extract::WithRejection;
use rusqlite::Connection;
use serde::Serialize;

use crate::{
    AppState, Error,
    auth::UserID,
    csv_import::parse::{ParsedRow, RecordKind, parse_csv},
    expense::{Expense, insert_expense_with_invoice},
    income::{Income, create_income},
};

/// The state needed for importing records.
#[derive(Debug, Clone)]
pub struct ImportState {
    /// The database connection for storing imported records.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for ImportState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A record created by an import.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ImportedRecord {
    /// An imported expense.
    Expense(Expense),
    /// An imported income entry.
    Income(Income),
}

/// The response body of a successful import.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportResult {
    /// The records created, in file and line order.
    pub registros_importados: Vec<ImportedRecord>,
}

/// Route handler for importing expenses or income from CSV files.
///
/// Every file is parsed before anything is stored, and all rows are inserted
/// in a single SQL transaction, so a bad row rejects the whole upload.
pub async fn import_records_endpoint(
    State(state): State<ImportState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Path(kind), _): WithRejection<Path<String>, Error>,
    WithRejection(mut multipart, _): WithRejection<Multipart, Error>,
) -> Result<(StatusCode, Json<ImportResult>), Error> {
    let start_time = std::time::Instant::now();
    let kind: RecordKind = kind.parse()?;
    let mut rows = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|error| {
        tracing::error!("Could not read multipart form: {error}");
        Error::MultipartError("Não foi possível ler o formulário enviado".to_owned())
    })? {
        let (file_name, text) = parse_multipart_field(field).await?;
        rows.extend(parse_csv(&text, kind, &file_name)?);
    }

    if rows.is_empty() {
        return Err(Error::Validation(
            "Nenhum registro encontrado nos arquivos enviados".to_owned(),
        ));
    }

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let transaction = connection
        .unchecked_transaction()
        .inspect_err(|error| tracing::error!("could not start transaction: {error}"))?;

    let records = import_rows(user_id, rows, &transaction)
        .inspect_err(|error| tracing::error!("Failed to import {kind}: {error}"))?;

    transaction
        .commit()
        .inspect_err(|error| tracing::error!("could not commit transaction: {error}"))?;

    tracing::info!(
        "Imported {} {kind} in {:.1}ms",
        records.len(),
        start_time.elapsed().as_millis()
    );

    Ok((
        StatusCode::CREATED,
        Json(ImportResult {
            registros_importados: records,
        }),
    ))
}

async fn parse_multipart_field(field: Field<'_>) -> Result<(String, String), Error> {
    let file_name = match field.file_name() {
        Some(file_name) => file_name.to_owned(),
        None => {
            tracing::error!("Could not get file name from multipart form field: {field:#?}");
            return Err(Error::MultipartError(
                "Não foi possível obter o nome do arquivo enviado".to_owned(),
            ));
        }
    };

    let is_csv = field.content_type() == Some("text/csv")
        || file_name.to_lowercase().ends_with(".csv");
    if !is_csv {
        return Err(Error::NotCSV);
    }

    let data = match field.text().await {
        Ok(data) => data,
        Err(error) => {
            tracing::error!("Could not read data from multipart form field: {error}");
            return Err(Error::MultipartError(
                "Não foi possível ler o arquivo enviado".to_owned(),
            ));
        }
    };

    tracing::debug!("Received file '{}' that is {} bytes", file_name, data.len());

    Ok((file_name, data))
}

/// Insert the parsed rows.
///
/// **Note**: pass in a transaction for `connection` to get all or nothing.
fn import_rows(
    user_id: UserID,
    rows: Vec<ParsedRow>,
    connection: &Connection,
) -> Result<Vec<ImportedRecord>, Error> {
    rows.into_iter()
        .map(|row| match row {
            ParsedRow::Expense(form) => {
                insert_expense_with_invoice(user_id, &form, connection).map(ImportedRecord::Expense)
            }
            ParsedRow::Income(form) => {
                create_income(user_id, &form, connection).map(ImportedRecord::Income)
            }
        })
        .collect()
}
