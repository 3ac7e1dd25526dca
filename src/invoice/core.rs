//! The invoice model, its database queries and the reconciliation of invoice totals.

use std::{fmt::Display, str::FromStr};

use rusqlite::{
    Connection, Row, params, params_from_iter,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    Error,
    auth::UserID,
    card::{Card, CardId, get_card},
    database_id::DatabaseId,
    period::{day_in_month, month_from_number},
};

/// The ID of an invoice in the database.
pub type InvoiceId = DatabaseId;

/// Where an invoice is in its payment cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    /// Still accepting purchases.
    #[default]
    Aberta,
    /// Closed and waiting for payment.
    Pendente,
    /// Paid in full.
    Paga,
    /// Past its due date without being paid.
    Vencida,
}

impl InvoiceStatus {
    /// The name used in JSON and in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Aberta => "aberta",
            InvoiceStatus::Pendente => "pendente",
            InvoiceStatus::Paga => "paga",
            InvoiceStatus::Vencida => "vencida",
        }
    }
}

impl Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aberta" => Ok(InvoiceStatus::Aberta),
            "pendente" => Ok(InvoiceStatus::Pendente),
            "paga" => Ok(InvoiceStatus::Paga),
            "vencida" => Ok(InvoiceStatus::Vencida),
            other => Err(Error::Validation(format!("Status de fatura inválido: {other}"))),
        }
    }
}

impl ToSql for InvoiceStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for InvoiceStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|_| FromSqlError::InvalidType)
    }
}

/// The monthly invoice of a card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invoice {
    /// The ID of the invoice.
    pub id: InvoiceId,
    /// The owner of the invoice.
    #[serde(rename = "userId")]
    pub user_id: UserID,
    /// The card the invoice belongs to.
    #[serde(rename = "cartaoId")]
    pub cartao_id: CardId,
    /// The month the invoice covers, 1 to 12.
    pub mes_referencia: u8,
    /// The year the invoice covers.
    pub ano_referencia: i32,
    /// The sum of the expenses charged to the invoice.
    pub valor_total: f64,
    /// Where the invoice is in its payment cycle.
    pub status: InvoiceStatus,
}

impl Invoice {
    /// The day the invoice is due: the card's due day in the reference month,
    /// or the last day of the month for short months.
    ///
    /// # Errors
    /// Returns [Error::Validation] if the reference month is invalid.
    pub fn due_date(&self, card: &Card) -> Result<Date, Error> {
        day_in_month(self.ano_referencia, self.mes_referencia, card.data_vencimento)
    }
}

fn default_total() -> f64 {
    0.0
}

/// The request body for creating an invoice.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewInvoice {
    /// The card the invoice belongs to.
    #[serde(rename = "cartaoId")]
    pub cartao_id: CardId,
    /// The month the invoice covers, 1 to 12.
    pub mes_referencia: u8,
    /// The year the invoice covers.
    pub ano_referencia: i32,
    /// The initial total, zero when omitted.
    #[serde(default = "default_total")]
    pub valor_total: f64,
    /// The initial status, `aberta` when omitted.
    #[serde(default)]
    pub status: InvoiceStatus,
}

impl NewInvoice {
    /// Check the reference month, year and total.
    ///
    /// # Errors
    /// Returns [Error::Validation] describing the first invalid field.
    pub fn validate(&self) -> Result<(), Error> {
        month_from_number(self.mes_referencia)?;
        validate_year(self.ano_referencia)?;
        validate_total(self.valor_total)
    }
}

/// The request body for updating an invoice, missing fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InvoiceUpdate {
    /// The new total.
    pub valor_total: Option<f64>,
    /// The new status.
    pub status: Option<InvoiceStatus>,
}

/// Filters for listing invoices.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct InvoiceFilter {
    /// Only include invoices for this month.
    pub mes: Option<u8>,
    /// Only include invoices for this year.
    pub ano: Option<i32>,
    /// Only include invoices with this status.
    pub status: Option<InvoiceStatus>,
}

fn validate_year(year: i32) -> Result<(), Error> {
    if !(1..=9999).contains(&year) {
        return Err(Error::Validation(format!("Ano inválido: {year}")));
    }

    Ok(())
}

fn validate_total(total: f64) -> Result<(), Error> {
    if !total.is_finite() || total < 0.0 {
        return Err(Error::Validation(
            "O valor total não pode ser negativo".to_owned(),
        ));
    }

    Ok(())
}

/// Create the invoice table.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_invoice_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS faturas (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            cartao_id INTEGER NOT NULL REFERENCES cartoes(id) ON DELETE CASCADE,
            mes_referencia INTEGER NOT NULL,
            ano_referencia INTEGER NOT NULL,
            valor_total REAL NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'aberta',
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(cartao_id, mes_referencia, ano_referencia)
        )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_faturas_user_period
         ON faturas(user_id, ano_referencia, mes_referencia);",
        (),
    )?;

    Ok(())
}

const INVOICE_COLUMNS: &str =
    "id, user_id, cartao_id, mes_referencia, ano_referencia, valor_total, status";

/// Map a database row to an [Invoice].
pub fn map_invoice_row(row: &Row) -> Result<Invoice, rusqlite::Error> {
    let id = row.get(0)?;
    let user_id = row.get(1)?;
    let cartao_id = row.get(2)?;
    let mes_referencia = row.get(3)?;
    let ano_referencia = row.get(4)?;
    let valor_total = row.get(5)?;
    let status = row.get(6)?;

    Ok(Invoice {
        id,
        user_id: UserID::new(user_id),
        cartao_id,
        mes_referencia,
        ano_referencia,
        valor_total,
        status,
    })
}

/// Create an invoice for one of the user's cards.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidCard] if the card does not belong to the user,
/// - [Error::DuplicateInvoice] if the card already has an invoice for the month,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_invoice(
    user_id: UserID,
    new_invoice: &NewInvoice,
    connection: &Connection,
) -> Result<Invoice, Error> {
    match get_card(new_invoice.cartao_id, user_id, connection) {
        Ok(_) => {}
        Err(Error::NotFound) => return Err(Error::InvalidCard(new_invoice.cartao_id)),
        Err(error) => return Err(error),
    }

    let invoice = connection
        .prepare(&format!(
            "INSERT INTO faturas (user_id, cartao_id, mes_referencia, ano_referencia, valor_total, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             RETURNING {INVOICE_COLUMNS}"
        ))?
        .query_row(
            params![
                user_id.as_i64(),
                new_invoice.cartao_id,
                new_invoice.mes_referencia,
                new_invoice.ano_referencia,
                new_invoice.valor_total,
                new_invoice.status
            ],
            map_invoice_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
                },
                _,
            ) => Error::DuplicateInvoice {
                card_id: new_invoice.cartao_id,
                month: new_invoice.mes_referencia,
                year: new_invoice.ano_referencia,
            },
            error => error.into(),
        })?;

    Ok(invoice)
}

/// Get the invoice `id` owned by `user_id`.
///
/// # Errors
/// Returns [Error::NotFound] if the invoice does not exist or belongs to another user.
pub fn get_invoice(id: InvoiceId, user_id: UserID, connection: &Connection) -> Result<Invoice, Error> {
    let invoice = connection
        .prepare(&format!(
            "SELECT {INVOICE_COLUMNS} FROM faturas WHERE id = ?1 AND user_id = ?2"
        ))?
        .query_one((id, user_id.as_i64()), map_invoice_row)?;

    Ok(invoice)
}

/// Get the user's invoices matching `filter`, newest first.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn get_invoices(
    user_id: UserID,
    filter: InvoiceFilter,
    connection: &Connection,
) -> Result<Vec<Invoice>, Error> {
    let mut where_clause_parts = vec!["user_id = ?1".to_owned()];
    let mut query_parameters = vec![Value::Integer(user_id.as_i64())];

    if let Some(month) = filter.mes {
        query_parameters.push(Value::Integer(month.into()));
        where_clause_parts.push(format!("mes_referencia = ?{}", query_parameters.len()));
    }

    if let Some(year) = filter.ano {
        query_parameters.push(Value::Integer(year.into()));
        where_clause_parts.push(format!("ano_referencia = ?{}", query_parameters.len()));
    }

    if let Some(status) = filter.status {
        query_parameters.push(Value::Text(status.as_str().to_owned()));
        where_clause_parts.push(format!("status = ?{}", query_parameters.len()));
    }

    let query_string = format!(
        "SELECT {INVOICE_COLUMNS} FROM faturas WHERE {} \
         ORDER BY ano_referencia DESC, mes_referencia DESC, id ASC",
        where_clause_parts.join(" AND ")
    );

    connection
        .prepare(&query_string)?
        .query_map(params_from_iter(query_parameters.iter()), map_invoice_row)?
        .map(|maybe_invoice| maybe_invoice.map_err(Error::from))
        .collect()
}

/// Get all of the invoices of one of the user's cards, newest first.
///
/// # Errors
/// Returns [Error::NotFound] if the card does not exist or belongs to another user.
pub fn get_card_invoices(
    card_id: CardId,
    user_id: UserID,
    connection: &Connection,
) -> Result<Vec<Invoice>, Error> {
    get_card(card_id, user_id, connection)?;

    connection
        .prepare(&format!(
            "SELECT {INVOICE_COLUMNS} FROM faturas WHERE cartao_id = ?1 AND user_id = ?2 \
             ORDER BY ano_referencia DESC, mes_referencia DESC"
        ))?
        .query_map((card_id, user_id.as_i64()), map_invoice_row)?
        .map(|maybe_invoice| maybe_invoice.map_err(Error::from))
        .collect()
}

/// Change the total and/or status of the invoice `id`.
///
/// # Errors
/// Returns [Error::NotFound] if the invoice does not exist or belongs to another user,
/// or [Error::Validation] if the new total is negative.
pub fn update_invoice(
    id: InvoiceId,
    user_id: UserID,
    update: &InvoiceUpdate,
    connection: &Connection,
) -> Result<Invoice, Error> {
    if let Some(total) = update.valor_total {
        validate_total(total)?;
    }

    let invoice = connection
        .prepare(&format!(
            "UPDATE faturas
             SET valor_total = COALESCE(?1, valor_total), status = COALESCE(?2, status)
             WHERE id = ?3 AND user_id = ?4
             RETURNING {INVOICE_COLUMNS}"
        ))?
        .query_one(
            params![update.valor_total, update.status, id, user_id.as_i64()],
            map_invoice_row,
        )?;

    Ok(invoice)
}

/// Delete the invoice `id`, expenses charged to it are unlinked but kept.
///
/// # Errors
/// Returns [Error::NotFound] if the invoice does not exist or belongs to another user.
pub fn delete_invoice(id: InvoiceId, user_id: UserID, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM faturas WHERE id = ?1 AND user_id = ?2",
        (id, user_id.as_i64()),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Get the card's invoice for `month` and `year`, creating an open invoice
/// with a zero total if there is none yet.
///
/// The caller must have checked that the card belongs to `user_id`.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn find_or_create_invoice(
    user_id: UserID,
    card_id: CardId,
    month: u8,
    year: i32,
    connection: &Connection,
) -> Result<Invoice, Error> {
    let existing = connection
        .prepare(&format!(
            "SELECT {INVOICE_COLUMNS} FROM faturas
             WHERE cartao_id = ?1 AND mes_referencia = ?2 AND ano_referencia = ?3"
        ))?
        .query_one((card_id, month, year), map_invoice_row);

    match existing {
        Ok(invoice) => return Ok(invoice),
        Err(rusqlite::Error::QueryReturnedNoRows) => {}
        Err(error) => return Err(error.into()),
    }

    tracing::debug!("Opening invoice {month:02}/{year} for card {card_id}");

    let invoice = connection
        .prepare(&format!(
            "INSERT INTO faturas (user_id, cartao_id, mes_referencia, ano_referencia, valor_total, status)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)
             RETURNING {INVOICE_COLUMNS}"
        ))?
        .query_row(
            params![user_id.as_i64(), card_id, month, year, InvoiceStatus::Aberta],
            map_invoice_row,
        )?;

    Ok(invoice)
}

/// Add `amount` to the total of the invoice `id`, which may be negative to
/// take an expense off. The total never drops below zero.
///
/// # Errors
/// Returns [Error::NotFound] if the invoice does not exist.
pub fn add_to_invoice_total(id: InvoiceId, amount: f64, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE faturas SET valor_total = MAX(ROUND(valor_total + ?1, 2), 0) WHERE id = ?2",
        (amount, id),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Set the total of the invoice `id` to the sum of the expenses charged to it
/// and return the new total.
///
/// # Errors
/// Returns [Error::NotFound] if the invoice does not exist.
pub fn recalculate_invoice_total(id: InvoiceId, connection: &Connection) -> Result<f64, Error> {
    let total = connection
        .prepare(
            "UPDATE faturas
             SET valor_total = (
                SELECT ROUND(COALESCE(SUM(valor), 0), 2) FROM despesas WHERE fatura_id = ?1
             )
             WHERE id = ?1
             RETURNING valor_total",
        )?
        .query_one([id], |row| row.get(0))?;

    Ok(total)
}
