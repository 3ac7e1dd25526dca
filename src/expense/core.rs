//! The expense model, its database queries and the bookkeeping that keeps
//! invoice totals in step with the expenses charged to them.

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
    card::{CardId, get_card},
    database_id::DatabaseId,
    invoice::{InvoiceId, add_to_invoice_total, find_or_create_invoice, get_invoice},
    period::{MonthQuery, push_period_conditions},
};

/// The ID of an expense in the database.
pub type ExpenseId = DatabaseId;

/// How an expense was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseKind {
    /// A bill or purchase paid directly.
    #[default]
    Conta,
    /// A purchase charged to a credit card.
    Cartao,
}

impl ExpenseKind {
    /// The name used in JSON, CSV and in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseKind::Conta => "conta",
            ExpenseKind::Cartao => "cartao",
        }
    }
}

impl Display for ExpenseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpenseKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "conta" => Ok(ExpenseKind::Conta),
            "cartao" | "cartão" => Ok(ExpenseKind::Cartao),
            other => Err(Error::Validation(format!("Tipo de despesa inválido: {other}"))),
        }
    }
}

impl ToSql for ExpenseKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for ExpenseKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|_| FromSqlError::InvalidType)
    }
}

/// Money spent by a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expense {
    /// The ID of the expense.
    pub id: ExpenseId,
    /// The owner of the expense.
    #[serde(rename = "userId")]
    pub user_id: UserID,
    /// What the money was spent on.
    pub descricao: String,
    /// The amount spent.
    pub valor: f64,
    /// When the money was spent.
    pub data: Date,
    /// How the expense was paid.
    pub tipo: ExpenseKind,
    /// The card a `cartao` expense was charged to.
    #[serde(rename = "cartaoId")]
    pub cartao_id: Option<CardId>,
    /// The invoice a `cartao` expense is billed on.
    #[serde(rename = "faturaId")]
    pub fatura_id: Option<InvoiceId>,
    /// A free form category, e.g. "Alimentação".
    pub categoria: String,
}

/// The request body for creating or replacing an expense.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExpenseForm {
    /// What the money was spent on.
    pub descricao: String,
    /// The amount spent.
    pub valor: f64,
    /// When the money was spent.
    pub data: Date,
    /// How the expense was paid, `conta` when omitted.
    #[serde(default)]
    pub tipo: ExpenseKind,
    /// The card for `cartao` expenses, ignored for `conta` expenses.
    #[serde(rename = "cartaoId", default)]
    pub cartao_id: Option<CardId>,
    /// The invoice for `cartao` expenses. When omitted the card's invoice for
    /// the month of `data` is used, and opened if needed.
    #[serde(rename = "faturaId", default)]
    pub fatura_id: Option<InvoiceId>,
    /// A free form category.
    pub categoria: String,
}

impl ExpenseForm {
    /// Check the fields that do not need the database.
    ///
    /// # Errors
    /// Returns [Error::Validation] describing the first invalid field.
    pub fn validate(&self) -> Result<(), Error> {
        validate_entry(&self.descricao, self.valor, &self.categoria)?;

        if self.tipo == ExpenseKind::Cartao && self.cartao_id.is_none() {
            return Err(Error::Validation(
                "Selecione o cartão da despesa".to_owned(),
            ));
        }

        Ok(())
    }
}

/// Check the description, amount and category shared by expenses and income.
///
/// # Errors
/// Returns [Error::Validation] describing the first invalid field.
pub fn validate_entry(descricao: &str, valor: f64, categoria: &str) -> Result<(), Error> {
    if descricao.trim().is_empty() {
        return Err(Error::Validation("A descrição é obrigatória".to_owned()));
    }

    if !valor.is_finite() || valor <= 0.0 {
        return Err(Error::Validation(
            "O valor deve ser maior que zero".to_owned(),
        ));
    }

    if categoria.trim().is_empty() {
        return Err(Error::Validation("A categoria é obrigatória".to_owned()));
    }

    Ok(())
}

/// Filters for listing expenses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpenseFilter {
    /// Only include expenses in this month.
    pub mes: Option<u8>,
    /// Only include expenses in this year.
    pub ano: Option<i32>,
    /// Only include expenses in this category.
    pub categoria: Option<String>,
}

/// Create the expense table.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_expense_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS despesas (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            descricao TEXT NOT NULL,
            valor REAL NOT NULL,
            data TEXT NOT NULL,
            tipo TEXT NOT NULL,
            cartao_id INTEGER REFERENCES cartoes(id) ON DELETE SET NULL,
            fatura_id INTEGER REFERENCES faturas(id) ON DELETE SET NULL,
            categoria TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_despesas_user_date ON despesas(user_id, data);",
        (),
    )?;
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_despesas_fatura ON despesas(fatura_id);",
        (),
    )?;

    Ok(())
}

/// The columns read by [map_expense_row], in order.
pub const EXPENSE_COLUMNS: &str =
    "id, user_id, descricao, valor, data, tipo, cartao_id, fatura_id, categoria";

/// Map a database row to an [Expense].
pub fn map_expense_row(row: &Row) -> Result<Expense, rusqlite::Error> {
    let id = row.get(0)?;
    let user_id = row.get(1)?;
    let descricao = row.get(2)?;
    let valor = row.get(3)?;
    let data = row.get(4)?;
    let tipo = row.get(5)?;
    let cartao_id = row.get(6)?;
    let fatura_id = row.get(7)?;
    let categoria = row.get(8)?;

    Ok(Expense {
        id,
        user_id: UserID::new(user_id),
        descricao,
        valor,
        data,
        tipo,
        cartao_id,
        fatura_id,
        categoria,
    })
}

/// The card and invoice an expense ends up linked to.
struct ResolvedLinks {
    cartao_id: Option<CardId>,
    fatura_id: Option<InvoiceId>,
}

/// Check that the card and invoice in `form` belong to the user, picking or
/// opening the card's invoice for the expense's month when none is given.
fn resolve_links(
    user_id: UserID,
    form: &ExpenseForm,
    connection: &Connection,
) -> Result<ResolvedLinks, Error> {
    let card_id = match (form.tipo, form.cartao_id) {
        (ExpenseKind::Conta, _) => {
            return Ok(ResolvedLinks {
                cartao_id: None,
                fatura_id: None,
            });
        }
        (ExpenseKind::Cartao, Some(card_id)) => card_id,
        (ExpenseKind::Cartao, None) => {
            return Err(Error::Validation(
                "Selecione o cartão da despesa".to_owned(),
            ));
        }
    };

    match get_card(card_id, user_id, connection) {
        Ok(_) => {}
        Err(Error::NotFound) => return Err(Error::InvalidCard(card_id)),
        Err(error) => return Err(error),
    }

    let invoice = match form.fatura_id {
        Some(invoice_id) => match get_invoice(invoice_id, user_id, connection) {
            Ok(invoice) if invoice.cartao_id == card_id => invoice,
            Ok(_) | Err(Error::NotFound) => return Err(Error::InvalidInvoice(invoice_id)),
            Err(error) => return Err(error),
        },
        None => find_or_create_invoice(
            user_id,
            card_id,
            form.data.month() as u8,
            form.data.year(),
            connection,
        )?,
    };

    Ok(ResolvedLinks {
        cartao_id: Some(card_id),
        fatura_id: Some(invoice.id),
    })
}

fn insert_expense(
    user_id: UserID,
    form: &ExpenseForm,
    links: &ResolvedLinks,
    connection: &Connection,
) -> Result<Expense, Error> {
    let expense = connection
        .prepare(&format!(
            "INSERT INTO despesas (user_id, descricao, valor, data, tipo, cartao_id, fatura_id, categoria)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             RETURNING {EXPENSE_COLUMNS}"
        ))?
        .query_row(
            params![
                user_id.as_i64(),
                form.descricao.trim(),
                form.valor,
                form.data,
                form.tipo,
                links.cartao_id,
                links.fatura_id,
                form.categoria.trim()
            ],
            map_expense_row,
        )?;

    Ok(expense)
}

/// Insert an expense and update the total of the invoice it is billed on.
///
/// The form should be validated by the caller. The caller should wrap this
/// in an SQL transaction when inserting several expenses at once.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidCard] if the card does not belong to the user,
/// - [Error::InvalidInvoice] if the invoice does not belong to the user or the card,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn insert_expense_with_invoice(
    user_id: UserID,
    form: &ExpenseForm,
    connection: &Connection,
) -> Result<Expense, Error> {
    let links = resolve_links(user_id, form, connection)?;
    let expense = insert_expense(user_id, form, &links, connection)?;

    if let Some(invoice_id) = expense.fatura_id {
        add_to_invoice_total(invoice_id, expense.valor, connection)?;
    }

    Ok(expense)
}

/// Create an expense in a single SQL transaction.
///
/// # Errors
/// See [insert_expense_with_invoice].
pub fn create_expense(
    user_id: UserID,
    form: &ExpenseForm,
    connection: &Connection,
) -> Result<Expense, Error> {
    let transaction = connection.unchecked_transaction()?;
    let expense = insert_expense_with_invoice(user_id, form, &transaction)?;
    transaction.commit()?;

    Ok(expense)
}

/// Get the expense `id` owned by `user_id`.
///
/// # Errors
/// Returns [Error::NotFound] if the expense does not exist or belongs to another user.
pub fn get_expense(id: ExpenseId, user_id: UserID, connection: &Connection) -> Result<Expense, Error> {
    let expense = connection
        .prepare(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM despesas WHERE id = ?1 AND user_id = ?2"
        ))?
        .query_one((id, user_id.as_i64()), map_expense_row)?;

    Ok(expense)
}

/// Get the user's expenses matching `filter`, newest first.
///
/// # Errors
/// Returns [Error::Validation] for an invalid month or [Error::SqlError] if there is an SQL error.
pub fn get_expenses(
    user_id: UserID,
    filter: &ExpenseFilter,
    connection: &Connection,
) -> Result<Vec<Expense>, Error> {
    let mut where_clause_parts = vec!["user_id = ?1".to_owned()];
    let mut query_parameters = vec![Value::Integer(user_id.as_i64())];

    push_period_conditions(
        "data",
        MonthQuery {
            mes: filter.mes,
            ano: filter.ano,
        },
        &mut where_clause_parts,
        &mut query_parameters,
    )?;

    if let Some(category) = &filter.categoria {
        query_parameters.push(Value::Text(category.clone()));
        where_clause_parts.push(format!("categoria = ?{}", query_parameters.len()));
    }

    let query_string = format!(
        "SELECT {EXPENSE_COLUMNS} FROM despesas WHERE {} ORDER BY data DESC, id DESC",
        where_clause_parts.join(" AND ")
    );

    connection
        .prepare(&query_string)?
        .query_map(params_from_iter(query_parameters.iter()), map_expense_row)?
        .map(|maybe_expense| maybe_expense.map_err(Error::from))
        .collect()
}

/// Replace the expense `id`, taking its old amount off the invoice it was
/// billed on and adding the new amount to the invoice it is now billed on.
///
/// # Errors
/// Returns [Error::NotFound] if the expense does not exist or belongs to
/// another user, otherwise see [insert_expense_with_invoice].
pub fn update_expense(
    id: ExpenseId,
    user_id: UserID,
    form: &ExpenseForm,
    connection: &Connection,
) -> Result<Expense, Error> {
    let transaction = connection.unchecked_transaction()?;

    let previous = get_expense(id, user_id, &transaction)?;
    let links = resolve_links(user_id, form, &transaction)?;

    let expense = transaction
        .prepare(&format!(
            "UPDATE despesas
             SET descricao = ?1, valor = ?2, data = ?3, tipo = ?4, cartao_id = ?5, fatura_id = ?6, categoria = ?7
             WHERE id = ?8 AND user_id = ?9
             RETURNING {EXPENSE_COLUMNS}"
        ))?
        .query_one(
            params![
                form.descricao.trim(),
                form.valor,
                form.data,
                form.tipo,
                links.cartao_id,
                links.fatura_id,
                form.categoria.trim(),
                id,
                user_id.as_i64()
            ],
            map_expense_row,
        )?;

    if let Some(invoice_id) = previous.fatura_id {
        add_to_invoice_total(invoice_id, -previous.valor, &transaction)?;
    }

    if let Some(invoice_id) = expense.fatura_id {
        add_to_invoice_total(invoice_id, expense.valor, &transaction)?;
    }

    transaction.commit()?;

    Ok(expense)
}

/// Delete the expense `id` and take its amount off its invoice's total.
///
/// # Errors
/// Returns [Error::NotFound] if the expense does not exist or belongs to another user.
pub fn delete_expense(id: ExpenseId, user_id: UserID, connection: &Connection) -> Result<(), Error> {
    let transaction = connection.unchecked_transaction()?;

    let expense = get_expense(id, user_id, &transaction)?;
    transaction.execute(
        "DELETE FROM despesas WHERE id = ?1 AND user_id = ?2",
        (id, user_id.as_i64()),
    )?;

    if let Some(invoice_id) = expense.fatura_id {
        add_to_invoice_total(invoice_id, -expense.valor, &transaction)?;
    }

    transaction.commit()?;

    Ok(())
}

#[cfg(test)]
pub(crate) fn test_expense_form(valor: f64, data: Date) -> ExpenseForm {
    ExpenseForm {
        descricao: "Mercado".to_owned(),
        valor,
        data,
        tipo: ExpenseKind::Conta,
        cartao_id: None,
        fatura_id: None,
        categoria: "Alimentação".to_owned(),
    }
}
