//! The income model and its database queries.

use rusqlite::{Connection, Row, params, params_from_iter, types::Value};
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    Error,
    auth::UserID,
    database_id::DatabaseId,
    expense::validate_entry,
    period::{MonthQuery, push_period_conditions},
};

/// The ID of an income entry in the database.
pub type IncomeId = DatabaseId;

/// Money received by a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Income {
    /// The ID of the income entry.
    pub id: IncomeId,
    /// The owner of the income.
    #[serde(rename = "userId")]
    pub user_id: UserID,
    /// Where the money came from.
    pub descricao: String,
    /// The amount received.
    pub valor: f64,
    /// When the money was received.
    pub data: Date,
    /// A free form category, e.g. "Salário".
    pub categoria: String,
}

/// The request body for creating or replacing an income entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IncomeForm {
    /// Where the money came from.
    pub descricao: String,
    /// The amount received.
    pub valor: f64,
    /// When the money was received.
    pub data: Date,
    /// A free form category.
    pub categoria: String,
}

impl IncomeForm {
    /// Check the fields of the form.
    ///
    /// # Errors
    /// Returns [Error::Validation] describing the first invalid field.
    pub fn validate(&self) -> Result<(), Error> {
        validate_entry(&self.descricao, self.valor, &self.categoria)
    }
}

/// Filters for listing income.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncomeFilter {
    /// Only include income in this month.
    pub mes: Option<u8>,
    /// Only include income in this year.
    pub ano: Option<i32>,
    /// Only include income in this category.
    pub categoria: Option<String>,
}

/// Create the income table.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_income_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS receitas (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            descricao TEXT NOT NULL,
            valor REAL NOT NULL,
            data TEXT NOT NULL,
            categoria TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_receitas_user_date ON receitas(user_id, data);",
        (),
    )?;

    Ok(())
}

/// The columns read by [map_income_row], in order.
pub const INCOME_COLUMNS: &str = "id, user_id, descricao, valor, data, categoria";

/// Map a database row to an [Income].
pub fn map_income_row(row: &Row) -> Result<Income, rusqlite::Error> {
    let id = row.get(0)?;
    let user_id = row.get(1)?;
    let descricao = row.get(2)?;
    let valor = row.get(3)?;
    let data = row.get(4)?;
    let categoria = row.get(5)?;

    Ok(Income {
        id,
        user_id: UserID::new(user_id),
        descricao,
        valor,
        data,
        categoria,
    })
}

/// Insert an income entry for `user_id`.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn create_income(
    user_id: UserID,
    form: &IncomeForm,
    connection: &Connection,
) -> Result<Income, Error> {
    let income = connection
        .prepare(&format!(
            "INSERT INTO receitas (user_id, descricao, valor, data, categoria)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING {INCOME_COLUMNS}"
        ))?
        .query_row(
            params![
                user_id.as_i64(),
                form.descricao.trim(),
                form.valor,
                form.data,
                form.categoria.trim()
            ],
            map_income_row,
        )?;

    Ok(income)
}

/// Get the income entry `id` owned by `user_id`.
///
/// # Errors
/// Returns [Error::NotFound] if the entry does not exist or belongs to another user.
pub fn get_income(id: IncomeId, user_id: UserID, connection: &Connection) -> Result<Income, Error> {
    let income = connection
        .prepare(&format!(
            "SELECT {INCOME_COLUMNS} FROM receitas WHERE id = ?1 AND user_id = ?2"
        ))?
        .query_one((id, user_id.as_i64()), map_income_row)?;

    Ok(income)
}

/// Get the user's income matching `filter`, newest first.
///
/// # Errors
/// Returns [Error::Validation] for an invalid month or [Error::SqlError] if there is an SQL error.
pub fn get_incomes(
    user_id: UserID,
    filter: &IncomeFilter,
    connection: &Connection,
) -> Result<Vec<Income>, Error> {
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
        "SELECT {INCOME_COLUMNS} FROM receitas WHERE {} ORDER BY data DESC, id DESC",
        where_clause_parts.join(" AND ")
    );

    connection
        .prepare(&query_string)?
        .query_map(params_from_iter(query_parameters.iter()), map_income_row)?
        .map(|maybe_income| maybe_income.map_err(Error::from))
        .collect()
}

/// Replace the income entry `id`.
///
/// # Errors
/// Returns [Error::NotFound] if the entry does not exist or belongs to another user.
pub fn update_income(
    id: IncomeId,
    user_id: UserID,
    form: &IncomeForm,
    connection: &Connection,
) -> Result<Income, Error> {
    let income = connection
        .prepare(&format!(
            "UPDATE receitas SET descricao = ?1, valor = ?2, data = ?3, categoria = ?4
             WHERE id = ?5 AND user_id = ?6
             RETURNING {INCOME_COLUMNS}"
        ))?
        .query_one(
            params![
                form.descricao.trim(),
                form.valor,
                form.data,
                form.categoria.trim(),
                id,
                user_id.as_i64()
            ],
            map_income_row,
        )?;

    Ok(income)
}

/// Delete the income entry `id`.
///
/// # Errors
/// Returns [Error::NotFound] if the entry does not exist or belongs to another user.
pub fn delete_income(id: IncomeId, user_id: UserID, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM receitas WHERE id = ?1 AND user_id = ?2",
        (id, user_id.as_i64()),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

#[cfg(test)]
pub(crate) fn test_income_form(valor: f64, data: Date) -> IncomeForm {
    IncomeForm {
        descricao: "Salário".to_owned(),
        valor,
        data,
        categoria: "Salário".to_owned(),
    }
}
