//! SQL aggregations of income and expenses for the dashboards.

use rusqlite::Connection;
use serde::Serialize;

use crate::{Error, auth::UserID, invoice::InvoiceStatus, period::DateRange};

/// The tables that hold dated amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Ledger {
    Expenses,
    Income,
}

impl Ledger {
    fn table(&self) -> &'static str {
        match self {
            Ledger::Expenses => "despesas",
            Ledger::Income => "receitas",
        }
    }
}

/// The total spent or received in a category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    /// The category name.
    pub categoria: String,
    /// The sum of the amounts in the category.
    pub total: f64,
}

/// The total spent or received on a day of the month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTotal {
    /// The day of the month, starting at 1.
    pub dia: u8,
    /// The sum of the amounts on that day.
    pub total: f64,
}

/// The sum of the user's amounts in `ledger` dated within `range`.
pub(super) fn sum_in_range(
    ledger: Ledger,
    user_id: UserID,
    range: DateRange,
    connection: &Connection,
) -> Result<f64, Error> {
    let total = connection
        .prepare(&format!(
            "SELECT ROUND(COALESCE(SUM(valor), 0), 2) FROM {}
             WHERE user_id = ?1 AND data BETWEEN ?2 AND ?3",
            ledger.table()
        ))?
        .query_one((user_id.as_i64(), range.start, range.end), |row| row.get(0))?;

    Ok(total)
}

/// Totals per category within `range`, largest first.
pub(super) fn totals_by_category(
    ledger: Ledger,
    user_id: UserID,
    range: DateRange,
    connection: &Connection,
) -> Result<Vec<CategoryTotal>, Error> {
    connection
        .prepare(&format!(
            "SELECT categoria, ROUND(SUM(valor), 2) AS total FROM {}
             WHERE user_id = ?1 AND data BETWEEN ?2 AND ?3
             GROUP BY categoria
             ORDER BY total DESC, categoria ASC",
            ledger.table()
        ))?
        .query_map((user_id.as_i64(), range.start, range.end), |row| {
            Ok(CategoryTotal {
                categoria: row.get(0)?,
                total: row.get(1)?,
            })
        })?
        .map(|maybe_total| maybe_total.map_err(Error::from))
        .collect()
}

/// Totals per day within `range`, in date order. Days without entries are left out.
pub(super) fn totals_by_day(
    ledger: Ledger,
    user_id: UserID,
    range: DateRange,
    connection: &Connection,
) -> Result<Vec<DailyTotal>, Error> {
    connection
        .prepare(&format!(
            "SELECT CAST(strftime('%d', data) AS INTEGER) AS dia, ROUND(SUM(valor), 2) FROM {}
             WHERE user_id = ?1 AND data BETWEEN ?2 AND ?3
             GROUP BY dia
             ORDER BY dia ASC",
            ledger.table()
        ))?
        .query_map((user_id.as_i64(), range.start, range.end), |row| {
            Ok(DailyTotal {
                dia: row.get(0)?,
                total: row.get(1)?,
            })
        })?
        .map(|maybe_total| maybe_total.map_err(Error::from))
        .collect()
}

/// Totals for each month of `range`, which should cover a single year.
///
/// Index 0 is January. Months without entries are zero.
pub(super) fn totals_by_month(
    ledger: Ledger,
    user_id: UserID,
    range: DateRange,
    connection: &Connection,
) -> Result<[f64; 12], Error> {
    let mut totals = [0.0; 12];

    let rows = connection
        .prepare(&format!(
            "SELECT CAST(strftime('%m', data) AS INTEGER) AS mes, ROUND(SUM(valor), 2) FROM {}
             WHERE user_id = ?1 AND data BETWEEN ?2 AND ?3
             GROUP BY mes",
            ledger.table()
        ))?
        .query_map((user_id.as_i64(), range.start, range.end), |row| {
            Ok((row.get::<_, u8>(0)?, row.get::<_, f64>(1)?))
        })?
        .collect::<Result<Vec<_>, rusqlite::Error>>()?;

    for (month, total) in rows {
        if let Some(slot) = usize::from(month)
            .checked_sub(1)
            .and_then(|index| totals.get_mut(index))
        {
            *slot = total;
        }
    }

    Ok(totals)
}

/// The sum of the user's `pendente` invoices for the reference month.
pub(super) fn pending_invoice_total(
    user_id: UserID,
    month: u8,
    year: i32,
    connection: &Connection,
) -> Result<f64, Error> {
    let total = connection
        .prepare(
            "SELECT ROUND(COALESCE(SUM(valor_total), 0), 2) FROM faturas
             WHERE user_id = ?1 AND mes_referencia = ?2 AND ano_referencia = ?3 AND status = ?4",
        )?
        .query_one(
            (user_id.as_i64(), month, year, InvoiceStatus::Pendente),
            |row| row.get(0),
        )?;

    Ok(total)
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use time::macros::date;

    use crate::{
        PasswordHash,
        auth::{UserID, create_user},
        db::initialize,
        expense::{create_expense, test_expense_form},
        income::{create_income, test_income_form},
        period::{month_bounds, year_bounds},
    };

    use super::{
        CategoryTotal, DailyTotal, Ledger, sum_in_range, totals_by_category, totals_by_day,
        totals_by_month,
    };

    fn get_test_connection() -> (Connection, UserID) {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        let user = create_user(
            "Ana",
            "ana@email.com",
            PasswordHash::new_unchecked("hunter2"),
            &conn,
        )
        .unwrap();

        (conn, user.id)
    }

    #[test]
    fn sums_only_the_requested_month() {
        let (conn, user_id) = get_test_connection();
        create_expense(user_id, &test_expense_form(10.0, date!(2025 - 02 - 28)), &conn).unwrap();
        create_expense(user_id, &test_expense_form(20.5, date!(2025 - 03 - 01)), &conn).unwrap();
        create_expense(user_id, &test_expense_form(30.25, date!(2025 - 03 - 31)), &conn).unwrap();
        create_expense(user_id, &test_expense_form(40.0, date!(2025 - 04 - 01)), &conn).unwrap();

        let total = sum_in_range(
            Ledger::Expenses,
            user_id,
            month_bounds(2025, 3).unwrap(),
            &conn,
        )
        .unwrap();

        assert_eq!(total, 50.75);
    }

    #[test]
    fn categories_are_ordered_by_total() {
        let (conn, user_id) = get_test_connection();
        let mut transport = test_expense_form(80.0, date!(2025 - 03 - 02));
        transport.categoria = "Transporte".to_owned();
        create_expense(user_id, &transport, &conn).unwrap();
        create_expense(user_id, &test_expense_form(50.0, date!(2025 - 03 - 03)), &conn).unwrap();
        create_expense(user_id, &test_expense_form(60.0, date!(2025 - 03 - 04)), &conn).unwrap();

        let totals = totals_by_category(
            Ledger::Expenses,
            user_id,
            month_bounds(2025, 3).unwrap(),
            &conn,
        )
        .unwrap();

        assert_eq!(
            totals,
            vec![
                CategoryTotal {
                    categoria: "Alimentação".to_owned(),
                    total: 110.0,
                },
                CategoryTotal {
                    categoria: "Transporte".to_owned(),
                    total: 80.0,
                },
            ]
        );
    }

    #[test]
    fn daily_totals_are_in_day_order() {
        let (conn, user_id) = get_test_connection();
        create_income(user_id, &test_income_form(100.0, date!(2025 - 03 - 20)), &conn).unwrap();
        create_income(user_id, &test_income_form(5.0, date!(2025 - 03 - 05)), &conn).unwrap();
        create_income(user_id, &test_income_form(7.0, date!(2025 - 03 - 05)), &conn).unwrap();

        let totals = totals_by_day(
            Ledger::Income,
            user_id,
            month_bounds(2025, 3).unwrap(),
            &conn,
        )
        .unwrap();

        assert_eq!(
            totals,
            vec![
                DailyTotal { dia: 5, total: 12.0 },
                DailyTotal {
                    dia: 20,
                    total: 100.0,
                },
            ]
        );
    }

    #[test]
    fn monthly_totals_fill_missing_months_with_zero() {
        let (conn, user_id) = get_test_connection();
        create_income(user_id, &test_income_form(100.0, date!(2025 - 01 - 10)), &conn).unwrap();
        create_income(user_id, &test_income_form(200.0, date!(2025 - 12 - 10)), &conn).unwrap();
        create_income(user_id, &test_income_form(999.0, date!(2024 - 12 - 10)), &conn).unwrap();

        let totals =
            totals_by_month(Ledger::Income, user_id, year_bounds(2025).unwrap(), &conn).unwrap();

        let mut want = [0.0; 12];
        want[0] = 100.0;
        want[11] = 200.0;
        assert_eq!(totals, want);
    }
}
