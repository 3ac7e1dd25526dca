//! Calendar month helpers shared by the list filters, dashboards and installments.

use rusqlite::types::Value;
use serde::Deserialize;
use time::{Date, Month};

use crate::Error;

/// The query string that selects a calendar month, e.g. `?mes=3&ano=2025`.
///
/// Missing values default to the current local month and year.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct MonthQuery {
    /// The month number, 1 to 12.
    pub mes: Option<u8>,
    /// The four digit year.
    pub ano: Option<i32>,
}

/// An inclusive range of dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    /// The first day in the range.
    pub start: Date,
    /// The last day in the range.
    pub end: Date,
}

/// Resolve the month and year in `query`, falling back to the month containing `today`.
///
/// # Errors
/// Returns [Error::Validation] if the month is not between 1 and 12.
pub fn resolve_month(query: MonthQuery, today: Date) -> Result<(u8, i32), Error> {
    let month = query.mes.unwrap_or(today.month() as u8);
    let year = query.ano.unwrap_or(today.year());

    month_from_number(month)?;

    Ok((month, year))
}

/// Convert a month number (1 = January) into a [Month].
///
/// # Errors
/// Returns [Error::Validation] if `number` is not between 1 and 12.
pub fn month_from_number(number: u8) -> Result<Month, Error> {
    Month::try_from(number).map_err(|_| Error::Validation(format!("Mês inválido: {number}")))
}

/// The first and last day of `month` in `year`.
///
/// # Errors
/// Returns [Error::Validation] if the month or year is out of range.
pub fn month_bounds(year: i32, month: u8) -> Result<DateRange, Error> {
    let month = month_from_number(month)?;
    let start = calendar_date(year, month, 1)?;
    let end = calendar_date(year, month, last_day_of_month(year, month))?;

    Ok(DateRange { start, end })
}

/// The first and last day of `year`.
///
/// # Errors
/// Returns [Error::Validation] if the year is out of range.
pub fn year_bounds(year: i32) -> Result<DateRange, Error> {
    Ok(DateRange {
        start: calendar_date(year, Month::January, 1)?,
        end: calendar_date(year, Month::December, 31)?,
    })
}

/// Move `date` forward by `months` calendar months.
///
/// The day of the month is kept where possible and otherwise clamped to the
/// last day of the target month, so 31 January plus one month is 28 (or 29)
/// February.
///
/// # Errors
/// Returns [Error::Validation] if the resulting year is out of range.
pub fn add_months(date: Date, months: u32) -> Result<Date, Error> {
    let month_index = date.month() as i64 - 1 + months as i64;
    let year = date.year() as i64 + month_index.div_euclid(12);
    let month = (month_index.rem_euclid(12) + 1) as u8;

    let year = i32::try_from(year)
        .map_err(|_| Error::Validation(format!("Ano fora do intervalo: {year}")))?;

    day_in_month(year, month, date.day())
}

/// The date with `day` in the given month, clamped to the month's last day.
///
/// Used for card closing and due days, which are stored as plain day numbers.
///
/// # Errors
/// Returns [Error::Validation] if the month or year is out of range.
pub fn day_in_month(year: i32, month: u8, day: u8) -> Result<Date, Error> {
    let month = month_from_number(month)?;
    let day = day.clamp(1, last_day_of_month(year, month));

    calendar_date(year, month, day)
}

/// Append SQL conditions that keep the rows whose date `column` falls in the
/// month and/or year selected by `query`, pushing the matching parameters.
///
/// Unlike [resolve_month], missing values do not default to today: with no
/// month and no year nothing is appended, with only a month every year's
/// instance of that month matches.
///
/// # Errors
/// Returns [Error::Validation] if the month is not between 1 and 12.
pub fn push_period_conditions(
    column: &str,
    query: MonthQuery,
    where_clause_parts: &mut Vec<String>,
    query_parameters: &mut Vec<Value>,
) -> Result<(), Error> {
    let range = match (query.mes, query.ano) {
        (Some(month), Some(year)) => Some(month_bounds(year, month)?),
        (None, Some(year)) => Some(year_bounds(year)?),
        (Some(month), None) => {
            month_from_number(month)?;
            query_parameters.push(Value::Text(format!("{month:02}")));
            where_clause_parts.push(format!(
                "strftime('%m', {column}) = ?{}",
                query_parameters.len()
            ));
            None
        }
        (None, None) => None,
    };

    if let Some(range) = range {
        query_parameters.push(Value::Text(range.start.to_string()));
        query_parameters.push(Value::Text(range.end.to_string()));
        where_clause_parts.push(format!(
            "{column} BETWEEN ?{} AND ?{}",
            query_parameters.len() - 1,
            query_parameters.len()
        ));
    }

    Ok(())
}

fn last_day_of_month(year: i32, month: Month) -> u8 {
    match month {
        Month::January
        | Month::March
        | Month::May
        | Month::July
        | Month::August
        | Month::October
        | Month::December => 31,
        Month::April | Month::June | Month::September | Month::November => 30,
        Month::February if is_leap_year(year) => 29,
        Month::February => 28,
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

fn calendar_date(year: i32, month: Month, day: u8) -> Result<Date, Error> {
    Date::from_calendar_date(year, month, day)
        .map_err(|_| Error::Validation(format!("Data inválida: {day}/{}/{year}", month as u8)))
}
