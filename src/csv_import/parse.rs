//! Parses uploaded CSV files into expense and income forms.
//!
//! The first row must be a header naming the columns `descricao`, `valor`,
//! `data` and `categoria`, in any order and any letter case. Expense files may
//! also have `tipo` and `cartaoId` columns.

use std::{fmt::Display, str::FromStr};

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use time::{Date, format_description::BorrowedFormatItem, macros::format_description};

use crate::{
    Error,
    card::CardId,
    expense::{ExpenseForm, ExpenseKind},
    income::IncomeForm,
};

/// The kinds of records that can be imported from or exported to CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// Expenses.
    Despesas,
    /// Income.
    Receitas,
}

impl RecordKind {
    /// The name used in URLs and file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Despesas => "despesas",
            RecordKind::Receitas => "receitas",
        }
    }
}

impl Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "despesas" => Ok(RecordKind::Despesas),
            "receitas" => Ok(RecordKind::Receitas),
            other => Err(Error::Validation(format!(
                "Tipo de registro inválido \"{other}\", use despesas ou receitas"
            ))),
        }
    }
}

/// A row parsed from a CSV file, ready to be inserted.
#[derive(Debug, Clone)]
pub enum ParsedRow {
    /// A row of an expense file.
    Expense(ExpenseForm),
    /// A row of an income file.
    Income(IncomeForm),
}

const ISO_DATE_FORMAT: &[BorrowedFormatItem] = format_description!("[year]-[month]-[day]");
const BRAZILIAN_DATE_FORMAT: &[BorrowedFormatItem] = format_description!("[day]/[month]/[year]");

/// The positions of the known columns in the header row.
struct Columns {
    descricao: usize,
    valor: usize,
    data: usize,
    categoria: usize,
    tipo: Option<usize>,
    cartao_id: Option<usize>,
}

impl Columns {
    fn from_header(header: &StringRecord) -> Result<Self, Error> {
        let names: Vec<String> = header
            .iter()
            .map(|name| name.trim_start_matches('\u{feff}').trim().to_lowercase())
            .collect();
        let find = |wanted: &str| names.iter().position(|name| name == wanted);
        let require = |wanted: &str| {
            find(wanted).ok_or_else(|| {
                Error::InvalidCSV(format!("Coluna obrigatória ausente: {wanted}"))
            })
        };

        Ok(Self {
            descricao: require("descricao")?,
            valor: require("valor")?,
            data: require("data")?,
            categoria: require("categoria")?,
            tipo: find("tipo"),
            cartao_id: find("cartaoid").or_else(|| find("cartao_id")),
        })
    }
}

/// Parse the CSV `text` into one row per non-blank line.
///
/// `file_name` is only used in error messages.
///
/// # Errors
/// Returns [Error::InvalidCSV] naming the file and line of the first row that
/// cannot be parsed or fails validation.
pub fn parse_csv(text: &str, kind: RecordKind, file_name: &str) -> Result<Vec<ParsedRow>, Error> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let header = reader
        .headers()
        .map_err(|error| Error::InvalidCSV(format!("{file_name}: cabeçalho inválido: {error}")))?
        .clone();
    let columns = Columns::from_header(&header)
        .map_err(|error| Error::InvalidCSV(format!("{file_name}: {}", client_message(error))))?;

    let mut rows = Vec::new();

    for result in reader.records() {
        let record = result.map_err(|error| {
            let line = error.position().map_or(0, |position| position.line());
            Error::InvalidCSV(format!("{file_name}, linha {line}: {error}"))
        })?;

        if record.iter().all(str::is_empty) {
            continue;
        }

        let line = record.position().map_or(0, |position| position.line());
        let row = parse_record(&record, &columns, kind).map_err(|error| {
            Error::InvalidCSV(format!("{file_name}, linha {line}: {}", client_message(error)))
        })?;

        rows.push(row);
    }

    tracing::debug!("Parsed {} {kind} from '{file_name}'", rows.len());

    Ok(rows)
}

fn client_message(error: Error) -> String {
    match error {
        Error::Validation(message) | Error::InvalidCSV(message) => message,
        error => error.to_string(),
    }
}

fn parse_record(
    record: &StringRecord,
    columns: &Columns,
    kind: RecordKind,
) -> Result<ParsedRow, Error> {
    let field = |index: usize| record.get(index).unwrap_or_default();

    let descricao = field(columns.descricao).to_owned();
    let valor = parse_amount(field(columns.valor))?;
    let data = parse_date(field(columns.data))?;
    let categoria = field(columns.categoria).to_owned();

    match kind {
        RecordKind::Despesas => {
            let tipo = match columns.tipo.map(field) {
                Some(tipo) if !tipo.is_empty() => tipo.parse()?,
                _ => ExpenseKind::Conta,
            };
            let cartao_id = match columns.cartao_id.map(field) {
                Some(id) if !id.is_empty() => Some(id.parse::<CardId>().map_err(|_| {
                    Error::Validation(format!("Cartão inválido \"{id}\""))
                })?),
                _ => None,
            };

            let form = ExpenseForm {
                descricao,
                valor,
                data,
                tipo,
                cartao_id,
                fatura_id: None,
                categoria,
            };
            form.validate()?;

            Ok(ParsedRow::Expense(form))
        }
        RecordKind::Receitas => {
            let form = IncomeForm {
                descricao,
                valor,
                data,
                categoria,
            };
            form.validate()?;

            Ok(ParsedRow::Income(form))
        }
    }
}

/// Parse an amount written as `1234.56` or in the Brazilian style `1.234,56`.
///
/// An optional `R$` prefix is ignored. A comma is always the decimal
/// separator, so mixed styles such as `1,234.56` are rejected.
///
/// # Errors
/// Returns [Error::Validation] if `text` is not a number.
pub fn parse_amount(text: &str) -> Result<f64, Error> {
    let cleaned: String = text
        .trim()
        .trim_start_matches("R$")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    let invalid = || Error::Validation(format!("Valor inválido \"{text}\""));

    let normalized = match cleaned.split_once(',') {
        Some((_, decimals)) if decimals.contains([',', '.']) => return Err(invalid()),
        Some((whole, decimals)) => format!("{}.{decimals}", whole.replace('.', "")),
        None => cleaned.clone(),
    };

    normalized
        .parse::<f64>()
        .ok()
        .filter(|amount| amount.is_finite())
        .ok_or_else(invalid)
}

/// Parse a date written as `YYYY-MM-DD` or `DD/MM/YYYY`.
///
/// # Errors
/// Returns [Error::Validation] if `text` is not a date in either format.
pub fn parse_date(text: &str) -> Result<Date, Error> {
    Date::parse(text, ISO_DATE_FORMAT)
        .or_else(|_| Date::parse(text, BRAZILIAN_DATE_FORMAT))
        .map_err(|_| Error::Validation(format!("Data inválida \"{text}\"")))
}
