//! Card purchases split into monthly installments.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, State},
    http::StatusCode,
};
use axum_extra::extract::WithRejection;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    AppState, Error,
    auth::UserID,
    card::{CardId, get_card},
    expense::core::{Expense, ExpenseForm, ExpenseKind, insert_expense_with_invoice, validate_entry},
    invoice::{Invoice, get_invoice},
    money::to_cents,
    period::add_months,
};

/// The most installments a purchase can be split into.
pub const MAX_INSTALLMENTS: u32 = 48;

/// The request body for a purchase split into installments.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstallmentPurchase {
    /// What was bought, each installment gets a "(n/total)" suffix.
    pub descricao: String,
    /// The full price of the purchase.
    pub valor: f64,
    /// The date of the purchase and of the first installment.
    pub data: Date,
    /// A free form category.
    pub categoria: String,
    /// The card the purchase was charged to.
    #[serde(rename = "cartaoId")]
    pub cartao_id: CardId,
    /// The number of monthly installments.
    pub parcelas: u32,
}

/// The expenses created for a purchase and the invoices they were billed on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallmentPurchaseResult {
    /// One expense per installment, in date order.
    pub despesas: Vec<Expense>,
    /// The invoices of the installments with their updated totals.
    pub faturas: Vec<Invoice>,
}

/// Split `total` into `count` amounts in whole cents.
///
/// Every installment is the total divided by `count` rounded down to the cent,
/// except the last which also takes the remainder, so the amounts always add
/// up to `total`.
pub fn split_amount(total: f64, count: u32) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }

    let total_cents = to_cents(total);
    let count = i64::from(count);
    let base = total_cents / count;
    let last = total_cents - base * (count - 1);

    (0..count)
        .map(|i| if i == count - 1 { last } else { base })
        .map(|cents| cents as f64 / 100.0)
        .collect()
}

impl InstallmentPurchase {
    /// Check the fields that do not need the database.
    ///
    /// # Errors
    /// Returns [Error::Validation] describing the first invalid field.
    pub fn validate(&self) -> Result<(), Error> {
        validate_entry(&self.descricao, self.valor, &self.categoria)?;

        if !(1..=MAX_INSTALLMENTS).contains(&self.parcelas) {
            return Err(Error::Validation(format!(
                "O número de parcelas deve estar entre 1 e {MAX_INSTALLMENTS}"
            )));
        }

        if to_cents(self.valor) < i64::from(self.parcelas) {
            return Err(Error::Validation(
                "Cada parcela deve ser de pelo menos R$ 0,01".to_owned(),
            ));
        }

        Ok(())
    }

    fn installment_description(&self, index: u32) -> String {
        let descricao = self.descricao.trim();

        if self.parcelas == 1 {
            descricao.to_owned()
        } else {
            format!("{descricao} ({}/{})", index + 1, self.parcelas)
        }
    }
}

/// Create one expense per installment, each billed on the card's invoice for
/// the month it falls in.
///
/// Installment `i` (from zero) is dated `i` months after the purchase, with
/// the day clamped to the end of shorter months. Missing invoices are opened.
/// Everything happens in one SQL transaction, so either every installment is
/// created or none are.
///
/// # Errors
/// This function will return a:
/// - [Error::Validation] if the purchase is invalid,
/// - [Error::InvalidCard] if the card does not belong to the user,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_installment_purchase(
    user_id: UserID,
    purchase: &InstallmentPurchase,
    connection: &Connection,
) -> Result<InstallmentPurchaseResult, Error> {
    purchase.validate()?;

    let transaction = connection.unchecked_transaction()?;

    match get_card(purchase.cartao_id, user_id, &transaction) {
        Ok(_) => {}
        Err(Error::NotFound) => return Err(Error::InvalidCard(purchase.cartao_id)),
        Err(error) => return Err(error),
    }

    let amounts = split_amount(purchase.valor, purchase.parcelas);
    let mut expenses = Vec::with_capacity(amounts.len());

    for (index, amount) in (0..purchase.parcelas).zip(amounts) {
        let form = ExpenseForm {
            descricao: purchase.installment_description(index),
            valor: amount,
            data: add_months(purchase.data, index)?,
            tipo: ExpenseKind::Cartao,
            cartao_id: Some(purchase.cartao_id),
            fatura_id: None,
            categoria: purchase.categoria.clone(),
        };

        expenses.push(insert_expense_with_invoice(user_id, &form, &transaction)?);
    }

    let mut invoices: Vec<Invoice> = Vec::new();
    for invoice_id in expenses.iter().filter_map(|expense| expense.fatura_id) {
        if invoices.iter().all(|invoice| invoice.id != invoice_id) {
            invoices.push(get_invoice(invoice_id, user_id, &transaction)?);
        }
    }

    transaction.commit()?;

    tracing::info!(
        "Created {} installments on card {} for user {user_id}",
        expenses.len(),
        purchase.cartao_id
    );

    Ok(InstallmentPurchaseResult {
        despesas: expenses,
        faturas: invoices,
    })
}

/// The state needed for creating installment purchases.
#[derive(Debug, Clone)]
pub struct InstallmentState {
    /// The database connection for creating expenses and invoices.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for InstallmentState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Route handler for purchases split into installments, responds with 201.
pub async fn create_installment_purchase_endpoint(
    State(state): State<InstallmentState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Json(purchase), _): WithRejection<Json<InstallmentPurchase>, Error>,
) -> Result<(StatusCode, Json<InstallmentPurchaseResult>), Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let result = create_installment_purchase(user_id, &purchase, &connection)?;

    Ok((StatusCode::CREATED, Json(result)))
}

#[cfg(test)]
mod split_amount_tests {
    use super::split_amount;

    #[test]
    fn even_split() {
        assert_eq!(split_amount(300.0, 3), vec![100.0, 100.0, 100.0]);
    }

    #[test]
    fn remainder_goes_on_last_installment() {
        assert_eq!(split_amount(100.0, 3), vec![33.33, 33.33, 33.34]);
    }

    #[test]
    fn amounts_add_up_to_total() {
        for (total, count) in [(1234.56, 7), (0.48, 48), (99.99, 12), (10.0, 1)] {
            let amounts = split_amount(total, count);
            let cents: i64 = amounts.iter().map(|a| (a * 100.0).round() as i64).sum();

            assert_eq!(amounts.len(), count as usize);
            assert_eq!(cents, (total * 100.0).round() as i64, "total {total} in {count}");
        }
    }

    #[test]
    fn zero_installments_is_empty() {
        assert!(split_amount(10.0, 0).is_empty());
    }
}

#[cfg(test)]
mod create_installment_purchase_tests {
    use rusqlite::Connection;
    use time::macros::date;

    use crate::{
        Error, PasswordHash,
        auth::{UserID, create_user},
        card::{Card, create_card, test_card_form},
        db::initialize,
        expense::core::{ExpenseKind, create_expense, test_expense_form},
        invoice::{InvoiceStatus, get_invoice},
    };

    use super::{InstallmentPurchase, create_installment_purchase};

    fn get_test_connection() -> (Connection, UserID, Card) {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        let user = create_user(
            "Ana",
            "ana@email.com",
            PasswordHash::new_unchecked("hunter2"),
            &conn,
        )
        .unwrap();
        let card = create_card(user.id, &test_card_form(), &conn).unwrap();

        (conn, user.id, card)
    }

    fn purchase(card: &Card, valor: f64, parcelas: u32) -> InstallmentPurchase {
        InstallmentPurchase {
            descricao: "Notebook".to_owned(),
            valor,
            data: date!(2025 - 11 - 30),
            categoria: "Eletrônicos".to_owned(),
            cartao_id: card.id,
            parcelas,
        }
    }

    fn count_rows(table: &str, conn: &Connection) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    #[test]
    fn creates_one_expense_and_invoice_per_month() {
        let (conn, user_id, card) = get_test_connection();

        let result = create_installment_purchase(user_id, &purchase(&card, 100.0, 3), &conn).unwrap();

        let descriptions: Vec<_> = result.despesas.iter().map(|e| e.descricao.as_str()).collect();
        assert_eq!(
            descriptions,
            ["Notebook (1/3)", "Notebook (2/3)", "Notebook (3/3)"]
        );
        let dates: Vec<_> = result.despesas.iter().map(|e| e.data).collect();
        assert_eq!(
            dates,
            [
                date!(2025 - 11 - 30),
                date!(2025 - 12 - 30),
                date!(2026 - 01 - 30)
            ]
        );
        let amounts: Vec<_> = result.despesas.iter().map(|e| e.valor).collect();
        assert_eq!(amounts, [33.33, 33.33, 33.34]);
        assert!(result.despesas.iter().all(|e| e.tipo == ExpenseKind::Cartao));

        let periods: Vec<_> = result
            .faturas
            .iter()
            .map(|f| (f.mes_referencia, f.ano_referencia, f.valor_total, f.status))
            .collect();
        assert_eq!(
            periods,
            [
                (11, 2025, 33.33, InvoiceStatus::Aberta),
                (12, 2025, 33.33, InvoiceStatus::Aberta),
                (1, 2026, 33.34, InvoiceStatus::Aberta),
            ]
        );
    }

    #[test]
    fn month_end_purchase_is_clamped_to_shorter_months() {
        let (conn, user_id, card) = get_test_connection();
        let form = InstallmentPurchase {
            data: date!(2025 - 01 - 31),
            ..purchase(&card, 90.0, 3)
        };

        let result = create_installment_purchase(user_id, &form, &conn).unwrap();

        let dates: Vec<_> = result.despesas.iter().map(|e| e.data).collect();
        assert_eq!(
            dates,
            [
                date!(2025 - 01 - 31),
                date!(2025 - 02 - 28),
                date!(2025 - 03 - 31)
            ]
        );
        let periods: Vec<_> = result
            .faturas
            .iter()
            .map(|f| (f.mes_referencia, f.ano_referencia))
            .collect();
        assert_eq!(periods, [(1, 2025), (2, 2025), (3, 2025)]);
    }

    #[test]
    fn single_installment_keeps_description() {
        let (conn, user_id, card) = get_test_connection();

        let result = create_installment_purchase(user_id, &purchase(&card, 80.0, 1), &conn).unwrap();

        assert_eq!(result.despesas.len(), 1);
        assert_eq!(result.despesas[0].descricao, "Notebook");
        assert_eq!(result.despesas[0].valor, 80.0);
    }

    #[test]
    fn installments_are_added_to_existing_invoice() {
        let (conn, user_id, card) = get_test_connection();
        let mut existing = test_expense_form(20.0, date!(2025 - 12 - 05));
        existing.tipo = ExpenseKind::Cartao;
        existing.cartao_id = Some(card.id);
        let existing = create_expense(user_id, &existing, &conn).unwrap();

        create_installment_purchase(user_id, &purchase(&card, 100.0, 2), &conn).unwrap();

        let december = get_invoice(existing.fatura_id.unwrap(), user_id, &conn).unwrap();
        assert_eq!(december.valor_total, 70.0);
        assert_eq!(count_rows("faturas", &conn), 2);
    }

    #[test]
    fn rejects_out_of_range_installments() {
        let (conn, user_id, card) = get_test_connection();

        for parcelas in [0, 49] {
            assert!(matches!(
                create_installment_purchase(user_id, &purchase(&card, 100.0, parcelas), &conn),
                Err(Error::Validation(_))
            ));
        }
        assert!(matches!(
            create_installment_purchase(user_id, &purchase(&card, 0.02, 3), &conn),
            Err(Error::Validation(_))
        ));
        assert_eq!(count_rows("despesas", &conn), 0);
    }

    #[test]
    fn rejects_card_of_other_user() {
        let (conn, user_id, card) = get_test_connection();
        let mut foreign = purchase(&card, 100.0, 3);
        foreign.cartao_id = card.id + 1;

        assert_eq!(
            create_installment_purchase(user_id, &foreign, &conn),
            Err(Error::InvalidCard(card.id + 1))
        );
        assert_eq!(count_rows("despesas", &conn), 0);
        assert_eq!(count_rows("faturas", &conn), 0);
    }

    #[test]
    fn failure_part_way_rolls_back_everything() {
        let (conn, user_id, card) = get_test_connection();
        // Fail the third installment's insert, after two invoices have been opened.
        conn.execute_batch(
            "CREATE TRIGGER fail_third_installment BEFORE INSERT ON despesas
             WHEN NEW.descricao LIKE '%(3/3)'
             BEGIN SELECT RAISE(ABORT, 'boom'); END;",
        )
        .unwrap();

        let result = create_installment_purchase(user_id, &purchase(&card, 90.0, 3), &conn);

        assert!(matches!(result, Err(Error::SqlError(_))));
        assert_eq!(count_rows("despesas", &conn), 0);
        assert_eq!(count_rows("faturas", &conn), 0);
    }
}
