//! Sample data for trying out the API against a fresh database.

use rusqlite::Connection;
use time::Date;

use crate::{
    Error, PasswordHash, ValidatedPassword,
    auth::{User, create_user},
    card::{CardForm, create_card},
    expense::{
        ExpenseForm, ExpenseKind, InstallmentPurchase, create_expense, create_installment_purchase,
    },
    income::{IncomeForm, create_income},
    investment::{InvestmentForm, create_investment},
    period::add_months,
};

/// The email address of the demo user.
pub const DEMO_EMAIL: &str = "demo@financeasy.com";
/// The password of the demo user.
pub const DEMO_PASSWORD: &str = "demonstracao123";

/// Create the demo user with a card, an installment purchase, a few expenses,
/// income and investments spread over the three months from `start`.
///
/// `hash_cost` is the bcrypt cost for the demo user's password. The records
/// are created one by one, each expense in its own SQL transaction.
///
/// # Errors
/// Returns [Error::DuplicateEmail] if the demo user already exists, or any
/// error from creating the records.
pub fn create_demo_data(
    start: Date,
    hash_cost: u32,
    connection: &Connection,
) -> Result<User, Error> {
    let user = create_user(
        "Usuário Demo",
        DEMO_EMAIL,
        PasswordHash::new(ValidatedPassword::new_unchecked(DEMO_PASSWORD), hash_cost)?,
        connection,
    )?;

    let card = create_card(
        user.id,
        &CardForm {
            nome: "Nubank".to_owned(),
            numero: "4321".to_owned(),
            limite: 5000.0,
            data_fechamento: 3,
            data_vencimento: 10,
        },
        connection,
    )?;

    create_installment_purchase(
        user.id,
        &InstallmentPurchase {
            descricao: "Notebook".to_owned(),
            valor: 3599.9,
            data: start,
            categoria: "Eletrônicos".to_owned(),
            cartao_id: card.id,
            parcelas: 10,
        },
        connection,
    )?;

    for month in 0..3 {
        let date = add_months(start, month)?;

        create_income(
            user.id,
            &IncomeForm {
                descricao: "Salário".to_owned(),
                valor: 6500.0,
                data: date,
                categoria: "Salário".to_owned(),
            },
            connection,
        )?;

        let expenses = [
            ("Aluguel", 1800.0, "Moradia", ExpenseKind::Conta),
            ("Conta de luz", 180.35, "Moradia", ExpenseKind::Conta),
            ("Supermercado", 742.18, "Alimentação", ExpenseKind::Cartao),
            ("Cinema", 64.0, "Lazer", ExpenseKind::Cartao),
        ];

        for (descricao, valor, categoria, tipo) in expenses {
            create_expense(
                user.id,
                &ExpenseForm {
                    descricao: descricao.to_owned(),
                    valor,
                    data: date,
                    tipo,
                    cartao_id: (tipo == ExpenseKind::Cartao).then_some(card.id),
                    fatura_id: None,
                    categoria: categoria.to_owned(),
                },
                connection,
            )?;
        }
    }

    for (tipo, nome, valor_aplicado, rendimento_mensal) in [
        ("CDB", "CDB Liquidez Diária", 10000.0, 0.95),
        ("Tesouro Direto", "Tesouro Selic 2029", 5000.0, 0.87),
        ("Ações", "Carteira de dividendos", 3000.0, 1.2),
    ] {
        create_investment(
            user.id,
            &InvestmentForm {
                tipo: tipo.to_owned(),
                nome: nome.to_owned(),
                valor_aplicado,
                rendimento_mensal,
            },
            connection,
        )?;
    }

    Ok(user)
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use time::macros::date;

    use crate::{Error, db::initialize};

    use super::{DEMO_EMAIL, create_demo_data};

    #[test]
    fn creates_demo_user_and_records() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let user = create_demo_data(date!(2025 - 01 - 15), 4, &conn).unwrap();

        assert_eq!(user.email, DEMO_EMAIL);
        let count = |table: &str| -> i64 {
            conn.query_row(
                &format!("SELECT COUNT(*) FROM {table} WHERE user_id = ?1"),
                [user.id.as_i64()],
                |row| row.get(0),
            )
            .unwrap()
        };
        assert_eq!(count("cartoes"), 1);
        assert_eq!(count("despesas"), 10 + 3 * 4);
        assert_eq!(count("receitas"), 3);
        assert_eq!(count("investimentos"), 3);
        assert_eq!(count("faturas"), 10);
    }

    #[test]
    fn running_twice_is_an_error() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        create_demo_data(date!(2025 - 01 - 15), 4, &conn).unwrap();

        assert_eq!(
            create_demo_data(date!(2025 - 01 - 15), 4, &conn).map(|user| user.id),
            Err(Error::DuplicateEmail)
        );
    }
}
