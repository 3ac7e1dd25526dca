//! Database schema initialization.

use rusqlite::Connection;

use crate::{
    Error,
    auth::create_user_table,
    card::create_card_table,
    expense::create_expense_table,
    income::create_income_table,
    investment::create_investment_table,
    invoice::create_invoice_table,
    settings::create_settings_table,
};

/// Create the application's tables if they do not exist.
///
/// All tables are created in a single SQL transaction, if any statement fails
/// nothing is created. Foreign key enforcement is switched on for
/// `connection`, since SQLite leaves it off by default and the cascade rules
/// between cards, invoices and expenses depend on it.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    connection.pragma_update(None, "foreign_keys", "ON")?;

    let transaction = connection.unchecked_transaction()?;

    create_user_table(&transaction)?;
    create_card_table(&transaction)?;
    create_invoice_table(&transaction)?;
    create_expense_table(&transaction)?;
    create_income_table(&transaction)?;
    create_investment_table(&transaction)?;
    create_settings_table(&transaction)?;

    transaction.commit()?;

    tracing::debug!("Database initialized successfully");

    Ok(())
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::initialize;

    #[test]
    fn initialize_creates_all_tables() {
        let connection = Connection::open_in_memory().unwrap();

        initialize(&connection).unwrap();

        let table_count: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                 ('users', 'cartoes', 'faturas', 'despesas', 'receitas', 'investimentos', 'configuracoes')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(table_count, 7);
    }

    #[test]
    fn initialize_is_idempotent() {
        let connection = Connection::open_in_memory().unwrap();

        initialize(&connection).unwrap();

        assert_eq!(initialize(&connection), Ok(()));
    }

    #[test]
    fn initialize_enables_foreign_keys() {
        let connection = Connection::open_in_memory().unwrap();

        initialize(&connection).unwrap();

        let enabled: i64 = connection
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }
}
