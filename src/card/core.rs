//! The card model and its database queries.

use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

use crate::{Error, auth::UserID, database_id::DatabaseId};

/// The ID of a card in the database.
pub type CardId = DatabaseId;

/// A credit card belonging to a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Card {
    /// The ID of the card.
    pub id: CardId,
    /// The owner of the card.
    #[serde(rename = "userId")]
    pub user_id: UserID,
    /// A name to identify the card, e.g. "Nubank".
    pub nome: String,
    /// The last four digits of the card number.
    pub numero: String,
    /// The credit limit.
    pub limite: f64,
    /// The day of the month the invoice closes.
    pub data_fechamento: u8,
    /// The day of the month the invoice is due.
    pub data_vencimento: u8,
    /// When the card was added, in UTC.
    pub created_at: PrimitiveDateTime,
}

/// The request body for creating or replacing a card.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CardForm {
    /// A name to identify the card.
    pub nome: String,
    /// The last four digits of the card number.
    pub numero: String,
    /// The credit limit.
    pub limite: f64,
    /// The day of the month the invoice closes.
    pub data_fechamento: u8,
    /// The day of the month the invoice is due.
    pub data_vencimento: u8,
}

impl CardForm {
    /// Check the fields of the form.
    ///
    /// # Errors
    /// Returns [Error::Validation] describing the first invalid field.
    pub fn validate(&self) -> Result<(), Error> {
        if self.nome.trim().is_empty() {
            return Err(Error::Validation("O nome do cartão é obrigatório".to_owned()));
        }

        if self.numero.len() != 4 || !self.numero.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::Validation(
                "O número do cartão deve ter os 4 últimos dígitos".to_owned(),
            ));
        }

        if !self.limite.is_finite() || self.limite < 0.0 {
            return Err(Error::Validation(
                "O limite não pode ser negativo".to_owned(),
            ));
        }

        for (field, day) in [
            ("data_fechamento", self.data_fechamento),
            ("data_vencimento", self.data_vencimento),
        ] {
            if !(1..=31).contains(&day) {
                return Err(Error::Validation(format!(
                    "{field} deve ser um dia entre 1 e 31"
                )));
            }
        }

        Ok(())
    }
}

/// Create the card table.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_card_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS cartoes (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            nome TEXT NOT NULL,
            numero TEXT NOT NULL,
            limite REAL NOT NULL,
            data_fechamento INTEGER NOT NULL,
            data_vencimento INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_cartoes_user ON cartoes(user_id);",
        (),
    )?;

    Ok(())
}

/// Map a database row to a [Card].
pub fn map_card_row(row: &Row) -> Result<Card, rusqlite::Error> {
    let id = row.get(0)?;
    let user_id = row.get(1)?;
    let nome = row.get(2)?;
    let numero = row.get(3)?;
    let limite = row.get(4)?;
    let data_fechamento = row.get(5)?;
    let data_vencimento = row.get(6)?;
    let created_at = row.get(7)?;

    Ok(Card {
        id,
        user_id: UserID::new(user_id),
        nome,
        numero,
        limite,
        data_fechamento,
        data_vencimento,
        created_at,
    })
}

const CARD_COLUMNS: &str =
    "id, user_id, nome, numero, limite, data_fechamento, data_vencimento, created_at";

/// Insert a card for `user_id`.
///
/// The form should be validated by the caller.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn create_card(user_id: UserID, form: &CardForm, connection: &Connection) -> Result<Card, Error> {
    let card = connection
        .prepare(&format!(
            "INSERT INTO cartoes (user_id, nome, numero, limite, data_fechamento, data_vencimento)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             RETURNING {CARD_COLUMNS}"
        ))?
        .query_row(
            params![
                user_id.as_i64(),
                form.nome.trim(),
                form.numero,
                form.limite,
                form.data_fechamento,
                form.data_vencimento
            ],
            map_card_row,
        )?;

    Ok(card)
}

/// Get the card `id` owned by `user_id`.
///
/// # Errors
/// Returns [Error::NotFound] if the card does not exist or belongs to another user.
pub fn get_card(id: CardId, user_id: UserID, connection: &Connection) -> Result<Card, Error> {
    let card = connection
        .prepare(&format!(
            "SELECT {CARD_COLUMNS} FROM cartoes WHERE id = ?1 AND user_id = ?2"
        ))?
        .query_one((id, user_id.as_i64()), map_card_row)?;

    Ok(card)
}

/// Get all of the cards owned by `user_id`, ordered by name.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn get_cards(user_id: UserID, connection: &Connection) -> Result<Vec<Card>, Error> {
    connection
        .prepare(&format!(
            "SELECT {CARD_COLUMNS} FROM cartoes WHERE user_id = ?1 ORDER BY nome ASC, id ASC"
        ))?
        .query_map([user_id.as_i64()], map_card_row)?
        .map(|maybe_card| maybe_card.map_err(Error::from))
        .collect()
}

/// Replace the details of the card `id` owned by `user_id`.
///
/// # Errors
/// Returns [Error::NotFound] if the card does not exist or belongs to another user.
pub fn update_card(
    id: CardId,
    user_id: UserID,
    form: &CardForm,
    connection: &Connection,
) -> Result<Card, Error> {
    let card = connection
        .prepare(&format!(
            "UPDATE cartoes
             SET nome = ?1, numero = ?2, limite = ?3, data_fechamento = ?4, data_vencimento = ?5
             WHERE id = ?6 AND user_id = ?7
             RETURNING {CARD_COLUMNS}"
        ))?
        .query_one(
            params![
                form.nome.trim(),
                form.numero,
                form.limite,
                form.data_fechamento,
                form.data_vencimento,
                id,
                user_id.as_i64()
            ],
            map_card_row,
        )?;

    Ok(card)
}

/// Delete the card `id` owned by `user_id`.
///
/// The card's invoices are deleted with it and any expenses charged to the
/// card are kept, but are no longer linked to the card or an invoice.
///
/// # Errors
/// Returns [Error::NotFound] if the card does not exist or belongs to another user.
pub fn delete_card(id: CardId, user_id: UserID, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM cartoes WHERE id = ?1 AND user_id = ?2",
        (id, user_id.as_i64()),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

#[cfg(test)]
pub(crate) fn test_card_form() -> CardForm {
    CardForm {
        nome: "Nubank".to_owned(),
        numero: "1234".to_owned(),
        limite: 5000.0,
        data_fechamento: 3,
        data_vencimento: 10,
    }
}

#[cfg(test)]
mod validation_tests {
    use crate::Error;

    use super::test_card_form;

    #[test]
    fn valid_form_passes() {
        assert_eq!(test_card_form().validate(), Ok(()));
    }

    #[test]
    fn blank_name_fails() {
        let mut form = test_card_form();
        form.nome = "  ".to_owned();

        assert!(matches!(form.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn number_must_be_four_digits() {
        for numero in ["123", "12345", "12a4", ""] {
            let mut form = test_card_form();
            form.numero = numero.to_owned();

            assert!(
                matches!(form.validate(), Err(Error::Validation(_))),
                "want validation error for numero {numero:?}"
            );
        }
    }

    #[test]
    fn negative_limit_fails() {
        let mut form = test_card_form();
        form.limite = -0.01;

        assert!(matches!(form.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn days_must_be_in_month_range() {
        let mut form = test_card_form();
        form.data_fechamento = 0;
        assert!(matches!(form.validate(), Err(Error::Validation(_))));

        let mut form = test_card_form();
        form.data_vencimento = 32;
        assert!(matches!(form.validate(), Err(Error::Validation(_))));
    }
}

#[cfg(test)]
mod database_tests {
    use rusqlite::Connection;
    use time::OffsetDateTime;

    use crate::{
        Error, PasswordHash,
        auth::{UserID, create_user},
        db::initialize,
    };

    use super::{create_card, delete_card, get_card, get_cards, test_card_form, update_card};

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
    fn create_and_get_card() {
        let (conn, user_id) = get_test_connection();

        let card = create_card(user_id, &test_card_form(), &conn).unwrap();
        let got = get_card(card.id, user_id, &conn).unwrap();

        assert_eq!(card, got);
        assert_eq!(got.numero, "1234");
    }

    #[test]
    fn update_card_keeps_creation_time() {
        let (conn, user_id) = get_test_connection();
        let before = OffsetDateTime::now_utc().date();
        let card = create_card(user_id, &test_card_form(), &conn).unwrap();

        let updated = update_card(card.id, user_id, &test_card_form(), &conn).unwrap();

        assert!(card.created_at.date() >= before);
        assert_eq!(updated.created_at, card.created_at);
    }

    #[test]
    fn get_card_of_other_user_is_not_found() {
        let (conn, user_id) = get_test_connection();
        let other_user = create_user(
            "Bruno",
            "bruno@email.com",
            PasswordHash::new_unchecked("hunter2"),
            &conn,
        )
        .unwrap();
        let card = create_card(user_id, &test_card_form(), &conn).unwrap();

        assert_eq!(get_card(card.id, other_user.id, &conn), Err(Error::NotFound));
    }

    #[test]
    fn get_cards_only_returns_own_cards() {
        let (conn, user_id) = get_test_connection();
        let other_user = create_user(
            "Bruno",
            "bruno@email.com",
            PasswordHash::new_unchecked("hunter2"),
            &conn,
        )
        .unwrap();
        let want = create_card(user_id, &test_card_form(), &conn).unwrap();
        create_card(other_user.id, &test_card_form(), &conn).unwrap();

        let got = get_cards(user_id, &conn).unwrap();

        assert_eq!(got, vec![want]);
    }

    #[test]
    fn update_card_replaces_fields() {
        let (conn, user_id) = get_test_connection();
        let card = create_card(user_id, &test_card_form(), &conn).unwrap();
        let mut form = test_card_form();
        form.nome = "Inter".to_owned();
        form.limite = 1200.0;

        let updated = update_card(card.id, user_id, &form, &conn).unwrap();

        assert_eq!(updated.nome, "Inter");
        assert_eq!(updated.limite, 1200.0);
        assert_eq!(get_card(card.id, user_id, &conn).unwrap(), updated);
    }

    #[test]
    fn update_missing_card_is_not_found() {
        let (conn, user_id) = get_test_connection();

        assert_eq!(
            update_card(99, user_id, &test_card_form(), &conn),
            Err(Error::NotFound)
        );
    }

    #[test]
    fn delete_card_removes_it() {
        let (conn, user_id) = get_test_connection();
        let card = create_card(user_id, &test_card_form(), &conn).unwrap();

        delete_card(card.id, user_id, &conn).unwrap();

        assert_eq!(get_card(card.id, user_id, &conn), Err(Error::NotFound));
        assert_eq!(delete_card(card.id, user_id, &conn), Err(Error::NotFound));
    }
}
