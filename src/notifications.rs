//! Alerts derived from the user's cards and invoices when requested.
//!
//! Nothing is stored: an alert disappears once the invoice is paid or the
//! card's used limit drops.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, State},
};
use rusqlite::Connection;
use serde::Serialize;
use time::{Date, format_description::BorrowedFormatItem, macros::format_description};

use crate::{
    AppState, Error,
    auth::UserID,
    card::{Card, get_cards, get_used_limit},
    invoice::{InvoiceStatus, get_card_invoices},
    money::format_brl,
    timezone::local_today,
};

/// The share of a card's limit at which a [NotificationKind::LimiteCartao] alert is raised.
pub const CARD_LIMIT_WARNING_RATIO: f64 = 0.8;

const DISPLAY_DATE_FORMAT: &[BorrowedFormatItem] = format_description!("[day]/[month]/[year]");

/// What an alert is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// An invoice is past its due date and has not been paid.
    FaturaVencida,
    /// A card is using most of its limit.
    LimiteCartao,
}

/// An alert shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// What the alert is about.
    pub tipo: NotificationKind,
    /// A short title.
    pub titulo: String,
    /// The details.
    pub mensagem: String,
}

fn card_label(card: &Card) -> String {
    format!("{} (final {})", card.nome, card.numero)
}

/// Compute the user's alerts as of `today`.
///
/// Overdue invoices come first, oldest due date first, followed by cards
/// near their limit.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn get_notifications(
    user_id: UserID,
    today: Date,
    connection: &Connection,
) -> Result<Vec<Notification>, Error> {
    let cards = get_cards(user_id, connection)?;

    let mut overdue = Vec::new();
    let mut near_limit = Vec::new();

    for card in &cards {
        for invoice in get_card_invoices(card.id, user_id, connection)? {
            if invoice.status == InvoiceStatus::Paga {
                continue;
            }

            let due_date = invoice.due_date(card)?;
            if due_date >= today {
                continue;
            }

            let formatted_due_date = due_date
                .format(DISPLAY_DATE_FORMAT)
                .unwrap_or_else(|_| due_date.to_string());

            overdue.push((
                due_date,
                Notification {
                    tipo: NotificationKind::FaturaVencida,
                    titulo: "Fatura vencida".to_owned(),
                    mensagem: format!(
                        "A fatura {:02}/{} do cartão {} venceu em {} e ainda não foi paga. Valor: {}.",
                        invoice.mes_referencia,
                        invoice.ano_referencia,
                        card_label(card),
                        formatted_due_date,
                        format_brl(invoice.valor_total),
                    ),
                },
            ));
        }

        let used_limit = get_used_limit(card.id, connection)?;
        if used_limit <= 0.0 || used_limit < card.limite * CARD_LIMIT_WARNING_RATIO {
            continue;
        }

        let mensagem = if card.limite > 0.0 {
            format!(
                "O cartão {} está usando {:.0}% do limite ({} de {}).",
                card_label(card),
                used_limit / card.limite * 100.0,
                format_brl(used_limit),
                format_brl(card.limite),
            )
        } else {
            format!(
                "O cartão {} não tem limite e já possui {} em faturas abertas.",
                card_label(card),
                format_brl(used_limit),
            )
        };

        near_limit.push(Notification {
            tipo: NotificationKind::LimiteCartao,
            titulo: "Limite do cartão".to_owned(),
            mensagem,
        });
    }

    overdue.sort_by_key(|(due_date, _)| *due_date);

    Ok(overdue
        .into_iter()
        .map(|(_, notification)| notification)
        .chain(near_limit)
        .collect())
}

/// The state needed for computing alerts.
#[derive(Debug, Clone)]
pub struct NotificationState {
    /// The database connection for reading cards and invoices.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The local timezone as a canonical timezone name, e.g. "America/Sao_Paulo".
    pub local_timezone: String,
}

impl FromRef<AppState> for NotificationState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

/// List the user's current alerts.
pub async fn get_notifications_endpoint(
    State(state): State<NotificationState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Json<Vec<Notification>>, Error> {
    let today = local_today(&state.local_timezone)?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    get_notifications(user_id, today, &connection).map(Json)
}
