//! Route handlers for invoices.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
};
use axum_extra::extract::WithRejection;
use rusqlite::Connection;

use crate::{
    AppState, Error,
    auth::UserID,
    card::CardId,
    invoice::core::{
        Invoice, InvoiceFilter, InvoiceId, InvoiceUpdate, NewInvoice, create_invoice,
        delete_invoice, get_card_invoices, get_invoice, get_invoices, recalculate_invoice_total,
        update_invoice,
    },
};

/// The state needed by the invoice routes.
#[derive(Debug, Clone)]
pub struct InvoiceState {
    /// The database connection for managing invoices.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for InvoiceState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// List the user's invoices, optionally filtered by `mes`, `ano` and `status`.
pub async fn list_invoices_endpoint(
    State(state): State<InvoiceState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Query(filter), _): WithRejection<Query<InvoiceFilter>, Error>,
) -> Result<Json<Vec<Invoice>>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    get_invoices(user_id, filter, &connection).map(Json)
}

/// List the invoices of one card.
pub async fn list_card_invoices_endpoint(
    State(state): State<InvoiceState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Path(card_id), _): WithRejection<Path<CardId>, Error>,
) -> Result<Json<Vec<Invoice>>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    get_card_invoices(card_id, user_id, &connection).map(Json)
}

/// Create an invoice, responding with 201 and the new invoice.
pub async fn create_invoice_endpoint(
    State(state): State<InvoiceState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Json(new_invoice), _): WithRejection<Json<NewInvoice>, Error>,
) -> Result<(StatusCode, Json<Invoice>), Error> {
    new_invoice.validate()?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let invoice = create_invoice(user_id, &new_invoice, &connection)?;

    Ok((StatusCode::CREATED, Json(invoice)))
}

/// Get a single invoice.
pub async fn get_invoice_endpoint(
    State(state): State<InvoiceState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Path(invoice_id), _): WithRejection<Path<InvoiceId>, Error>,
) -> Result<Json<Invoice>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    get_invoice(invoice_id, user_id, &connection).map(Json)
}

/// Change the total or status of an invoice.
pub async fn update_invoice_endpoint(
    State(state): State<InvoiceState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Path(invoice_id), _): WithRejection<Path<InvoiceId>, Error>,
    WithRejection(Json(update), _): WithRejection<Json<InvoiceUpdate>, Error>,
) -> Result<Json<Invoice>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    update_invoice(invoice_id, user_id, &update, &connection).map(Json)
}

/// Reset an invoice's total to the sum of the expenses charged to it.
pub async fn recalculate_invoice_endpoint(
    State(state): State<InvoiceState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Path(invoice_id), _): WithRejection<Path<InvoiceId>, Error>,
) -> Result<Json<Invoice>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let invoice = get_invoice(invoice_id, user_id, &connection)?;
    let valor_total = recalculate_invoice_total(invoice.id, &connection)?;

    if valor_total != invoice.valor_total {
        tracing::info!(
            "Invoice {} total changed from {} to {valor_total}",
            invoice.id,
            invoice.valor_total
        );
    }

    Ok(Json(Invoice {
        valor_total,
        ..invoice
    }))
}

/// Delete an invoice.
pub async fn delete_invoice_endpoint(
    State(state): State<InvoiceState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Path(invoice_id), _): WithRejection<Path<InvoiceId>, Error>,
) -> Result<StatusCode, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    delete_invoice(invoice_id, user_id, &connection)?;

    Ok(StatusCode::NO_CONTENT)
}
