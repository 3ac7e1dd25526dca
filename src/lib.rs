//! FinancEasy is a personal finance tracker.
//!
//! This library provides a JSON REST API for managing credit cards, card
//! invoices, expenses (including purchases split into installments), income,
//! investments and user settings, plus dashboards that aggregate them by
//! month and year.
//!
//! All routes except registration and log in require a bearer token issued by
//! the log in or registration endpoints.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    extract::multipart::MultipartRejection,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod app_state;
mod auth;
mod card;
mod csv_import;
mod dashboard;
mod database_id;
mod db;
mod demo;
mod endpoints;
mod expense;
mod export;
mod income;
mod investment;
mod invoice;
mod logging;
mod money;
mod notifications;
mod period;
mod routing;
mod settings;
mod timezone;

#[cfg(test)]
mod test_utils;

pub use app_state::AppState;
pub use auth::{PasswordHash, User, UserID, ValidatedPassword, get_user_by_email, update_password};
pub use database_id::DatabaseId;
pub use db::initialize as initialize_db;
pub use demo::{DEMO_EMAIL, DEMO_PASSWORD, create_demo_data};
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use routing::build_router;

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The email and password combination did not match a registered user.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// The request did not include a bearer token.
    #[error("missing bearer token")]
    MissingToken,

    /// The bearer token could not be decoded, has a bad signature or has expired.
    #[error("invalid bearer token")]
    InvalidToken,

    /// The JWT library failed to sign a token.
    #[error("could not create token: {0}")]
    TokenCreation(String),

    /// The user provided a password that is too easy to guess.
    #[error("password is too weak: {0}")]
    TooWeak(String),

    /// An unexpected error occurred with the underlying hashing library.
    ///
    /// The error string should only be logged for debugging on the server.
    #[error("hashing failed: {0}")]
    HashingError(String),

    /// The email address is not syntactically valid.
    #[error("invalid email address \"{0}\"")]
    InvalidEmail(String),

    /// The email address is already used by another user.
    #[error("the email address is already registered")]
    DuplicateEmail,

    /// A field in the request body or query failed validation.
    ///
    /// The string is shown to the client, so it is written in the client's language.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The card ID used to create an expense or invoice does not refer to a
    /// card owned by the user.
    #[error("the card ID {0} does not refer to a valid card")]
    InvalidCard(DatabaseId),

    /// The invoice ID used to create an expense does not refer to an invoice
    /// owned by the user.
    #[error("the invoice ID {0} does not refer to a valid invoice")]
    InvalidInvoice(DatabaseId),

    /// The card already has an invoice for the month.
    #[error("an invoice for card {card_id} already exists for {month}/{year}")]
    DuplicateInvoice {
        /// The card the invoice belongs to.
        card_id: DatabaseId,
        /// The reference month.
        month: u8,
        /// The reference year.
        year: i32,
    },

    /// The requested resource was not found.
    ///
    /// Resources owned by other users are also reported as not found.
    #[error("the requested resource could not be found")]
    NotFound,

    /// The multipart form could not be parsed as a list of CSV files.
    #[error("could not parse multipart form: {0}")]
    MultipartError(String),

    /// The multipart form contained a file that is not a CSV.
    #[error("file is not a CSV")]
    NotCSV,

    /// The CSV had issues that prevented it from being parsed.
    #[error("could not parse the CSV file: {0}")]
    InvalidCSV(String),

    /// Records could not be written as CSV.
    #[error("could not write CSV: {0}")]
    CsvWriteError(String),

    /// A request or response body could not be read.
    #[error("could not read body: {0}")]
    BodyReadError(String),

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezoneError(String),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    && desc.ends_with("users.email") =>
            {
                Error::DuplicateEmail
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

fn rejected_request(details: String) -> Error {
    tracing::debug!("Rejected request: {details}");
    Error::Validation(format!("Requisição inválida: {details}"))
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        rejected_request(rejection.body_text())
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        rejected_request(rejection.body_text())
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        rejected_request(rejection.body_text())
    }
}

impl From<MultipartRejection> for Error {
    fn from(rejection: MultipartRejection) -> Self {
        rejected_request(rejection.body_text())
    }
}

impl From<csv::Error> for Error {
    fn from(value: csv::Error) -> Self {
        Error::CsvWriteError(value.to_string())
    }
}

impl Error {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Error::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "Credenciais inválidas".to_owned(),
            ),
            Error::MissingToken => (StatusCode::UNAUTHORIZED, "Acesso negado".to_owned()),
            Error::InvalidToken => (StatusCode::FORBIDDEN, "Token inválido".to_owned()),
            Error::TooWeak(feedback) => (
                StatusCode::BAD_REQUEST,
                format!("Senha muito fraca: {feedback}"),
            ),
            Error::InvalidEmail(email) => {
                (StatusCode::BAD_REQUEST, format!("Email inválido: {email}"))
            }
            Error::DuplicateEmail => (StatusCode::CONFLICT, "Email já cadastrado".to_owned()),
            Error::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
            Error::InvalidCard(card_id) => (
                StatusCode::BAD_REQUEST,
                format!("Cartão {card_id} não encontrado"),
            ),
            Error::InvalidInvoice(invoice_id) => (
                StatusCode::BAD_REQUEST,
                format!("Fatura {invoice_id} não encontrada"),
            ),
            Error::DuplicateInvoice {
                card_id,
                month,
                year,
            } => (
                StatusCode::CONFLICT,
                format!("O cartão {card_id} já possui uma fatura para {month:02}/{year}"),
            ),
            Error::NotFound => (
                StatusCode::NOT_FOUND,
                "Recurso não encontrado".to_owned(),
            ),
            Error::NotCSV => (
                StatusCode::BAD_REQUEST,
                "O arquivo deve ser um CSV".to_owned(),
            ),
            Error::MultipartError(message) | Error::InvalidCSV(message) => {
                (StatusCode::BAD_REQUEST, message.clone())
            }
            // Any errors that are not handled above are not intended to be shown to the client.
            error => {
                tracing::error!("An unexpected error occurred: {}", error);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Erro interno do servidor".to_owned(),
                )
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        (status, Json(json!({ "error": message }))).into_response()
    }
}
