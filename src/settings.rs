//! Per-user settings: email notifications and the interface theme.

use std::{
    fmt::Display,
    str::FromStr,
    sync::{Arc, Mutex},
};

use axum::{
    Extension, Json,
    extract::{FromRef, State},
};
use axum_extra::extract::WithRejection;
use rusqlite::{
    Connection, Row, ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};

use crate::{AppState, Error, auth::UserID};

/// The colour scheme of the client.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Light theme.
    #[default]
    Claro,
    /// Dark theme.
    Escuro,
}

impl Theme {
    fn as_str(&self) -> &'static str {
        match self {
            Theme::Claro => "claro",
            Theme::Escuro => "escuro",
        }
    }
}

impl Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "claro" => Ok(Theme::Claro),
            "escuro" => Ok(Theme::Escuro),
            other => Err(Error::Validation(format!(
                "Tema inválido \"{other}\", use claro ou escuro"
            ))),
        }
    }
}

impl ToSql for Theme {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Theme {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|_| FromSqlError::InvalidType)
    }
}

/// A user's settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    /// Whether the user wants notifications by email.
    pub notificacoes_email: bool,
    /// The client's colour scheme.
    pub tema: Theme,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            notificacoes_email: false,
            tema: Theme::Claro,
        }
    }
}

/// The request body for updating settings. Missing fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsForm {
    /// Whether the user wants notifications by email.
    pub notificacoes_email: Option<bool>,
    /// "claro" or "escuro".
    pub tema: Option<String>,
}

/// Create the settings table.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_settings_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS configuracoes (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
            notificacoes_email INTEGER NOT NULL DEFAULT 0,
            tema TEXT NOT NULL DEFAULT 'claro'
        )",
        (),
    )?;

    Ok(())
}

fn map_settings_row(row: &Row) -> Result<Settings, rusqlite::Error> {
    Ok(Settings {
        notificacoes_email: row.get(0)?,
        tema: row.get(1)?,
    })
}

/// Get the user's settings, storing the defaults on first access.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn get_settings(user_id: UserID, connection: &Connection) -> Result<Settings, Error> {
    connection.execute(
        "INSERT INTO configuracoes (user_id) VALUES (?1) ON CONFLICT(user_id) DO NOTHING",
        [user_id.as_i64()],
    )?;

    let settings = connection
        .prepare("SELECT notificacoes_email, tema FROM configuracoes WHERE user_id = ?1")?
        .query_one([user_id.as_i64()], map_settings_row)?;

    Ok(settings)
}

/// Apply `form` on top of the user's current settings.
///
/// # Errors
/// Returns [Error::Validation] for an unknown theme or [Error::SqlError] if there is an SQL error.
pub fn update_settings(
    user_id: UserID,
    form: &SettingsForm,
    connection: &Connection,
) -> Result<Settings, Error> {
    let tema = form.tema.as_deref().map(Theme::from_str).transpose()?;
    let current = get_settings(user_id, connection)?;

    let settings = Settings {
        notificacoes_email: form.notificacoes_email.unwrap_or(current.notificacoes_email),
        tema: tema.unwrap_or(current.tema),
    };

    connection.execute(
        "INSERT INTO configuracoes (user_id, notificacoes_email, tema) VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id) DO UPDATE SET
            notificacoes_email = excluded.notificacoes_email,
            tema = excluded.tema",
        (user_id.as_i64(), settings.notificacoes_email, settings.tema),
    )?;

    Ok(settings)
}

/// The state needed by the settings routes.
#[derive(Debug, Clone)]
pub struct SettingsState {
    /// The database connection for reading and storing settings.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for SettingsState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Get the user's settings.
pub async fn get_settings_endpoint(
    State(state): State<SettingsState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Json<Settings>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    get_settings(user_id, &connection).map(Json)
}

/// Update the user's settings.
pub async fn update_settings_endpoint(
    State(state): State<SettingsState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Json(form), _): WithRejection<Json<SettingsForm>, Error>,
) -> Result<Json<Settings>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    update_settings(user_id, &form, &connection).map(Json)
}
