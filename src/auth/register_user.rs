//! The route for creating a new user account.

use std::{
    str::FromStr,
    sync::{Arc, Mutex},
};

use axum::{
    Json,
    extract::{FromRef, State},
    http::StatusCode,
};
use axum_extra::extract::WithRejection;
use email_address::EmailAddress;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::{
    AppState, Error, PasswordHash, ValidatedPassword,
    app_state::JwtKeys,
    auth::{create_user, log_in::AuthResponse, token::encode_token},
};

/// The state needed for creating a new user.
#[derive(Clone)]
pub struct RegistrationState {
    /// The keys used for issuing bearer tokens.
    pub jwt_keys: JwtKeys,
    /// The duration for which issued tokens are valid.
    pub token_duration: Duration,
    /// The bcrypt cost used when hashing the new password.
    pub hash_cost: u32,
    /// The database connection for storing the new user.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for RegistrationState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            jwt_keys: state.jwt_keys.clone(),
            token_duration: state.token_duration,
            hash_cost: PasswordHash::DEFAULT_COST,
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The JSON body of a registration request.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterForm {
    /// The user's display name.
    pub nome: String,
    /// The email address used to log in.
    pub email: String,
    /// The plain text password.
    pub senha: String,
}

/// Create a user and log them in.
///
/// Responds with 201 and the same body as a log in on success.
pub async fn register_user(
    State(state): State<RegistrationState>,
    WithRejection(Json(form), _): WithRejection<Json<RegisterForm>, Error>,
) -> Result<(StatusCode, Json<AuthResponse>), Error> {
    let nome = form.nome.trim();
    if nome.is_empty() {
        return Err(Error::Validation("O nome é obrigatório".to_owned()));
    }

    let email = form.email.trim();
    EmailAddress::from_str(email).map_err(|_| Error::InvalidEmail(email.to_owned()))?;

    let validated_password = ValidatedPassword::new(&form.senha, &[nome, email])?;
    let password_hash = PasswordHash::new(validated_password, state.hash_cost)?;

    let user = {
        let connection = state
            .db_connection
            .lock()
            .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
            .map_err(|_| Error::DatabaseLockError)?;

        create_user(nome, email, password_hash, &connection)?
    };

    tracing::info!("Registered user {}", user.id);

    let token = encode_token(user.id, state.token_duration, &state.jwt_keys)?;

    Ok((StatusCode::CREATED, Json(AuthResponse::new(token, &user)?)))
}
