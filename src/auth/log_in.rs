//! The routes for logging in and fetching the logged in user.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, State},
};
use axum_extra::extract::WithRejection;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::{
    AppState, Error,
    app_state::JwtKeys,
    auth::{User, UserID, get_user_by_email, get_user_by_id, token::encode_token},
};

/// The state needed to log in a user.
#[derive(Clone)]
pub struct LogInState {
    /// The keys used for issuing bearer tokens.
    pub jwt_keys: JwtKeys,
    /// The duration for which issued tokens are valid.
    pub token_duration: Duration,
    /// The database connection for looking up users.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for LogInState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            jwt_keys: state.jwt_keys.clone(),
            token_duration: state.token_duration,
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The JSON body of a log in request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogInData {
    /// Email entered during log in.
    pub email: String,
    /// Password entered during log in.
    pub senha: String,
}

/// The response to a successful log in or registration.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    /// The bearer token to send with subsequent requests.
    pub token: String,
    /// The logged in user.
    pub user: serde_json::Value,
}

impl AuthResponse {
    pub(super) fn new(token: String, user: &User) -> Result<Self, Error> {
        let user = serde_json::to_value(user).map_err(|error| {
            tracing::error!("Could not serialize user: {error}");
            Error::TokenCreation(error.to_string())
        })?;

        Ok(Self { token, user })
    }
}

/// Handler for log-in requests.
///
/// # Errors
///
/// This function will return an error in a few situations.
/// - The email does not belong to a registered user.
/// - The password is not correct.
/// - An internal error occurred when verifying the password or signing the token.
pub async fn post_log_in(
    State(state): State<LogInState>,
    WithRejection(Json(log_in_data), _): WithRejection<Json<LogInData>, Error>,
) -> Result<Json<AuthResponse>, Error> {
    let user = {
        let connection = state
            .db_connection
            .lock()
            .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
            .map_err(|_| Error::DatabaseLockError)?;

        match get_user_by_email(&log_in_data.email, &connection) {
            Ok(user) => user,
            Err(Error::NotFound) => return Err(Error::InvalidCredentials),
            Err(error) => return Err(error),
        }
    };

    let is_password_valid = user
        .password_hash
        .verify(&log_in_data.senha)
        .map_err(|error| {
            tracing::error!("Unhandled error while verifying credentials: {error}");
            Error::HashingError(error.to_string())
        })?;

    if !is_password_valid {
        return Err(Error::InvalidCredentials);
    }

    let token = encode_token(user.id, state.token_duration, &state.jwt_keys)?;

    tracing::info!("User {} logged in", user.id);

    Ok(Json(AuthResponse::new(token, &user)?))
}

/// The state needed to fetch the logged in user.
#[derive(Debug, Clone)]
pub struct CurrentUserState {
    /// The database connection for looking up users.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for CurrentUserState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Return the user the bearer token was issued to.
pub async fn get_current_user(
    State(state): State<CurrentUserState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Json<User>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    get_user_by_id(user_id, &connection).map(Json)
}
