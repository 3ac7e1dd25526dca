#![allow(missing_docs)]

use axum_test::TestServer;
use rusqlite::Connection;
use time::Duration;

use crate::{
    AppState, PasswordHash, UserID, ValidatedPassword,
    auth::{create_user, encode_token},
    build_router,
};

pub(crate) const TEST_SECRET: &str = "a test secret for signing tokens";
pub(crate) const TEST_TIMEZONE: &str = "America/Sao_Paulo";

/// A test server running the full router against an in-memory database,
/// with one registered user.
pub(crate) struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub user_id: UserID,
    pub token: String,
}

impl TestApp {
    /// Register another user and return their ID and bearer token.
    pub fn add_user(&self, email: &str) -> (UserID, String) {
        let connection = self.state.db_connection.lock().unwrap();
        let user = create_user(
            "Outro Usuário",
            email,
            PasswordHash::new(ValidatedPassword::new_unchecked("hunter2hunter2"), 4).unwrap(),
            &connection,
        )
        .unwrap();
        let token = encode_token(user.id, Duration::hours(1), &self.state.jwt_keys).unwrap();

        (user.id, token)
    }
}

#[track_caller]
pub(crate) fn get_test_app() -> TestApp {
    let connection = Connection::open_in_memory().expect("Could not open database in memory.");
    let state = AppState::new(connection, TEST_SECRET, TEST_TIMEZONE)
        .expect("Could not create app state.");

    let user = {
        let connection = state.db_connection.lock().unwrap();
        create_user(
            "Usuária Teste",
            "teste@email.com",
            PasswordHash::new(ValidatedPassword::new_unchecked("hunter2hunter2"), 4).unwrap(),
            &connection,
        )
        .unwrap()
    };
    let token = encode_token(user.id, Duration::hours(1), &state.jwt_keys).unwrap();

    let server =
        TestServer::new(build_router(state.clone())).expect("Could not create test server.");

    TestApp {
        server,
        state,
        user_id: user.id,
        token,
    }
}
