//! Route handlers for creating, reading, updating and deleting cards.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Path, State},
    http::StatusCode,
};
use axum_extra::extract::WithRejection;
use rusqlite::Connection;

use crate::{
    AppState, Error,
    auth::UserID,
    card::core::{Card, CardForm, CardId, create_card, delete_card, get_card, get_cards, update_card},
};

/// The state needed by the card routes.
#[derive(Debug, Clone)]
pub struct CardState {
    /// The database connection for managing cards.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for CardState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// List the user's cards.
pub async fn list_cards_endpoint(
    State(state): State<CardState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Json<Vec<Card>>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    get_cards(user_id, &connection).map(Json)
}

/// Create a card, responding with 201 and the new card.
pub async fn create_card_endpoint(
    State(state): State<CardState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Json(form), _): WithRejection<Json<CardForm>, Error>,
) -> Result<(StatusCode, Json<Card>), Error> {
    form.validate()?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let card = create_card(user_id, &form, &connection)?;

    Ok((StatusCode::CREATED, Json(card)))
}

/// Get a single card.
pub async fn get_card_endpoint(
    State(state): State<CardState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Path(card_id), _): WithRejection<Path<CardId>, Error>,
) -> Result<Json<Card>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    get_card(card_id, user_id, &connection).map(Json)
}

/// Replace the details of a card.
pub async fn update_card_endpoint(
    State(state): State<CardState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Path(card_id), _): WithRejection<Path<CardId>, Error>,
    WithRejection(Json(form), _): WithRejection<Json<CardForm>, Error>,
) -> Result<Json<Card>, Error> {
    form.validate()?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    update_card(card_id, user_id, &form, &connection).map(Json)
}

/// Delete a card and its invoices.
pub async fn delete_card_endpoint(
    State(state): State<CardState>,
    Extension(user_id): Extension<UserID>,
    WithRejection(Path(card_id), _): WithRejection<Path<CardId>, Error>,
) -> Result<StatusCode, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    delete_card(card_id, user_id, &connection)?;

    tracing::info!("Deleted card {card_id} for user {user_id}");

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    use crate::{
        card::core::test_card_form,
        endpoints::{self, format_endpoint},
        test_utils::get_test_app,
    };

    #[tokio::test]
    async fn create_then_list_cards() {
        let app = get_test_app();

        let response = app
            .server
            .post(endpoints::CARDS)
            .authorization_bearer(&app.token)
            .json(&test_card_form())
            .await;
        response.assert_status(StatusCode::CREATED);
        let card = response.json::<Value>();
        assert_eq!(card["nome"], "Nubank");
        assert_eq!(card["userId"], app.user_id.as_i64());
        assert!(card["created_at"].is_string(), "got {card}");

        let response = app
            .server
            .get(endpoints::CARDS)
            .authorization_bearer(&app.token)
            .await;
        response.assert_status_ok();
        response.assert_json(&json!([card]));
    }

    #[tokio::test]
    async fn create_rejects_invalid_number() {
        let app = get_test_app();
        let mut form = test_card_form();
        form.numero = "12".to_owned();

        app.server
            .post(endpoints::CARDS)
            .authorization_bearer(&app.token)
            .json(&form)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn routes_require_token() {
        let app = get_test_app();

        app.server
            .get(endpoints::CARDS)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn other_users_card_is_not_found() {
        let app = get_test_app();
        let card = app
            .server
            .post(endpoints::CARDS)
            .authorization_bearer(&app.token)
            .json(&test_card_form())
            .await
            .json::<Value>();
        let (_, other_token) = app.add_user("outro@email.com");
        let card_path = format_endpoint(endpoints::CARD, &card["id"]);

        app.server
            .get(&card_path)
            .authorization_bearer(&other_token)
            .await
            .assert_status(StatusCode::NOT_FOUND);
        app.server
            .delete(&card_path)
            .authorization_bearer(&other_token)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_and_delete_card() {
        let app = get_test_app();
        let card = app
            .server
            .post(endpoints::CARDS)
            .authorization_bearer(&app.token)
            .json(&test_card_form())
            .await
            .json::<Value>();
        let card_path = format_endpoint(endpoints::CARD, &card["id"]);
        let mut form = test_card_form();
        form.limite = 800.0;

        let response = app
            .server
            .put(&card_path)
            .authorization_bearer(&app.token)
            .json(&form)
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["limite"], 800.0);

        app.server
            .delete(&card_path)
            .authorization_bearer(&app.token)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        app.server
            .get(&card_path)
            .authorization_bearer(&app.token)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
