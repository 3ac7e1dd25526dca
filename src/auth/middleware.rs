//! Authentication middleware that checks the bearer token on protected routes.

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::{AppState, Error, app_state::JwtKeys, auth::token::decode_token};

/// The state needed for the auth middleware
#[derive(Clone)]
pub struct AuthState {
    /// The keys used to verify bearer tokens.
    pub jwt_keys: JwtKeys,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            jwt_keys: state.jwt_keys.clone(),
        }
    }
}

/// Middleware function that checks for a valid bearer token.
///
/// The user ID is placed into the request extensions and the request executed normally if the
/// token is valid. A missing `Authorization` header gives 401 and a token that cannot be
/// verified gives 403, both with a JSON error body.
///
/// **Note**: Route handlers can use the function argument `Extension(user_id): Extension<UserID>` to receive the user ID.
pub async fn auth_guard(State(state): State<AuthState>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();

    let bearer =
        match TypedHeader::<Authorization<Bearer>>::from_request_parts(&mut parts, &state).await {
            Ok(TypedHeader(Authorization(bearer))) => bearer,
            Err(rejection) if rejection.is_missing() => {
                return Error::MissingToken.into_response();
            }
            Err(rejection) => {
                tracing::debug!("Malformed authorization header: {rejection}");
                return Error::InvalidToken.into_response();
            }
        };

    let claims = match decode_token(bearer.token(), &state.jwt_keys) {
        Ok(claims) => claims,
        Err(error) => return error.into_response(),
    };

    parts.extensions.insert(claims.id);
    let request = Request::from_parts(parts, body);

    next.run(request).await
}

#[cfg(test)]
mod auth_guard_tests {
    use axum::{Extension, Router, http::StatusCode, middleware, routing::get};
    use axum_test::TestServer;
    use serde_json::json;
    use time::Duration;

    use crate::{
        app_state::JwtKeys,
        auth::{UserID, middleware::AuthState, token::encode_token},
    };

    use super::auth_guard;

    async fn test_handler(Extension(user_id): Extension<UserID>) -> String {
        user_id.to_string()
    }

    const TEST_PROTECTED_ROUTE: &str = "/api/protected";

    fn get_test_server() -> (TestServer, JwtKeys) {
        let state = AuthState {
            jwt_keys: JwtKeys::from_secret("nafstenoas"),
        };
        let app = Router::new()
            .route(TEST_PROTECTED_ROUTE, get(test_handler))
            .layer(middleware::from_fn_with_state(state.clone(), auth_guard))
            .with_state(state.clone());

        (
            TestServer::new(app).expect("Could not create test server."),
            state.jwt_keys,
        )
    }

    #[tokio::test]
    async fn valid_token_passes_user_id_to_handler() {
        let (server, keys) = get_test_server();
        let token = encode_token(UserID::new(7), Duration::hours(1), &keys).unwrap();

        let response = server
            .get(TEST_PROTECTED_ROUTE)
            .authorization_bearer(token)
            .await;

        response.assert_status_ok();
        response.assert_text("7");
    }

    #[tokio::test]
    async fn missing_header_gives_unauthorized() {
        let (server, _) = get_test_server();

        let response = server.get(TEST_PROTECTED_ROUTE).await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        response.assert_json(&json!({"error": "Acesso negado"}));
    }

    #[tokio::test]
    async fn invalid_token_gives_forbidden() {
        let (server, _) = get_test_server();

        let response = server
            .get(TEST_PROTECTED_ROUTE)
            .authorization_bearer("definitely.not.valid")
            .await;

        response.assert_status(StatusCode::FORBIDDEN);
        response.assert_json(&json!({"error": "Token inválido"}));
    }

    #[tokio::test]
    async fn token_from_other_secret_gives_forbidden() {
        let (server, _) = get_test_server();
        let other_keys = JwtKeys::from_secret("another secret");
        let token = encode_token(UserID::new(7), Duration::hours(1), &other_keys).unwrap();

        server
            .get(TEST_PROTECTED_ROUTE)
            .authorization_bearer(token)
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }
}
