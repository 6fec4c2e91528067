use axum::{Router, routing::post};

use super::Controller;
use crate::{
    AppState,
    actions::auth::{LoginAction, LogoutAction, LogoutAllSessionsAction, RefreshTokensAction},
    dispatcher::ActionRunner,
};

/// Session lifecycle endpoints under `/auth`.
pub struct AuthController;

impl Controller for AuthController {
    fn name(&self) -> &'static str {
        "AuthController"
    }

    fn router(&self) -> Router<AppState> {
        Router::new()
            // POST /auth/login
            // Checks credentials and opens a session bound to the client fingerprint.
            .route("/auth/login", post(ActionRunner::new(LoginAction::new())))
            // POST /auth/refresh-tokens
            // Single-use rotation: the presented refresh token is consumed.
            .route(
                "/auth/refresh-tokens",
                post(ActionRunner::new(RefreshTokensAction::new())),
            )
            .route("/auth/logout", post(ActionRunner::new(LogoutAction::new())))
            .route(
                "/auth/logout-all-sessions",
                post(ActionRunner::new(LogoutAllSessionsAction)),
            )
    }

    fn init(&self) {
        tracing::info!("{} initialized...", self.name());
    }
}
