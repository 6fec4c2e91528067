use axum::{
    Router,
    routing::{get, post},
};

use super::Controller;
use crate::{
    AppState,
    actions::users::{
        ChangeEmailAction, ChangePasswordAction, CreateUserAction, GetCurrentUserAction,
        GetPostsByUserIdAction, GetUserByIdAction, ListUsersAction, RemoveUserAction,
        UpdateUserAction,
    },
    dispatcher::ActionRunner,
};

/// User management endpoints under `/users`.
pub struct UsersController;

impl Controller for UsersController {
    fn name(&self) -> &'static str {
        "UsersController"
    }

    fn router(&self) -> Router<AppState> {
        Router::new()
            // GET /users?page=..&limit=..   POST /users   PATCH /users (self)
            .route(
                "/users",
                get(ActionRunner::new(ListUsersAction::new()))
                    .post(ActionRunner::new(CreateUserAction::new()))
                    .patch(ActionRunner::new(UpdateUserAction::new())),
            )
            // GET /users/current
            // Static segment, matched before `/{id}`.
            .route("/users/current", get(ActionRunner::new(GetCurrentUserAction)))
            .route(
                "/users/{id}",
                get(ActionRunner::new(GetUserByIdAction::new()).numeric_param("id"))
                    .delete(ActionRunner::new(RemoveUserAction::new()).numeric_param("id")),
            )
            .route(
                "/users/{id}/posts",
                get(ActionRunner::new(GetPostsByUserIdAction::new()).numeric_param("id")),
            )
            .route(
                "/users/change-password",
                post(ActionRunner::new(ChangePasswordAction::new())),
            )
            .route(
                "/users/change-email",
                post(ActionRunner::new(ChangeEmailAction::new())),
            )
    }

    fn init(&self) {
        tracing::info!("{} initialized...", self.name());
    }
}
