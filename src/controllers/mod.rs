//! Route Tables
//!
//! Each controller is pure wiring: a static table binding `{method, path}` to an
//! action through the dispatcher. Controllers carry no business logic.

use axum::Router;

use crate::AppState;

pub mod auth;
pub mod posts;
pub mod root;
pub mod users;

/// Controller
///
/// Every controller exposes its router and an initialization hook, invoked exactly
/// once when the application router is assembled.
pub trait Controller {
    fn name(&self) -> &'static str;

    fn router(&self) -> Router<AppState>;

    fn init(&self);
}

/// All controllers in mount order.
pub fn all() -> Vec<Box<dyn Controller>> {
    vec![
        Box::new(root::RootController),
        Box::new(auth::AuthController),
        Box::new(users::UsersController),
        Box::new(posts::PostsController),
    ]
}
