use axum::{Router, routing::get};

use super::Controller;
use crate::AppState;

pub struct RootController;

impl Controller for RootController {
    fn name(&self) -> &'static str {
        "RootController"
    }

    fn router(&self) -> Router<AppState> {
        Router::new()
            // GET /health
            // Used by load balancers and monitoring; answers without touching the dispatcher.
            .route("/health", get(|| async { "ok" }))
    }

    fn init(&self) {
        tracing::info!("{} initialized...", self.name());
    }
}
