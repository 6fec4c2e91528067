use axum::{Router, http::HeaderName};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Request pipeline: context, validation, access policy, dispatch.
pub mod context;
pub mod dispatcher;
pub mod policy;
pub mod validation;

// Business actions and the route tables binding them.
pub mod actions;
pub mod controllers;

// Collaborators and shared infrastructure.
pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod models;
pub mod repository;

// --- Public Re-exports ---

pub use config::AppConfig;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

use auth::TokenService;
use crypto::{CryptoError, CryptoService};

/// ApiDoc
///
/// OpenAPI document of the response schemas, served at `/api-docs/openapi.json`.
/// Endpoints self-describe their inputs through the `?schema=true` flag instead.
#[derive(OpenApi)]
#[openapi(
    components(schemas(models::User, models::Post, models::TokenPair)),
    tags((name = "supra-api", description = "Users, auth and posts REST API"))
)]
struct ApiDoc;

/// AppState
///
/// The single, immutable container of every collaborator, shared across all requests.
/// Nothing in here is mutated after startup.
#[derive(Clone)]
pub struct AppState {
    /// Storage collaborator.
    pub repo: RepositoryState,
    /// Access token minting and verification.
    pub tokens: TokenService,
    /// Symmetric encrypt/decrypt helper.
    pub crypto: CryptoService,
    pub config: AppConfig,
}

impl AppState {
    /// Builds every service from the configuration.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Result<Self, CryptoError> {
        Ok(Self {
            repo,
            tokens: TokenService::new(&config),
            crypto: CryptoService::new(&config.encrypt_key)?,
            config,
        })
    }
}

/// create_router
///
/// Mounts every controller (running its init hook once), applies the observability
/// layers and registers the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let mut router = Router::new();
    for controller in controllers::all() {
        controller.init();
        router = router.merge(controller.router());
    }

    // Swagger UI is a development aid, same as schema introspection.
    if !state.config.env.is_production() {
        router = router
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));
    }

    router
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                // Unique id per request, reused by the trace span below.
                .layer(SetRequestIdLayer::new(
                    x_request_id.clone(),
                    MakeRequestUuid,
                ))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// Span per request carrying method, uri and the generated `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
