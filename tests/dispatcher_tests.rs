use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode, header},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;
use supra_api::{
    AppConfig, AppState, InMemoryRepository, RepositoryState,
    actions::{Action, ActionResult},
    config::Env,
    context::RequestContext,
    create_router,
    dispatcher::{ActionRunner, coerce_numeric},
    error::AppError,
    validation::{
        RequestRule, RequestSchema, SchemaRule, ValidationRules, Verdict,
        registry::{self, user},
    },
};
use tower::ServiceExt;

// --- Probe actions ---

static NEVER_VALID: SchemaRule = SchemaRule {
    name: "probe.flag",
    description: "Never valid",
    validator: |_| Verdict::Invalid,
};

static WITH_REASON: SchemaRule = SchemaRule {
    name: "probe.reason",
    description: "Static description",
    validator: |_| "Computed reason".into(),
};

static BROKEN: SchemaRule = SchemaRule {
    name: "probe.broken",
    description: "Answers with a number",
    validator: |_| Verdict::from(json!(42)),
};

/// Validates a body and echoes it back.
struct ProbeAction {
    rules: ValidationRules,
}

impl ProbeAction {
    fn new() -> Self {
        Self {
            rules: ValidationRules::new().body(
                RequestSchema::new()
                    .field("name", RequestRule::required(&user::NAME))
                    .field("flag", RequestRule::optional(&NEVER_VALID))
                    .field("reason", RequestRule::optional(&WITH_REASON))
                    .field("broken", RequestRule::optional(&BROKEN)),
            ),
        }
    }
}

#[async_trait]
impl Action for ProbeAction {
    fn name(&self) -> &'static str {
        "ProbeAction"
    }

    fn access_tag(&self) -> &'static str {
        "posts:list"
    }

    fn validation_rules(&self) -> Option<&ValidationRules> {
        Some(&self.rules)
    }

    async fn run(&self, _state: &AppState, ctx: &RequestContext) -> Result<ActionResult, AppError> {
        ActionResult::ok().message("probed").data(&ctx.body)
    }
}

/// No rules; answers with the coerced path params and a custom header.
struct EchoAction;

#[async_trait]
impl Action for EchoAction {
    fn name(&self) -> &'static str {
        "EchoAction"
    }

    fn access_tag(&self) -> &'static str {
        "posts:get-by-id"
    }

    async fn run(&self, _state: &AppState, ctx: &RequestContext) -> Result<ActionResult, AppError> {
        Ok(ActionResult::ok()
            .status(StatusCode::ACCEPTED)
            .header(
                HeaderName::from_static("x-probe"),
                HeaderValue::from_static("yes"),
            )
            .data(&ctx.params)?)
    }
}

// --- Helpers ---

fn test_state(env: Env) -> AppState {
    let repo = Arc::new(InMemoryRepository::new()) as RepositoryState;
    let config = AppConfig {
        env,
        ..AppConfig::default()
    };
    AppState::new(repo, config).unwrap()
}

fn probe_app(env: Env) -> Router {
    Router::new()
        .route("/probe", post(ActionRunner::new(ProbeAction::new())))
        .route(
            "/echo/{id}",
            get(ActionRunner::new(EchoAction).numeric_param("id"))
                .delete(ActionRunner::new(EchoAction).numeric_param("id")),
        )
        .with_state(test_state(env))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, serde_json::from_slice(&bytes).unwrap())
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

// --- Validation ---

#[tokio::test]
async fn test_extra_keys_are_listed() {
    let body = json!({
        "name": "John Doe",
        "username": "john_doe",
        "email": "john@example.com",
        "password": "secret-password",
        "foo": 1,
        "bar": 2
    });
    let app = create_router(test_state(Env::Local));
    let (status, _, json) = send(app, json_request(Method::POST, "/users", body)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    let message = json["message"].as_str().unwrap();
    assert!(message.starts_with("Extra keys found in 'body' payload: ["));
    assert!(message.contains("foo"));
    assert!(message.contains("bar"));
}

#[tokio::test]
async fn test_missing_required_field_is_named() {
    let app = create_router(test_state(Env::Local));
    let (status, _, json) = send(
        app,
        json_request(Method::POST, "/users", json!({ "name": "John Doe" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["message"], "'body.username' field is required.");
}

#[tokio::test]
async fn test_false_verdict_uses_static_description() {
    let (status, _, json) = send(
        probe_app(Env::Local),
        json_request(Method::POST, "/probe", json!({ "name": "John Doe", "flag": true })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        json["message"],
        "Invalid 'body.flag' field. Description: Never valid"
    );
}

#[tokio::test]
async fn test_string_verdict_is_used_verbatim() {
    let (status, _, json) = send(
        probe_app(Env::Local),
        json_request(Method::POST, "/probe", json!({ "name": "John Doe", "reason": 1 })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        json["message"],
        "Invalid 'body.reason' field. Description: Computed reason"
    );
}

#[tokio::test]
async fn test_unclassified_verdict_is_a_server_error() {
    let (status, _, json) = send(
        probe_app(Env::Local),
        json_request(Method::POST, "/probe", json!({ "name": "John Doe", "broken": "x" })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "SERVER_ERROR");
    assert!(
        json["message"]
            .as_str()
            .unwrap()
            .contains("Validator should return boolean or string")
    );
}

#[tokio::test]
async fn test_server_error_message_is_hidden_in_production() {
    let (status, _, json) = send(
        probe_app(Env::Production),
        json_request(Method::POST, "/probe", json!({ "name": "John Doe", "broken": "x" })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["message"], "Server error occurred");
    assert!(json.get("meta").is_none());
}

#[tokio::test]
async fn test_non_object_body_is_rejected() {
    let (status, _, json) = send(
        probe_app(Env::Local),
        json_request(Method::POST, "/probe", json!(["John Doe"])),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        json["message"],
        "Invalid request validation payload. Only object allowed. Actual type: array"
    );
}

#[tokio::test]
async fn test_malformed_json_is_a_validation_error() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/probe")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _, json) = send(probe_app(Env::Local), request).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_empty_body_is_rejected_when_required() {
    let app = create_router(test_state(Env::Local));
    let (status, _, json) = send(app, empty_request(Method::POST, "/users")).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "EMPTY_BODY");
    assert_eq!(json["success"], false);
    assert_eq!(json["status"], 422);
}

// --- Schema introspection ---

#[tokio::test]
async fn test_schema_flag_describes_rules_locally() {
    let app = create_router(test_state(Env::Local));
    let (status, _, json) = send(app, empty_request(Method::GET, "/users?schema=true")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["query"]["page"], "Number; min 0, max 1000000 (optional)");
    assert_eq!(
        json["query"]["limit"],
        "Number; one of: [10, 20, 50, 100] (optional)"
    );
    assert_eq!(json["params"], json!({}));
    assert_eq!(json["body"], json!({}));
}

#[tokio::test]
async fn test_schema_flag_skips_access_check() {
    // Anonymous callers may not create posts, but may read their schema.
    let app = create_router(test_state(Env::Local));
    let (status, _, json) = send(app, empty_request(Method::POST, "/posts?schema=1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["body"]["title"], "String; min 3, max 100 chars (required)");
}

#[tokio::test]
async fn test_schema_flag_is_ignored_in_production() {
    let (status, _, json) = send(
        probe_app(Env::Production),
        empty_request(Method::POST, "/probe?schema=true"),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["message"], "'body.name' field is required.");
}

#[tokio::test]
async fn test_schema_flag_is_ignored_for_delete() {
    let (status, _, json) = send(
        probe_app(Env::Local),
        empty_request(Method::DELETE, "/echo/3?schema=true"),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["data"]["id"], 3);
}

// --- Path params ---

#[tokio::test]
async fn test_numeric_params_are_coerced() {
    let (_, _, json) = send(probe_app(Env::Local), empty_request(Method::GET, "/echo/42")).await;
    assert_eq!(json["data"]["id"], json!(42));

    let (_, _, json) = send(probe_app(Env::Local), empty_request(Method::GET, "/echo/abc")).await;
    assert_eq!(json["data"]["id"], json!("abc"));
}

#[test]
fn test_coerce_numeric_keeps_zero_as_string() {
    assert_eq!(coerce_numeric("7".to_string()), json!(7));
    assert_eq!(coerce_numeric("-3".to_string()), json!(-3));
    assert_eq!(coerce_numeric("0".to_string()), json!("0"));
    assert_eq!(coerce_numeric("12ab".to_string()), json!("12ab"));
}

#[tokio::test]
async fn test_non_numeric_id_fails_validation() {
    let app = create_router(test_state(Env::Local));
    let (status, _, json) = send(app, empty_request(Method::GET, "/posts/abc")).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        json["message"],
        format!(
            "Invalid 'params.id' field. Description: {}",
            registry::post::ID.description
        )
    );
}

#[tokio::test]
async fn test_zero_id_fails_validation() {
    let app = create_router(test_state(Env::Local));
    let (status, _, _) = send(app, empty_request(Method::GET, "/users/0")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let app = create_router(test_state(Env::Local));
    let (status, _, json) = send(app, empty_request(Method::GET, "/users/999")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

// --- Access ---

#[tokio::test]
async fn test_anonymous_access_is_denied() {
    let app = create_router(test_state(Env::Local));
    let (status, _, json) = send(
        app,
        json_request(
            Method::POST,
            "/posts",
            json!({ "title": "Hello", "content": "World!" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "ACCESS_ERROR");
    assert_eq!(
        json["message"],
        "Access denied, don't have permissions for 'posts:create'."
    );
}

#[tokio::test]
async fn test_invalid_bearer_token_is_rejected() {
    let app = create_router(test_state(Env::Local));
    let request = Request::builder()
        .uri("/posts")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let (status, _, json) = send(app, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_malformed_authorization_header_is_rejected() {
    let app = create_router(test_state(Env::Local));
    let request = Request::builder()
        .uri("/posts")
        .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(app, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// --- Envelopes ---

#[tokio::test]
async fn test_success_envelope_and_custom_headers() {
    let (status, headers, json) =
        send(probe_app(Env::Local), empty_request(Method::GET, "/echo/5")).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(headers.get("x-probe").unwrap(), "yes");
    assert_eq!(json["success"], true);
    assert!(json.get("message").is_none());
    assert_eq!(json["data"], json!({ "id": 5 }));
}

#[tokio::test]
async fn test_message_and_data_in_envelope() {
    let (status, _, json) = send(
        probe_app(Env::Local),
        json_request(Method::POST, "/probe", json!({ "name": "John Doe" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "probed");
    assert_eq!(json["data"]["name"], "John Doe");
}

#[tokio::test]
async fn test_local_errors_carry_request_meta() {
    let request = Request::builder()
        .method(Method::GET)
        .uri("/users/999?page=1")
        .header(header::USER_AGENT, "dispatcher-tests")
        .body(Body::empty())
        .unwrap();
    let app = create_router(test_state(Env::Local));
    let (_, _, json) = send(app, request).await;

    let meta = &json["meta"]["request"];
    assert_eq!(meta["method"], "GET");
    assert_eq!(meta["url"], "/users/999?page=1");
    assert_eq!(meta["params"]["id"], 999);
    assert_eq!(meta["headers"]["User-Agent"], "dispatcher-tests");
}

#[tokio::test]
async fn test_production_errors_have_no_meta() {
    let app = create_router(test_state(Env::Production));
    let (status, _, json) = send(app, empty_request(Method::GET, "/users/999")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json.get("meta").is_none());
}
