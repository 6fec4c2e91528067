//! Generic request dispatch.
//!
//! [`ActionRunner`] turns one inbound HTTP call into one [`Action`] invocation:
//! it normalizes the request into a [`RequestContext`], enforces access and
//! validation, runs the action and serializes its [`ActionResult`]. Failures are
//! wrapped with the context and handed to [`error::render`].

use std::{collections::HashMap, future::Future, net::SocketAddr, pin::Pin, sync::Arc};

use axum::{
    Json, RequestPartsExt,
    body::{Body, to_bytes},
    extract::{ConnectInfo, Path, Query, Request},
    handler::Handler,
    http::{HeaderMap, Method, request::Parts},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;

use crate::{
    AppState,
    actions::{Action, ActionResult},
    context::{ContextHeaders, RequestContext},
    error::{self, ActionFailure, AppError},
    policy,
    validation::{self, ValidationRules},
};

/// Largest request body the dispatcher will buffer.
const BODY_LIMIT: usize = 1024 * 1024;
/// Query flag that asks for the action's validation schema instead of running it.
const SCHEMA_FLAG: &str = "schema";

/// Marker type for the [`Handler`] implementation of [`ActionRunner`].
#[derive(Debug, Clone, Copy)]
pub struct Dispatched;

/// ActionRunner
///
/// Binds one action to a route. Cloned per request by axum; the action itself is shared.
#[derive(Clone)]
pub struct ActionRunner {
    action: Arc<dyn Action>,
    numeric_params: Vec<&'static str>,
}

impl ActionRunner {
    pub fn new(action: impl Action) -> Self {
        Self {
            action: Arc::new(action),
            numeric_params: Vec::new(),
        }
    }

    /// Declares a path parameter that should reach the action as an integer.
    pub fn numeric_param(mut self, name: &'static str) -> Self {
        self.numeric_params.push(name);
        self
    }

    async fn dispatch(self, state: AppState, request: Request) -> Response {
        let (parts, body) = request.into_parts();
        let mut ctx = RequestContext::new(
            parts.method.clone(),
            parts
                .uri
                .path_and_query()
                .map_or_else(|| parts.uri.path().to_owned(), |pq| pq.as_str().to_owned()),
        );

        match self.execute(&state, &mut ctx, parts, body).await {
            Ok(response) => response,
            Err(error) => error::render(ActionFailure::new(error, ctx), state.config.env),
        }
    }

    async fn execute(
        &self,
        state: &AppState,
        ctx: &mut RequestContext,
        mut parts: Parts,
        body: Body,
    ) -> Result<Response, AppError> {
        build_context(ctx, &mut parts, body, state, &self.numeric_params).await?;
        let rules = self.action.validation_rules();

        if wants_schema(ctx) && !state.config.env.is_production() {
            return Ok(Json(validation::describe(rules)).into_response());
        }

        policy::check_access(self.action.access_tag(), ctx.current_user.as_ref())?;

        if let Some(rules) = rules {
            check_rules(ctx, rules)?;
        }

        tracing::debug!(action = self.action.name(), "running action");
        let result = self.action.run(state, ctx).await?;
        Ok(into_response(result))
    }
}

impl Handler<Dispatched, AppState> for ActionRunner {
    type Future = Pin<Box<dyn Future<Output = Response> + Send>>;

    fn call(self, req: Request, state: AppState) -> Self::Future {
        Box::pin(self.dispatch(state, req))
    }
}

/// Fills the context from the raw request. Each step that can fail leaves whatever
/// was already gathered in `ctx` for diagnostics.
async fn build_context(
    ctx: &mut RequestContext,
    parts: &mut Parts,
    body: Body,
    state: &AppState,
    numeric_params: &[&str],
) -> Result<(), AppError> {
    ctx.headers = ContextHeaders::from_headers(&parts.headers);
    ctx.ip = client_ip(parts);

    let params = parts
        .extract::<Path<HashMap<String, String>>>()
        .await
        .map(|Path(params)| params)
        .unwrap_or_default();
    ctx.params = params
        .into_iter()
        .map(|(key, raw)| {
            let value = if numeric_params.contains(&key.as_str()) {
                coerce_numeric(raw)
            } else {
                Value::String(raw)
            };
            (key, value)
        })
        .collect();

    let Query(query) = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .map_err(|e| AppError::validation(format!("Malformed query string: {e}")))?;
    ctx.query = query
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();

    let bytes = to_bytes(body, BODY_LIMIT)
        .await
        .map_err(|e| AppError::validation(format!("Failed to read request body: {e}")))?;
    if !bytes.iter().all(u8::is_ascii_whitespace) {
        ctx.body = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::validation(format!("Malformed JSON body: {e}")))?;
    }

    ctx.current_user = state.tokens.resolve_principal(&parts.headers)?;
    Ok(())
}

/// Integer strings become JSON numbers; anything else (including "0") is passed
/// through untouched and left for the field validator to judge.
pub fn coerce_numeric(raw: String) -> Value {
    match raw.trim().parse::<i64>() {
        Ok(n) if n != 0 => Value::from(n),
        _ => Value::String(raw),
    }
}

fn client_ip(parts: &Parts) -> Option<String> {
    if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        return Some(addr.ip().to_string());
    }
    forwarded_for(&parts.headers)
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_owned())
        .filter(|ip| !ip.is_empty())
}

fn wants_schema(ctx: &RequestContext) -> bool {
    let flagged = ctx
        .query
        .get(SCHEMA_FLAG)
        .and_then(Value::as_str)
        .is_some_and(|v| !v.is_empty());
    flagged && matches!(ctx.method, Method::GET | Method::POST | Method::PATCH)
}

fn check_rules(ctx: &RequestContext, rules: &ValidationRules) -> Result<(), AppError> {
    if rules.not_empty_body && ctx.body_is_empty() {
        return Err(AppError::EmptyBody);
    }
    if let Some(schema) = &rules.query {
        validation::validate_part(&Value::Object(ctx.query.clone()), schema, "query")?;
    }
    if let Some(schema) = &rules.params {
        validation::validate_part(&Value::Object(ctx.params.clone()), schema, "params")?;
    }
    if let Some(schema) = &rules.body {
        validation::validate_part(&ctx.body, schema, "body")?;
    }
    Ok(())
}

#[derive(Serialize)]
struct Envelope {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

fn into_response(result: ActionResult) -> Response {
    let ActionResult {
        success,
        status,
        message,
        data,
        headers,
    } = result;

    let mut response = (
        status,
        Json(Envelope {
            success,
            message,
            data,
        }),
    )
        .into_response();
    response.headers_mut().extend(headers);
    response
}

