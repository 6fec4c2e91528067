//! Actions: one stateless unit per endpoint.
//!
//! Each action declares an access tag and (optionally) its validation rules, and runs
//! against an already-validated [`RequestContext`]. Instances are built once when the
//! route tables are assembled and shared by every request.

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::Serialize;
use serde_json::Value;

use crate::{AppState, context::RequestContext, error::AppError, validation::ValidationRules};

pub mod auth;
pub mod posts;
pub mod users;

/// Action
///
/// The contract the dispatcher is generic over. `run` only ever sees a context that
/// passed access and validation checks.
#[async_trait]
pub trait Action: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Permission required to invoke this action.
    fn access_tag(&self) -> &'static str;

    fn validation_rules(&self) -> Option<&ValidationRules> {
        None
    }

    async fn run(&self, state: &AppState, ctx: &RequestContext) -> Result<ActionResult, AppError>;
}

/// ActionResult
///
/// The result envelope an action hands back to the dispatcher.
#[derive(Debug, Clone)]
pub struct ActionResult {
    pub success: bool,
    pub status: StatusCode,
    pub message: Option<String>,
    pub data: Option<Value>,
    pub headers: HeaderMap,
}

impl Default for ActionResult {
    fn default() -> Self {
        Self {
            success: true,
            status: StatusCode::OK,
            message: None,
            data: None,
            headers: HeaderMap::new(),
        }
    }
}

impl ActionResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Serializes `data` into the envelope's payload.
    pub fn data(mut self, data: impl Serialize) -> Result<Self, AppError> {
        let value = serde_json::to_value(data)
            .map_err(|e| AppError::server(format!("Failed to serialize action data: {e}")))?;
        self.data = Some(value);
        Ok(self)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Page/limit query pair shared by list actions. Query values arrive as strings and
/// were already validated by `common::PAGE` / `common::LIMIT`.
pub(crate) fn pagination(ctx: &RequestContext) -> (i64, i64) {
    let read = |key: &str, default: i64| {
        ctx.query
            .get(key)
            .and_then(|v| match v {
                Value::String(s) => s.parse().ok(),
                other => other.as_i64(),
            })
            .unwrap_or(default)
    };
    (read("page", 0), read("limit", 10))
}
