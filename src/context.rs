use axum::http::{HeaderMap, Method, header};
use serde::{Serialize, Serializer, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::{error::AppError, policy};

/// CurrentUser
///
/// The principal resolved from a verified access token. Absent for anonymous calls.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: i64,
    pub email: String,
    pub role: String,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == policy::ROLE_ADMIN || self.role == policy::ROLE_SUPERADMIN
    }
}

/// The fixed subset of inbound headers actions may read.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextHeaders {
    #[serde(rename = "Content-Type")]
    pub content_type: Option<String>,
    #[serde(rename = "Referer")]
    pub referer: Option<String>,
    #[serde(rename = "User-Agent")]
    pub user_agent: Option<String>,
}

impl ContextHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
        };
        Self {
            content_type: get(header::CONTENT_TYPE),
            referer: get(header::REFERER),
            user_agent: get(header::USER_AGENT),
        }
    }
}

/// RequestContext
///
/// Normalized, immutable view of one inbound call. Built by the dispatcher, lent to
/// the action, and attached to any failure for diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub current_user: Option<CurrentUser>,
    pub body: Value,
    pub query: Map<String, Value>,
    pub params: Map<String, Value>,
    pub ip: Option<String>,
    #[serde(serialize_with = "serialize_method")]
    pub method: Method,
    pub url: String,
    pub headers: ContextHeaders,
}

fn serialize_method<S: Serializer>(method: &Method, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(method.as_str())
}

impl RequestContext {
    /// A context with no payload. Used as the starting point before the body is read.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            current_user: None,
            body: Value::Object(Map::new()),
            query: Map::new(),
            params: Map::new(),
            ip: None,
            method,
            url: url.into(),
            headers: ContextHeaders::default(),
        }
    }

    /// The authenticated principal, or an Authorization error for anonymous callers.
    pub fn require_user(&self) -> Result<&CurrentUser, AppError> {
        self.current_user
            .as_ref()
            .ok_or_else(|| AppError::forbidden("Access denied, authentication required."))
    }

    /// Deserializes the (already validated) body into a typed input.
    pub fn parse_body<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| AppError::validation(format!("Invalid 'body' payload: {e}")))
    }

    /// Reads a path parameter that the route table coerced to an integer.
    pub fn param_id(&self, name: &str) -> Result<i64, AppError> {
        self.params
            .get(name)
            .and_then(Value::as_i64)
            .ok_or_else(|| AppError::validation(format!("Invalid 'params.{name}' field.")))
    }

    pub fn body_is_empty(&self) -> bool {
        match &self.body {
            Value::Object(map) => map.is_empty(),
            Value::Null => true,
            _ => false,
        }
    }
}
