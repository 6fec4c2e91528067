//! Request validation.
//!
//! Field validators are registered as named [`SchemaRule`]s (see [`registry`]).
//! Actions bind them to request fields through [`RequestRule`]s and declare the
//! complete set per request part in [`ValidationRules`]. The dispatcher walks those
//! declarations with [`validate_part`] before an action runs.

use serde_json::{Map, Value};

use crate::error::AppError;

pub mod registry;

/// Outcome of applying a validator to a value.
///
/// Validators may answer with a plain pass/fail, with a failure description, or (when
/// they delegate to something that produces arbitrary JSON) with a value that is neither.
/// The last case is a bug in the rule and is reported as a server error.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Valid,
    Invalid,
    Reason(String),
    Unclassified(Value),
}

impl From<bool> for Verdict {
    fn from(ok: bool) -> Self {
        if ok { Verdict::Valid } else { Verdict::Invalid }
    }
}

impl From<String> for Verdict {
    fn from(reason: String) -> Self {
        Verdict::Reason(reason)
    }
}

impl From<&str> for Verdict {
    fn from(reason: &str) -> Self {
        Verdict::Reason(reason.to_owned())
    }
}

impl From<Value> for Verdict {
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(ok) => ok.into(),
            Value::String(reason) => Verdict::Reason(reason),
            other => Verdict::Unclassified(other),
        }
    }
}

pub type Validator = fn(&Value) -> Verdict;

/// A named field validator with its static, human-readable requirement.
#[derive(Debug)]
pub struct SchemaRule {
    pub name: &'static str,
    pub description: &'static str,
    pub validator: Validator,
}

/// Binds a schema rule to one request field.
#[derive(Debug, Clone, Copy)]
pub struct RequestRule {
    pub rule: &'static SchemaRule,
    pub required: bool,
}

impl RequestRule {
    pub fn new(rule: &'static SchemaRule, required: bool) -> Self {
        Self { rule, required }
    }

    pub fn required(rule: &'static SchemaRule) -> Self {
        Self::new(rule, true)
    }

    pub fn optional(rule: &'static SchemaRule) -> Self {
        Self::new(rule, false)
    }

    fn describe(&self) -> String {
        let flag = if self.required { "(required)" } else { "(optional)" };
        format!("{} {}", self.rule.description, flag)
    }
}

/// Every field one request part may carry, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct RequestSchema {
    fields: Vec<(&'static str, RequestRule)>,
}

impl RequestSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &'static str, rule: RequestRule) -> Self {
        self.fields.push((name, rule));
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = &(&'static str, RequestRule)> {
        self.fields.iter()
    }

    fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(field, _)| *field == name)
    }

    fn describe(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(name, rule)| (name.to_string(), Value::String(rule.describe())))
            .collect()
    }
}

/// The validation declaration of one action.
#[derive(Debug, Clone, Default)]
pub struct ValidationRules {
    pub query: Option<RequestSchema>,
    pub params: Option<RequestSchema>,
    pub body: Option<RequestSchema>,
    pub not_empty_body: bool,
}

impl ValidationRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, schema: RequestSchema) -> Self {
        self.query = Some(schema);
        self
    }

    pub fn params(mut self, schema: RequestSchema) -> Self {
        self.params = Some(schema);
        self
    }

    pub fn body(mut self, schema: RequestSchema) -> Self {
        self.body = Some(schema);
        self
    }

    pub fn not_empty_body(mut self) -> Self {
        self.not_empty_body = true;
        self
    }
}

/// validate_part
///
/// Checks one request part against its declared schema:
/// undeclared keys are rejected all at once, then each declared field is checked for
/// presence (when required) and run through its validator (when present).
pub fn validate_part(src: &Value, schema: &RequestSchema, title: &str) -> Result<(), AppError> {
    let Value::Object(src) = src else {
        return Err(AppError::validation(format!(
            "Invalid request validation payload. Only object allowed. Actual type: {}",
            json_type(src)
        )));
    };

    let extra: Vec<&str> = src
        .keys()
        .map(String::as_str)
        .filter(|key| !schema.contains(key))
        .collect();
    if !extra.is_empty() {
        return Err(AppError::validation(format!(
            "Extra keys found in '{title}' payload: [{}]",
            extra.join(",")
        )));
    }

    for (name, request_rule) in schema.fields() {
        match src.get(*name) {
            None if request_rule.required => {
                return Err(AppError::validation(format!(
                    "'{title}.{name}' field is required."
                )));
            }
            None => {}
            Some(value) => apply(request_rule.rule, value, &format!("{title}.{name}"))?,
        }
    }

    Ok(())
}

/// Runs a single rule against a value. Also used by entity constructors and setters.
pub fn check_field(rule: &SchemaRule, value: &Value) -> Result<(), AppError> {
    apply(rule, value, rule.name)
}

fn apply(rule: &SchemaRule, value: &Value, path: &str) -> Result<(), AppError> {
    match (rule.validator)(value) {
        Verdict::Valid => Ok(()),
        Verdict::Invalid => Err(AppError::validation(format!(
            "Invalid '{path}' field. Description: {}",
            rule.description
        ))),
        Verdict::Reason(reason) => Err(AppError::validation(format!(
            "Invalid '{path}' field. Description: {reason}"
        ))),
        Verdict::Unclassified(_) => Err(AppError::server(format!(
            "Invalid '{path}' field validation result. Validator should return boolean or string."
        ))),
    }
}

/// describe
///
/// Machine-readable description of an action's rules, one entry per declared field,
/// split by request part. Parts without rules are present and empty.
pub fn describe(rules: Option<&ValidationRules>) -> Value {
    let part = |schema: Option<&RequestSchema>| {
        Value::Object(schema.map(RequestSchema::describe).unwrap_or_default())
    };
    let (query, params, body) = match rules {
        Some(rules) => (
            part(rules.query.as_ref()),
            part(rules.params.as_ref()),
            part(rules.body.as_ref()),
        ),
        None => (part(None), part(None), part(None)),
    };
    serde_json::json!({ "query": query, "params": params, "body": body })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
