//! Named field validators, grouped by the entity that owns the field.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

use super::{SchemaRule, Verdict};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"));
static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]{3,50}$").expect("username regex"));

fn str_len(value: &Value, min: usize, max: usize) -> bool {
    value
        .as_str()
        .map(|s| (min..=max).contains(&s.chars().count()))
        .unwrap_or(false)
}

/// Accepts JSON integers and their decimal string form (query strings carry no types).
fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub mod common {
    use super::*;

    pub const MAX_PAGE: i64 = 1_000_000;

    pub static PAGE: SchemaRule = SchemaRule {
        name: "page",
        description: "Number; min 0, max 1000000",
        validator: |v| as_int(v).is_some_and(|n| (0..=MAX_PAGE).contains(&n)).into(),
    };

    pub static LIMIT: SchemaRule = SchemaRule {
        name: "limit",
        description: "Number; one of: [10, 20, 50, 100]",
        validator: |v| as_int(v).is_some_and(|n| [10, 20, 50, 100].contains(&n)).into(),
    };
}

pub mod user {
    use super::*;
    use crate::policy;

    pub static ID: SchemaRule = SchemaRule {
        name: "user.id",
        description: "Number; min 1",
        validator: |v| v.as_i64().is_some_and(|n| n >= 1).into(),
    };

    pub static NAME: SchemaRule = SchemaRule {
        name: "user.name",
        description: "String; min 3, max 50 chars",
        validator: |v| str_len(v, 3, 50).into(),
    };

    pub static USERNAME: SchemaRule = SchemaRule {
        name: "user.username",
        description: "String; 3-50 chars of letters, digits, '_', '.', '-'",
        validator: |v| v.as_str().is_some_and(|s| USERNAME_RE.is_match(s)).into(),
    };

    pub static EMAIL: SchemaRule = SchemaRule {
        name: "user.email",
        description: "String; email; max 50 chars",
        validator: |v| match v.as_str() {
            None => Verdict::Invalid,
            Some(s) if s.chars().count() > 50 => "Email is too long, max 50 chars".into(),
            Some(s) => EMAIL_RE.is_match(s).into(),
        },
    };

    pub static PASSWORD: SchemaRule = SchemaRule {
        name: "user.password",
        description: "String; min 8, max 100 chars",
        validator: |v| str_len(v, 8, 100).into(),
    };

    pub static ROLE: SchemaRule = SchemaRule {
        name: "user.role",
        description: "String; one of the known roles",
        validator: |v| v.as_str().is_some_and(|s| policy::ROLES.contains(&s)).into(),
    };
}

pub mod auth {
    use super::*;

    pub static REFRESH_TOKEN: SchemaRule = SchemaRule {
        name: "auth.refreshToken",
        description: "String; UUID v4",
        validator: |v| v.as_str().is_some_and(|s| Uuid::parse_str(s).is_ok()).into(),
    };

    pub static FINGERPRINT: SchemaRule = SchemaRule {
        name: "auth.fingerprint",
        description: "String; min 10, max 100 chars",
        validator: |v| str_len(v, 10, 100).into(),
    };
}

pub mod post {
    use super::*;

    pub static ID: SchemaRule = SchemaRule {
        name: "post.id",
        description: "Number; min 1",
        validator: |v| v.as_i64().is_some_and(|n| n >= 1).into(),
    };

    pub static TITLE: SchemaRule = SchemaRule {
        name: "post.title",
        description: "String; min 3, max 100 chars",
        validator: |v| str_len(v, 3, 100).into(),
    };

    pub static CONTENT: SchemaRule = SchemaRule {
        name: "post.content",
        description: "String; min 3, max 5000 chars",
        validator: |v| str_len(v, 3, 5000).into(),
    };
}

static ALL: [&SchemaRule; 13] = [
    &common::PAGE,
    &common::LIMIT,
    &user::ID,
    &user::NAME,
    &user::USERNAME,
    &user::EMAIL,
    &user::PASSWORD,
    &user::ROLE,
    &auth::REFRESH_TOKEN,
    &auth::FINGERPRINT,
    &post::ID,
    &post::TITLE,
    &post::CONTENT,
];

/// Resolves a registered rule by name, e.g. `"user.email"`.
pub fn lookup(name: &str) -> Option<&'static SchemaRule> {
    ALL.iter().copied().find(|rule| rule.name == name)
}
