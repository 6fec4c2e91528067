use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::AppError,
    policy,
    validation::{
        SchemaRule, check_field,
        registry::{auth, post, user},
    },
};

fn check_str(rule: &SchemaRule, value: &str) -> Result<(), AppError> {
    check_field(rule, &Value::String(value.to_owned()))
}

// --- Users ---

/// User
///
/// Canonical user record from the `users` table. The password hash is loaded for
/// credential checks but never serialized.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub username: String,
    pub email: String,
    // RBAC field, one of `policy::ROLES`.
    pub role: String,
    #[serde(skip_serializing, default)]
    #[ts(skip)]
    #[schema(ignore)]
    pub password_hash: String,
    pub is_email_confirmed: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Changes the email, re-running its validator and resetting confirmation.
    pub fn set_email(&mut self, email: &str) -> Result<(), AppError> {
        check_str(&user::EMAIL, email)?;
        self.email = email.to_owned();
        self.is_email_confirmed = false;
        Ok(())
    }

    pub fn set_name(&mut self, name: &str) -> Result<(), AppError> {
        check_str(&user::NAME, name)?;
        self.name = name.to_owned();
        Ok(())
    }
}

/// Insert payload for a user. Only constructible through [`NewUser::new`], which
/// validates every field.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub password_hash: String,
}

impl NewUser {
    pub fn new(
        name: &str,
        username: &str,
        email: &str,
        password_hash: String,
    ) -> Result<Self, AppError> {
        check_str(&user::NAME, name)?;
        check_str(&user::USERNAME, username)?;
        check_str(&user::EMAIL, email)?;
        Ok(Self {
            name: name.to_owned(),
            username: username.to_owned(),
            email: email.to_owned(),
            role: policy::ROLE_USER.to_owned(),
            password_hash,
        })
    }
}

/// Partial update of a user. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub is_email_confirmed: Option<bool>,
    pub password_hash: Option<String>,
}

// --- Posts ---

/// Post
///
/// A user-authored post from the `posts` table.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Post {
    pub id: i64,
    // FK to users.id (owner).
    pub user_id: i64,
    pub title: String,
    pub content: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: i64,
    pub title: String,
    pub content: String,
}

impl NewPost {
    pub fn new(user_id: i64, title: &str, content: &str) -> Result<Self, AppError> {
        check_str(&post::TITLE, title)?;
        check_str(&post::CONTENT, content)?;
        Ok(Self {
            user_id,
            title: title.to_owned(),
            content: content.to_owned(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PostPatch {
    pub title: Option<String>,
    pub content: Option<String>,
}

// --- Sessions ---

/// Session
///
/// A refresh session bound to one user and one client fingerprint.
/// The refresh token is single-use: it is consumed on refresh and logout.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub user_id: i64,
    pub refresh_token: Uuid,
    pub fingerprint: String,
    pub ip: Option<String>,
    pub ua: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Mints a new session with a fresh refresh token, valid for `ttl_secs`.
    pub fn issue(
        user_id: i64,
        ip: Option<String>,
        ua: Option<String>,
        fingerprint: &str,
        ttl_secs: i64,
    ) -> Result<Self, AppError> {
        check_str(&auth::FINGERPRINT, fingerprint)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            refresh_token: Uuid::new_v4(),
            fingerprint: fingerprint.to_owned(),
            ip,
            ua,
            expires_at: now + Duration::seconds(ttl_secs),
            created_at: now,
        })
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

// --- Action payloads (output schemas) ---

/// TokenPair
///
/// Returned by login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}
