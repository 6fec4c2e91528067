use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use super::{Action, ActionResult};
use crate::{
    AppState,
    auth::{check_password, verify_session},
    context::RequestContext,
    error::{AppError, AuthFailure},
    models::{Session, TokenPair},
    validation::{
        RequestRule, RequestSchema, ValidationRules,
        registry::{auth, user},
    },
};

/// Stores a new session. A user at the session cap loses all existing sessions first.
pub(crate) async fn add_session(state: &AppState, session: Session) -> Result<Session, AppError> {
    let count = state.repo.count_user_sessions(session.user_id).await?;
    if count >= state.config.max_sessions {
        tracing::info!(
            user_id = session.user_id,
            count,
            "session cap reached, wiping sessions"
        );
        state.repo.remove_user_sessions(session.user_id).await?;
    }
    state.repo.create_session(session).await
}

fn parse_refresh_token(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::validation("Invalid 'body.refreshToken' field."))
}

// --- Login ---

#[derive(Deserialize)]
struct LoginInput {
    email: String,
    password: String,
    fingerprint: String,
}

pub struct LoginAction {
    rules: ValidationRules,
}

impl LoginAction {
    pub fn new() -> Self {
        Self {
            rules: ValidationRules::new().body(
                RequestSchema::new()
                    .field("email", RequestRule::required(&user::EMAIL))
                    .field("password", RequestRule::required(&user::PASSWORD))
                    .field("fingerprint", RequestRule::required(&auth::FINGERPRINT)),
            ),
        }
    }
}

#[async_trait]
impl Action for LoginAction {
    fn name(&self) -> &'static str {
        "LoginAction"
    }

    fn access_tag(&self) -> &'static str {
        "auth:login"
    }

    fn validation_rules(&self) -> Option<&ValidationRules> {
        Some(&self.rules)
    }

    async fn run(&self, state: &AppState, ctx: &RequestContext) -> Result<ActionResult, AppError> {
        let input: LoginInput = ctx.parse_body()?;

        let invalid =
            || AppError::authentication(AuthFailure::InvalidCredentials, "Invalid credentials");
        let user = state
            .repo
            .find_user_by_email(&input.email)
            .await?
            .ok_or_else(invalid)?;
        check_password(&input.password, &user.password_hash)?;

        let session = Session::issue(
            user.id,
            ctx.ip.clone(),
            ctx.headers.user_agent.clone(),
            &input.fingerprint,
            state.config.refresh_token_ttl,
        )?;
        let session = add_session(state, session).await?;

        ActionResult::ok().data(TokenPair {
            access_token: state.tokens.make_access_token(&user)?,
            refresh_token: session.refresh_token.to_string(),
        })
    }
}

// --- Refresh tokens ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshTokensInput {
    refresh_token: String,
    fingerprint: String,
}

/// RefreshTokensAction
///
/// Rotates a refresh token. The old session is deleted before it is verified, so a
/// presented token is consumed even when verification fails: a second attempt with
/// the same token always ends in NotFound. Only the caller whose delete removed the
/// row may continue, which keeps concurrent refreshes of one token single-use.
pub struct RefreshTokensAction {
    rules: ValidationRules,
}

impl RefreshTokensAction {
    pub fn new() -> Self {
        Self {
            rules: ValidationRules::new().body(
                RequestSchema::new()
                    .field("refreshToken", RequestRule::required(&auth::REFRESH_TOKEN))
                    .field("fingerprint", RequestRule::required(&auth::FINGERPRINT)),
            ),
        }
    }
}

#[async_trait]
impl Action for RefreshTokensAction {
    fn name(&self) -> &'static str {
        "RefreshTokensAction"
    }

    fn access_tag(&self) -> &'static str {
        "auth:refresh-tokens"
    }

    fn validation_rules(&self) -> Option<&ValidationRules> {
        Some(&self.rules)
    }

    async fn run(&self, state: &AppState, ctx: &RequestContext) -> Result<ActionResult, AppError> {
        let input: RefreshTokensInput = ctx.parse_body()?;
        let token = parse_refresh_token(&input.refresh_token)?;

        let old_session = state.repo.get_session_by_refresh_token(token).await?;
        if state.repo.remove_session_by_refresh_token(token).await? == 0 {
            return Err(AppError::not_found("Session not found"));
        }
        verify_session(&old_session, &input.fingerprint)?;
        let user = state.repo.get_user(old_session.user_id).await?;

        let new_session = Session::issue(
            user.id,
            ctx.ip.clone(),
            ctx.headers.user_agent.clone(),
            &input.fingerprint,
            state.config.refresh_token_ttl,
        )?;
        let new_session = add_session(state, new_session).await?;

        ActionResult::ok().data(TokenPair {
            access_token: state.tokens.make_access_token(&user)?,
            refresh_token: new_session.refresh_token.to_string(),
        })
    }
}

// --- Logout ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogoutInput {
    refresh_token: String,
}

pub struct LogoutAction {
    rules: ValidationRules,
}

impl LogoutAction {
    pub fn new() -> Self {
        Self {
            rules: ValidationRules::new().body(
                RequestSchema::new()
                    .field("refreshToken", RequestRule::required(&auth::REFRESH_TOKEN)),
            ),
        }
    }
}

#[async_trait]
impl Action for LogoutAction {
    fn name(&self) -> &'static str {
        "LogoutAction"
    }

    fn access_tag(&self) -> &'static str {
        "auth:logout"
    }

    fn validation_rules(&self) -> Option<&ValidationRules> {
        Some(&self.rules)
    }

    async fn run(&self, state: &AppState, ctx: &RequestContext) -> Result<ActionResult, AppError> {
        let current_user = ctx.require_user()?;
        let input: LogoutInput = ctx.parse_body()?;
        let token = parse_refresh_token(&input.refresh_token)?;

        let session = state.repo.get_session_by_refresh_token(token).await?;
        if session.user_id != current_user.id {
            return Err(AppError::forbidden("Session belongs to another user."));
        }
        state.repo.remove_session_by_refresh_token(token).await?;

        Ok(ActionResult::ok().message("User is logged out from current session."))
    }
}

pub struct LogoutAllSessionsAction;

#[async_trait]
impl Action for LogoutAllSessionsAction {
    fn name(&self) -> &'static str {
        "LogoutAllSessionsAction"
    }

    fn access_tag(&self) -> &'static str {
        "auth:logout-all-sessions"
    }

    async fn run(&self, state: &AppState, ctx: &RequestContext) -> Result<ActionResult, AppError> {
        let current_user = ctx.require_user()?;
        let removed = state.repo.remove_user_sessions(current_user.id).await?;
        tracing::debug!(user_id = current_user.id, removed, "sessions wiped");

        Ok(ActionResult::ok().message("User is logged out from all sessions."))
    }
}
