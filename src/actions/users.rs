use async_trait::async_trait;
use axum::http::StatusCode;
use serde::Deserialize;

use super::{Action, ActionResult, pagination};
use crate::{
    AppState,
    auth::{check_password, hash_password},
    context::RequestContext,
    error::AppError,
    models::{NewUser, UserPatch},
    validation::{
        RequestRule, RequestSchema, ValidationRules,
        registry::{common, user},
    },
};

fn page_query() -> RequestSchema {
    RequestSchema::new()
        .field("page", RequestRule::optional(&common::PAGE))
        .field("limit", RequestRule::optional(&common::LIMIT))
}

fn id_params() -> RequestSchema {
    RequestSchema::new().field("id", RequestRule::required(&user::ID))
}

// --- Reads ---

pub struct ListUsersAction {
    rules: ValidationRules,
}

impl ListUsersAction {
    pub fn new() -> Self {
        Self {
            rules: ValidationRules::new().query(page_query()),
        }
    }
}

#[async_trait]
impl Action for ListUsersAction {
    fn name(&self) -> &'static str {
        "ListUsersAction"
    }

    fn access_tag(&self) -> &'static str {
        "users:list"
    }

    fn validation_rules(&self) -> Option<&ValidationRules> {
        Some(&self.rules)
    }

    async fn run(&self, state: &AppState, ctx: &RequestContext) -> Result<ActionResult, AppError> {
        let (page, limit) = pagination(ctx);
        let users = state.repo.list_users(page, limit).await?;
        ActionResult::ok().data(users)
    }
}

pub struct GetUserByIdAction {
    rules: ValidationRules,
}

impl GetUserByIdAction {
    pub fn new() -> Self {
        Self {
            rules: ValidationRules::new().params(id_params()),
        }
    }
}

#[async_trait]
impl Action for GetUserByIdAction {
    fn name(&self) -> &'static str {
        "GetUserByIdAction"
    }

    fn access_tag(&self) -> &'static str {
        "users:get-by-id"
    }

    fn validation_rules(&self) -> Option<&ValidationRules> {
        Some(&self.rules)
    }

    async fn run(&self, state: &AppState, ctx: &RequestContext) -> Result<ActionResult, AppError> {
        let user = state.repo.get_user(ctx.param_id("id")?).await?;
        ActionResult::ok().data(user)
    }
}

pub struct GetCurrentUserAction;

#[async_trait]
impl Action for GetCurrentUserAction {
    fn name(&self) -> &'static str {
        "GetCurrentUserAction"
    }

    fn access_tag(&self) -> &'static str {
        "users:current"
    }

    async fn run(&self, state: &AppState, ctx: &RequestContext) -> Result<ActionResult, AppError> {
        let current_user = ctx.require_user()?;
        let user = state.repo.get_user(current_user.id).await?;
        ActionResult::ok().data(user)
    }
}

pub struct GetPostsByUserIdAction {
    rules: ValidationRules,
}

impl GetPostsByUserIdAction {
    pub fn new() -> Self {
        Self {
            rules: ValidationRules::new()
                .params(id_params())
                .query(page_query()),
        }
    }
}

#[async_trait]
impl Action for GetPostsByUserIdAction {
    fn name(&self) -> &'static str {
        "GetPostsByUserIdAction"
    }

    fn access_tag(&self) -> &'static str {
        "users:get-posts-by-user-id"
    }

    fn validation_rules(&self) -> Option<&ValidationRules> {
        Some(&self.rules)
    }

    async fn run(&self, state: &AppState, ctx: &RequestContext) -> Result<ActionResult, AppError> {
        let user = state.repo.get_user(ctx.param_id("id")?).await?;
        let (page, limit) = pagination(ctx);
        let posts = state.repo.list_posts(page, limit, Some(user.id)).await?;
        ActionResult::ok().data(posts)
    }
}

// --- Writes ---

#[derive(Deserialize)]
struct CreateUserInput {
    name: String,
    username: String,
    email: String,
    password: String,
}

pub struct CreateUserAction {
    rules: ValidationRules,
}

impl CreateUserAction {
    pub fn new() -> Self {
        Self {
            rules: ValidationRules::new().not_empty_body().body(
                RequestSchema::new()
                    .field("name", RequestRule::required(&user::NAME))
                    .field("username", RequestRule::required(&user::USERNAME))
                    .field("email", RequestRule::required(&user::EMAIL))
                    .field("password", RequestRule::required(&user::PASSWORD)),
            ),
        }
    }
}

#[async_trait]
impl Action for CreateUserAction {
    fn name(&self) -> &'static str {
        "CreateUserAction"
    }

    fn access_tag(&self) -> &'static str {
        "users:create"
    }

    fn validation_rules(&self) -> Option<&ValidationRules> {
        Some(&self.rules)
    }

    async fn run(&self, state: &AppState, ctx: &RequestContext) -> Result<ActionResult, AppError> {
        let input: CreateUserInput = ctx.parse_body()?;

        if state.repo.is_email_taken(&input.email).await? {
            return Err(AppError::EmailAlreadyTaken);
        }
        let password_hash = hash_password(&input.password, state.config.bcrypt_cost)?;
        let new_user = NewUser::new(&input.name, &input.username, &input.email, password_hash)?;
        let user = state.repo.create_user(new_user).await?;

        ActionResult::ok().status(StatusCode::CREATED).data(user)
    }
}

#[derive(Deserialize)]
struct UpdateUserInput {
    name: Option<String>,
    username: Option<String>,
}

/// Updates the caller's own profile.
pub struct UpdateUserAction {
    rules: ValidationRules,
}

impl UpdateUserAction {
    pub fn new() -> Self {
        Self {
            rules: ValidationRules::new().not_empty_body().body(
                RequestSchema::new()
                    .field("name", RequestRule::optional(&user::NAME))
                    .field("username", RequestRule::optional(&user::USERNAME)),
            ),
        }
    }
}

#[async_trait]
impl Action for UpdateUserAction {
    fn name(&self) -> &'static str {
        "UpdateUserAction"
    }

    fn access_tag(&self) -> &'static str {
        "users:update"
    }

    fn validation_rules(&self) -> Option<&ValidationRules> {
        Some(&self.rules)
    }

    async fn run(&self, state: &AppState, ctx: &RequestContext) -> Result<ActionResult, AppError> {
        let current_user = ctx.require_user()?;
        let input: UpdateUserInput = ctx.parse_body()?;

        let mut user = state.repo.get_user(current_user.id).await?;
        let name = match input.name {
            Some(name) => {
                user.set_name(&name)?;
                Some(user.name)
            }
            None => None,
        };
        let patch = UserPatch {
            name,
            username: input.username,
            ..UserPatch::default()
        };
        let user = state.repo.update_user(current_user.id, patch).await?;
        ActionResult::ok().data(user)
    }
}

pub struct RemoveUserAction {
    rules: ValidationRules,
}

impl RemoveUserAction {
    pub fn new() -> Self {
        Self {
            rules: ValidationRules::new().params(id_params()),
        }
    }
}

#[async_trait]
impl Action for RemoveUserAction {
    fn name(&self) -> &'static str {
        "RemoveUserAction"
    }

    fn access_tag(&self) -> &'static str {
        "users:remove"
    }

    fn validation_rules(&self) -> Option<&ValidationRules> {
        Some(&self.rules)
    }

    async fn run(&self, state: &AppState, ctx: &RequestContext) -> Result<ActionResult, AppError> {
        let id = ctx.param_id("id")?;
        state.repo.remove_user(id).await?;
        Ok(ActionResult::ok().message(format!("User with id {id} was removed")))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordInput {
    old_password: String,
    new_password: String,
}

/// Changes the caller's password and signs out every session.
pub struct ChangePasswordAction {
    rules: ValidationRules,
}

impl ChangePasswordAction {
    pub fn new() -> Self {
        Self {
            rules: ValidationRules::new().body(
                RequestSchema::new()
                    .field("oldPassword", RequestRule::required(&user::PASSWORD))
                    .field("newPassword", RequestRule::required(&user::PASSWORD)),
            ),
        }
    }
}

#[async_trait]
impl Action for ChangePasswordAction {
    fn name(&self) -> &'static str {
        "ChangePasswordAction"
    }

    fn access_tag(&self) -> &'static str {
        "users:change-password"
    }

    fn validation_rules(&self) -> Option<&ValidationRules> {
        Some(&self.rules)
    }

    async fn run(&self, state: &AppState, ctx: &RequestContext) -> Result<ActionResult, AppError> {
        let current_user = ctx.require_user()?;
        let input: ChangePasswordInput = ctx.parse_body()?;

        let user = state.repo.get_user(current_user.id).await?;
        check_password(&input.old_password, &user.password_hash)?;

        let patch = UserPatch {
            password_hash: Some(hash_password(&input.new_password, state.config.bcrypt_cost)?),
            ..UserPatch::default()
        };
        state.repo.update_user(user.id, patch).await?;
        state.repo.remove_user_sessions(user.id).await?;

        Ok(ActionResult::ok().message("Password changed"))
    }
}

#[derive(Deserialize)]
struct ChangeEmailInput {
    email: String,
}

/// ChangeEmailAction
///
/// Moves the caller to a new email and marks it unconfirmed. The uniqueness check and
/// the update are two storage calls; the unique constraint on `users.email` settles
/// a concurrent race.
pub struct ChangeEmailAction {
    rules: ValidationRules,
}

impl ChangeEmailAction {
    pub fn new() -> Self {
        Self {
            rules: ValidationRules::new()
                .body(RequestSchema::new().field("email", RequestRule::required(&user::EMAIL))),
        }
    }
}

#[async_trait]
impl Action for ChangeEmailAction {
    fn name(&self) -> &'static str {
        "ChangeEmailAction"
    }

    fn access_tag(&self) -> &'static str {
        "users:change-email"
    }

    fn validation_rules(&self) -> Option<&ValidationRules> {
        Some(&self.rules)
    }

    async fn run(&self, state: &AppState, ctx: &RequestContext) -> Result<ActionResult, AppError> {
        let current_user = ctx.require_user()?;
        let input: ChangeEmailInput = ctx.parse_body()?;

        if state.repo.is_email_taken(&input.email).await? {
            return Err(AppError::EmailAlreadyTaken);
        }

        let mut user = state.repo.get_user(current_user.id).await?;
        user.set_email(&input.email)?;
        let patch = UserPatch {
            email: Some(user.email),
            is_email_confirmed: Some(user.is_email_confirmed),
            ..UserPatch::default()
        };
        state.repo.update_user(current_user.id, patch).await?;

        Ok(ActionResult::ok().message(format!("Email was changed to {}!", input.email)))
    }
}
