use async_trait::async_trait;
use axum::http::StatusCode;
use serde::Deserialize;

use super::{Action, ActionResult, pagination};
use crate::{
    AppState,
    context::{CurrentUser, RequestContext},
    error::AppError,
    models::{NewPost, Post, PostPatch},
    validation::{
        RequestRule, RequestSchema, ValidationRules,
        registry::{common, post},
    },
};

fn id_params() -> RequestSchema {
    RequestSchema::new().field("id", RequestRule::required(&post::ID))
}

/// Only the author or an admin may modify a post.
fn ensure_owner(user: &CurrentUser, post: &Post) -> Result<(), AppError> {
    if user.is_admin() || post.user_id == user.id {
        Ok(())
    } else {
        Err(AppError::forbidden("Access denied, you are not the owner of this post."))
    }
}

pub struct ListPostsAction {
    rules: ValidationRules,
}

impl ListPostsAction {
    pub fn new() -> Self {
        Self {
            rules: ValidationRules::new().query(
                RequestSchema::new()
                    .field("page", RequestRule::optional(&common::PAGE))
                    .field("limit", RequestRule::optional(&common::LIMIT)),
            ),
        }
    }
}

#[async_trait]
impl Action for ListPostsAction {
    fn name(&self) -> &'static str {
        "ListPostsAction"
    }

    fn access_tag(&self) -> &'static str {
        "posts:list"
    }

    fn validation_rules(&self) -> Option<&ValidationRules> {
        Some(&self.rules)
    }

    async fn run(&self, state: &AppState, ctx: &RequestContext) -> Result<ActionResult, AppError> {
        let (page, limit) = pagination(ctx);
        let posts = state.repo.list_posts(page, limit, None).await?;
        ActionResult::ok().data(posts)
    }
}

pub struct GetPostByIdAction {
    rules: ValidationRules,
}

impl GetPostByIdAction {
    pub fn new() -> Self {
        Self {
            rules: ValidationRules::new().params(id_params()),
        }
    }
}

#[async_trait]
impl Action for GetPostByIdAction {
    fn name(&self) -> &'static str {
        "GetPostByIdAction"
    }

    fn access_tag(&self) -> &'static str {
        "posts:get-by-id"
    }

    fn validation_rules(&self) -> Option<&ValidationRules> {
        Some(&self.rules)
    }

    async fn run(&self, state: &AppState, ctx: &RequestContext) -> Result<ActionResult, AppError> {
        let post = state.repo.get_post(ctx.param_id("id")?).await?;
        ActionResult::ok().data(post)
    }
}

#[derive(Deserialize)]
struct CreatePostInput {
    title: String,
    content: String,
}

pub struct CreatePostAction {
    rules: ValidationRules,
}

impl CreatePostAction {
    pub fn new() -> Self {
        Self {
            rules: ValidationRules::new().not_empty_body().body(
                RequestSchema::new()
                    .field("title", RequestRule::required(&post::TITLE))
                    .field("content", RequestRule::required(&post::CONTENT)),
            ),
        }
    }
}

#[async_trait]
impl Action for CreatePostAction {
    fn name(&self) -> &'static str {
        "CreatePostAction"
    }

    fn access_tag(&self) -> &'static str {
        "posts:create"
    }

    fn validation_rules(&self) -> Option<&ValidationRules> {
        Some(&self.rules)
    }

    async fn run(&self, state: &AppState, ctx: &RequestContext) -> Result<ActionResult, AppError> {
        let current_user = ctx.require_user()?;
        let input: CreatePostInput = ctx.parse_body()?;

        let new_post = NewPost::new(current_user.id, &input.title, &input.content)?;
        let post = state.repo.create_post(new_post).await?;
        ActionResult::ok().status(StatusCode::CREATED).data(post)
    }
}

#[derive(Deserialize)]
struct UpdatePostInput {
    title: Option<String>,
    content: Option<String>,
}

pub struct UpdatePostAction {
    rules: ValidationRules,
}

impl UpdatePostAction {
    pub fn new() -> Self {
        Self {
            rules: ValidationRules::new()
                .not_empty_body()
                .params(id_params())
                .body(
                    RequestSchema::new()
                        .field("title", RequestRule::optional(&post::TITLE))
                        .field("content", RequestRule::optional(&post::CONTENT)),
                ),
        }
    }
}

#[async_trait]
impl Action for UpdatePostAction {
    fn name(&self) -> &'static str {
        "UpdatePostAction"
    }

    fn access_tag(&self) -> &'static str {
        "posts:update"
    }

    fn validation_rules(&self) -> Option<&ValidationRules> {
        Some(&self.rules)
    }

    async fn run(&self, state: &AppState, ctx: &RequestContext) -> Result<ActionResult, AppError> {
        let current_user = ctx.require_user()?;
        let input: UpdatePostInput = ctx.parse_body()?;

        let post = state.repo.get_post(ctx.param_id("id")?).await?;
        ensure_owner(current_user, &post)?;

        let patch = PostPatch {
            title: input.title,
            content: input.content,
        };
        let post = state.repo.update_post(post.id, patch).await?;
        ActionResult::ok().data(post)
    }
}

pub struct RemovePostAction {
    rules: ValidationRules,
}

impl RemovePostAction {
    pub fn new() -> Self {
        Self {
            rules: ValidationRules::new().params(id_params()),
        }
    }
}

#[async_trait]
impl Action for RemovePostAction {
    fn name(&self) -> &'static str {
        "RemovePostAction"
    }

    fn access_tag(&self) -> &'static str {
        "posts:remove"
    }

    fn validation_rules(&self) -> Option<&ValidationRules> {
        Some(&self.rules)
    }

    async fn run(&self, state: &AppState, ctx: &RequestContext) -> Result<ActionResult, AppError> {
        let current_user = ctx.require_user()?;

        let post = state.repo.get_post(ctx.param_id("id")?).await?;
        ensure_owner(current_user, &post)?;
        state.repo.remove_post(post.id).await?;

        Ok(ActionResult::ok().message(format!("Post with id {} was removed", post.id)))
    }
}
