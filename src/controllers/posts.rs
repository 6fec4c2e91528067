use axum::{Router, routing::get};

use super::Controller;
use crate::{
    AppState,
    actions::posts::{
        CreatePostAction, GetPostByIdAction, ListPostsAction, RemovePostAction, UpdatePostAction,
    },
    dispatcher::ActionRunner,
};

/// Post endpoints. Every `{id}` is coerced to an integer before the action sees it.
pub struct PostsController;

fn by_id(runner: ActionRunner) -> ActionRunner {
    runner.numeric_param("id")
}

impl Controller for PostsController {
    fn name(&self) -> &'static str {
        "PostsController"
    }

    fn router(&self) -> Router<AppState> {
        Router::new()
            .route(
                "/posts",
                get(ActionRunner::new(ListPostsAction::new()))
                    .post(ActionRunner::new(CreatePostAction::new())),
            )
            .route(
                "/posts/{id}",
                get(by_id(ActionRunner::new(GetPostByIdAction::new())))
                    .patch(by_id(ActionRunner::new(UpdatePostAction::new())))
                    .delete(by_id(ActionRunner::new(RemovePostAction::new()))),
            )
    }

    fn init(&self) {
        tracing::info!("{} initialized...", self.name());
    }
}
