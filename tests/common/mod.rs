#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use std::sync::Arc;
use supra_api::{
    AppConfig, AppState, InMemoryRepository, RepositoryState, auth::hash_password, create_router,
    models::{NewUser, User},
    policy,
};
use tower::ServiceExt;

pub const PASSWORD: &str = "secret-password";
pub const FINGERPRINT: &str = "fingerprint-abc-123";

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let repo = Arc::new(InMemoryRepository::new()) as RepositoryState;
        Self::with_repo(repo, config)
    }

    pub fn with_repo(repo: RepositoryState, config: AppConfig) -> Self {
        let state = AppState::new(repo, config).expect("test state");
        let router = create_router(state.clone());
        Self { state, router }
    }

    /// Sends one request through the full router and decodes the JSON answer.
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    /// Inserts a user straight into the repository.
    pub async fn seed_user(&self, username: &str, email: &str, role: &str) -> User {
        let hash = hash_password(PASSWORD, self.state.config.bcrypt_cost).unwrap();
        let mut new_user = NewUser::new("Test User", username, email, hash).unwrap();
        new_user.role = role.to_string();
        self.state.repo.create_user(new_user).await.unwrap()
    }

    pub async fn seed_member(&self, username: &str, email: &str) -> (User, String) {
        let user = self.seed_user(username, email, policy::ROLE_USER).await;
        let token = self.state.tokens.make_access_token(&user).unwrap();
        (user, token)
    }

    pub async fn seed_admin(&self, username: &str, email: &str) -> (User, String) {
        let user = self.seed_user(username, email, policy::ROLE_ADMIN).await;
        let token = self.state.tokens.make_access_token(&user).unwrap();
        (user, token)
    }

    /// Logs in through the API and returns `(accessToken, refreshToken)`.
    pub async fn login(&self, email: &str) -> (String, String) {
        let (status, json) = self
            .call(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "email": email, "password": PASSWORD, "fingerprint": FINGERPRINT })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {json}");
        (
            json["data"]["accessToken"].as_str().unwrap().to_string(),
            json["data"]["refreshToken"].as_str().unwrap().to_string(),
        )
    }

    pub async fn refresh(&self, refresh_token: &str, fingerprint: &str) -> (StatusCode, Value) {
        self.call(
            Method::POST,
            "/auth/refresh-tokens",
            None,
            Some(json!({ "refreshToken": refresh_token, "fingerprint": fingerprint })),
        )
        .await
    }
}
