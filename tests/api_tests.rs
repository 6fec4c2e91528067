use serde_json::{Value, json};
use std::{net::SocketAddr, sync::Arc};
use supra_api::{AppConfig, AppState, InMemoryRepository, RepositoryState, create_router};
use tokio::net::TcpListener;

#[derive(Debug)]
pub struct TestApp {
    pub address: String,
}

async fn spawn_app() -> TestApp {
    let repo = Arc::new(InMemoryRepository::new()) as RepositoryState;
    let state = AppState::new(repo, AppConfig::default()).expect("Failed to build state");
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestApp { address }
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("req fail");
    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let app = spawn_app().await;
    let response = reqwest::get(format!("{}/posts", app.address))
        .await
        .expect("req fail");
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_register_login_and_read_profile() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/users", app.address))
        .json(&json!({
            "name": "John Doe",
            "username": "john_doe",
            "email": "john@example.com",
            "password": "secret-password"
        }))
        .send()
        .await
        .expect("req fail");
    assert_eq!(response.status().as_u16(), 201);

    let login: Value = client
        .post(format!("{}/auth/login", app.address))
        .header("User-Agent", "api-tests")
        .json(&json!({
            "email": "john@example.com",
            "password": "secret-password",
            "fingerprint": "fingerprint-abc-123"
        }))
        .send()
        .await
        .expect("req fail")
        .json()
        .await
        .unwrap();
    let access = login["data"]["accessToken"].as_str().unwrap();

    let profile: Value = client
        .get(format!("{}/users/current", app.address))
        .bearer_auth(access)
        .send()
        .await
        .expect("req fail")
        .json()
        .await
        .unwrap();
    assert_eq!(profile["data"]["username"], "john_doe");
}

#[tokio::test]
async fn test_error_meta_reports_client_ip() {
    let app = spawn_app().await;
    let body: Value = reqwest::get(format!("{}/users/999", app.address))
        .await
        .expect("req fail")
        .json()
        .await
        .unwrap();

    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(body["meta"]["request"]["ip"], "127.0.0.1");
}
