// Integration tests for bearer-client
//
// These run the reqwest transport against a local mockito server, covering
// token acquisition, refresh, retry and error surfacing over real HTTP.

use std::time::Duration;

use bearer_client::{ApiClient, ClientConfig, ClientError, Credentials};
use mockito::{Matcher, Server};
use serde_json::{json, Value};

// ==================================================================================================
// Test Helpers
// ==================================================================================================

fn test_client(server: &Server) -> ApiClient {
    let config = ClientConfig::new(
        &server.url(),
        Credentials::new("client-1", "s3cret").expect("valid credentials"),
    )
    .expect("valid config")
    .with_max_retries(3)
    .with_backoff(Duration::from_millis(1), Duration::from_millis(10))
    .with_request_timeout(Duration::from_secs(5));

    ApiClient::new(config).expect("Failed to create client")
}

fn token_body(access: &str, refresh: &str) -> String {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": 3600,
        "token_type": "Bearer"
    })
    .to_string()
}

// ==================================================================================================
// Request Flows
// ==================================================================================================

#[tokio::test]
async fn test_valid_credentials_return_body() {
    let mut server = Server::new_async().await;

    let token_mock = server
        .mock("POST", "/oauth/token")
        .match_header("content-type", "application/x-www-form-urlencoded")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("grant_type=client_credentials".to_string()),
            Matcher::Regex("client_id=client-1".to_string()),
            Matcher::Regex("client_secret=s3cret".to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("tok-1", "ref-1"))
        .expect(1)
        .create_async()
        .await;

    let api_mock = server
        .mock("GET", "/status")
        .match_header("authorization", "Bearer tok-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok":true}"#)
        .expect(1)
        .create_async()
        .await;

    let client = test_client(&server);
    let response = client.send(client.get("/status").unwrap()).await.unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().unwrap();
    assert_eq!(body, json!({"ok": true}));

    token_mock.assert_async().await;
    api_mock.assert_async().await;
}

#[tokio::test]
async fn test_rejected_token_is_refreshed() {
    let mut server = Server::new_async().await;

    let acquire_mock = server
        .mock("POST", "/oauth/token")
        .match_body(Matcher::Regex("grant_type=client_credentials".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("tok-old", "ref-1"))
        .expect(1)
        .create_async()
        .await;

    let refresh_mock = server
        .mock("POST", "/oauth/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("grant_type=refresh_token".to_string()),
            Matcher::Regex("refresh_token=ref-1".to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("tok-new", "ref-2"))
        .expect(1)
        .create_async()
        .await;

    let rejected_mock = server
        .mock("GET", "/me")
        .match_header("authorization", "Bearer tok-old")
        .with_status(401)
        .with_body(r#"{"error":"token_expired"}"#)
        .expect(1)
        .create_async()
        .await;

    let accepted_mock = server
        .mock("GET", "/me")
        .match_header("authorization", "Bearer tok-new")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"user":"client-1"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = test_client(&server);
    let response = client.send(client.get("/me").unwrap()).await.unwrap();

    assert_eq!(response.text(), r#"{"user":"client-1"}"#);
    let token = client.current_token().await.unwrap();
    assert_eq!(token.access_token, "tok-new");

    acquire_mock.assert_async().await;
    refresh_mock.assert_async().await;
    rejected_mock.assert_async().await;
    accepted_mock.assert_async().await;
}

#[tokio::test]
async fn test_rejected_credentials_surface_authentication_failed() {
    let mut server = Server::new_async().await;

    server
        .mock("POST", "/oauth/token")
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":"invalid_client"}"#)
        .create_async()
        .await;

    let api_mock = server
        .mock("GET", "/status")
        .with_status(200)
        .expect(0)
        .create_async()
        .await;

    let client = test_client(&server);
    let err = client
        .send(client.get("/status").unwrap())
        .await
        .unwrap_err();

    match err {
        ClientError::AuthenticationFailed(msg) => assert!(msg.contains("invalid_client")),
        other => panic!("unexpected error: {:?}", other),
    }
    api_mock.assert_async().await;
}

#[tokio::test]
async fn test_server_errors_exhaust_retry_cap() {
    let mut server = Server::new_async().await;

    server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("tok-1", "ref-1"))
        .create_async()
        .await;

    let api_mock = server
        .mock("GET", "/flaky")
        .with_status(500)
        .with_body("internal error")
        .expect(4)
        .create_async()
        .await;

    let client = test_client(&server);
    let err = client
        .send(client.get("/flaky").unwrap())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ClientError::TransportFailed {
            attempts: 4,
            status: Some(500),
            ..
        }
    ));
    api_mock.assert_async().await;
}

#[tokio::test]
async fn test_bad_request_is_not_retried() {
    let mut server = Server::new_async().await;

    server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("tok-1", "ref-1"))
        .create_async()
        .await;

    let api_mock = server
        .mock("POST", "/items")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({"name": ""})))
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":"bad"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = test_client(&server);
    let request = client
        .post("/items")
        .unwrap()
        .json(&json!({"name": ""}))
        .unwrap();
    let err = client.send(request).await.unwrap_err();

    match err {
        ClientError::RequestFailed {
            status, message, ..
        } => {
            assert_eq!(status, 400);
            assert_eq!(message, "bad");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    api_mock.assert_async().await;
}

#[tokio::test]
async fn test_rate_limit_is_retried_then_surfaced() {
    let mut server = Server::new_async().await;

    server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("tok-1", "ref-1"))
        .create_async()
        .await;

    let api_mock = server
        .mock("GET", "/limited")
        .with_status(429)
        .with_header("retry-after", "0")
        .with_body(r#"{"error":"rate_limited"}"#)
        .expect(2)
        .create_async()
        .await;

    let config = test_client(&server).config().clone().with_max_retries(1);
    let client = ApiClient::new(config).unwrap();
    let err = client
        .send(client.get("/limited").unwrap())
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(429));
    assert!(err.is_retryable());
    api_mock.assert_async().await;
}

#[tokio::test]
async fn test_scope_and_resource_are_sent() {
    let mut server = Server::new_async().await;

    let token_mock = server
        .mock("POST", "/oauth/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("scope=read\\+write".to_string()),
            Matcher::Regex("resource=".to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("tok-1", "ref-1"))
        .expect(1)
        .create_async()
        .await;

    server
        .mock("GET", "/status")
        .with_status(204)
        .create_async()
        .await;

    let config = test_client(&server)
        .config()
        .clone()
        .with_scope("read write")
        .with_resource("https://api.example.com");
    let client = ApiClient::new(config).unwrap();

    let response = client.send(client.get("/status").unwrap()).await.unwrap();
    assert_eq!(response.status().as_u16(), 204);
    token_mock.assert_async().await;
}
