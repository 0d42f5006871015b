//! End-to-end tests for `ApiClient` against a mock dashboard API.

use std::sync::Arc;
use std::time::Duration;

use arbwatch_core::auth::SessionEvent;
use arbwatch_core::retry::{retry_with, RetryPolicy};
use arbwatch_core::{ApiClient, ApiError, ClientConfig, CredentialStore, MemoryCredentialStore, User};
use reqwest::Url;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::TryRecvError;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn config_for(server: &MockServer) -> ClientConfig {
    ClientConfig::new(&format!("{}/api", server.uri())).unwrap()
}

fn client_with_token(server: &MockServer, token: &str) -> (ApiClient, Arc<MemoryCredentialStore>) {
    let store = Arc::new(MemoryCredentialStore::with_token(token));
    let client = ApiClient::new(config_for(server), store.clone()).unwrap();
    (client, store)
}

fn user_body() -> Value {
    json!({"data": {"id": "u1", "name": "Ada", "email": "a@b.com"}})
}

#[tokio::test]
async fn test_login_then_refresh_and_replay_current_user() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({"email": "a@b.com", "password": "pw"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "tok1",
            "data": {"id": "u1", "email": "a@b.com"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .and(header("authorization", "Bearer tok1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "jwt expired"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "tok2"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .and(header("authorization", "Bearer tok2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::in_memory(config_for(&server)).unwrap();
    let mut events = client.subscribe();

    let login = client.login("a@b.com", "pw").await.unwrap();
    assert_eq!(login.access_token.as_deref(), Some("tok1"));
    assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedIn);

    let me = client.get_current_user().await.unwrap();
    let user: User = me.into_data().unwrap();
    assert_eq!(user.display_name(), "Ada");

    // The refreshed token replaced the login token
    assert_eq!(client.credentials().token().unwrap().as_deref(), Some("tok2"));
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_concurrent_unauthorized_requests_share_one_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/opportunities"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(5)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"accessToken": "fresh"}))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/opportunities"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [1, 2, 3]})))
        .expect(5)
        .mount(&server)
        .await;

    let (client, store) = client_with_token(&server, "stale");

    let requests = (0..5).map(|_| {
        let client = client.clone();
        async move { client.get::<Vec<u32>>("/opportunities").await }
    });
    let results = futures::future::join_all(requests).await;

    for result in results {
        assert_eq!(result.unwrap().into_data(), Some(vec![1, 2, 3]));
    }
    assert_eq!(store.token().unwrap().as_deref(), Some("fresh"));
    assert!(!client.is_refreshing().await);
}

#[tokio::test]
async fn test_second_unauthorized_after_replay_is_propagated() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "tok2"})))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _store) = client_with_token(&server, "tok1");

    let err = client.get_current_user().await.unwrap_err();
    assert_eq!(err, ApiError::Unauthorized);
}

#[tokio::test]
async fn test_failed_refresh_clears_credentials_and_rejects_all_waiters() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/positions"))
        .respond_with(ResponseTemplate::new(401))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": "refresh token revoked"}))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (client, store) = client_with_token(&server, "tok1");
    let mut events = client.subscribe();

    let requests = (0..3).map(|_| {
        let client = client.clone();
        async move { client.get::<Value>("/positions").await }
    });
    let results = futures::future::join_all(requests).await;

    for result in results {
        assert_eq!(result.unwrap_err(), ApiError::Unauthorized);
    }
    assert_eq!(store.token().unwrap(), None);
    assert!(!client.is_authenticated());

    // Exactly one expiry notification for the one failed refresh
    assert!(matches!(events.recv().await.unwrap(), SessionEvent::Expired { .. }));
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_refresh_without_token_in_body_is_a_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let (client, store) = client_with_token(&server, "tok1");

    let err = client.get_current_user().await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidResponse(_)));
    assert_eq!(store.token().unwrap(), None);
}

#[tokio::test]
async fn test_login_with_bad_password_does_not_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Invalid credentials"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = ApiClient::in_memory(config_for(&server)).unwrap();
    let mut events = client.subscribe();

    let err = client.login("a@b.com", "wrong").await.unwrap_err();
    assert_eq!(err, ApiError::Unauthorized);
    assert!(!client.is_authenticated());
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_register_stores_returned_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/register"))
        .and(body_json(json!({"name": "Ada", "email": "a@b.com", "password": "pw"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "accessToken": "new-user-token",
            "message": "Registration successful",
            "data": {"id": "u9", "name": "Ada", "email": "a@b.com"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::in_memory(config_for(&server)).unwrap();
    let response = client.register("Ada", "a@b.com", "pw").await.unwrap();

    assert_eq!(response.message.as_deref(), Some("Registration successful"));
    assert_eq!(
        client.credentials().token().unwrap().as_deref(),
        Some("new-user-token")
    );
}

#[tokio::test]
async fn test_register_validation_error_surfaces_server_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/register"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "Email already registered"})),
        )
        .mount(&server)
        .await;

    let client = ApiClient::in_memory(config_for(&server)).unwrap();
    let err = client.register("Ada", "a@b.com", "pw").await.unwrap_err();

    assert_eq!(err, ApiError::Validation("Email already registered".into()));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_csrf_cookie_is_sent_as_header() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/alerts"))
        .and(header("x-csrf-token", "csrf-abc"))
        .and(header("authorization", "Bearer tok1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"id": 7}})))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _store) = client_with_token(&server, "tok1");
    let url: Url = format!("{}/api/", server.uri()).parse().unwrap();
    client.cookie_jar().add_cookie_str("csrf_token=csrf-abc; Path=/", &url);

    let response = client
        .post::<Value, _>("/alerts", &json!({"pair": "ETH/USDC", "minSpread": 0.5}))
        .await
        .unwrap();
    assert_eq!(response.data, Some(json!({"id": 7})));
}

#[tokio::test]
async fn test_missing_csrf_cookie_omits_header() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/api/alerts/7"))
        .and(|req: &Request| !req.headers.contains_key("x-csrf-token"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _store) = client_with_token(&server, "tok1");
    let response = client.delete::<Value>("/alerts/7").await.unwrap();
    assert!(response.data.is_none());
}

#[tokio::test]
async fn test_timeout_is_not_treated_as_auth_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(&server).with_request_timeout(Duration::from_millis(200));
    let store = Arc::new(MemoryCredentialStore::with_token("tok1"));
    let client = ApiClient::new(config, store.clone()).unwrap();

    let err = client.get_current_user().await.unwrap_err();
    assert!(matches!(err, ApiError::Timeout(_)), "unexpected error: {:?}", err);
    assert!(err.is_retryable());
    assert_eq!(store.token().unwrap().as_deref(), Some("tok1"));
}

#[tokio::test]
async fn test_logout_clears_credentials_even_on_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let (client, store) = client_with_token(&server, "tok1");
    let mut events = client.subscribe();

    let err = client.logout().await.unwrap_err();
    assert!(matches!(err, ApiError::Server(_)));
    assert_eq!(store.token().unwrap(), None);
    assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedOut);
}

#[tokio::test]
async fn test_logout_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .and(header("authorization", "Bearer tok1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Logged out"})))
        .expect(1)
        .mount(&server)
        .await;

    let (client, store) = client_with_token(&server, "tok1");
    client.logout().await.unwrap();
    assert_eq!(store.token().unwrap(), None);
}

#[tokio::test]
async fn test_retry_composes_with_authenticated_calls() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_body()))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _store) = client_with_token(&server, "tok1");
    let policy = RetryPolicy::transient().with_delay(Duration::from_millis(10));

    let me = retry_with(policy, || client.get_current_user()).await.unwrap();
    assert_eq!(me.into_data().map(|u| u.id), Some("u1".to_string()));
}

#[tokio::test]
async fn test_retry_does_not_repeat_validation_errors() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/settings"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({"error": "Invalid threshold"})))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _store) = client_with_token(&server, "tok1");
    let policy = RetryPolicy::transient().with_delay(Duration::from_millis(10));

    let body = json!({"minSpreadBps": -1});
    let err = retry_with(policy, || client.put::<Value, _>("/settings", &body))
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::Validation("Invalid threshold".into()));
}

#[tokio::test]
async fn test_abandoned_refresh_still_completes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"accessToken": "fresh"}))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_body()))
        .expect(1)
        .mount(&server)
        .await;

    let (client, store) = client_with_token(&server, "stale");
    let mut events = client.subscribe();

    // The caller gives up while the refresh is still on the wire
    let abandoned = tokio::time::timeout(Duration::from_millis(100), client.get_current_user()).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert!(!client.is_refreshing().await);
    assert_eq!(store.token().unwrap().as_deref(), Some("fresh"));
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

    let me = client.get_current_user().await.unwrap();
    assert_eq!(me.into_data().map(|u| u.id), Some("u1".to_string()));
}

#[tokio::test]
async fn test_session_retry_policy_stops_after_failed_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let (client, store) = client_with_token(&server, "tok1");
    let mut events = client.subscribe();
    let policy = client.retry_policy().with_delay(Duration::from_millis(10));

    let err = retry_with(policy, || client.get_current_user())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Server(_)), "unexpected error: {:?}", err);
    assert_eq!(store.token().unwrap(), None);
    assert!(matches!(events.recv().await.unwrap(), SessionEvent::Expired { .. }));
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_absolute_url_path_is_rejected_before_sending() {
    let server = MockServer::start().await;
    let foreign = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&foreign)
        .await;

    let (client, _store) = client_with_token(&server, "tok1");
    let err = client
        .get::<Value>(&format!("{}/steal", foreign.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Validation(_)), "unexpected error: {:?}", err);
}
