use reqwest::Client;
use serde_json::json;
use topos_auth::{AuthClient, AuthError};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_get_user() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("Authorization", "Bearer user-token"))
        .and(header("apikey", "anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "user-1",
            "email": "Staff@Topos.example",
            "role": "authenticated",
            "aud": "authenticated"
        })))
        .mount(&mock_server)
        .await;

    let auth = AuthClient::new(&mock_server.uri(), "anon-key", Client::new());
    let user = auth.get_user("user-token").await.unwrap();

    assert_eq!(user.id, "user-1");
    assert_eq!(user.email.as_deref(), Some("Staff@Topos.example"));
}

#[tokio::test]
async fn test_get_user_rejected_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "code": 401,
            "msg": "invalid JWT"
        })))
        .mount(&mock_server)
        .await;

    let auth = AuthClient::new(&mock_server.uri(), "anon-key", Client::new());
    let err = auth.get_user("stale").await.unwrap_err();

    assert!(err.is_unauthorized());
}

#[test]
fn test_get_user_empty_token() {
    tokio_test::block_on(async {
        let auth = AuthClient::new("http://localhost:1", "anon-key", Client::new());
        assert!(matches!(
            auth.get_user("").await,
            Err(AuthError::MissingSession)
        ));
    });
}

#[tokio::test]
async fn test_sign_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .and(header("Authorization", "Bearer user-token"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let auth = AuthClient::new(&mock_server.uri(), "anon-key", Client::new());
    auth.sign_out("user-token").await.unwrap();
}

#[tokio::test]
async fn test_sign_out_expired_session_is_ok() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let auth = AuthClient::new(&mock_server.uri(), "anon-key", Client::new());
    assert!(auth.sign_out("expired").await.is_ok());
}
