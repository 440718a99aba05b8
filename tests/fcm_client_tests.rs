use member_push_ws::notifications::{FcmMessage, PushClient, PushError};
use member_push_ws::notifications::builder::FcmNotification;
use member_push_ws::services::{Credentials, FcmClient};
use serde_json::json;
use shared::config::FirebaseConfig;
use std::collections::HashMap;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEND_PATH: &str = "/v1/projects/demo-project/messages:send";

fn client(server: &MockServer) -> FcmClient {
    let config = FirebaseConfig {
        project_id: "demo-project".to_string(),
        credentials_path: None,
        fcm_base_url: server.uri(),
        iid_base_url: server.uri(),
    };
    FcmClient::new(&config, Credentials::Static("test-token".to_string()))
}

fn device_message() -> FcmMessage {
    let mut data = HashMap::new();
    data.insert("notification_id".to_string(), "42".to_string());
    data.insert("screen".to_string(), "/promo".to_string());

    FcmMessage {
        token: Some("device-token".to_string()),
        topic: None,
        notification: FcmNotification {
            title: "Weekend sale".to_string(),
            body: "Up to 50% off".to_string(),
            image: None,
        },
        data,
    }
}

fn fcm_error(http_code: u16, status: &str, error_code: &str) -> serde_json::Value {
    json!({
        "error": {
            "code": http_code,
            "message": "request failed",
            "status": status,
            "details": [{
                "@type": "type.googleapis.com/google.firebase.fcm.v1.FcmError",
                "errorCode": error_code
            }]
        }
    })
}

#[tokio::test]
async fn send_returns_vendor_message_name() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "name": "projects/demo-project/messages/0:1234" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let name = client(&server).send(&device_message()).await.unwrap();
    assert_eq!(name, "projects/demo-project/messages/0:1234");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["message"]["token"], "device-token");
    assert_eq!(body["message"]["data"]["notification_id"], "42");
    assert!(body["message"].get("topic").is_none());
}

#[tokio::test]
async fn unregistered_device_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(fcm_error(404, "NOT_FOUND", "UNREGISTERED")),
        )
        .mount(&server)
        .await;

    let err = client(&server).send(&device_message()).await.unwrap_err();
    assert_eq!(err, PushError::Unregistered);
}

#[tokio::test]
async fn unavailable_carries_retry_after_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(
            ResponseTemplate::new(503)
                .insert_header("Retry-After", "3")
                .set_body_json(fcm_error(503, "UNAVAILABLE", "UNAVAILABLE")),
        )
        .mount(&server)
        .await;

    let err = client(&server).send(&device_message()).await.unwrap_err();
    assert_eq!(
        err,
        PushError::Unavailable {
            retry_after: Some(Duration::from_secs(3))
        }
    );
}

#[tokio::test]
async fn quota_exceeded_without_hint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(fcm_error(429, "RESOURCE_EXHAUSTED", "QUOTA_EXCEEDED")),
        )
        .mount(&server)
        .await;

    let err = client(&server).send(&device_message()).await.unwrap_err();
    assert_eq!(err, PushError::QuotaExceeded { retry_after: None });
}

#[tokio::test]
async fn invalid_argument_is_other() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(fcm_error(400, "INVALID_ARGUMENT", "INVALID_ARGUMENT")),
        )
        .mount(&server)
        .await;

    let err = client(&server).send(&device_message()).await.unwrap_err();
    assert_eq!(err.kind(), "other");
}

#[tokio::test]
async fn topic_subscription_uses_batch_add() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/iid/v1:batchAdd"))
        .and(header("authorization", "Bearer test-token"))
        .and(header("access_token_auth", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [{}] })))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .subscribe_to_topic(&["device-token".to_string()], "authenticated.promo")
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["to"], "/topics/authenticated.promo");
    assert_eq!(body["registration_tokens"], json!(["device-token"]));
}

#[tokio::test]
async fn subscription_of_unknown_token_is_unregistered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/iid/v1:batchAdd"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "results": [{ "error": "NOT_FOUND" }] })),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .subscribe_to_topic(&["stale-token".to_string()], "authenticated.general")
        .await
        .unwrap_err();
    assert_eq!(err, PushError::Unregistered);
}

#[tokio::test]
async fn internal_server_error_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({
                "error": { "code": 500, "message": "internal error", "status": "INTERNAL" }
            })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).send(&device_message()).await.unwrap_err();
    assert_eq!(err.kind(), "other");
}
