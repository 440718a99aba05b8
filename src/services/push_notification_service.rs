// ============================================================================
// PUSH NOTIFICATION SERVICE - Firebase Cloud Messaging (FCM) HTTP v1 API
// ============================================================================
//
// Sends through the FCM HTTP v1 API with OAuth 2.0 service account tokens and
// manages topic subscriptions through the Instance ID API.
//
// Configuration:
// - GOOGLE_APPLICATION_CREDENTIALS: Path to service account JSON file
// - FIREBASE_PROJECT_ID: Your Firebase project ID
//
// ============================================================================

use crate::notifications::{FcmMessage, PushClient, PushError};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use serde::{Deserialize, Serialize};
use shared::config::FirebaseConfig;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";

// ============================================================================
// DATA STRUCTURES
// ============================================================================

#[derive(Debug, Serialize)]
struct FcmV1Request<'a> {
    message: &'a FcmMessage,
}

#[derive(Debug, Deserialize)]
struct FcmV1SendResponse {
    name: String,
}

/// FCM v1 API error response
#[derive(Debug, Deserialize)]
struct FcmV1ErrorResponse {
    error: FcmV1Error,
}

#[derive(Debug, Deserialize)]
struct FcmV1Error {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<FcmV1ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct FcmV1ErrorDetail {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
}

#[derive(Debug, Serialize)]
struct BatchAddRequest<'a> {
    to: String,
    registration_tokens: &'a [String],
}

#[derive(Debug, Deserialize)]
struct BatchAddResponse {
    #[serde(default)]
    results: Vec<BatchAddResult>,
}

#[derive(Debug, Deserialize)]
struct BatchAddResult {
    error: Option<String>,
}

/// Cached OAuth token with expiration
struct CachedToken {
    token: String,
    expires_at: chrono::DateTime<Utc>,
}

/// Where OAuth bearer tokens come from
pub enum Credentials {
    /// Application default credentials resolved by `gcp_auth`
    ServiceAccount,
    /// A fixed token, for emulators and tests
    Static(String),
}

// ============================================================================
// FCM CLIENT
// ============================================================================

pub struct FcmClient {
    http_client: Client,
    project_id: String,
    fcm_base_url: String,
    iid_base_url: String,
    credentials: Credentials,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

impl FcmClient {
    pub fn new(config: &FirebaseConfig, credentials: Credentials) -> Self {
        if config.project_id.is_empty() {
            warn!("FIREBASE_PROJECT_ID is not set, push delivery will fail");
        } else {
            info!("FCM HTTP v1 configured for project: {}", config.project_id);
        }

        Self {
            http_client: Client::new(),
            project_id: config.project_id.clone(),
            fcm_base_url: config.fcm_base_url.trim_end_matches('/').to_string(),
            iid_base_url: config.iid_base_url.trim_end_matches('/').to_string(),
            credentials,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Get a valid OAuth token for FCM
    async fn get_oauth_token(&self) -> Result<String, PushError> {
        if let Credentials::Static(token) = &self.credentials {
            return Ok(token.clone());
        }

        {
            let cache = self.token_cache.read().await;
            if let Some(ref cached) = *cache {
                // Use token if it has at least 5 minutes of validity left
                if cached.expires_at > Utc::now() + Duration::minutes(5) {
                    return Ok(cached.token.clone());
                }
            }
        }

        let provider = gcp_auth::provider()
            .await
            .map_err(|e| PushError::other(format!("failed to create GCP auth provider: {}", e)))?;

        let token = provider
            .token(&[FCM_SCOPE])
            .await
            .map_err(|e| PushError::other(format!("failed to get OAuth token for FCM: {}", e)))?;

        let token_string = token.as_str().to_string();

        // Tokens typically last 1 hour, we cache for 50 minutes
        let expires_at = Utc::now() + Duration::minutes(50);
        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token_string.clone(),
                expires_at,
            });
        }

        debug!("Obtained new FCM OAuth token, valid until {}", expires_at);
        Ok(token_string)
    }

    fn fcm_endpoint(&self) -> String {
        format!(
            "{}/v1/projects/{}/messages:send",
            self.fcm_base_url, self.project_id
        )
    }

    fn batch_add_endpoint(&self) -> String {
        format!("{}/iid/v1:batchAdd", self.iid_base_url)
    }
}

#[async_trait]
impl PushClient for FcmClient {
    async fn send(&self, message: &FcmMessage) -> Result<String, PushError> {
        let oauth_token = self.get_oauth_token().await?;

        let response = self
            .http_client
            .post(self.fcm_endpoint())
            .bearer_auth(oauth_token)
            .json(&FcmV1Request { message })
            .send()
            .await
            .map_err(|e| PushError::other(format!("failed to send FCM request: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            let body: FcmV1SendResponse = response
                .json()
                .await
                .map_err(|e| PushError::other(format!("malformed FCM response: {}", e)))?;
            debug!(fcm_message_id = %body.name, "FCM message sent");
            return Ok(body.name);
        }

        let retry_after = parse_retry_after(response.headers().get(RETRY_AFTER));
        let error_body = response.text().await.unwrap_or_default();
        Err(classify_fcm_error(status, retry_after, &error_body))
    }

    async fn subscribe_to_topic(&self, tokens: &[String], topic: &str) -> Result<(), PushError> {
        let oauth_token = self.get_oauth_token().await?;

        let response = self
            .http_client
            .post(self.batch_add_endpoint())
            .bearer_auth(oauth_token)
            .header("access_token_auth", "true")
            .json(&BatchAddRequest {
                to: format!("/topics/{}", topic),
                registration_tokens: tokens,
            })
            .send()
            .await
            .map_err(|e| PushError::other(format!("failed to subscribe to topic: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers().get(RETRY_AFTER));
            let error_body = response.text().await.unwrap_or_default();
            return Err(classify_fcm_error(status, retry_after, &error_body));
        }

        let body: BatchAddResponse = response
            .json()
            .await
            .map_err(|e| PushError::other(format!("malformed topic subscription response: {}", e)))?;

        match body.results.iter().find_map(|r| r.error.as_deref()) {
            None => Ok(()),
            Some("NOT_FOUND") | Some("INVALID_ARGUMENT") => Err(PushError::Unregistered),
            Some(reason) => Err(PushError::other(format!(
                "topic {} subscription failed: {}",
                topic, reason
            ))),
        }
    }
}

fn parse_retry_after(value: Option<&reqwest::header::HeaderValue>) -> Option<std::time::Duration> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(std::time::Duration::from_secs)
}

/// Maps an FCM error response onto the categories the dispatcher retries on
fn classify_fcm_error(
    status: StatusCode,
    retry_after: Option<std::time::Duration>,
    body: &str,
) -> PushError {
    let parsed = serde_json::from_str::<FcmV1ErrorResponse>(body).ok();
    let error_code = parsed.as_ref().map(|e| {
        e.error
            .details
            .iter()
            .find_map(|d| d.error_code.clone())
            .unwrap_or_else(|| e.error.status.clone())
    });

    match error_code.as_deref() {
        Some("UNAVAILABLE") => PushError::Unavailable { retry_after },
        Some("QUOTA_EXCEEDED") | Some("RESOURCE_EXHAUSTED") => {
            PushError::QuotaExceeded { retry_after }
        }
        Some("UNREGISTERED") | Some("NOT_FOUND") => PushError::Unregistered,
        _ if status == StatusCode::SERVICE_UNAVAILABLE => PushError::Unavailable { retry_after },
        _ if status == StatusCode::TOO_MANY_REQUESTS => PushError::QuotaExceeded { retry_after },
        Some(code) => PushError::other(format!(
            "FCM error ({}): {} - {}",
            status.as_u16(),
            code,
            parsed.map(|e| e.error.message).unwrap_or_default()
        )),
        None => PushError::other(format!("FCM request failed ({}): {}", status, body)),
    }
}
