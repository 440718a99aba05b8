//! Configuration management for the membership backend

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub firebase: FirebaseConfig,
    pub notification: NotificationConfig,
    pub auth: AuthConfig,
    pub app: AppConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub max_lifetime_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    pub project_id: String,
    /// Path to the service account JSON, read by `gcp_auth`
    pub credentials_path: Option<String>,
    pub fcm_base_url: String,
    pub iid_base_url: String,
}

/// Tuning knobs of the push dispatch engine
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    /// Max simultaneous delivery workers, also the audience page size
    pub concurrent_push_limit: usize,
    pub send_timeout_seconds: u64,
    pub wait_worker_pool_finish_on_close_seconds: u64,
    pub max_send_tries: u32,
    pub unavailable_retry_after_seconds: u64,
    pub quota_exceeded_retry_after_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_signing_key: Vec<u8>,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub admin_api_key_hash_secret: Vec<u8>,
    pub admin_api_key_hash: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub environment: String,
    pub log_level: String,
}

impl NotificationConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_seconds)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_worker_pool_finish_on_close_seconds)
    }

    pub fn unavailable_retry_after(&self) -> Duration {
        Duration::from_secs(self.unavailable_retry_after_seconds)
    }

    pub fn quota_exceeded_retry_after(&self) -> Duration {
        Duration::from_secs(self.quota_exceeded_retry_after_seconds)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            concurrent_push_limit: 100,
            send_timeout_seconds: 10,
            wait_worker_pool_finish_on_close_seconds: 30,
            max_send_tries: 3,
            unavailable_retry_after_seconds: 5,
            quota_exceeded_retry_after_seconds: 10,
        }
    }
}

fn decode_base64_var(name: &str) -> anyhow::Result<Vec<u8>> {
    match env::var(name) {
        Ok(raw) if !raw.is_empty() => STANDARD
            .decode(raw.trim())
            .map_err(|e| anyhow::anyhow!("{} is not valid base64: {}", name, e)),
        _ => Ok(Vec::new()),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let notification = NotificationConfig {
            concurrent_push_limit: env::var("NOTIFICATION_CONCURRENT_PUSH_LIMIT")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
            send_timeout_seconds: env::var("NOTIFICATION_SEND_TIMEOUT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            wait_worker_pool_finish_on_close_seconds: env::var(
                "NOTIFICATION_WAIT_WORKER_POOL_FINISH_ON_CLOSE",
            )
            .unwrap_or_else(|_| "30".to_string())
            .parse()?,
            max_send_tries: env::var("NOTIFICATION_MAX_SEND_TRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            unavailable_retry_after_seconds: env::var("NOTIFICATION_UNAVAILABLE_RETRY_AFTER")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            quota_exceeded_retry_after_seconds: env::var(
                "NOTIFICATION_QUOTA_EXCEEDED_RETRY_AFTER",
            )
            .unwrap_or_else(|_| "10".to_string())
            .parse()?,
        };

        if notification.concurrent_push_limit == 0 {
            anyhow::bail!("NOTIFICATION_CONCURRENT_PUSH_LIMIT must be greater than 0");
        }

        Ok(Config {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "mysql://localhost:3306/membership".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()?,
                acquire_timeout_seconds: env::var("DATABASE_ACQUIRE_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()?,
                max_lifetime_seconds: env::var("DATABASE_MAX_LIFETIME_SECONDS")
                    .unwrap_or_else(|_| "180".to_string())
                    .parse()?,
            },
            firebase: FirebaseConfig {
                project_id: env::var("FIREBASE_PROJECT_ID").unwrap_or_default(),
                credentials_path: env::var("GOOGLE_APPLICATION_CREDENTIALS").ok(),
                fcm_base_url: env::var("FCM_BASE_URL")
                    .unwrap_or_else(|_| "https://fcm.googleapis.com".to_string()),
                iid_base_url: env::var("FCM_IID_BASE_URL")
                    .unwrap_or_else(|_| "https://iid.googleapis.com".to_string()),
            },
            notification,
            auth: AuthConfig {
                jwt_signing_key: decode_base64_var("JWT_SIGNING_KEY")?,
                jwt_issuer: env::var("JWT_ISSUER")
                    .unwrap_or_else(|_| "https://tokomasjawa.com".to_string()),
                jwt_audience: env::var("JWT_AUDIENCE")
                    .unwrap_or_else(|_| "https://tokomasjawa.com".to_string()),
                admin_api_key_hash_secret: decode_base64_var("ADMIN_API_KEY_HASH_SECRET")?,
                admin_api_key_hash: decode_base64_var("ADMIN_API_KEY_HASH")?,
            },
            app: AppConfig {
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()?,
                environment: env::var("ENVIRONMENT")
                    .unwrap_or_else(|_| "development".to_string()),
                log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_defaults_match_deployment() {
        let cfg = NotificationConfig::default();
        assert_eq!(cfg.max_send_tries, 3);
        assert_eq!(cfg.unavailable_retry_after(), Duration::from_secs(5));
        assert_eq!(cfg.quota_exceeded_retry_after(), Duration::from_secs(10));
        assert_eq!(cfg.drain_timeout(), Duration::from_secs(30));
    }
}
