use crate::notifications::{MySqlNotificationRepository, NotificationEngine};
use crate::services::push_notification_service::{Credentials, FcmClient};
use shared::{Config, DatabaseService};
use std::sync::Arc;
use tracing::warn;

/// Shared application state
pub struct AppState {
    pub config: Arc<Config>,
    /// `None` when the state is assembled around in-memory collaborators
    pub database: Option<DatabaseService>,
    pub notifications: Arc<NotificationEngine>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let database = DatabaseService::new(&config.database).await?;

        if config.firebase.credentials_path.is_none() {
            warn!("GOOGLE_APPLICATION_CREDENTIALS is not set, relying on ambient GCP credentials");
        }
        let push_client = FcmClient::new(&config.firebase, Credentials::ServiceAccount);
        let repository = MySqlNotificationRepository::new(database.pool().clone());

        let notifications = NotificationEngine::new(
            &config.notification,
            Arc::new(repository),
            Arc::new(push_client),
        )?;

        Ok(Self {
            config: Arc::new(config),
            database: Some(database),
            notifications: Arc::new(notifications),
        })
    }

    pub fn from_parts(config: Config, notifications: Arc<NotificationEngine>) -> Self {
        Self {
            config: Arc::new(config),
            database: None,
            notifications,
        }
    }
}
