//! Connection pool for the legacy MySQL membership database

use crate::{config::DatabaseConfig, error::AppError, Result};
use sqlx::{mysql::MySqlPoolOptions, MySqlPool};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct DatabaseService {
    pool: MySqlPool,
}

impl DatabaseService {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Initializing database connection pool");

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .max_lifetime(Duration::from_secs(config.max_lifetime_seconds))
            .connect(&config.url)
            .await
            .map_err(|e| AppError::internal(format!("Failed to connect to database: {}", e)))?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        info!("Database connection pool initialized successfully");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
