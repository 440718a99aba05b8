//! Shared library for the membership backend
//!
//! Common functionality used by the API service:
//! - Environment configuration
//! - Service-wide error type and HTTP error mapping
//! - MySQL connection pool
//! - Member identity and pagination value types

pub mod config;
pub mod database;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use database::DatabaseService;
pub use error::{AppError, Result};
pub use types::*;
