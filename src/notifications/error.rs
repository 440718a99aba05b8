use shared::AppError;
use std::time::Duration;

/// Failure reported by the push vendor, normalized for retry classification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    #[error("push service unavailable")]
    Unavailable { retry_after: Option<Duration> },

    #[error("push quota exceeded")]
    QuotaExceeded { retry_after: Option<Duration> },

    #[error("registration token is no longer valid")]
    Unregistered,

    #[error("push request timed out")]
    Timeout,

    #[error("push request failed: {message}")]
    Other { message: String },
}

impl PushError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Stable label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            PushError::Unavailable { .. } => "unavailable",
            PushError::QuotaExceeded { .. } => "quota_exceeded",
            PushError::Unregistered => "unregistered",
            PushError::Timeout => "timeout",
            PushError::Other { .. } => "other",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,

    #[error("storage failure: {0}")]
    Storage(#[source] sqlx::Error),

    #[error("stored value is malformed: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound,
            other => RepositoryError::Storage(other),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("worker pool capacity must be greater than zero")]
    InvalidCapacity,

    #[error("worker pool is at capacity")]
    Overloaded,

    #[error("worker pool is closed")]
    Closed,

    #[error("timed out waiting for workers to finish")]
    DrainTimeout,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("{0}")]
    Client(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("notification storage failed: {0}")]
    Storage(#[source] RepositoryError),

    #[error("notification service is closing")]
    ServiceUnavailable,

    #[error(transparent)]
    Vendor(#[from] PushError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl NotificationError {
    pub fn client(message: impl Into<String>) -> Self {
        Self::Client(message.into())
    }
}

impl From<RepositoryError> for NotificationError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => NotificationError::NotFound("notification"),
            other => NotificationError::Storage(other),
        }
    }
}

impl From<validator::ValidationErrors> for NotificationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        NotificationError::Client(errors.to_string())
    }
}

impl From<NotificationError> for AppError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::Client(message) => AppError::validation(message),
            NotificationError::NotFound(resource) => AppError::not_found(resource),
            NotificationError::ServiceUnavailable => AppError::service_unavailable("notification"),
            NotificationError::Vendor(e) => AppError::external_service("fcm", e.to_string()),
            NotificationError::Storage(e) => AppError::internal(e.to_string()),
            NotificationError::Pool(e) => AppError::internal(e.to_string()),
        }
    }
}
