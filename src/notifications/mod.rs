//! Push notification dispatch: device registration, audience fan-out,
//! bounded delivery with retries and per-member delivery records.

pub mod audience;
pub mod builder;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod model;
pub mod pool;
pub mod push;
pub mod repository;
pub mod retry;

pub use audience::{AgeBound, AudienceFilter};
pub use builder::FcmMessage;
pub use engine::NotificationEngine;
pub use error::{NotificationError, PoolError, PushError, RepositoryError};
pub use model::*;
pub use push::PushClient;
pub use repository::{MySqlNotificationRepository, NotificationRepository};
