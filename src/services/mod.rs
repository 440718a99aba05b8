pub mod push_notification_service;

pub use push_notification_service::{Credentials, FcmClient};
