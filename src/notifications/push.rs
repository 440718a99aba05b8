use super::builder::FcmMessage;
use super::error::PushError;
use async_trait::async_trait;

/// Outbound push vendor
#[async_trait]
pub trait PushClient: Send + Sync {
    /// Sends one message and returns the vendor-assigned message id
    async fn send(&self, message: &FcmMessage) -> Result<String, PushError>;

    async fn subscribe_to_topic(&self, tokens: &[String], topic: &str) -> Result<(), PushError>;
}
