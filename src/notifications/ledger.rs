//! Bookkeeping of per-recipient delivery state.
//!
//! Every write the dispatcher makes about a delivery goes through here, so
//! the rules for what a record looks like at each step live in one place.

use super::error::RepositoryError;
use super::model::{
    ClientNotificationStatus, FcmToken, MemberNotification, MemberNotificationListItem,
    NewNotificationMessage, NotificationMessage, NotificationStatus,
};
use super::repository::NotificationRepository;
use shared::MemberIdentity;
use std::sync::Arc;

#[derive(Clone)]
pub struct DeliveryLedger {
    repo: Arc<dyn NotificationRepository>,
}

impl DeliveryLedger {
    pub fn new(repo: Arc<dyn NotificationRepository>) -> Self {
        Self { repo }
    }

    pub async fn record_message(
        &self,
        message: NewNotificationMessage,
    ) -> Result<NotificationMessage, RepositoryError> {
        self.repo.create_notification_message(message).await
    }

    /// Written before the first send attempt so a crash mid-send still leaves
    /// a trace
    pub async fn mark_pending(
        &self,
        member: MemberIdentity,
        notification_id: i64,
    ) -> Result<(), RepositoryError> {
        self.repo
            .save_member_notification(&MemberNotification {
                member,
                notification_id,
                fcm_message_id: None,
                status: NotificationStatus::Pending,
            })
            .await
    }

    pub async fn mark_sent(
        &self,
        member: MemberIdentity,
        notification_id: i64,
        fcm_message_id: &str,
    ) -> Result<(), RepositoryError> {
        self.repo
            .save_member_notification(&MemberNotification {
                member,
                notification_id,
                fcm_message_id: Some(fcm_message_id.to_string()),
                status: NotificationStatus::Sent,
            })
            .await
    }

    /// Applies a status reported by the device. Repeating it is harmless.
    pub async fn apply_client_status(
        &self,
        member: MemberIdentity,
        status: &ClientNotificationStatus,
    ) -> Result<(), RepositoryError> {
        self.repo
            .save_member_notification(&MemberNotification {
                member,
                notification_id: status.notification_id,
                fcm_message_id: Some(status.fcm_notification_id.clone()),
                status: status.status,
            })
            .await
    }

    /// Drops the record of a delivery that will never happen
    pub async fn discard(
        &self,
        member: MemberIdentity,
        notification_id: i64,
    ) -> Result<(), RepositoryError> {
        self.repo
            .delete_member_notification(member, notification_id)
            .await
    }

    /// Removes a device the vendor reported as unregistered
    pub async fn invalidate_token(&self, token: &FcmToken) -> Result<(), RepositoryError> {
        self.repo
            .delete_fcm_token(token.owner(), &token.device_id)
            .await
    }

    pub async fn register_token(&self, token: &FcmToken) -> Result<(), RepositoryError> {
        self.repo.save_fcm_token(token).await
    }

    pub async fn list(
        &self,
        member: MemberIdentity,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<MemberNotificationListItem>, RepositoryError> {
        self.repo
            .get_member_notifications(member, offset, limit)
            .await
    }
}
