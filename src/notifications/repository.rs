//! Persistence of device tokens, messages and per-member delivery records

use super::audience::AudienceFilter;
use super::error::RepositoryError;
use super::model::{
    FcmToken, MemberNotification, MemberNotificationListItem, NewNotificationMessage,
    NotificationMessage,
};
use async_trait::async_trait;
use shared::{MemberIdentity, SimplePagination};
use sqlx::MySqlPool;

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Upserts the device token of a member
    async fn save_fcm_token(&self, token: &FcmToken) -> Result<(), RepositoryError>;

    /// One page of the devices matching `filter`. Empty when exhausted.
    async fn get_fcm_tokens_by_filter(
        &self,
        filter: &AudienceFilter,
        page: SimplePagination,
    ) -> Result<Vec<FcmToken>, RepositoryError>;

    async fn delete_fcm_token(
        &self,
        owner: MemberIdentity,
        device_id: &str,
    ) -> Result<(), RepositoryError>;

    async fn create_notification_message(
        &self,
        message: NewNotificationMessage,
    ) -> Result<NotificationMessage, RepositoryError>;

    /// Upserts the delivery record keyed by member and message
    async fn save_member_notification(
        &self,
        record: &MemberNotification,
    ) -> Result<(), RepositoryError>;

    /// Deleting a record that does not exist is not an error
    async fn delete_member_notification(
        &self,
        member: MemberIdentity,
        notification_id: i64,
    ) -> Result<(), RepositoryError>;

    /// Newest first
    async fn get_member_notifications(
        &self,
        member: MemberIdentity,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<MemberNotificationListItem>, RepositoryError>;
}

/// Repository backed by the legacy membership MySQL schema
#[derive(Clone)]
pub struct MySqlNotificationRepository {
    pool: MySqlPool,
}

impl MySqlNotificationRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for MySqlNotificationRepository {
    async fn save_fcm_token(&self, token: &FcmToken) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO member_mtokenfcm (
                IdMMember, IdMCabangDaftar, DeviceId, Platform, TokenFCM,
                TimeCreate, TimeUpdate, TimeLastUsed
            ) VALUES (?, ?, ?, ?, ?, NOW(), NOW(), NOW())
            ON DUPLICATE KEY UPDATE
                TokenFCM = VALUES(TokenFCM),
                Platform = VALUES(Platform),
                TimeUpdate = NOW()
            "#,
        )
        .bind(token.member_id)
        .bind(token.member_regist_branch_id)
        .bind(&token.device_id)
        .bind(&token.platform)
        .bind(&token.token)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_fcm_tokens_by_filter(
        &self,
        filter: &AudienceFilter,
        page: SimplePagination,
    ) -> Result<Vec<FcmToken>, RepositoryError> {
        let tokens = filter
            .to_query(page)
            .build_query_as::<FcmToken>()
            .fetch_all(&self.pool)
            .await?;

        Ok(tokens)
    }

    async fn delete_fcm_token(
        &self,
        owner: MemberIdentity,
        device_id: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            DELETE FROM member_mtokenfcm
            WHERE IdMMember = ? AND IdMCabangDaftar = ? AND DeviceId = ?
            "#,
        )
        .bind(owner.member_id)
        .bind(owner.registration_branch_id)
        .bind(device_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_notification_message(
        &self,
        message: NewNotificationMessage,
    ) -> Result<NotificationMessage, RepositoryError> {
        let data = serde_json::to_string(&message.data)
            .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO member_mnotifikasi (Topic, Judul, Konten, URLGambar, DataJson, TimeCreate)
            VALUES (?, ?, ?, ?, ?, NOW())
            "#,
        )
        .bind(message.topic.map(|t| t.as_str()).unwrap_or_default())
        .bind(&message.title)
        .bind(&message.body)
        .bind(&message.image_url)
        .bind(data)
        .execute(&self.pool)
        .await?;

        let id = i64::try_from(result.last_insert_id())
            .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;

        Ok(NotificationMessage::from_new(id, message))
    }

    async fn save_member_notification(
        &self,
        record: &MemberNotification,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO member_mnotifikasimember (
                IdMMember, IdMCabangDaftar, IdMNotifikasi, IdFCMMessage, StatusNotifikasi, TimeCreate
            ) VALUES (?, ?, ?, ?, ?, NOW())
            ON DUPLICATE KEY UPDATE
                IdFCMMessage = VALUES(IdFCMMessage),
                StatusNotifikasi = VALUES(StatusNotifikasi),
                TimeUpdate = NOW()
            "#,
        )
        .bind(record.member.member_id)
        .bind(record.member.registration_branch_id)
        .bind(record.notification_id)
        .bind(&record.fcm_message_id)
        .bind(record.status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_member_notification(
        &self,
        member: MemberIdentity,
        notification_id: i64,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            DELETE FROM member_mnotifikasimember
            WHERE IdMMember = ? AND IdMCabangDaftar = ? AND IdMNotifikasi = ?
            "#,
        )
        .bind(member.member_id)
        .bind(member.registration_branch_id)
        .bind(notification_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_member_notifications(
        &self,
        member: MemberIdentity,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<MemberNotificationListItem>, RepositoryError> {
        let items = sqlx::query_as::<_, MemberNotificationListItem>(
            r#"
            SELECT
                mm.IdMNotifikasi AS notification_id,
                mm.IdFCMMessage AS fcm_message_id,
                mm.StatusNotifikasi AS status,
                mmn.Judul AS title,
                mmn.Konten AS body,
                mmn.URLGambar AS image_url
            FROM member_mnotifikasimember mm
            JOIN member_mnotifikasi mmn ON mmn.IdMNotifikasi = mm.IdMNotifikasi
            WHERE mm.IdMMember = ? AND mm.IdMCabangDaftar = ?
            ORDER BY mm.TimeCreate DESC
            LIMIT ?, ?
            "#,
        )
        .bind(member.member_id)
        .bind(member.registration_branch_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }
}
