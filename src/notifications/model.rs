use serde::{Deserialize, Serialize};
use shared::MemberIdentity;
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// Broadcast channel a device is subscribed to on registration.
///
/// Every registered token is subscribed to all topics, so a topic broadcast
/// reaches every device without a per-member lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Topic {
    General,
    Promo,
}

impl Topic {
    pub const ALL: [Topic; 2] = [Topic::General, Topic::Promo];

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::General => "GENERAL",
            Topic::Promo => "PROMO",
        }
    }

    /// Topic name registered with FCM
    pub fn fcm_topic(self) -> &'static str {
        match self {
            Topic::General => "authenticated.general",
            Topic::Promo => "authenticated.promo",
        }
    }

    /// App screen opened when the notification is tapped
    pub fn ui_route(self) -> Option<&'static str> {
        match self {
            Topic::General => None,
            Topic::Promo => Some("/promo"),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown value: {0}")]
pub struct UnknownValue(pub String);

impl FromStr for Topic {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GENERAL" => Ok(Topic::General),
            "PROMO" => Ok(Topic::Promo),
            other => Err(UnknownValue(other.to_string())),
        }
    }
}

/// Lifecycle of a per-recipient notification record.
///
/// `Pending` and `Sent` are written by the dispatcher, `Delivered` and `Read`
/// are reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Delivered,
    Read,
}

impl NotificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationStatus::Pending => "PENDING",
            NotificationStatus::Sent => "SENT",
            NotificationStatus::Delivered => "DELIVERED",
            NotificationStatus::Read => "READ",
        }
    }

    /// Statuses a device may report back
    pub fn is_client_reportable(self) -> bool {
        matches!(self, NotificationStatus::Delivered | NotificationStatus::Read)
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(NotificationStatus::Pending),
            "SENT" => Ok(NotificationStatus::Sent),
            "DELIVERED" => Ok(NotificationStatus::Delivered),
            "READ" => Ok(NotificationStatus::Read),
            other => Err(UnknownValue(other.to_string())),
        }
    }
}

impl TryFrom<String> for NotificationStatus {
    type Error = UnknownValue;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Deep-link payload stored with the message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionData {
    #[serde(default)]
    pub screen: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Audience criteria of a targeted push. Empty lists impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFilter {
    #[serde(default)]
    pub member_type: Vec<i64>,
    #[serde(default)]
    pub gender: Vec<String>,
    #[serde(default)]
    pub age: Vec<i32>,
    #[serde(default)]
    pub member_codes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Action {
    #[serde(default)]
    pub topic: Option<Topic>,
    #[serde(default)]
    pub target_filter: Option<TargetFilter>,
    #[serde(default)]
    pub data: Option<ActionData>,
}

/// A push request as submitted by an operator
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Message {
    #[validate(length(min = 1, max = 255, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Body is required"))]
    pub body: String,
    #[serde(default)]
    #[validate(url(message = "Image URL must be a valid URL"))]
    pub image_url: Option<String>,
    #[serde(default)]
    pub action: Action,
}

/// Message row to be inserted, before the store assigns an id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotificationMessage {
    pub topic: Option<Topic>,
    pub title: String,
    pub body: String,
    pub image_url: Option<String>,
    pub data: ActionData,
}

impl From<&Message> for NewNotificationMessage {
    fn from(message: &Message) -> Self {
        Self {
            topic: message.action.topic,
            title: message.title.clone(),
            body: message.body.clone(),
            image_url: message.image_url.clone().filter(|url| !url.is_empty()),
            data: message.action.data.clone().unwrap_or_default(),
        }
    }
}

/// A persisted message. The id is shared by every recipient's delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationMessage {
    pub id: i64,
    pub topic: Option<Topic>,
    pub title: String,
    pub body: String,
    pub image_url: Option<String>,
    pub data: ActionData,
}

impl NotificationMessage {
    pub fn from_new(id: i64, new: NewNotificationMessage) -> Self {
        Self {
            id,
            topic: new.topic,
            title: new.title,
            body: new.body,
            image_url: new.image_url,
            data: new.data,
        }
    }
}

/// A device registration owned by a member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FcmToken {
    pub member_id: i64,
    pub member_regist_branch_id: i64,
    pub device_id: String,
    pub platform: String,
    pub token: String,
}

impl FcmToken {
    pub fn owner(&self) -> MemberIdentity {
        MemberIdentity::new(self.member_id, self.member_regist_branch_id)
    }
}

/// Body of the device registration endpoint; the owner comes from the JWT
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterFcmTokenRequest {
    #[validate(length(min = 1, max = 255, message = "Device ID is required"))]
    pub device_id: String,
    #[validate(length(min = 1, max = 20, message = "Platform is required"))]
    pub platform: String,
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
}

impl RegisterFcmTokenRequest {
    pub fn into_token(self, owner: MemberIdentity) -> FcmToken {
        FcmToken {
            member_id: owner.member_id,
            member_regist_branch_id: owner.registration_branch_id,
            device_id: self.device_id,
            platform: self.platform,
            token: self.token,
        }
    }
}

/// Delivery record of one message to one member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberNotification {
    pub member: MemberIdentity,
    pub notification_id: i64,
    pub fcm_message_id: Option<String>,
    pub status: NotificationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct MemberNotificationListItem {
    pub notification_id: i64,
    pub fcm_message_id: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: NotificationStatus,
    pub title: String,
    pub body: String,
    pub image_url: Option<String>,
}

/// Status report sent back by a device
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClientNotificationStatus {
    #[validate(range(min = 1, message = "Notification ID is required"))]
    pub notification_id: i64,
    #[validate(length(min = 1, message = "FCM notification ID is required"))]
    pub fcm_notification_id: String,
    pub status: NotificationStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_routing() {
        assert_eq!(Topic::General.fcm_topic(), "authenticated.general");
        assert_eq!(Topic::Promo.fcm_topic(), "authenticated.promo");
        assert_eq!(Topic::Promo.ui_route(), Some("/promo"));
        assert_eq!(Topic::General.ui_route(), None);
    }

    #[test]
    fn status_parses_from_storage() {
        assert_eq!(
            NotificationStatus::try_from("SENT".to_string()),
            Ok(NotificationStatus::Sent)
        );
        assert!("sent".parse::<NotificationStatus>().is_err());
    }

    #[test]
    fn message_deserializes_with_action() {
        let json = r#"{
            "title": "Promo",
            "body": "50% off",
            "action": {
                "topic": "PROMO",
                "target_filter": { "gender": ["F"], "age": [20, 30] },
                "data": { "screen": "promo", "url": "https://example.com/p" }
            }
        }"#;

        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(message.action.topic, Some(Topic::Promo));
        let filter = message.action.target_filter.unwrap();
        assert_eq!(filter.age, vec![20, 30]);
        assert!(filter.member_type.is_empty());
    }

    #[test]
    fn message_requires_title_and_body() {
        let message = Message {
            title: String::new(),
            body: "hi".to_string(),
            ..Default::default()
        };
        assert!(message.validate().is_err());
    }

    #[test]
    fn only_delivered_and_read_are_client_reportable() {
        assert!(NotificationStatus::Read.is_client_reportable());
        assert!(NotificationStatus::Delivered.is_client_reportable());
        assert!(!NotificationStatus::Sent.is_client_reportable());
        assert!(!NotificationStatus::Pending.is_client_reportable());
    }
}
