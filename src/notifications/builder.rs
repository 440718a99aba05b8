//! Conversion of stored messages into the FCM HTTP v1 wire format

use super::model::{FcmToken, NotificationMessage};
use serde::Serialize;
use std::collections::HashMap;

pub const DATA_NOTIFICATION_ID: &str = "notification_id";
pub const DATA_SCREEN: &str = "screen";
pub const DATA_URL: &str = "url";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FcmNotification {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// `message` object of an FCM v1 send request. Exactly one of `token` and
/// `topic` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FcmMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub notification: FcmNotification,
    pub data: HashMap<String, String>,
}

/// Builds the wire message. With a recipient the message goes to that device,
/// otherwise it is broadcast to the message topic.
///
/// The data payload always carries the message id and screen route so the app
/// can report status back and navigate on tap.
pub fn build_message(message: &NotificationMessage, recipient: Option<&FcmToken>) -> FcmMessage {
    let mut data = HashMap::with_capacity(3);
    data.insert(DATA_NOTIFICATION_ID.to_string(), message.id.to_string());
    data.insert(
        DATA_SCREEN.to_string(),
        message
            .topic
            .and_then(|topic| topic.ui_route())
            .unwrap_or_default()
            .to_string(),
    );
    if let Some(url) = &message.data.url {
        data.insert(DATA_URL.to_string(), url.clone());
    }

    let (token, topic) = match recipient {
        Some(device) => (Some(device.token.clone()), None),
        None => (None, message.topic.map(|t| t.fcm_topic().to_string())),
    };

    FcmMessage {
        token,
        topic,
        notification: FcmNotification {
            title: message.title.clone(),
            body: message.body.clone(),
            image: message.image_url.clone(),
        },
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::model::{ActionData, Topic};

    fn promo() -> NotificationMessage {
        NotificationMessage {
            id: 42,
            topic: Some(Topic::Promo),
            title: "Flash sale".to_string(),
            body: "Today only".to_string(),
            image_url: Some("https://cdn.example.com/p.png".to_string()),
            data: ActionData {
                screen: "promo".to_string(),
                url: Some("https://example.com/sale".to_string()),
            },
        }
    }

    fn device() -> FcmToken {
        FcmToken {
            member_id: 1,
            member_regist_branch_id: 2,
            device_id: "pixel".to_string(),
            platform: "android".to_string(),
            token: "tok-1".to_string(),
        }
    }

    #[test]
    fn broadcast_targets_topic() {
        let wire = build_message(&promo(), None);
        assert_eq!(wire.topic.as_deref(), Some("authenticated.promo"));
        assert!(wire.token.is_none());
        assert_eq!(wire.data[DATA_NOTIFICATION_ID], "42");
        assert_eq!(wire.data[DATA_SCREEN], "/promo");
        assert_eq!(wire.data[DATA_URL], "https://example.com/sale");
    }

    #[test]
    fn recipient_targets_device_token() {
        let wire = build_message(&promo(), Some(&device()));
        assert_eq!(wire.token.as_deref(), Some("tok-1"));
        assert!(wire.topic.is_none());
    }

    #[test]
    fn general_topic_has_empty_screen_and_no_url() {
        let mut message = promo();
        message.topic = Some(Topic::General);
        message.data.url = None;

        let wire = build_message(&message, None);
        assert_eq!(wire.data[DATA_SCREEN], "");
        assert!(!wire.data.contains_key(DATA_URL));
    }

    #[test]
    fn serializes_without_empty_target() {
        let json = serde_json::to_value(build_message(&promo(), Some(&device()))).unwrap();
        assert!(json.get("topic").is_none());
        assert_eq!(json["notification"]["image"], "https://cdn.example.com/p.png");
    }
}
