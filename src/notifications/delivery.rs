//! A single delivery: one message to one device, or one topic broadcast.
//!
//! The delivery owns its whole lifecycle. It writes the pending record, tries
//! the vendor with retries and finalizes or cleans up the record. The outcome
//! is logged here and handed back to the caller.

use super::builder::{build_message, FcmMessage};
use super::error::{NotificationError, PushError, RepositoryError};
use super::ledger::DeliveryLedger;
use super::model::{FcmToken, NotificationMessage, Topic};
use super::push::PushClient;
use super::retry::{retry, Attempt, RetryError, RetryPolicy};
use crate::observability::{record_push_notification, record_push_retry, record_token_pruned};
use shared::config::NotificationConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Compensating action for a delivery that will never succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cleanup {
    Nothing,
    DiscardRecord,
    PruneTokenAndDiscardRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Retry(Duration),
    Terminal(Cleanup),
}

/// Waits applied when the vendor asks for a retry without saying how long
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryHints {
    pub unavailable: Duration,
    pub quota_exceeded: Duration,
}

impl From<&NotificationConfig> for RetryHints {
    fn from(config: &NotificationConfig) -> Self {
        Self {
            unavailable: config.unavailable_retry_after(),
            quota_exceeded: config.quota_exceeded_retry_after(),
        }
    }
}

pub fn classify(error: &PushError, targeted: bool, hints: &RetryHints) -> Verdict {
    match error {
        PushError::Unavailable { retry_after } => {
            Verdict::Retry(retry_after.unwrap_or(hints.unavailable))
        }
        PushError::QuotaExceeded { retry_after } => {
            Verdict::Retry(retry_after.unwrap_or(hints.quota_exceeded))
        }
        PushError::Unregistered if targeted => Verdict::Terminal(Cleanup::PruneTokenAndDiscardRecord),
        _ if targeted => Verdict::Terminal(Cleanup::DiscardRecord),
        _ => Verdict::Terminal(Cleanup::Nothing),
    }
}

pub struct Dispatcher {
    ledger: DeliveryLedger,
    push: Arc<dyn PushClient>,
    policy: RetryPolicy,
    hints: RetryHints,
    send_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        ledger: DeliveryLedger,
        push: Arc<dyn PushClient>,
        config: &NotificationConfig,
    ) -> Self {
        Self {
            ledger,
            push,
            policy: RetryPolicy::from(config),
            hints: RetryHints::from(config),
            send_timeout: config.send_timeout(),
        }
    }

    /// Runs one delivery to completion and logs its outcome. The returned
    /// result is the same outcome; the worker pool drops it.
    pub async fn deliver(
        &self,
        message: &NotificationMessage,
        recipient: Option<&FcmToken>,
    ) -> Result<String, NotificationError> {
        let topic = message.topic.map(Topic::as_str).unwrap_or_default();

        let outcome = self.try_deliver(message, recipient).await;
        match &outcome {
            Ok(fcm_message_id) => {
                record_push_notification(topic, true);
                debug!(
                    msg_id = message.id,
                    member_id = recipient.map(|d| d.member_id),
                    fcm_message_id = %fcm_message_id,
                    "notification sent"
                );
            }
            Err(err) => {
                record_push_notification(topic, false);
                error!(
                    msg_id = message.id,
                    member_id = recipient.map(|d| d.member_id),
                    member_reg_branch_id = recipient.map(|d| d.member_regist_branch_id),
                    device_platform = recipient.map(|d| d.platform.as_str()),
                    device_id = recipient.map(|d| d.device_id.as_str()),
                    topic = message.topic.map(Topic::as_str),
                    "fail to send notification: {}",
                    err
                );
            }
        }

        outcome
    }

    async fn try_deliver(
        &self,
        message: &NotificationMessage,
        recipient: Option<&FcmToken>,
    ) -> Result<String, NotificationError> {
        if let Some(device) = recipient {
            self.ledger.mark_pending(device.owner(), message.id).await?;
        }

        let wire = build_message(message, recipient);
        let wire = &wire;

        retry(
            &self.policy,
            move |_| self.attempt(message, recipient, wire),
            |err, wait| {
                if let NotificationError::Vendor(push_err) = err {
                    record_push_retry(push_err.kind());
                }
                warn!(
                    msg_id = message.id,
                    member_id = recipient.map(|d| d.member_id),
                    member_reg_branch_id = recipient.map(|d| d.member_regist_branch_id),
                    device_platform = recipient.map(|d| d.platform.as_str()),
                    device_id = recipient.map(|d| d.device_id.as_str()),
                    topic = message.topic.map(Topic::as_str),
                    retry_in_ms = wait.as_millis() as u64,
                    "fail to send notification: {}",
                    err
                );
            },
        )
        .await
        .map_err(RetryError::into_inner)
    }

    async fn attempt(
        &self,
        message: &NotificationMessage,
        recipient: Option<&FcmToken>,
        wire: &FcmMessage,
    ) -> Attempt<String, NotificationError> {
        let sent = match tokio::time::timeout(self.send_timeout, self.push.send(wire)).await {
            Ok(result) => result,
            Err(_) => Err(PushError::Timeout),
        };

        let error = match sent {
            Ok(fcm_message_id) => {
                if let Some(device) = recipient {
                    if let Err(e) = self
                        .ledger
                        .mark_sent(device.owner(), message.id, &fcm_message_id)
                        .await
                    {
                        return Attempt::Fail(e.into());
                    }
                }
                return Attempt::Done(fcm_message_id);
            }
            Err(error) => error,
        };

        match classify(&error, recipient.is_some(), &self.hints) {
            Verdict::Retry(after) => Attempt::Retry {
                error: error.into(),
                after: Some(after),
            },
            Verdict::Terminal(cleanup) => match self.clean_up(cleanup, message, recipient).await {
                // a failed cleanup is the more actionable error
                Err(e) => Attempt::Fail(e.into()),
                Ok(()) => Attempt::Fail(error.into()),
            },
        }
    }

    async fn clean_up(
        &self,
        cleanup: Cleanup,
        message: &NotificationMessage,
        recipient: Option<&FcmToken>,
    ) -> Result<(), RepositoryError> {
        let Some(device) = recipient else {
            return Ok(());
        };

        match cleanup {
            Cleanup::Nothing => Ok(()),
            Cleanup::DiscardRecord => self.ledger.discard(device.owner(), message.id).await,
            Cleanup::PruneTokenAndDiscardRecord => {
                match self.ledger.invalidate_token(device).await {
                    Ok(()) => {
                        record_token_pruned();
                        info!(
                            member_id = device.member_id,
                            member_reg_branch_id = device.member_regist_branch_id,
                            device_id = %device.device_id,
                            "pruned unregistered FCM token"
                        );
                    }
                    Err(e) => error!(
                        member_id = device.member_id,
                        member_reg_branch_id = device.member_regist_branch_id,
                        device_id = %device.device_id,
                        "failed to delete invalid FCM token: {}",
                        e
                    ),
                }
                self.ledger.discard(device.owner(), message.id).await
            }
        }
    }
}
