use super::audience::{AudienceFilter, AudienceResolver};
use super::delivery::Dispatcher;
use super::error::{NotificationError, PoolError};
use super::ledger::DeliveryLedger;
use super::model::{
    ClientNotificationStatus, FcmToken, MemberNotificationListItem, Message,
    NewNotificationMessage, NotificationMessage, Topic,
};
use super::pool::WorkerPool;
use super::push::PushClient;
use super::repository::NotificationRepository;
use shared::config::NotificationConfig;
use shared::{MemberIdentity, SimplePagination};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use validator::Validate;

pub const DEFAULT_LIST_PAGE_SIZE: u32 = 50;

/// Entry point of the notification module.
///
/// `push` only persists the message before returning. Expanding it into
/// deliveries happens on a background task, and deliveries run on a bounded
/// worker pool.
pub struct NotificationEngine {
    is_closed: AtomicBool,
    ledger: DeliveryLedger,
    push_client: Arc<dyn PushClient>,
    fan_out: Arc<FanOut>,
    fan_outs: TaskTracker,
}

impl NotificationEngine {
    pub fn new(
        config: &NotificationConfig,
        repo: Arc<dyn NotificationRepository>,
        push_client: Arc<dyn PushClient>,
    ) -> Result<Self, NotificationError> {
        let pool = WorkerPool::new(config.concurrent_push_limit)?;
        let ledger = DeliveryLedger::new(repo.clone());
        let dispatcher = Dispatcher::new(ledger.clone(), push_client.clone(), config);

        let fan_out = FanOut {
            page_size: u32::try_from(config.concurrent_push_limit).unwrap_or(u32::MAX),
            resolver: AudienceResolver::new(repo),
            dispatcher: Arc::new(dispatcher),
            pool,
        };

        Ok(Self {
            is_closed: AtomicBool::new(false),
            ledger,
            push_client,
            fan_out: Arc::new(fan_out),
            fan_outs: TaskTracker::new(),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed.load(Ordering::SeqCst)
    }

    /// FCM topic names every device is subscribed to
    pub fn topics(&self) -> Vec<&'static str> {
        Topic::ALL.iter().map(|t| t.fcm_topic()).collect()
    }

    /// Persists `message` and hands delivery off to the background.
    ///
    /// Without a target filter the message is broadcast to its topic. With
    /// one, every matching device gets its own delivery.
    pub async fn push(&self, message: Message) -> Result<NotificationMessage, NotificationError> {
        if self.is_closed() {
            return Err(NotificationError::ServiceUnavailable);
        }

        message.validate()?;
        let audience = message.action.target_filter.as_ref().map(AudienceFilter::from);
        if audience.is_none() && message.action.topic.is_none() {
            return Err(NotificationError::client(
                "either a topic or a target filter is required",
            ));
        }

        let stored = self
            .ledger
            .record_message(NewNotificationMessage::from(&message))
            .await?;

        info!(
            msg_id = stored.id,
            topic = stored.topic.map(Topic::as_str),
            targeted = audience.is_some(),
            "notification accepted"
        );

        let fan_out = self.fan_out.clone();
        let job = Arc::new(stored.clone());
        self.fan_outs.spawn(async move {
            fan_out.run(job, audience).await;
        });

        Ok(stored)
    }

    /// Subscribes the device to every topic, then stores it. Nothing is stored
    /// if any subscription fails.
    pub async fn save_fcm_token(&self, token: FcmToken) -> Result<(), NotificationError> {
        let tokens = [token.token.clone()];
        for topic in Topic::ALL {
            self.push_client
                .subscribe_to_topic(&tokens, topic.fcm_topic())
                .await?;
        }

        self.ledger.register_token(&token).await?;
        Ok(())
    }

    pub async fn set_member_notification_status(
        &self,
        member: MemberIdentity,
        status: ClientNotificationStatus,
    ) -> Result<(), NotificationError> {
        status.validate()?;
        if !status.status.is_client_reportable() {
            return Err(NotificationError::client(format!(
                "status {} cannot be reported by a device",
                status.status
            )));
        }

        self.ledger.apply_client_status(member, &status).await?;
        Ok(())
    }

    /// Newest first. `page_size` 0 means the default; pages start at 1.
    pub async fn get_member_notification_list(
        &self,
        member: MemberIdentity,
        page: i64,
        page_size: u32,
    ) -> Result<Vec<MemberNotificationListItem>, NotificationError> {
        let page_size = if page_size == 0 {
            DEFAULT_LIST_PAGE_SIZE
        } else {
            page_size
        };
        let page = u64::try_from(page).unwrap_or(0).max(1);
        let offset = (page - 1).saturating_mul(u64::from(page_size));

        Ok(self.ledger.list(member, offset, page_size).await?)
    }

    pub async fn delete_member_notification(
        &self,
        member: MemberIdentity,
        notification_id: i64,
    ) -> Result<(), NotificationError> {
        self.ledger.discard(member, notification_id).await?;
        Ok(())
    }

    /// Rejects new pushes, then waits up to `drain_timeout` for accepted
    /// pushes to finish fanning out and for running deliveries to finish.
    pub async fn close(&self, drain_timeout: Duration) -> Result<(), NotificationError> {
        self.is_closed.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + drain_timeout;

        self.fan_outs.close();
        if tokio::time::timeout_at(deadline, self.fan_outs.wait())
            .await
            .is_err()
        {
            warn!("notification fan-out still running at shutdown, remaining recipients are skipped");
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        self.fan_out.pool.close(remaining).await?;

        info!("notification engine closed");
        Ok(())
    }
}

struct FanOut {
    page_size: u32,
    resolver: AudienceResolver,
    dispatcher: Arc<Dispatcher>,
    pool: WorkerPool,
}

impl FanOut {
    async fn run(&self, message: Arc<NotificationMessage>, audience: Option<AudienceFilter>) {
        let Some(filter) = audience else {
            if let Err(e) = self.submit(message.clone(), None).await {
                error!(msg_id = message.id, "failed to submit topic broadcast: {}", e);
            }
            return;
        };

        let mut page = SimplePagination::new(self.page_size);
        let mut submitted = 0usize;

        loop {
            let recipients = match self.resolver.page(&filter, page).await {
                Ok(recipients) => recipients,
                Err(e) => {
                    error!(
                        msg_id = message.id,
                        offset = page.offset(),
                        submitted,
                        "failed to resolve notification audience: {}",
                        e
                    );
                    return;
                }
            };

            if recipients.is_empty() {
                break;
            }

            for device in recipients {
                if let Err(e) = self.submit(message.clone(), Some(device)).await {
                    error!(
                        msg_id = message.id,
                        submitted,
                        "failed to submit notification delivery: {}",
                        e
                    );
                    return;
                }
                submitted += 1;
            }

            debug!(msg_id = message.id, offset = page.offset(), submitted, "audience page submitted");
            page = page.next();
        }

        info!(msg_id = message.id, recipients = submitted, "notification fan-out complete");
    }

    async fn submit(
        &self,
        message: Arc<NotificationMessage>,
        recipient: Option<FcmToken>,
    ) -> Result<(), PoolError> {
        let dispatcher = self.dispatcher.clone();
        self.pool
            .submit(async move {
                // the outcome is already logged
                let _ = dispatcher.deliver(&message, recipient.as_ref()).await;
            })
            .await
    }
}
