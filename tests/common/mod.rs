#![allow(dead_code)]

use async_trait::async_trait;
use member_push_ws::notifications::{
    AudienceFilter, FcmMessage, FcmToken, MemberNotification, MemberNotificationListItem,
    NewNotificationMessage, NotificationEngine, NotificationMessage, NotificationRepository,
    NotificationStatus, PushClient, PushError, RepositoryError,
};
use parking_lot::Mutex;
use shared::config::NotificationConfig;
use shared::{MemberIdentity, SimplePagination};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Membership attributes the audience filter looks at
#[derive(Debug, Clone)]
pub struct Profile {
    pub member_type: i64,
    pub gender: String,
    pub age: i32,
    pub member_code: String,
}

impl Profile {
    pub fn new(member_type: i64, gender: &str, age: i32, member_code: &str) -> Self {
        Self {
            member_type,
            gender: gender.to_string(),
            age,
            member_code: member_code.to_string(),
        }
    }

    fn matches(&self, filter: &AudienceFilter) -> bool {
        (filter.member_types.is_empty() || filter.member_types.contains(&self.member_type))
            && (filter.genders.is_empty() || filter.genders.contains(&self.gender))
            && filter.age.map_or(true, |bound| bound.contains(self.age))
            && (filter.member_codes.is_empty() || filter.member_codes.contains(&self.member_code))
    }
}

#[derive(Default)]
struct RepoState {
    devices: Vec<FcmToken>,
    profiles: HashMap<MemberIdentity, Profile>,
    messages: Vec<NotificationMessage>,
    records: HashMap<(MemberIdentity, i64), MemberNotification>,
    record_writes: Vec<MemberNotification>,
    deleted_tokens: Vec<(MemberIdentity, String)>,
    page_requests: Vec<(AudienceFilter, SimplePagination)>,
    list_requests: Vec<(MemberIdentity, u64, u32)>,
}

/// In-memory stand-in for the membership database
#[derive(Default)]
pub struct FakeRepository {
    state: Mutex<RepoState>,
    pub fail_message_create: AtomicBool,
    pub fail_record_delete: AtomicBool,
    pub fail_token_delete: AtomicBool,
    /// Fails only the write that finalizes a record as SENT
    pub fail_sent_update: AtomicBool,
}

impl FakeRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_member(&self, member_id: i64, branch_id: i64, profile: Profile) -> FcmToken {
        let token = FcmToken {
            member_id,
            member_regist_branch_id: branch_id,
            device_id: format!("device-{}", member_id),
            platform: "android".to_string(),
            token: format!("token-{}", member_id),
        };

        let mut state = self.state.lock();
        state
            .profiles
            .insert(MemberIdentity::new(member_id, branch_id), profile);
        state.devices.push(token.clone());
        token
    }

    pub fn devices(&self) -> Vec<FcmToken> {
        self.state.lock().devices.clone()
    }

    pub fn messages(&self) -> Vec<NotificationMessage> {
        self.state.lock().messages.clone()
    }

    pub fn record(&self, member: MemberIdentity, notification_id: i64) -> Option<MemberNotification> {
        self.state
            .lock()
            .records
            .get(&(member, notification_id))
            .cloned()
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn record_writes(&self) -> Vec<MemberNotification> {
        self.state.lock().record_writes.clone()
    }

    pub fn deleted_tokens(&self) -> Vec<(MemberIdentity, String)> {
        self.state.lock().deleted_tokens.clone()
    }

    pub fn page_requests(&self) -> Vec<(AudienceFilter, SimplePagination)> {
        self.state.lock().page_requests.clone()
    }

    pub fn list_requests(&self) -> Vec<(MemberIdentity, u64, u32)> {
        self.state.lock().list_requests.clone()
    }
}

fn storage_failure() -> RepositoryError {
    RepositoryError::Storage(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl NotificationRepository for FakeRepository {
    async fn save_fcm_token(&self, token: &FcmToken) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        // one token row per member registration, last write wins
        state.devices.retain(|d| d.owner() != token.owner());
        state.devices.push(token.clone());
        Ok(())
    }

    async fn get_fcm_tokens_by_filter(
        &self,
        filter: &AudienceFilter,
        page: SimplePagination,
    ) -> Result<Vec<FcmToken>, RepositoryError> {
        let mut state = self.state.lock();
        state.page_requests.push((filter.clone(), page));

        let matching: Vec<FcmToken> = state
            .devices
            .iter()
            .filter(|d| {
                state
                    .profiles
                    .get(&d.owner())
                    .map_or(false, |profile| profile.matches(filter))
            })
            .skip(page.offset() as usize)
            .take(page.size() as usize)
            .cloned()
            .collect();

        Ok(matching)
    }

    async fn delete_fcm_token(
        &self,
        owner: MemberIdentity,
        device_id: &str,
    ) -> Result<(), RepositoryError> {
        if self.fail_token_delete.load(Ordering::SeqCst) {
            return Err(storage_failure());
        }

        let mut state = self.state.lock();
        state
            .devices
            .retain(|d| !(d.owner() == owner && d.device_id == device_id));
        state.deleted_tokens.push((owner, device_id.to_string()));
        Ok(())
    }

    async fn create_notification_message(
        &self,
        message: NewNotificationMessage,
    ) -> Result<NotificationMessage, RepositoryError> {
        if self.fail_message_create.load(Ordering::SeqCst) {
            return Err(storage_failure());
        }

        let mut state = self.state.lock();
        let id = state.messages.len() as i64 + 1;
        let stored = NotificationMessage::from_new(id, message);
        state.messages.push(stored.clone());
        Ok(stored)
    }

    async fn save_member_notification(
        &self,
        record: &MemberNotification,
    ) -> Result<(), RepositoryError> {
        if record.status == NotificationStatus::Sent
            && self.fail_sent_update.load(Ordering::SeqCst)
        {
            return Err(storage_failure());
        }

        let mut state = self.state.lock();
        state
            .records
            .insert((record.member, record.notification_id), record.clone());
        state.record_writes.push(record.clone());
        Ok(())
    }

    async fn delete_member_notification(
        &self,
        member: MemberIdentity,
        notification_id: i64,
    ) -> Result<(), RepositoryError> {
        if self.fail_record_delete.load(Ordering::SeqCst) {
            return Err(storage_failure());
        }

        self.state.lock().records.remove(&(member, notification_id));
        Ok(())
    }

    async fn get_member_notifications(
        &self,
        member: MemberIdentity,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<MemberNotificationListItem>, RepositoryError> {
        let mut state = self.state.lock();
        state.list_requests.push((member, offset, limit));

        let mut items: Vec<MemberNotificationListItem> = state
            .records
            .values()
            .filter(|r| r.member == member)
            .filter_map(|r| {
                let message = state.messages.iter().find(|m| m.id == r.notification_id)?;
                Some(MemberNotificationListItem {
                    notification_id: r.notification_id,
                    fcm_message_id: r.fcm_message_id.clone(),
                    status: r.status,
                    title: message.title.clone(),
                    body: message.body.clone(),
                    image_url: message.image_url.clone(),
                })
            })
            .collect();
        items.sort_by(|a, b| b.notification_id.cmp(&a.notification_id));

        Ok(items
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

/// Scripted push vendor
#[derive(Default)]
pub struct FakePushClient {
    script: Mutex<VecDeque<Result<String, PushError>>>,
    fallback_error: Mutex<Option<PushError>>,
    subscription_error: Mutex<Option<PushError>>,
    delay: Mutex<Option<Duration>>,
    sent: Mutex<Vec<FcmMessage>>,
    subscriptions: Mutex<Vec<(Vec<String>, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakePushClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Responses used in order before falling back to the default behaviour
    pub fn push_responses(&self, responses: impl IntoIterator<Item = Result<String, PushError>>) {
        self.script.lock().extend(responses);
    }

    /// Every unscripted send fails with `error`
    pub fn always_fail_with(&self, error: PushError) {
        *self.fallback_error.lock() = Some(error);
    }

    pub fn fail_subscriptions_with(&self, error: PushError) {
        *self.subscription_error.lock() = Some(error);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn sent(&self) -> Vec<FcmMessage> {
        self.sent.lock().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn subscriptions(&self) -> Vec<(Vec<String>, String)> {
        self.subscriptions.lock().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushClient for FakePushClient {
    async fn send(&self, message: &FcmMessage) -> Result<String, PushError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let response = {
            let mut sent = self.sent.lock();
            sent.push(message.clone());
            let n = sent.len();
            match self.script.lock().pop_front() {
                Some(scripted) => scripted,
                None => match self.fallback_error.lock().clone() {
                    Some(error) => Err(error),
                    None => Ok(format!("projects/test/messages/{}", n)),
                },
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }

    async fn subscribe_to_topic(&self, tokens: &[String], topic: &str) -> Result<(), PushError> {
        if let Some(error) = self.subscription_error.lock().clone() {
            return Err(error);
        }
        self.subscriptions
            .lock()
            .push((tokens.to_vec(), topic.to_string()));
        Ok(())
    }
}

/// Engine settings with retry waits short enough for tests
pub fn test_config(concurrent_push_limit: usize) -> NotificationConfig {
    NotificationConfig {
        concurrent_push_limit,
        send_timeout_seconds: 5,
        wait_worker_pool_finish_on_close_seconds: 5,
        max_send_tries: 3,
        unavailable_retry_after_seconds: 0,
        quota_exceeded_retry_after_seconds: 0,
    }
}

pub fn engine(
    concurrent_push_limit: usize,
    repo: &Arc<FakeRepository>,
    push: &Arc<FakePushClient>,
) -> NotificationEngine {
    NotificationEngine::new(
        &test_config(concurrent_push_limit),
        repo.clone(),
        push.clone(),
    )
    .expect("engine")
}

/// Polls `condition` until it holds or `timeout` elapses
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
