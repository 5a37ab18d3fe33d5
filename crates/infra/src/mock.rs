//! # テスト用モック
//!
//! ユースケーステストで使用するインメモリ実装。
//! `test-utils` feature を有効にすることで、他クレートからも利用可能。
//!
//! ```toml
//! [dev-dependencies]
//! notifyd-infra = { workspace = true, features = ["test-utils"] }
//! ```

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration as StdDuration,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use notifyd_domain::{
    client::{Client, ClientId, Kind, KindId, Template, TemplateId},
    clock::{Clock, SystemClock},
    directory::{Identity, OrgRole, Organization, Space, UserGuid},
    job::{FailOutcome, Job, JobId, JobState, RetryPolicy, WorkerId},
    message::{Message, MessageStatus},
    notification::{EmailMessage, MessageId, NotificationError},
};
use tokio::sync::Notify;

use crate::{
    db::{TransactionManager, TxContext},
    directory::{AccessToken, DirectoryError, OrgDirectory, UserDirectory},
    error::InfraError,
    notification::NotificationSender,
    queue::{JobQueue, reserve_with_wake},
    repository::{
        ClientRepository,
        KindRepository,
        MessageRepository,
        ReceiptRepository,
        TemplateRepository,
        UnsubscribeRepository,
    },
    template_store::{TemplateLoadError, TemplateStore},
};

// ===== MockTransactionManager =====

/// Mock 用 TransactionManager（常に Mock TxContext を返す）
#[derive(Clone, Default)]
pub struct MockTransactionManager;

#[async_trait]
impl TransactionManager for MockTransactionManager {
    async fn begin(&self) -> Result<TxContext, InfraError> {
        Ok(TxContext::mock())
    }
}

// ===== MockJobQueue =====

/// インメモリのジョブキュー
///
/// リースは扱わない。`fail` のジッタは常に 0。
#[derive(Clone)]
pub struct MockJobQueue {
    jobs:   Arc<Mutex<Vec<Job>>>,
    clock:  Arc<dyn Clock>,
    policy: RetryPolicy,
    wake:   Arc<Notify>,
}

impl Default for MockJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MockJobQueue {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock), RetryPolicy::default())
    }

    pub fn with_clock(clock: Arc<dyn Clock>, policy: RetryPolicy) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(Vec::new())),
            clock,
            policy,
            wake: Arc::new(Notify::new()),
        }
    }

    /// 残っているジョブ（予約中を含む）
    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobQueue for MockJobQueue {
    async fn enqueue(
        &self,
        _tx: &mut TxContext,
        payload: serde_json::Value,
    ) -> Result<JobId, InfraError> {
        let now = self.clock.now();
        let id = JobId::new();
        self.jobs.lock().unwrap().push(Job {
            id,
            payload,
            state: JobState::Queued,
            attempts: 0,
            available_at: now,
            reserved_by: None,
            created_at: now,
        });
        self.wake.notify_waiters();
        Ok(id)
    }

    async fn try_reserve(&self, worker_id: &WorkerId) -> Result<Option<Job>, InfraError> {
        let now = self.clock.now();
        let mut jobs = self.jobs.lock().unwrap();
        let next = jobs
            .iter_mut()
            .filter(|j| j.state == JobState::Queued && j.available_at <= now)
            .min_by_key(|j| j.available_at);

        Ok(next.map(|job| {
            job.state = JobState::Reserved;
            job.reserved_by = Some(worker_id.clone());
            job.clone()
        }))
    }

    async fn reserve(
        &self,
        worker_id: &WorkerId,
        max_wait: StdDuration,
    ) -> Result<Option<Job>, InfraError> {
        reserve_with_wake(
            self,
            &self.wake,
            worker_id,
            max_wait,
            StdDuration::from_millis(10),
        )
        .await
    }

    async fn succeed(&self, job: &Job) -> Result<(), InfraError> {
        self.jobs
            .lock()
            .unwrap()
            .retain(|j| !(j.id == job.id && j.reserved_by == job.reserved_by));
        Ok(())
    }

    async fn fail(&self, job: &Job) -> Result<FailOutcome, InfraError> {
        let now = self.clock.now();
        let mut jobs = self.jobs.lock().unwrap();
        let Some(stored) = jobs.iter_mut().find(|j| {
            j.id == job.id && j.state == JobState::Reserved && j.reserved_by == job.reserved_by
        }) else {
            return Err(InfraError::conflict("Job", job.id.to_string()));
        };

        let outcome = self.policy.on_failure(stored.attempts, now, Duration::zero());
        match outcome {
            FailOutcome::Retry {
                attempts,
                available_at,
            } => {
                stored.state = JobState::Queued;
                stored.attempts = attempts;
                stored.available_at = available_at;
                stored.reserved_by = None;
            }
            FailOutcome::Exhausted { .. } => {
                jobs.retain(|j| j.id != job.id);
            }
        }
        Ok(outcome)
    }

    async fn discard(&self, job: &Job) -> Result<(), InfraError> {
        self.succeed(job).await
    }

    async fn unlock(&self) -> Result<u64, InfraError> {
        let mut count = 0;
        for job in self.jobs.lock().unwrap().iter_mut() {
            if job.state == JobState::Reserved {
                job.state = JobState::Queued;
                job.reserved_by = None;
                count += 1;
            }
        }
        Ok(count)
    }
}

// ===== MockClientRepository =====

#[derive(Clone, Default)]
pub struct MockClientRepository {
    clients: Arc<Mutex<HashMap<ClientId, Client>>>,
}

impl MockClientRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_client(&self, client: Client) {
        self.clients.lock().unwrap().insert(client.id.clone(), client);
    }

    pub fn get(&self, id: &ClientId) -> Option<Client> {
        self.clients.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl ClientRepository for MockClientRepository {
    async fn register(&self, _tx: &mut TxContext, client: &Client) -> Result<(), InfraError> {
        let mut clients = self.clients.lock().unwrap();
        clients
            .entry(client.id.clone())
            .and_modify(|c| c.source_name.clone_from(&client.source_name))
            .or_insert_with(|| Client {
                template_id: None,
                ..client.clone()
            });
        Ok(())
    }

    async fn ensure(&self, _tx: &mut TxContext, id: &ClientId) -> Result<(), InfraError> {
        self.clients
            .lock()
            .unwrap()
            .entry(id.clone())
            .or_insert_with(|| Client {
                id:          id.clone(),
                source_name: String::new(),
                template_id: None,
            });
        Ok(())
    }

    async fn find_by_id(
        &self,
        _tx: &mut TxContext,
        id: &ClientId,
    ) -> Result<Option<Client>, InfraError> {
        Ok(self.get(id))
    }
}

// ===== MockKindRepository =====

#[derive(Clone, Default)]
pub struct MockKindRepository {
    kinds: Arc<Mutex<HashMap<(ClientId, KindId), Kind>>>,
}

impl MockKindRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_kind(&self, kind: Kind) {
        self.kinds
            .lock()
            .unwrap()
            .insert((kind.client_id.clone(), kind.id.clone()), kind);
    }

    pub fn get(&self, id: &KindId, client_id: &ClientId) -> Option<Kind> {
        self.kinds
            .lock()
            .unwrap()
            .get(&(client_id.clone(), id.clone()))
            .cloned()
    }
}

#[async_trait]
impl KindRepository for MockKindRepository {
    async fn register(&self, _tx: &mut TxContext, kind: &Kind) -> Result<(), InfraError> {
        let mut kinds = self.kinds.lock().unwrap();
        kinds
            .entry((kind.client_id.clone(), kind.id.clone()))
            .and_modify(|k| {
                k.description.clone_from(&kind.description);
                k.critical = kind.critical;
            })
            .or_insert_with(|| Kind {
                template_id: None,
                ..kind.clone()
            });
        Ok(())
    }

    async fn ensure(
        &self,
        _tx: &mut TxContext,
        id: &KindId,
        client_id: &ClientId,
    ) -> Result<(), InfraError> {
        self.kinds
            .lock()
            .unwrap()
            .entry((client_id.clone(), id.clone()))
            .or_insert_with(|| Kind {
                id:          id.clone(),
                client_id:   client_id.clone(),
                description: String::new(),
                critical:    false,
                template_id: None,
            });
        Ok(())
    }

    async fn find(
        &self,
        _tx: &mut TxContext,
        id: &KindId,
        client_id: &ClientId,
    ) -> Result<Option<Kind>, InfraError> {
        Ok(self.get(id, client_id))
    }
}

// ===== MockTemplateRepository =====

#[derive(Clone, Default)]
pub struct MockTemplateRepository {
    templates: Arc<Mutex<HashMap<TemplateId, Template>>>,
}

impl MockTemplateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_template(&self, template: Template) {
        self.templates
            .lock()
            .unwrap()
            .insert(template.id.clone(), template);
    }
}

#[async_trait]
impl TemplateRepository for MockTemplateRepository {
    async fn find_by_id(&self, id: &TemplateId) -> Result<Option<Template>, InfraError> {
        Ok(self.templates.lock().unwrap().get(id).cloned())
    }
}

// ===== MockUnsubscribeRepository =====

#[derive(Clone, Default)]
pub struct MockUnsubscribeRepository {
    global: Arc<Mutex<HashSet<UserGuid>>>,
    kinds:  Arc<Mutex<HashSet<(UserGuid, ClientId, KindId)>>>,
}

impl MockUnsubscribeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unsubscribe_globally(&self, user_guid: UserGuid) {
        self.global.lock().unwrap().insert(user_guid);
    }

    pub fn unsubscribe(&self, user_guid: UserGuid, client_id: ClientId, kind_id: KindId) {
        self.kinds
            .lock()
            .unwrap()
            .insert((user_guid, client_id, kind_id));
    }
}

#[async_trait]
impl UnsubscribeRepository for MockUnsubscribeRepository {
    async fn is_globally_unsubscribed(
        &self,
        _tx: &mut TxContext,
        user_guid: &UserGuid,
    ) -> Result<bool, InfraError> {
        Ok(self.global.lock().unwrap().contains(user_guid))
    }

    async fn is_unsubscribed(
        &self,
        _tx: &mut TxContext,
        user_guid: &UserGuid,
        client_id: &ClientId,
        kind_id: &KindId,
    ) -> Result<bool, InfraError> {
        Ok(self.kinds.lock().unwrap().contains(&(
            user_guid.clone(),
            client_id.clone(),
            kind_id.clone(),
        )))
    }
}

// ===== MockReceiptRepository =====

#[derive(Clone, Default)]
pub struct MockReceiptRepository {
    receipts: Arc<Mutex<HashSet<(UserGuid, ClientId, KindId)>>>,
}

impl MockReceiptRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 記録済みの受信記録（ソート済み）
    pub fn receipts(&self) -> Vec<(UserGuid, ClientId, KindId)> {
        let mut receipts: Vec<_> = self.receipts.lock().unwrap().iter().cloned().collect();
        receipts.sort();
        receipts
    }
}

#[async_trait]
impl ReceiptRepository for MockReceiptRepository {
    async fn create_receipts(
        &self,
        _tx: &mut TxContext,
        user_guids: &[UserGuid],
        client_id: &ClientId,
        kind_id: &KindId,
    ) -> Result<(), InfraError> {
        let mut receipts = self.receipts.lock().unwrap();
        for guid in user_guids {
            receipts.insert((guid.clone(), client_id.clone(), kind_id.clone()));
        }
        Ok(())
    }
}

// ===== MockMessageRepository =====

#[derive(Clone, Default)]
pub struct MockMessageRepository {
    messages: Arc<Mutex<HashMap<MessageId, Message>>>,
}

impl MockMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&self, message: Message) {
        self.messages.lock().unwrap().insert(message.id, message);
    }

    pub fn status_of(&self, id: &MessageId) -> Option<MessageStatus> {
        self.messages.lock().unwrap().get(id).map(|m| m.status)
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MessageRepository for MockMessageRepository {
    async fn upsert_status(
        &self,
        id: &MessageId,
        status: MessageStatus,
        now: DateTime<Utc>,
    ) -> Result<(), InfraError> {
        self.messages
            .lock()
            .unwrap()
            .entry(*id)
            .and_modify(|m| {
                m.status = status;
                m.updated_at = now;
            })
            .or_insert(Message {
                id: *id,
                status,
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    async fn find_by_id(&self, id: &MessageId) -> Result<Option<Message>, InfraError> {
        Ok(self.messages.lock().unwrap().get(id).cloned())
    }

    async fn delete_created_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<u64, InfraError> {
        let mut messages = self.messages.lock().unwrap();
        let mut expired: Vec<_> = messages
            .values()
            .filter(|m| m.created_at < cutoff)
            .map(|m| (m.created_at, m.id))
            .collect();
        expired.sort_by_key(|(created_at, _)| *created_at);
        expired.truncate(usize::try_from(limit).unwrap_or(0));

        for (_, id) in &expired {
            messages.remove(id);
        }
        Ok(expired.len() as u64)
    }
}

// ===== MockUserDirectory =====

#[derive(Clone, Default)]
pub struct MockUserDirectory {
    users:          Arc<Mutex<Vec<Identity>>>,
    scopes:         Arc<Mutex<HashMap<String, Vec<UserGuid>>>>,
    failure:        Arc<Mutex<Option<fn() -> DirectoryError>>>,
    token_requests: Arc<Mutex<usize>>,
}

impl MockUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, guid: &str, emails: &[&str]) {
        self.users.lock().unwrap().push(Identity {
            guid:   UserGuid::new(guid).unwrap(),
            emails: emails.iter().map(ToString::to_string).collect(),
        });
    }

    pub fn add_scope(&self, scope: &str, guids: &[&str]) {
        self.scopes.lock().unwrap().insert(
            scope.to_string(),
            guids.iter().map(|g| UserGuid::new(*g).unwrap()).collect(),
        );
    }

    /// 以後の呼び出しをすべて失敗させる
    pub fn fail_with(&self, make: fn() -> DirectoryError) {
        *self.failure.lock().unwrap() = Some(make);
    }

    /// `client_token` が呼ばれた回数
    pub fn token_requests(&self) -> usize {
        *self.token_requests.lock().unwrap()
    }

    fn check(&self) -> Result<(), DirectoryError> {
        match *self.failure.lock().unwrap() {
            Some(make) => Err(make()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl UserDirectory for MockUserDirectory {
    async fn client_token(&self) -> Result<AccessToken, DirectoryError> {
        self.check()?;
        *self.token_requests.lock().unwrap() += 1;
        Ok(AccessToken::new("mock-token"))
    }

    async fn users_by_ids(
        &self,
        guids: &[UserGuid],
        _token: &AccessToken,
    ) -> Result<Vec<Identity>, DirectoryError> {
        self.check()?;
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| guids.contains(&u.guid))
            .cloned()
            .collect())
    }

    async fn user_guids_by_scope(
        &self,
        scope: &str,
        _token: &AccessToken,
    ) -> Result<Vec<UserGuid>, DirectoryError> {
        self.check()?;
        Ok(self
            .scopes
            .lock()
            .unwrap()
            .get(scope)
            .cloned()
            .unwrap_or_default())
    }

    async fn all_users(&self, _token: &AccessToken) -> Result<Vec<Identity>, DirectoryError> {
        self.check()?;
        Ok(self.users.lock().unwrap().clone())
    }
}

// ===== MockOrgDirectory =====

#[derive(Clone, Default)]
pub struct MockOrgDirectory {
    spaces:        Arc<Mutex<HashMap<String, Space>>>,
    organizations: Arc<Mutex<HashMap<String, Organization>>>,
    space_members: Arc<Mutex<HashMap<String, Vec<UserGuid>>>>,
    org_members:   Arc<Mutex<HashMap<(String, Option<OrgRole>), Vec<UserGuid>>>>,
    failure:       Arc<Mutex<Option<fn() -> DirectoryError>>>,
}

impl MockOrgDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_organization(&self, guid: &str, name: &str) {
        self.organizations.lock().unwrap().insert(
            guid.to_string(),
            Organization {
                guid: guid.to_string(),
                name: name.to_string(),
            },
        );
    }

    pub fn add_space(&self, guid: &str, name: &str, organization_guid: &str, members: &[&str]) {
        self.spaces.lock().unwrap().insert(
            guid.to_string(),
            Space {
                guid:              guid.to_string(),
                name:              name.to_string(),
                organization_guid: organization_guid.to_string(),
            },
        );
        self.space_members.lock().unwrap().insert(
            guid.to_string(),
            members.iter().map(|m| UserGuid::new(*m).unwrap()).collect(),
        );
    }

    pub fn add_org_members(&self, guid: &str, role: Option<OrgRole>, members: &[&str]) {
        self.org_members.lock().unwrap().insert(
            (guid.to_string(), role),
            members.iter().map(|m| UserGuid::new(*m).unwrap()).collect(),
        );
    }

    /// 以後の呼び出しをすべて失敗させる
    pub fn fail_with(&self, make: fn() -> DirectoryError) {
        *self.failure.lock().unwrap() = Some(make);
    }

    fn check(&self) -> Result<(), DirectoryError> {
        match *self.failure.lock().unwrap() {
            Some(make) => Err(make()),
            None => Ok(()),
        }
    }
}

fn not_found(entity: &'static str, id: &str) -> DirectoryError {
    DirectoryError::NotFound {
        entity,
        id: id.to_string(),
    }
}

#[async_trait]
impl OrgDirectory for MockOrgDirectory {
    async fn space(&self, guid: &str, _token: &AccessToken) -> Result<Space, DirectoryError> {
        self.check()?;
        self.spaces
            .lock()
            .unwrap()
            .get(guid)
            .cloned()
            .ok_or_else(|| not_found("Space", guid))
    }

    async fn organization(
        &self,
        guid: &str,
        _token: &AccessToken,
    ) -> Result<Organization, DirectoryError> {
        self.check()?;
        self.organizations
            .lock()
            .unwrap()
            .get(guid)
            .cloned()
            .ok_or_else(|| not_found("Organization", guid))
    }

    async fn space_user_guids(
        &self,
        guid: &str,
        _token: &AccessToken,
    ) -> Result<Vec<UserGuid>, DirectoryError> {
        self.check()?;
        self.space_members
            .lock()
            .unwrap()
            .get(guid)
            .cloned()
            .ok_or_else(|| not_found("Space", guid))
    }

    async fn organization_user_guids(
        &self,
        guid: &str,
        role: Option<OrgRole>,
        _token: &AccessToken,
    ) -> Result<Vec<UserGuid>, DirectoryError> {
        self.check()?;
        if !self.organizations.lock().unwrap().contains_key(guid) {
            return Err(not_found("Organization", guid));
        }
        Ok(self
            .org_members
            .lock()
            .unwrap()
            .get(&(guid.to_string(), role))
            .cloned()
            .unwrap_or_default())
    }
}

// ===== MockNotificationSender =====

/// 送信したメールを記録する NotificationSender
#[derive(Clone, Default)]
pub struct MockNotificationSender {
    sent:    Arc<Mutex<Vec<EmailMessage>>>,
    failure: Arc<Mutex<Option<fn() -> NotificationError>>>,
}

impl MockNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// 以後の送信をすべて失敗させる
    pub fn fail_with(&self, make: fn() -> NotificationError) {
        *self.failure.lock().unwrap() = Some(make);
    }

    /// 失敗設定を解除する
    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }
}

#[async_trait]
impl NotificationSender for MockNotificationSender {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), NotificationError> {
        if let Some(make) = *self.failure.lock().unwrap() {
            return Err(make());
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

// ===== MockTemplateStore =====

/// 名前 → 本文のインメモリテンプレートストア
#[derive(Clone, Default)]
pub struct MockTemplateStore {
    templates: Arc<Mutex<HashMap<String, String>>>,
}

impl MockTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 6 種の既定テンプレートを簡易な本文で登録した状態で作成する
    pub fn with_defaults() -> Self {
        let store = Self::new();
        store.set("subject.provided", "{{ subject }}");
        store.set("subject.missing", "{{ source_description }}: {{ kind_description }}");
        store.set("user_body.text", "{{ text }}");
        store.set("user_body.html", "<div>{{ html | safe }}</div>");
        store.set("space_body.text", "[{{ organization }}/{{ space }}] {{ text }}");
        store.set(
            "space_body.html",
            "<p>{{ organization }}/{{ space }}</p>{{ html | safe }}",
        );
        store
    }

    pub fn set(&self, name: &str, body: &str) {
        self.templates
            .lock()
            .unwrap()
            .insert(name.to_string(), body.to_string());
    }

    pub fn remove(&self, name: &str) {
        self.templates.lock().unwrap().remove(name);
    }
}

#[async_trait]
impl TemplateStore for MockTemplateStore {
    async fn load(&self, name: &str) -> Result<String, TemplateLoadError> {
        self.templates
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| TemplateLoadError {
                name:   name.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
    }
}
