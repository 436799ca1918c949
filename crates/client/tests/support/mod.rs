#![forbid(unsafe_code)]
#![allow(dead_code)]

use async_trait::async_trait;
use rh_client::{ApiError, Backend, FeedHub, NoticeReceiver, RecordingRedirector, Session, SessionDeps};
use rh_core::feed::{ChangeEvent, EntityKind, Operation};
use rh_core::model::{
    Activity, Catalog, Identity, Message, NewBankAccount, Page, Platform, SystemConfig, TaskStatus,
    Transaction, TransactionKind, TransactionStatus, UserTask,
};
use rh_storage::{MarkerKey, MarkerStore, MemoryMarkers};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;

pub(crate) const USER: &str = "u1";

#[derive(Default)]
struct Script {
    calls: Vec<&'static str>,
    gates: HashMap<&'static str, VecDeque<oneshot::Receiver<()>>>,
    failures: HashMap<&'static str, VecDeque<ApiError>>,
    invites: Vec<Option<String>>,
    next_id: u64,
}

/// Backend double holding the server-side truth. Calls can be held back with [`gate`] and made
/// to fail with [`fail_next`].
///
/// [`gate`]: FakeBackend::gate
/// [`fail_next`]: FakeBackend::fail_next
pub(crate) struct FakeBackend {
    user: Mutex<Identity>,
    catalog: Mutex<Catalog>,
    config: Mutex<SystemConfig>,
    script: Mutex<Script>,
}

impl FakeBackend {
    pub(crate) fn new(user: Identity, catalog: Catalog) -> Arc<Self> {
        Arc::new(Self {
            user: Mutex::new(user),
            catalog: Mutex::new(catalog),
            config: Mutex::new(SystemConfig::default()),
            script: Mutex::new(Script::default()),
        })
    }

    pub(crate) fn user(&self) -> Identity {
        lock(&self.user).clone()
    }

    pub(crate) fn update_user(&self, change: impl FnOnce(&mut Identity)) {
        change(&mut lock(&self.user));
    }

    pub(crate) fn set_config(&self, config: SystemConfig) {
        *lock(&self.config) = config;
    }

    /// Holds the next call of `op` until the returned sender fires (or is dropped).
    pub(crate) fn gate(&self, op: &'static str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        lock(&self.script).gates.entry(op).or_default().push_back(rx);
        tx
    }

    pub(crate) fn fail_next(&self, op: &'static str, err: ApiError) {
        lock(&self.script)
            .failures
            .entry(op)
            .or_default()
            .push_back(err);
    }

    pub(crate) fn calls(&self, op: &str) -> usize {
        lock(&self.script).calls.iter().filter(|c| **c == op).count()
    }

    pub(crate) fn invites(&self) -> Vec<Option<String>> {
        lock(&self.script).invites.clone()
    }

    async fn before(&self, op: &'static str) -> Result<(), ApiError> {
        let (gate, failure) = {
            let mut script = lock(&self.script);
            script.calls.push(op);
            let gate = script.gates.get_mut(op).and_then(VecDeque::pop_front);
            let failure = script.failures.get_mut(op).and_then(VecDeque::pop_front);
            (gate, failure)
        };
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut script = lock(&self.script);
        script.next_id += 1;
        format!("{prefix}{}", script.next_id)
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn login(&self, _email: &str, _password: &str) -> Result<Identity, ApiError> {
        self.before("login").await?;
        Ok(self.user())
    }

    async fn register(
        &self,
        _email: &str,
        _password: &str,
        invite_code: Option<&str>,
    ) -> Result<Identity, ApiError> {
        self.before("register").await?;
        lock(&self.script)
            .invites
            .push(invite_code.map(str::to_string));
        Ok(self.user())
    }

    async fn get_user(&self, user_id: &str) -> Result<Identity, ApiError> {
        self.before("get_user").await?;
        let user = self.user();
        if user.id != user_id {
            return Err(ApiError::status(404, "User not found"));
        }
        Ok(user)
    }

    async fn initial_data(&self) -> Result<Catalog, ApiError> {
        self.before("initial_data").await?;
        Ok(lock(&self.catalog).clone())
    }

    async fn config(&self) -> Result<SystemConfig, ApiError> {
        self.before("config").await?;
        Ok(lock(&self.config).clone())
    }

    async fn like_task(&self, _user_id: &str, platform_id: &str) -> Result<Identity, ApiError> {
        self.before("like_task").await?;
        if self.user().has_liked(platform_id) {
            return Err(ApiError::status(400, "Already liked"));
        }
        self.update_user(|user| user.liked_task_ids.push(platform_id.to_string()));
        if let Some(platform) = lock(&self.catalog)
            .platforms
            .iter_mut()
            .find(|p| p.id == platform_id)
        {
            platform.likes = Some(platform.like_count() + 1);
        }
        Ok(self.user())
    }

    async fn start_task(&self, _user_id: &str, platform_id: &str) -> Result<UserTask, ApiError> {
        self.before("start_task").await?;
        let row = server_task(&format!("T-{platform_id}"), platform_id, TaskStatus::Ongoing);
        self.update_user(|user| user.my_tasks.insert(0, row.clone()));
        Ok(row)
    }

    async fn submit_task_proof(
        &self,
        _user_id: &str,
        task_id: &str,
        proof_image_url: &str,
    ) -> Result<(), ApiError> {
        self.before("submit_task_proof").await?;
        self.update_user(|user| {
            if let Some(task) = user.my_tasks.iter_mut().find(|t| t.id == task_id) {
                task.status = TaskStatus::Reviewing;
                task.proof_image_url = Some(proof_image_url.to_string());
            }
        });
        Ok(())
    }

    async fn bind_phone(&self, _user_id: &str, phone: &str) -> Result<Identity, ApiError> {
        self.before("bind_phone").await?;
        self.update_user(|user| user.phone = Some(phone.to_string()));
        Ok(self.user())
    }

    async fn bind_account(
        &self,
        _user_id: &str,
        account: &NewBankAccount,
    ) -> Result<Identity, ApiError> {
        self.before("bind_account").await?;
        let id = self.next_id("bank-");
        self.update_user(|user| user.bank_accounts.push(account.with_id(id)));
        Ok(self.user())
    }

    async fn withdraw(
        &self,
        _user_id: &str,
        amount: f64,
        _account_id: &str,
    ) -> Result<Identity, ApiError> {
        self.before("withdraw").await?;
        let id = self.next_id("W");
        self.update_user(|user| {
            user.balance -= amount;
            user.transactions.insert(
                0,
                transaction(&id, TransactionKind::Withdraw, -amount, TransactionStatus::Pending),
            );
        });
        Ok(self.user())
    }

    async fn mark_all_messages_read(&self, _user_id: &str) -> Result<(), ApiError> {
        self.before("mark_all_messages_read").await?;
        self.update_user(|user| user.messages.iter_mut().for_each(|m| m.read = true));
        Ok(())
    }

    async fn user_transactions(
        &self,
        _user_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Transaction>, ApiError> {
        self.before("user_transactions").await?;
        Ok(paginate(self.user().transactions, page, per_page))
    }

    async fn user_tasks(
        &self,
        _user_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Page<UserTask>, ApiError> {
        self.before("user_tasks").await?;
        Ok(paginate(self.user().my_tasks, page, per_page))
    }

    async fn user_messages(
        &self,
        _user_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Message>, ApiError> {
        self.before("user_messages").await?;
        Ok(paginate(self.user().messages, page, per_page))
    }

    async fn task_detail(&self, platform_id: &str) -> Result<Platform, ApiError> {
        self.before("task_detail").await?;
        lock(&self.catalog)
            .platform(platform_id)
            .cloned()
            .ok_or_else(|| ApiError::status(404, "Task not found"))
    }

    async fn activity_detail(&self, activity_id: &str) -> Result<Activity, ApiError> {
        self.before("activity_detail").await?;
        lock(&self.catalog)
            .activities
            .iter()
            .find(|a| a.id == activity_id)
            .cloned()
            .ok_or_else(|| ApiError::status(404, "Activity not found"))
    }
}

fn paginate<T>(rows: Vec<T>, page: u32, per_page: u32) -> Page<T> {
    let total = rows.len() as u64;
    let skip = (page.max(1) as usize - 1) * per_page as usize;
    Page {
        items: rows.into_iter().skip(skip).take(per_page as usize).collect(),
        total,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("fake backend lock")
}

pub(crate) fn identity(value: Value) -> Identity {
    let mut value = value;
    if value.get("id").is_none() {
        value["id"] = json!(USER);
    }
    serde_json::from_value(value).expect("identity fixture")
}

pub(crate) fn platform(id: &str, likes: u64, link: &str) -> Platform {
    Platform {
        id: id.to_string(),
        name: format!("Partner {id}"),
        download_link: link.to_string(),
        reward_amount: 15_000.0,
        likes: Some(likes),
        ..Platform::default()
    }
}

pub(crate) fn server_task(id: &str, platform_id: &str, status: TaskStatus) -> UserTask {
    UserTask {
        id: id.to_string(),
        platform_id: platform_id.to_string(),
        platform_name: format!("Partner {platform_id}"),
        logo_url: String::new(),
        reward_amount: 15_000.0,
        status,
        start_time: "2024-05-01T10:00:00".to_string(),
        submission_time: None,
        proof_image_url: None,
        reject_reason: None,
    }
}

pub(crate) fn transaction(
    id: &str,
    kind: TransactionKind,
    amount: f64,
    status: TransactionStatus,
) -> Transaction {
    Transaction {
        id: id.to_string(),
        kind,
        amount,
        date: "2024-05-02T10:00:00".to_string(),
        description: String::new(),
        status,
    }
}

pub(crate) struct Harness {
    pub(crate) backend: Arc<FakeBackend>,
    pub(crate) markers: Arc<MemoryMarkers>,
    pub(crate) feed: FeedHub,
    pub(crate) redirector: Arc<RecordingRedirector>,
}

impl Harness {
    pub(crate) fn new(user: Identity, catalog: Catalog) -> Self {
        Self::with_feed(user, catalog, FeedHub::new())
    }

    pub(crate) fn with_feed(user: Identity, catalog: Catalog, feed: FeedHub) -> Self {
        Self {
            backend: FakeBackend::new(user, catalog),
            markers: Arc::new(MemoryMarkers::new()),
            feed,
            redirector: Arc::new(RecordingRedirector::new()),
        }
    }

    pub(crate) fn session(&self) -> (Session, NoticeReceiver) {
        self.session_with_timeout(None)
    }

    pub(crate) fn session_with_timeout(
        &self,
        confirm_timeout: Option<Duration>,
    ) -> (Session, NoticeReceiver) {
        Session::new(
            SessionDeps {
                backend: self.backend.clone(),
                markers: self.markers.clone(),
                feed: Arc::new(self.feed.clone()),
                redirector: self.redirector.clone(),
            },
            confirm_timeout,
        )
    }

    /// A session that has logged in and loaded the catalog.
    pub(crate) async fn signed_in(&self) -> (Session, NoticeReceiver) {
        let (session, notices) = self.session();
        session.login("a@example.com", "secret").await.expect("login");
        session.load_catalog().await.expect("catalog");
        (session, notices)
    }

    pub(crate) fn marker(&self, key: MarkerKey) -> Option<String> {
        self.markers.get(key).expect("marker")
    }

    pub(crate) fn publish(&self, kind: EntityKind, row: Value) {
        self.feed
            .publish(ChangeEvent::new(kind, Operation::Updated, row, Value::Null));
    }

    pub(crate) fn publish_for_user(&self, kind: EntityKind, row_id: &str) {
        self.publish(kind, json!({"id": row_id, "user_id": USER}));
    }
}

/// Polls `condition` until it holds, failing the test after a second.
pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Lets spawned tasks run to their next suspension point.
pub(crate) async fn settle_tasks() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
}

pub(crate) async fn next_notice(rx: &mut NoticeReceiver) -> rh_client::Notice {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("notice in time")
        .expect("notice channel open")
}

pub(crate) fn sample_catalog() -> Catalog {
    Catalog::new(
        vec![
            platform("P1", 10, "partner.example/app"),
            platform("P2", 3, "https://other.example"),
        ],
        vec![],
    )
}
