#![forbid(unsafe_code)]

//! Headless view surface: every user action of the reward app, wired through the coordinator,
//! the reconciler and the realtime engine.

use crate::api::Backend;
use crate::coordinator::{Authoritative, Coordinator, Policy, Submission};
use crate::error::SessionError;
use crate::feed::ChangeFeed;
use crate::notices::{self, NoticeReceiver};
use crate::realtime::RealtimeEngine;
use crate::reconcile::Reconciler;
use crate::redirect::Redirector;
use crate::store::{SessionStore, Versioned};
use rh_core::ids::UserId;
use rh_core::indicators::Indicators;
use rh_core::model::{
    Activity, Catalog, Identity, Message, NewBankAccount, Page, Platform, SystemConfig,
    Transaction, UserTask,
};
use rh_core::patch::{
    BindAccount, BindPhone, LikeTask, MarkMessagesRead, StartTask, SubmitProof, Withdraw,
};
use rh_core::validate::{self, ValidationError};
use rh_storage::{MarkerKey, MarkerStore};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// External collaborators a session talks to.
#[derive(Clone)]
pub struct SessionDeps {
    pub backend: Arc<dyn Backend>,
    pub markers: Arc<dyn MarkerStore>,
    pub feed: Arc<dyn ChangeFeed>,
    pub redirector: Arc<dyn Redirector>,
}

pub struct Session {
    store: Arc<SessionStore>,
    backend: Arc<dyn Backend>,
    markers: Arc<dyn MarkerStore>,
    feed: Arc<dyn ChangeFeed>,
    redirector: Arc<dyn Redirector>,
    reconciler: Arc<Reconciler>,
    coordinator: Coordinator,
    engine: Mutex<Option<RealtimeEngine>>,
}

impl Session {
    pub fn new(deps: SessionDeps, confirm_timeout: Option<Duration>) -> (Self, NoticeReceiver) {
        let (notice_tx, notice_rx) = notices::channel();
        let store = Arc::new(SessionStore::new());
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            deps.backend.clone(),
            deps.markers.clone(),
            notice_tx,
        ));
        let coordinator = Coordinator::new(reconciler.clone(), confirm_timeout);
        let session = Self {
            store,
            backend: deps.backend,
            markers: deps.markers,
            feed: deps.feed,
            redirector: deps.redirector,
            reconciler,
            coordinator,
            engine: Mutex::new(None),
        };
        (session, notice_rx)
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn identity(&self) -> Option<Arc<Identity>> {
        self.store.identity.get()
    }

    pub fn catalog(&self) -> Option<Arc<Catalog>> {
        self.store.catalog.get()
    }

    pub fn config(&self) -> Option<Arc<SystemConfig>> {
        self.store.config.get()
    }

    pub fn indicators(&self) -> Indicators {
        self.reconciler.indicators()
    }

    pub fn subscribe_identity(&self) -> watch::Receiver<Versioned<Identity>> {
        self.store.identity.subscribe()
    }

    pub fn subscribe_catalog(&self) -> watch::Receiver<Versioned<Catalog>> {
        self.store.catalog.subscribe()
    }

    pub fn subscribe_indicators(&self) -> watch::Receiver<Indicators> {
        self.reconciler.subscribe_indicators()
    }

    pub fn is_listening(&self) -> bool {
        self.lock_engine()
            .as_ref()
            .is_some_and(RealtimeEngine::is_running)
    }

    /// Re-enters the session remembered by the session marker, if any.
    pub async fn restore(&self) -> Result<Option<Arc<Identity>>, SessionError> {
        let Some(raw) = self.markers.get(MarkerKey::Session)? else {
            return Ok(None);
        };
        let user_id = match UserId::try_new(raw) {
            Ok(user_id) => user_id,
            Err(err) => {
                warn!(error = %err, "discarding malformed session marker");
                self.markers.clear(MarkerKey::Session)?;
                return Ok(None);
            }
        };
        match self.backend.get_user(user_id.as_str()).await {
            Ok(identity) => self.establish(identity).map(Some),
            Err(err) if err.status_code() == Some(404) => {
                info!(user_id = %user_id, "remembered account no longer exists");
                self.markers.clear(MarkerKey::Session)?;
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Arc<Identity>, SessionError> {
        let email = required(email, "email")?;
        let password = required(password, "password")?;
        let identity = self.backend.login(&email, &password).await?;
        self.establish(identity)
    }

    /// Without an explicit invite code, a captured referral is used and consumed.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        invite_code: Option<&str>,
    ) -> Result<Arc<Identity>, SessionError> {
        let email = required(email, "email")?;
        let password = required(password, "password")?;
        let explicit = invite_code
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_string);
        let invite = match explicit {
            Some(code) => Some(code),
            None => self.markers.get(MarkerKey::PendingReferral)?,
        };
        let identity = self
            .backend
            .register(&email, &password, invite.as_deref())
            .await?;
        self.markers.clear(MarkerKey::PendingReferral)?;
        self.establish(identity)
    }

    pub fn logout(&self) -> Result<(), SessionError> {
        self.stop_engine();
        self.markers.clear(MarkerKey::Session)?;
        self.reconciler.end_session();
        Ok(())
    }

    pub fn capture_referral(&self, code: &str) -> Result<(), SessionError> {
        let code = required(code, "referral code")?;
        self.markers.set(MarkerKey::PendingReferral, &code)?;
        Ok(())
    }

    pub async fn load_catalog(&self) -> Result<Arc<Catalog>, SessionError> {
        let ticket = self.store.issue_ticket();
        let catalog = self.backend.initial_data().await?;
        self.reconciler.commit_catalog(ticket, catalog);
        self.store
            .catalog
            .get()
            .ok_or_else(|| SessionError::Invalid(ValidationError::Empty("catalog")))
    }

    pub async fn load_config(&self) -> Result<Arc<SystemConfig>, SessionError> {
        let ticket = self.store.issue_ticket();
        let config = Arc::new(self.backend.config().await?);
        self.store.config.commit(ticket, Some(config.clone()));
        Ok(config)
    }

    pub fn like(&self, platform_id: &str) -> Submission {
        let Some(user_id) = self.store.user_id() else {
            return Submission::Invalid(ValidationError::NotSignedIn);
        };
        let backend = self.backend.clone();
        let platform_id = platform_id.to_string();
        let patch = LikeTask {
            platform_id: platform_id.clone(),
        };
        // "already liked" means the server agrees with the optimistic state
        self.coordinator.apply_with(
            patch,
            async move {
                backend
                    .like_task(&user_id, &platform_id)
                    .await
                    .map(Authoritative::identity)
            },
            Policy {
                keep_on_benign: true,
                ..Policy::default()
            },
        )
    }

    /// Opens the partner page first, whatever happens to the request afterwards.
    pub fn start_task(&self, platform_id: &str) -> Submission {
        let Some(user_id) = self.store.user_id() else {
            return Submission::Invalid(ValidationError::NotSignedIn);
        };
        let Some(platform) = self
            .store
            .catalog
            .get()
            .and_then(|catalog| catalog.platform(platform_id).cloned())
        else {
            return Submission::Invalid(ValidationError::UnknownTask);
        };

        let url = platform.redirect_url();
        if !url.is_empty() {
            self.redirector.open(&url);
        }

        let backend = self.backend.clone();
        let patch = StartTask {
            platform_id: platform.id.clone(),
            platform_name: platform.name.clone(),
            logo_url: platform.logo_url.clone(),
            reward_amount: platform.reward_amount,
        };
        let policy = Policy {
            keep_on_benign: true,
            raise_missions: true,
            ..Policy::default()
        };
        self.coordinator.apply_with(
            patch,
            async move {
                backend
                    .start_task(&user_id, &platform.id)
                    .await
                    .map(|_| Authoritative::refetch())
            },
            policy,
        )
    }

    pub fn bind_phone(&self, raw_phone: &str) -> Submission {
        let Some(user_id) = self.store.user_id() else {
            return Submission::Invalid(ValidationError::NotSignedIn);
        };
        let phone = match validate::normalize_phone(raw_phone) {
            Ok(phone) => phone,
            Err(err) => return Submission::Invalid(err),
        };
        let backend = self.backend.clone();
        let patch = BindPhone {
            phone: phone.clone(),
        };
        self.coordinator.apply_with(
            patch,
            async move {
                backend
                    .bind_phone(&user_id, &phone)
                    .await
                    .map(Authoritative::identity)
            },
            announce(),
        )
    }

    pub fn bind_account(&self, account: NewBankAccount) -> Submission {
        let Some(user_id) = self.store.user_id() else {
            return Submission::Invalid(ValidationError::NotSignedIn);
        };
        let account = match validate::normalize_account(&account) {
            Ok(account) => account,
            Err(err) => return Submission::Invalid(err),
        };
        let backend = self.backend.clone();
        let patch = BindAccount {
            account: account.clone(),
        };
        self.coordinator.apply_with(
            patch,
            async move {
                backend
                    .bind_account(&user_id, &account)
                    .await
                    .map(Authoritative::identity)
            },
            announce(),
        )
    }

    pub fn submit_proof(&self, task_id: &str, proof_url: &str) -> Submission {
        let Some(user_id) = self.store.user_id() else {
            return Submission::Invalid(ValidationError::NotSignedIn);
        };
        let backend = self.backend.clone();
        let task_id = task_id.to_string();
        let proof_url = proof_url.trim().to_string();
        let patch = SubmitProof {
            task_id: task_id.clone(),
            proof_url: proof_url.clone(),
        };
        self.coordinator.apply(patch, async move {
            backend
                .submit_task_proof(&user_id, &task_id, &proof_url)
                .await
                .map(|()| Authoritative::refetch())
        })
    }

    pub fn withdraw(&self, amount: f64, account_id: &str) -> Submission {
        let Some(user_id) = self.store.user_id() else {
            return Submission::Invalid(ValidationError::NotSignedIn);
        };
        let backend = self.backend.clone();
        let account_id = account_id.to_string();
        let patch = Withdraw {
            amount,
            account_id: account_id.clone(),
        };
        self.coordinator.apply_with(
            patch,
            async move {
                backend
                    .withdraw(&user_id, amount, &account_id)
                    .await
                    .map(Authoritative::identity)
            },
            announce(),
        )
    }

    pub fn mark_all_read(&self) -> Submission {
        let Some(user_id) = self.store.user_id() else {
            return Submission::Invalid(ValidationError::NotSignedIn);
        };
        let backend = self.backend.clone();
        self.coordinator.apply(MarkMessagesRead, async move {
            backend
                .mark_all_messages_read(&user_id)
                .await
                .map(|()| Authoritative::refetch())
        })
    }

    pub fn clear_unread_transactions(&self) {
        self.reconciler.mark_transactions_read();
    }

    pub fn clear_unread_missions(&self) {
        self.reconciler.clear_missions();
    }

    /// Returns the id of the dismissed reward transaction, if an overlay was showing.
    pub fn dismiss_reward_popup(&self) -> Option<String> {
        self.reconciler.dismiss_reward_popup()
    }

    pub async fn transactions(&self, page: u32, per_page: u32) -> Result<Page<Transaction>, SessionError> {
        let user_id = self.signed_in()?;
        Ok(self.backend.user_transactions(&user_id, page, per_page).await?)
    }

    pub async fn tasks(&self, page: u32, per_page: u32) -> Result<Page<UserTask>, SessionError> {
        let user_id = self.signed_in()?;
        Ok(self.backend.user_tasks(&user_id, page, per_page).await?)
    }

    pub async fn messages(&self, page: u32, per_page: u32) -> Result<Page<Message>, SessionError> {
        let user_id = self.signed_in()?;
        Ok(self.backend.user_messages(&user_id, page, per_page).await?)
    }

    pub async fn task_detail(&self, platform_id: &str) -> Result<Platform, SessionError> {
        Ok(self.backend.task_detail(platform_id).await?)
    }

    pub async fn activity_detail(&self, activity_id: &str) -> Result<Activity, SessionError> {
        Ok(self.backend.activity_detail(activity_id).await?)
    }

    fn establish(&self, identity: Identity) -> Result<Arc<Identity>, SessionError> {
        let user_id = UserId::try_new(identity.id.clone())?;
        self.markers.set(MarkerKey::Session, user_id.as_str())?;
        self.stop_engine();
        if self.store.user_id().is_some() {
            // a different account must not be diffed against the previous one
            self.reconciler.end_session();
        }
        self.reconciler.begin_session();

        let ticket = self.store.issue_ticket();
        self.reconciler.commit_identity(ticket, identity);
        self.start_engine(user_id.as_str());
        info!(user_id = %user_id, "session established");

        self.store
            .identity
            .get()
            .ok_or(SessionError::Invalid(ValidationError::NotSignedIn))
    }

    fn signed_in(&self) -> Result<String, SessionError> {
        self.store
            .user_id()
            .ok_or(SessionError::Invalid(ValidationError::NotSignedIn))
    }

    fn start_engine(&self, user_id: &str) {
        let engine = RealtimeEngine::start(self.feed.as_ref(), self.reconciler.clone(), user_id);
        if let Some(previous) = self.lock_engine().replace(engine) {
            previous.stop();
        }
    }

    fn stop_engine(&self) {
        if let Some(engine) = self.lock_engine().take() {
            engine.stop();
        }
    }

    fn lock_engine(&self) -> std::sync::MutexGuard<'_, Option<RealtimeEngine>> {
        self.engine
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_engine();
    }
}

fn announce() -> Policy {
    Policy {
        announce_success: true,
        ..Policy::default()
    }
}

fn required(value: &str, field: &'static str) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Empty(field));
    }
    Ok(value.to_string())
}
