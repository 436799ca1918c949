#![forbid(unsafe_code)]

//! The single commit path for authoritative identity snapshots.
//!
//! Every server-confirmed identity (login, restore, mutation confirmations, realtime refetches,
//! quiet resyncs) lands here. A commit diffs the replaced snapshot against the new one, raises
//! each user-meaningful transition once per session, then refreshes the indicators.

use crate::api::Backend;
use crate::error::ApiError;
use crate::notices::{Notice, NoticeSender};
use crate::store::{Commit, SessionStore, Ticket};
use rh_core::clock;
use rh_core::indicators::{self, Indicators};
use rh_core::model::{Catalog, Identity};
use rh_core::transitions;
use rh_storage::{MarkerKey, MarkerStore};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, warn};

pub struct Reconciler {
    store: Arc<SessionStore>,
    backend: Arc<dyn Backend>,
    markers: Arc<dyn MarkerStore>,
    notices: NoticeSender,
    announced: Mutex<HashSet<(String, &'static str)>>,
    missions: AtomicBool,
    indicators: watch::Sender<Indicators>,
}

impl Reconciler {
    pub fn new(
        store: Arc<SessionStore>,
        backend: Arc<dyn Backend>,
        markers: Arc<dyn MarkerStore>,
        notices: NoticeSender,
    ) -> Self {
        let (indicators, _) = watch::channel(Indicators::default());
        Self {
            store,
            backend,
            markers,
            notices,
            announced: Mutex::new(HashSet::new()),
            missions: AtomicBool::new(false),
            indicators,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn markers(&self) -> &Arc<dyn MarkerStore> {
        &self.markers
    }

    pub fn notices(&self) -> &NoticeSender {
        &self.notices
    }

    /// Commits `identity` under `ticket`. Returns `false` when the write was stale.
    pub fn commit_identity(&self, ticket: Ticket, identity: Identity) -> bool {
        let next = Arc::new(identity);
        let previous = match self.store.identity.commit(ticket, Some(next.clone())) {
            Commit::Applied { previous, .. } => previous,
            Commit::Stale { authority } => {
                debug!(ticket, authority, "stale identity dropped");
                return false;
            }
        };

        let mut fresh = Vec::new();
        {
            let mut announced = self.lock_announced();
            if let Some(previous) = &previous {
                for transition in transitions::detect(previous, &next) {
                    if let Some(key) = transition.terminal_key() {
                        if !announced.insert(key) {
                            continue;
                        }
                    }
                    fresh.push(transition);
                }
            }
            // a resubmitted task or retried payout may end again; forget its earlier alert
            for key in transitions::reopened_keys(&next) {
                announced.remove(&key);
            }
        }
        for transition in fresh {
            if matches!(transition, transitions::Transition::RewardReceived { .. }) {
                self.missions.store(true, Ordering::SeqCst);
            }
            self.notices.send(Notice::from(transition));
        }

        self.refresh_indicators();
        true
    }

    pub fn commit_catalog(&self, ticket: Ticket, catalog: Catalog) -> bool {
        match self.store.catalog.commit(ticket, Some(Arc::new(catalog))) {
            Commit::Applied { .. } => true,
            Commit::Stale { authority } => {
                debug!(ticket, authority, "stale catalog dropped");
                false
            }
        }
    }

    /// Refetches the signed-in identity under a fresh ticket and commits it. `Ok(false)` when
    /// nobody is signed in or a newer snapshot already landed.
    pub async fn resync(&self) -> Result<bool, ApiError> {
        let Some(user_id) = self.store.user_id() else {
            return Ok(false);
        };
        let ticket = self.store.issue_ticket();
        let identity = self.backend.get_user(&user_id).await?;
        if identity.id != user_id {
            return Ok(false);
        }
        Ok(self.commit_identity(ticket, identity))
    }

    pub async fn resync_catalog(&self) -> Result<bool, ApiError> {
        let ticket = self.store.issue_ticket();
        let catalog = self.backend.initial_data().await?;
        Ok(self.commit_catalog(ticket, catalog))
    }

    /// Starts a fresh alert session: nothing has been announced yet.
    pub fn begin_session(&self) {
        self.lock_announced().clear();
        self.missions.store(false, Ordering::SeqCst);
    }

    /// Empties the identity slot. Confirmations issued before this point become stale.
    pub fn end_session(&self) {
        let ticket = self.store.issue_ticket();
        self.store.identity.commit(ticket, None);
        self.begin_session();
        self.refresh_indicators();
    }

    pub fn raise_missions(&self) {
        self.missions.store(true, Ordering::SeqCst);
        self.refresh_indicators();
    }

    pub fn clear_missions(&self) {
        self.missions.store(false, Ordering::SeqCst);
        self.refresh_indicators();
    }

    pub fn indicators(&self) -> Indicators {
        self.indicators.borrow().clone()
    }

    pub fn subscribe_indicators(&self) -> watch::Receiver<Indicators> {
        self.indicators.subscribe()
    }

    pub fn refresh_indicators(&self) {
        let next = match self.store.identity.get() {
            None => Indicators::default(),
            Some(identity) => {
                let last_read = self.marker(MarkerKey::LastTxReadAt);
                let last_popup = self.marker(MarkerKey::LastRewardPopupTx);
                Indicators {
                    unread_messages: identity.unread_message_count() > 0,
                    unread_transactions: indicators::has_unread_transactions(
                        &identity,
                        last_read.as_deref(),
                    ),
                    unread_missions: self.missions.load(Ordering::SeqCst),
                    reward_popup: indicators::reward_popup_candidate(
                        &identity,
                        last_popup.as_deref(),
                    )
                    .cloned(),
                }
            }
        };
        self.indicators.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    /// Stamps the transaction list as read now.
    pub fn mark_transactions_read(&self) {
        if let Err(err) = self
            .markers
            .set(MarkerKey::LastTxReadAt, &clock::now_rfc3339())
        {
            warn!(error = %err, "failed to persist transaction read marker");
        }
        self.refresh_indicators();
    }

    /// Hides the reward overlay for good. Returns the dismissed transaction id.
    pub fn dismiss_reward_popup(&self) -> Option<String> {
        let tx = self.indicators.borrow().reward_popup.clone()?;
        if let Err(err) = self.markers.set(MarkerKey::LastRewardPopupTx, &tx.id) {
            warn!(error = %err, "failed to persist reward popup marker");
        }
        self.refresh_indicators();
        Some(tx.id)
    }

    fn marker(&self, key: MarkerKey) -> Option<String> {
        match self.markers.get(key) {
            Ok(value) => value,
            Err(err) => {
                warn!(marker = key.as_str(), error = %err, "marker read failed");
                None
            }
        }
    }

    fn lock_announced(&self) -> std::sync::MutexGuard<'_, HashSet<(String, &'static str)>> {
        self.announced
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
