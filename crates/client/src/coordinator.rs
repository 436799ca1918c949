#![forbid(unsafe_code)]

//! Optimistic mutations: patch locally right away, confirm in the background, and either adopt
//! the backend's answer or undo the patch.

use crate::error::ApiError;
use crate::notices::Notice;
use crate::reconcile::Reconciler;
use crate::store::{Rollback, Slot, Ticket, Written};
use rh_core::clock;
use rh_core::model::{Catalog, Identity};
use rh_core::patch::{Check, LOCAL_ID_PREFIX, LocalPatch, PatchContext};
use rh_core::validate::ValidationError;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What the backend returned for a confirmed mutation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Authoritative {
    pub identity: Option<Identity>,
    pub catalog: Option<Catalog>,
    /// Fetch the identity after the call instead of using a returned one.
    pub refetch: bool,
}

impl Authoritative {
    pub fn identity(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            ..Self::default()
        }
    }

    pub fn refetch() -> Self {
        Self {
            refetch: true,
            ..Self::default()
        }
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }
}

/// Per-action tweaks on top of the default confirm-or-rollback behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Policy {
    /// Benign conflicts keep the optimistic state and resync quietly instead of rolling back.
    pub keep_on_benign: bool,
    /// Emit [`Notice::ActionConfirmed`] on success.
    pub announce_success: bool,
    /// Raise the missions indicator on success.
    pub raise_missions: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Settlement {
    Confirmed,
    RolledBack(ApiError),
    /// The failed mutation was already overwritten; its snapshot was not restored.
    Superseded(ApiError),
    /// Benign conflict; optimistic state kept and resynced.
    Swallowed(ApiError),
    /// The confirmation task never finished.
    Abandoned,
}

#[derive(Debug)]
pub struct PendingMutation {
    label: &'static str,
    ticket: Ticket,
    handle: JoinHandle<Settlement>,
}

impl PendingMutation {
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    pub async fn settled(self) -> Settlement {
        self.handle.await.unwrap_or(Settlement::Abandoned)
    }
}

#[derive(Debug)]
pub enum Submission {
    Pending(PendingMutation),
    /// Duplicate or no-op action; nothing changed and nothing was sent.
    Skipped(&'static str),
    Invalid(ValidationError),
}

impl Submission {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Waits for the confirmation, if one was started.
    pub async fn settled(self) -> Option<Settlement> {
        match self {
            Self::Pending(pending) => Some(pending.settled().await),
            Self::Skipped(_) | Self::Invalid(_) => None,
        }
    }
}

pub struct Coordinator {
    reconciler: Arc<Reconciler>,
    confirm_timeout: Option<Duration>,
    local_ids: AtomicU64,
}

impl Coordinator {
    pub fn new(reconciler: Arc<Reconciler>, confirm_timeout: Option<Duration>) -> Self {
        Self {
            reconciler,
            confirm_timeout,
            local_ids: AtomicU64::new(0),
        }
    }

    pub fn apply<P, F>(&self, patch: P, remote: F) -> Submission
    where
        P: LocalPatch,
        F: Future<Output = Result<Authoritative, ApiError>> + Send + 'static,
    {
        self.apply_with(patch, remote, Policy::default())
    }

    pub fn apply_with<P, F>(&self, patch: P, remote: F, policy: Policy) -> Submission
    where
        P: LocalPatch,
        F: Future<Output = Result<Authoritative, ApiError>> + Send + 'static,
    {
        let store = self.reconciler.store().clone();
        let label = patch.label();
        let ctx = PatchContext {
            now: clock::now_rfc3339(),
            local_id: format!(
                "{LOCAL_ID_PREFIX}{}",
                self.local_ids.fetch_add(1, Ordering::SeqCst) + 1
            ),
            min_withdraw: store.min_withdraw(),
        };

        if store.identity.get().is_none() {
            return Submission::Invalid(ValidationError::NotSignedIn);
        }

        // check and patch run inside the slot's critical section so two racing submissions of
        // the same action cannot both pass the duplicate check
        let mut verdict: Result<Check, ValidationError> = Ok(Check::Apply);
        let identity_write = store.identity.apply_optimistic(|current| {
            verdict = patch.check(current, &ctx);
            match verdict {
                Ok(Check::Apply) => Some(patch.patch_identity(current, &ctx)),
                _ => None,
            }
        });
        match verdict {
            Err(err) => {
                info!(action = label, error = %err, "mutation rejected locally");
                return Submission::Invalid(err);
            }
            Ok(Check::Skip(reason)) => {
                info!(action = label, reason, "mutation skipped");
                return Submission::Skipped(reason);
            }
            Ok(Check::Apply) => {}
        }
        let Some(identity_write) = identity_write else {
            return Submission::Invalid(ValidationError::NotSignedIn);
        };

        let ticket = store.issue_ticket();
        let catalog_write = store
            .catalog
            .apply_optimistic(|current| patch.patch_catalog(current));
        debug!(action = label, ticket, "optimistic write applied");
        self.reconciler.refresh_indicators();

        let job = Confirmation {
            label,
            ticket,
            policy,
            reconciler: self.reconciler.clone(),
            identity_write,
            catalog_write,
        };
        let timeout = self.confirm_timeout;
        let handle = tokio::spawn(async move {
            let outcome = match timeout {
                Some(limit) => match tokio::time::timeout(limit, remote).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ApiError::timeout(format!(
                        "no confirmation within {} ms",
                        limit.as_millis()
                    ))),
                },
                None => remote.await,
            };
            job.settle(outcome).await
        });

        Submission::Pending(PendingMutation {
            label,
            ticket,
            handle,
        })
    }
}

struct Confirmation {
    label: &'static str,
    ticket: Ticket,
    policy: Policy,
    reconciler: Arc<Reconciler>,
    identity_write: Written<Identity>,
    catalog_write: Option<Written<Catalog>>,
}

impl Confirmation {
    async fn settle(self, outcome: Result<Authoritative, ApiError>) -> Settlement {
        match outcome {
            Ok(authoritative) => {
                self.confirm(authoritative).await;
                Settlement::Confirmed
            }
            Err(err) if err.is_benign() && self.policy.keep_on_benign => {
                info!(action = self.label, error = %err, "benign conflict, keeping local state");
                let catalog = self.catalog_write.is_some();
                quiet_resync(&self.reconciler, self.label, true, catalog).await;
                Settlement::Swallowed(err)
            }
            Err(err) => self.undo(err).await,
        }
    }

    async fn confirm(&self, authoritative: Authoritative) {
        let reconciler = &self.reconciler;
        let catalog_dropped = authoritative
            .catalog
            .is_some_and(|catalog| !reconciler.commit_catalog(self.ticket, catalog));
        let identity_dropped = authoritative
            .identity
            .is_some_and(|identity| !reconciler.commit_identity(self.ticket, identity));
        // the newer write may have read the server before this call landed there
        if identity_dropped || catalog_dropped {
            debug!(action = self.label, ticket = self.ticket, "stale confirmation, refetching");
        }
        if authoritative.refetch || identity_dropped {
            if let Err(err) = reconciler.resync().await {
                warn!(action = self.label, error = %err, "refetch after confirmation failed");
            }
        }
        if catalog_dropped {
            if let Err(err) = reconciler.resync_catalog().await {
                warn!(action = self.label, error = %err, "catalog refetch after confirmation failed");
            }
        }
        info!(action = self.label, ticket = self.ticket, "mutation confirmed");
        if self.policy.raise_missions {
            reconciler.raise_missions();
        }
        if self.policy.announce_success {
            reconciler
                .notices()
                .send(Notice::ActionConfirmed { action: self.label });
        }
    }

    async fn undo(self, err: ApiError) -> Settlement {
        let Confirmation {
            label,
            ticket,
            reconciler,
            identity_write,
            catalog_write,
            ..
        } = self;
        let store = reconciler.store().clone();
        let identity = restore(&store.identity, ticket, identity_write);
        let catalog = catalog_write.map(|written| restore(&store.catalog, ticket, written));

        let mut superseded = false;
        let mut resync_identity = false;
        let mut resync_catalog = false;
        if let Rollback::Superseded {
            newer_authoritative,
        } = identity
        {
            superseded = true;
            resync_identity = !newer_authoritative;
        }
        if let Some(Rollback::Superseded {
            newer_authoritative,
        }) = catalog
        {
            superseded = true;
            resync_catalog = !newer_authoritative;
        }
        if superseded {
            quiet_resync(&reconciler, label, resync_identity, resync_catalog).await;
        } else {
            reconciler.refresh_indicators();
        }

        if err.is_benign() {
            info!(action = label, error = %err, "benign conflict, rolled back");
        } else {
            warn!(action = label, error = %err, "mutation failed");
            reconciler.notices().send(Notice::ActionFailed {
                action: label,
                message: err.message.clone(),
            });
        }

        if superseded {
            Settlement::Superseded(err)
        } else {
            Settlement::RolledBack(err)
        }
    }
}

async fn quiet_resync(reconciler: &Reconciler, label: &'static str, identity: bool, catalog: bool) {
    if identity {
        if let Err(err) = reconciler.resync().await {
            warn!(action = label, error = %err, "quiet resync failed");
        }
    }
    if catalog {
        if let Err(err) = reconciler.resync_catalog().await {
            warn!(action = label, error = %err, "quiet catalog resync failed");
        }
    }
}

fn restore<T: Send + Sync + 'static>(slot: &Slot<T>, ticket: Ticket, written: Written<T>) -> Rollback {
    slot.rollback(written.revision, ticket, written.previous)
}
