#![forbid(unsafe_code)]

//! Observable session state.
//!
//! Each [`Slot`] holds one shared value that is always replaced wholesale. Writes bump the slot
//! revision; authoritative writes also carry the ticket they were issued under so that a reply
//! to an older request can never overwrite a newer one.

use rh_core::model::{Catalog, DEFAULT_MIN_WITHDRAW, Identity, SystemConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

pub type Ticket = u64;

#[derive(Debug)]
pub struct Versioned<T> {
    pub value: Option<Arc<T>>,
    pub revision: u64,
    /// Ticket of the last authoritative write that landed.
    pub authority: Option<Ticket>,
}

impl<T> Clone for Versioned<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            revision: self.revision,
            authority: self.authority,
        }
    }
}

impl<T> Default for Versioned<T> {
    fn default() -> Self {
        Self {
            value: None,
            revision: 0,
            authority: None,
        }
    }
}

/// Result of an optimistic write: what to restore and which revision the write produced.
#[derive(Debug)]
pub struct Written<T> {
    pub previous: Arc<T>,
    pub revision: u64,
}

#[derive(Debug)]
pub enum Commit<T> {
    Applied { previous: Option<Arc<T>>, revision: u64 },
    Stale { authority: Ticket },
}

impl<T> Commit<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rollback {
    Restored,
    /// Something was written on top of the optimistic value; the snapshot is not restored.
    Superseded { newer_authoritative: bool },
}

#[derive(Debug)]
pub struct Slot<T> {
    tx: watch::Sender<Versioned<T>>,
}

impl<T: Send + Sync + 'static> Slot<T> {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Versioned::default());
        Self { tx }
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.tx.borrow().value.clone()
    }

    pub fn snapshot(&self) -> Versioned<T> {
        self.tx.borrow().clone()
    }

    pub fn revision(&self) -> u64 {
        self.tx.borrow().revision
    }

    pub fn subscribe(&self) -> watch::Receiver<Versioned<T>> {
        self.tx.subscribe()
    }

    /// Replaces the current value with `patch(current)`. `None` from the patch, or an empty
    /// slot, leaves everything untouched.
    pub fn apply_optimistic(&self, patch: impl FnOnce(&T) -> Option<T>) -> Option<Written<T>> {
        let mut written = None;
        self.tx.send_if_modified(|state| {
            let Some(current) = state.value.clone() else {
                return false;
            };
            let Some(next) = patch(&current) else {
                return false;
            };
            state.value = Some(Arc::new(next));
            state.revision += 1;
            written = Some(Written {
                previous: current,
                revision: state.revision,
            });
            true
        });
        written
    }

    /// Authoritative replacement. Dropped when `ticket` is older than the last authoritative
    /// write; among the rest the last one to arrive wins.
    pub fn commit(&self, ticket: Ticket, value: Option<Arc<T>>) -> Commit<T> {
        let mut outcome = None;
        self.tx.send_if_modified(|state| {
            if let Some(authority) = state.authority.filter(|last| ticket < *last) {
                outcome = Some(Commit::Stale { authority });
                return false;
            }
            let previous = std::mem::replace(&mut state.value, value);
            state.revision += 1;
            state.authority = Some(ticket);
            outcome = Some(Commit::Applied {
                previous,
                revision: state.revision,
            });
            true
        });
        outcome.unwrap_or(Commit::Stale { authority: ticket })
    }

    /// Restores `snapshot` only if the slot still holds the value written at `revision`.
    pub fn rollback(&self, revision: u64, ticket: Ticket, snapshot: Arc<T>) -> Rollback {
        let mut outcome = Rollback::Superseded {
            newer_authoritative: false,
        };
        self.tx.send_if_modified(|state| {
            if state.revision != revision {
                outcome = Rollback::Superseded {
                    newer_authoritative: state.authority.is_some_and(|last| last > ticket),
                };
                return false;
            }
            state.value = Some(snapshot);
            state.revision += 1;
            outcome = Rollback::Restored;
            true
        });
        outcome
    }
}

impl<T: Send + Sync + 'static> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the views observe for the signed-in session.
#[derive(Debug, Default)]
pub struct SessionStore {
    pub identity: Slot<Identity>,
    pub catalog: Slot<Catalog>,
    pub config: Slot<SystemConfig>,
    tickets: AtomicU64,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue_ticket(&self) -> Ticket {
        self.tickets.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn user_id(&self) -> Option<String> {
        self.identity.get().map(|identity| identity.id.clone())
    }

    pub fn min_withdraw(&self) -> f64 {
        self.config
            .get()
            .map(|config| config.min_withdraw())
            .unwrap_or(DEFAULT_MIN_WITHDRAW)
    }
}
