#![forbid(unsafe_code)]

//! Small persisted markers that make client-side notifications idempotent across restarts.

mod memory;
mod sqlite;

pub use memory::MemoryMarkers;
pub use sqlite::SqliteMarkers;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MarkerKey {
    /// Id of the signed-in account.
    Session,
    /// RFC 3339 instant the transaction list was last opened.
    LastTxReadAt,
    /// Id of the last reward transaction whose overlay was dismissed.
    LastRewardPopupTx,
    /// Invite code captured from a referral link, consumed by registration.
    PendingReferral,
}

impl MarkerKey {
    pub const ALL: [MarkerKey; 4] = [
        MarkerKey::Session,
        MarkerKey::LastTxReadAt,
        MarkerKey::LastRewardPopupTx,
        MarkerKey::PendingReferral,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::LastTxReadAt => "last_tx_read_at",
            Self::LastRewardPopupTx => "last_reward_popup_tx",
            Self::PendingReferral => "pending_referral",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == raw)
    }
}

/// Absence of a marker means "never happened".
pub trait MarkerStore: Send + Sync {
    fn get(&self, key: MarkerKey) -> Result<Option<String>, StoreError>;
    fn set(&self, key: MarkerKey, value: &str) -> Result<(), StoreError>;
    fn clear(&self, key: MarkerKey) -> Result<(), StoreError>;
}

const MAX_MARKER_LEN: usize = 1024;

pub(crate) fn check_value(value: &str) -> Result<(), StoreError> {
    if value.is_empty() {
        return Err(StoreError::InvalidInput("marker value must not be empty"));
    }
    if value.len() > MAX_MARKER_LEN {
        return Err(StoreError::InvalidInput("marker value is too long"));
    }
    Ok(())
}
