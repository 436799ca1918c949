#![forbid(unsafe_code)]

use crate::clock::parse_instant;
use crate::model::{Identity, Transaction};

/// Red dots and the reward overlay, derived from the live identity plus persisted markers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Indicators {
    pub unread_messages: bool,
    pub unread_transactions: bool,
    pub unread_missions: bool,
    pub reward_popup: Option<Transaction>,
}

/// Most recent transaction by date. Rows with unparsable dates only win when nothing parses;
/// ties keep list order (the backend lists newest first).
pub fn latest_transaction(identity: &Identity) -> Option<&Transaction> {
    let mut best: Option<(&Transaction, Option<time::OffsetDateTime>)> = None;
    for tx in &identity.transactions {
        let at = parse_instant(&tx.date);
        best = match best {
            None => Some((tx, at)),
            Some((current, current_at)) => match (at, current_at) {
                (Some(a), Some(c)) if a > c => Some((tx, at)),
                (Some(_), None) => Some((tx, at)),
                _ => Some((current, current_at)),
            },
        };
    }
    best.map(|(tx, _)| tx)
}

pub fn has_unread_transactions(identity: &Identity, last_read_at: Option<&str>) -> bool {
    let Some(latest) = latest_transaction(identity) else {
        return false;
    };
    let Some(read_at) = last_read_at.and_then(parse_instant) else {
        return true;
    };
    match parse_instant(&latest.date) {
        Some(at) => at > read_at,
        None => false,
    }
}

/// The transaction the reward overlay should show, if any: the latest row, when it is income
/// and has not been dismissed before.
pub fn reward_popup_candidate<'a>(
    identity: &'a Identity,
    last_dismissed: Option<&str>,
) -> Option<&'a Transaction> {
    let latest = latest_transaction(identity)?;
    if latest.amount <= 0.0 {
        return None;
    }
    if last_dismissed == Some(latest.id.as_str()) {
        return None;
    }
    Some(latest)
}
