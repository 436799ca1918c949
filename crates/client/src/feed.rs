#![forbid(unsafe_code)]

//! Row-change notifications for the signed-in account.

use rh_core::feed::{ChangeEvent, WatchSpec};
use tokio::sync::broadcast;
use tracing::debug;

const DEFAULT_FEED_BUFFER: usize = 256;

#[derive(Clone, Debug, PartialEq)]
pub enum FeedItem {
    Event(ChangeEvent),
    /// The subscriber fell behind and `n` events were dropped.
    Lagged(u64),
}

/// Source of row-change events. Reconnecting is the transport's business; subscribers only see
/// events and lag reports.
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self, specs: Vec<WatchSpec>) -> Subscription;
}

/// Receives events matching any of its watch specs. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<ChangeEvent>,
    specs: Vec<WatchSpec>,
}

impl Subscription {
    pub fn new(rx: broadcast::Receiver<ChangeEvent>, specs: Vec<WatchSpec>) -> Self {
        Self { rx, specs }
    }

    pub fn specs(&self) -> &[WatchSpec] {
        &self.specs
    }

    /// `None` once the feed is closed.
    pub async fn next(&mut self) -> Option<FeedItem> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if self.specs.iter().any(|spec| spec.matches(&event)) {
                        return Some(FeedItem::Event(event));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    return Some(FeedItem::Lagged(missed));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// In-process feed that transport adapters publish into.
#[derive(Clone, Debug)]
pub struct FeedHub {
    tx: broadcast::Sender<ChangeEvent>,
}

impl FeedHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FEED_BUFFER)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: ChangeEvent) {
        let kind = event.entity_kind.as_str().to_string();
        match self.tx.send(event) {
            Ok(subscribers) => debug!(entity_kind = %kind, subscribers, "change event published"),
            Err(_) => debug!(entity_kind = %kind, "change event dropped, no subscribers"),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for FeedHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed for FeedHub {
    fn subscribe(&self, specs: Vec<WatchSpec>) -> Subscription {
        Subscription::new(self.tx.subscribe(), specs)
    }
}
