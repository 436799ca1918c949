#![forbid(unsafe_code)]

use crate::feed::{ChangeFeed, FeedItem};
use crate::reconcile::Reconciler;
use rh_core::feed::user_watch_specs;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Turns row-change events for one user into identity refetches.
///
/// Events are handled one at a time in arrival order. The event payload is only a hint: every
/// event (and every lag report) triggers a full refetch committed through the [`Reconciler`].
#[derive(Debug)]
pub struct RealtimeEngine {
    user_id: String,
    handle: JoinHandle<()>,
}

impl RealtimeEngine {
    pub fn start(feed: &dyn ChangeFeed, reconciler: Arc<Reconciler>, user_id: &str) -> Self {
        let mut subscription = feed.subscribe(user_watch_specs(user_id));
        let owner = user_id.to_string();
        let handle = tokio::spawn(async move {
            while let Some(item) = subscription.next().await {
                match item {
                    FeedItem::Event(event) => debug!(
                        user_id = %owner,
                        entity_kind = event.entity_kind.as_str(),
                        operation = event.operation.as_str(),
                        "change event"
                    ),
                    FeedItem::Lagged(missed) => {
                        warn!(user_id = %owner, missed, "change feed lagged, refetching")
                    }
                }
                if let Err(err) = reconciler.resync().await {
                    warn!(user_id = %owner, error = %err, "refetch after change event failed");
                }
            }
            info!(user_id = %owner, "change feed closed");
        });
        Self {
            user_id: user_id.to_string(),
            handle,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Drops the subscription. An in-flight refetch is abandoned before it commits.
    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for RealtimeEngine {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
