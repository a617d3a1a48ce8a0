//! Process-wide change bus.
//!
//! Writers publish a [`Changes`] value after their native call succeeds.
//! Subscribers receive every published value on a broadcast channel and
//! keep only the ones that intersect their observed tables or tags.
//!
//! # Design Principles
//!
//! - Publishing never blocks and never fails the write that triggered it
//! - A subscriber that falls behind sees one synthetic change covering
//!   everything it observes, so it re-reads instead of missing an update
//! - Dropping a subscription stream unsubscribes it

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, trace, warn};

use crate::changes::{Changes, ObservedSet};

/// Buffered changes per subscriber before it is considered lagged.
pub const DEFAULT_CHANGES_CAPACITY: usize = 256;

/// Broadcast bus for [`Changes`].
#[derive(Debug, Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<Changes>,
}

impl ChangeBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes `changes` to every current subscriber.
    ///
    /// Empty change sets are dropped.
    pub fn notify(&self, changes: Changes) {
        if changes.is_empty() {
            return;
        }
        // Err only means there is no subscriber right now.
        let receivers = self.sender.send(changes.clone()).unwrap_or(0);
        debug!(%changes, receivers, "published changes");
    }

    /// Raw receiver of every published change set.
    pub fn subscribe(&self) -> broadcast::Receiver<Changes> {
        self.sender.subscribe()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Stream of change sets that intersect `observed`.
    ///
    /// The subscription is registered before this returns, so a change
    /// published right after the call is delivered. The stream ends when
    /// the bus is dropped.
    pub fn observe(&self, observed: ObservedSet) -> BoxStream<'static, Changes> {
        let receiver = self.sender.subscribe();
        stream::unfold((receiver, observed), |(mut receiver, observed)| async move {
            loop {
                match receiver.recv().await {
                    Ok(changes) if observed.matches(&changes) => {
                        return Some((changes, (receiver, observed)));
                    }
                    Ok(changes) => {
                        trace!(%changes, "ignoring unrelated changes");
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "change subscriber lagged behind");
                        let missed = Changes::new(
                            observed.tables().iter().cloned(),
                            observed.tags().iter().cloned(),
                        );
                        return Some((missed, (receiver, observed)));
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANGES_CAPACITY)
    }
}
