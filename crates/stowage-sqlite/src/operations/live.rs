//! Live queries.
//!
//! A live query subscribes to the change bus, runs its operation once right
//! away, then again after every change to what it observes.
//!
//! # Design Principles
//!
//! - The subscription exists before the first run, so no change that
//!   commits after `observe()` returns is missed
//! - Runs never overlap; changes that arrive during a run queue up
//! - Dropping the stream unsubscribes; a run in flight finishes and its
//!   result is discarded
//! - The first error is delivered and ends the stream

use futures_util::future;
use futures_util::stream::{self, BoxStream, StreamExt};
use stowage_common::ValidationError;
use tracing::debug;

use super::PreparedOperation;
use crate::changes::ObservedSet;
use crate::StowageResult;

/// Turns `operation` into a live stream over `observed`.
pub(crate) fn observe<O: PreparedOperation>(
    operation: O,
    observed: ObservedSet,
    describe: impl FnOnce() -> String,
) -> StowageResult<BoxStream<'static, StowageResult<O::Output>>> {
    if observed.is_empty() {
        return Err(ValidationError::NothingObserved { query: describe() }.into());
    }
    debug!(
        tables = ?observed.tables(),
        tags = ?observed.tags(),
        "observing changes"
    );

    let changes = operation.store().low_level().subscribe_changes(observed);
    let triggers = stream::once(future::ready(()))
        .chain(changes.map(|_| ()))
        .boxed();

    let results = stream::unfold(
        (operation, triggers, false),
        |(operation, mut triggers, failed)| async move {
            if failed {
                return None;
            }
            triggers.next().await?;
            let result = operation.execute_async().await;
            let failed = result.is_err();
            Some((result, (operation, triggers, failed)))
        },
    );
    Ok(results.boxed())
}
