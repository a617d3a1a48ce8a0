//! Prepared operations.
//!
//! Every operation is described by an immutable value built in two stages
//! (required target first, optional overrides after). A prepared operation
//! can be executed any number of times:
//!
//! - `execute()` blocks the calling thread
//! - `execute_async()` runs the blocking call on the store scheduler
//! - `as_stream()` is a single-item stream over `execute_async()`
//! - `as_completable()` drops the output
//!
//! Get operations can also be observed: see [`ObservableOperation`].

use std::fmt;
use std::thread;

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{self, BoxStream, StreamExt};
use tracing::warn;

use crate::changes::Changes;
use crate::low_level::LowLevel;
use crate::store::SqliteStore;
use crate::StowageResult;

pub mod delete;
pub mod delete_result;
pub mod execute;
pub mod get;
pub mod live;
pub mod put;
pub mod put_result;

/// Types the store can put, get and delete.
///
/// Batch results hand back the input objects and error messages include
/// them, hence the `Clone` and `Debug` requirements.
pub trait Storable: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T: Clone + fmt::Debug + Send + Sync + 'static> Storable for T {}

/// An immutable, reusable unit of work.
pub trait PreparedOperation: Clone + Send + Sync + 'static {
    type Output: Send + 'static;

    /// Store the operation runs against.
    fn store(&self) -> &SqliteStore;

    /// Runs the operation on the calling thread.
    fn execute(&self) -> StowageResult<Self::Output>;

    /// Runs the operation on the store scheduler once awaited.
    fn execute_async(&self) -> BoxFuture<'static, StowageResult<Self::Output>> {
        let operation = self.clone();
        async move {
            let scheduler = operation.store().scheduler().clone();
            scheduler.run(move || operation.execute()).await
        }
        .boxed()
    }

    /// Single-item stream that runs the operation when first polled.
    fn as_stream(&self) -> BoxStream<'static, StowageResult<Self::Output>> {
        stream::once(self.execute_async()).boxed()
    }

    /// Runs the operation and discards its output.
    fn as_completable(&self) -> BoxFuture<'static, StowageResult<()>> {
        self.execute_async().map(|result| result.map(|_| ())).boxed()
    }
}

/// A read that can be re-run whenever what it reads changes.
pub trait ObservableOperation: PreparedOperation {
    /// Stream that yields the current result immediately, then a fresh
    /// result after every change to an observed table or tag.
    ///
    /// Fails when the operation observes nothing. The stream ends after
    /// its first error.
    fn observe(&self) -> StowageResult<BoxStream<'static, StowageResult<Self::Output>>>;
}

/// One open transaction level.
///
/// Dropping the guard without [`TransactionGuard::end`] ends the level
/// unsuccessfully, so a panicking body still rolls back and releases the
/// connection to other threads.
struct TransactionGuard<'a> {
    low_level: &'a dyn LowLevel,
    open: bool,
}

impl<'a> TransactionGuard<'a> {
    fn begin(low_level: &'a dyn LowLevel) -> StowageResult<Self> {
        low_level.begin_transaction()?;
        Ok(Self {
            low_level,
            open: true,
        })
    }

    fn end(mut self) -> StowageResult<()> {
        self.open = false;
        self.low_level.end_transaction()
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        if thread::panicking() {
            warn!("Transaction body panicked, rolling back");
        }
        if let Err(e) = self.low_level.end_transaction() {
            warn!(error = %e, "Ending abandoned transaction failed");
        }
    }
}

/// Runs `body` inside a transaction.
///
/// Marks the transaction successful only when `body` succeeds. The
/// transaction is always ended, also when `body` panics; a failure of
/// `body` wins over a failure to end.
pub(crate) fn in_transaction<R>(
    low_level: &dyn LowLevel,
    body: impl FnOnce() -> StowageResult<R>,
) -> StowageResult<R> {
    let guard = TransactionGuard::begin(low_level)?;
    let result = body().and_then(|value| {
        low_level.set_transaction_successful()?;
        Ok(value)
    });
    let ended = guard.end();
    match (result, ended) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(end_err)) => {
            warn!(error = %end_err, "Ending failed transaction also failed");
            Err(e)
        }
    }
}

/// Runs one mutation per item, in order.
///
/// With `use_transaction` the whole batch commits or rolls back together
/// and one merged notification follows the commit. Without it every item
/// that changed something notifies on its own.
pub(crate) fn run_batch<I, R>(
    low_level: &dyn LowLevel,
    items: &[I],
    use_transaction: bool,
    mut mutate: impl FnMut(&I) -> StowageResult<R>,
    changes_of: impl Fn(&R) -> Option<Changes>,
) -> StowageResult<Vec<(I, R)>>
where
    I: Clone,
{
    if !use_transaction {
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let result = mutate(item)?;
            if let Some(changes) = changes_of(&result) {
                low_level.notify_about_changes(changes);
            }
            results.push((item.clone(), result));
        }
        return Ok(results);
    }

    let results = in_transaction(low_level, || {
        items
            .iter()
            .map(|item| -> StowageResult<(I, R)> { Ok((item.clone(), mutate(item)?)) })
            .collect::<StowageResult<Vec<_>>>()
    })?;

    let mut merged = Changes::default();
    for (_, result) in &results {
        if let Some(changes) = changes_of(result) {
            merged.merge(changes);
        }
    }
    if !merged.is_empty() {
        low_level.notify_about_changes(merged);
    }
    Ok(results)
}
