//! Transaction tests.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::TryRecvError;

use super::{count_users, list_users, User};
use crate::entity::{EntityMapper, EntityPutResolver, SqliteEntity};
use crate::low_level::{LowLevel, SqliteLowLevel};
use crate::operations::put::PutResolver;
use crate::operations::put_result::PutResult;
use crate::operations::PreparedOperation;
use crate::store::SqliteStore;
use crate::type_mapping::TypeMapping;
use crate::{StowageError, StowageResult};

/// Store over a shared low level, so tests can watch its bus directly.
fn shared_store() -> (SqliteStore, Arc<SqliteLowLevel>) {
    let low_level = Arc::new(SqliteLowLevel::open_in_memory().unwrap());
    low_level
        .with_connection(|conn| {
            conn.execute_batch(&User::table_meta().create_table_sql())?;
            Ok(())
        })
        .unwrap();
    let store = SqliteStore::builder()
        .low_level(low_level.clone())
        .add_type_mapping(TypeMapping::<User>::for_entity())
        .build()
        .unwrap();
    (store, low_level)
}

#[test]
fn run_in_transaction_commits_and_notifies_once() {
    let (store, low_level) = shared_store();
    let mut receiver = low_level.bus().subscribe();

    store
        .run_in_transaction(|store| {
            store.put().object(User::new("a")).prepare().execute()?;
            store.put().object(User::new("b")).prepare().execute()?;
            assert!(matches!(receiver.try_recv(), Err(TryRecvError::Empty)));
            Ok(())
        })
        .unwrap();

    let changes = receiver.try_recv().unwrap();
    assert!(changes.affected_tables().contains("users"));
    assert!(matches!(receiver.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(count_users(&store), 2);
    assert_eq!(low_level.transaction_depth(), 0);
}

#[test]
fn failed_transaction_rolls_back_and_drops_changes() {
    let (store, low_level) = shared_store();
    let mut receiver = low_level.bus().subscribe();

    let err = store
        .run_in_transaction(|store| {
            store.put().object(User::new("a")).prepare().execute()?;
            Err::<(), _>(StowageError::resolver("abort"))
        })
        .unwrap_err();

    assert!(matches!(err, StowageError::Resolver(_)));
    assert!(matches!(receiver.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(count_users(&store), 0);
}

#[test]
fn batch_inside_transaction_joins_it() {
    let (store, low_level) = shared_store();

    let err = store
        .run_in_transaction(|store| {
            store
                .put()
                .objects(vec![User::new("a"), User::new("b")])
                .prepare()
                .execute()?;
            assert_eq!(low_level.transaction_depth(), 1);
            Err::<(), _>(StowageError::resolver("abort"))
        })
        .unwrap_err();

    assert!(matches!(err, StowageError::Resolver(_)));
    assert!(list_users(&store).is_empty());
}

#[test]
fn inner_level_without_success_rolls_back_the_outer_one() {
    let (store, low_level) = shared_store();

    low_level.begin_transaction().unwrap();
    store.put().object(User::new("outer")).prepare().execute().unwrap();
    low_level.begin_transaction().unwrap();
    assert_eq!(low_level.transaction_depth(), 2);
    low_level.end_transaction().unwrap();
    low_level.set_transaction_successful().unwrap();
    low_level.end_transaction().unwrap();

    assert_eq!(count_users(&store), 0);
}

#[test]
fn out_of_sequence_calls_are_rejected() {
    let (_store, low_level) = shared_store();
    assert!(matches!(
        low_level.set_transaction_successful(),
        Err(StowageError::Transaction(_))
    ));
    assert!(matches!(
        low_level.end_transaction(),
        Err(StowageError::Transaction(_))
    ));

    low_level.begin_transaction().unwrap();
    low_level.set_transaction_successful().unwrap();
    assert!(matches!(
        low_level.set_transaction_successful(),
        Err(StowageError::Transaction(_))
    ));
    low_level.end_transaction().unwrap();
}

#[test]
fn other_threads_wait_for_the_transaction() {
    let (store, low_level) = shared_store();
    low_level.begin_transaction().unwrap();
    store.put().object(User::new("first")).prepare().execute().unwrap();

    let writer = {
        let store = store.clone();
        std::thread::spawn(move || {
            store.put().object(User::new("second")).prepare().execute().unwrap();
        })
    };
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert!(!writer.is_finished());

    low_level.set_transaction_successful().unwrap();
    low_level.end_transaction().unwrap();
    writer.join().unwrap();

    let names: Vec<String> = list_users(&store).into_iter().map(|u| u.name).collect();
    assert_eq!(names, ["first", "second"]);
}

/// Puts users through the entity mapping but panics on "boom".
struct PanicOnBoom(EntityPutResolver<User>);

impl PanicOnBoom {
    fn new() -> Self {
        Self(EntityPutResolver::new(EntityMapper::default()))
    }
}

impl PutResolver<User> for PanicOnBoom {
    fn perform_put(&self, store: &SqliteStore, user: &User) -> StowageResult<PutResult> {
        if user.name == "boom" {
            panic!("resolver panicked on {}", user.name);
        }
        self.0.perform_put(store, user)
    }
}

/// Puts one user from another thread, failing instead of hanging when the
/// store stays locked.
fn put_from_other_thread(store: &SqliteStore, name: &str) {
    let (done_tx, done_rx) = mpsc::channel();
    let store = store.clone();
    let user = User::new(name);
    std::thread::spawn(move || {
        let result = store.put().object(user).prepare().execute();
        let _ = done_tx.send(result.map(|r| r.was_inserted()).ok());
    });
    assert_eq!(
        done_rx.recv_timeout(Duration::from_secs(5)),
        Ok(Some(true)),
        "store still locked by the abandoned transaction"
    );
}

#[test]
fn panicking_batch_rolls_back_and_releases_the_store() {
    let (store, low_level) = shared_store();
    let mut receiver = low_level.bus().subscribe();

    let batch = {
        let store = store.clone();
        std::thread::spawn(move || {
            store
                .put()
                .objects(vec![User::new("ok"), User::new("boom")])
                .with_put_resolver(PanicOnBoom::new())
                .prepare()
                .execute()
        })
    };
    assert!(batch.join().is_err());
    assert_eq!(low_level.transaction_depth(), 0);
    assert!(matches!(receiver.try_recv(), Err(TryRecvError::Empty)));

    put_from_other_thread(&store, "after");
    let names: Vec<String> = list_users(&store).into_iter().map(|u| u.name).collect();
    assert_eq!(names, ["after"]);
}

#[tokio::test]
async fn panicking_async_batch_reports_and_releases_the_store() {
    let (store, low_level) = shared_store();

    let err = store
        .put()
        .objects(vec![User::new("ok"), User::new("boom")])
        .with_put_resolver(PanicOnBoom::new())
        .prepare()
        .execute_async()
        .await
        .unwrap_err();
    assert!(matches!(err, StowageError::Scheduler(_)));
    assert_eq!(low_level.transaction_depth(), 0);

    put_from_other_thread(&store, "after");
    assert_eq!(count_users(&store), 1);
}

#[test]
fn panic_inside_run_in_transaction_rolls_back() {
    let (store, low_level) = shared_store();

    let outcome = {
        let store = store.clone();
        std::thread::spawn(move || {
            store.run_in_transaction(|store| -> StowageResult<()> {
                store.put().object(User::new("lost")).prepare().execute()?;
                panic!("body panicked");
            })
        })
        .join()
    };
    assert!(outcome.is_err());
    assert_eq!(low_level.transaction_depth(), 0);

    put_from_other_thread(&store, "after");
    assert_eq!(count_users(&store), 1);
}
