//! Put tests.

use futures_util::StreamExt;
use rusqlite::types::Value;

use super::{count_users, counting_store, list_users, seed_users, user_store, User};
use crate::operations::put::{DefaultPutResolver, PutMapper, PutResolver};
use crate::operations::put_result::PutResult;
use crate::operations::PreparedOperation;
use crate::queries::{InsertQuery, UpdateQuery};
use crate::store::SqliteStore;
use crate::values::ContentValues;
use crate::{StowageError, StowageResult};

/// Raw-values mapping onto the `users` table, keyed by `id`.
struct UserValues;

impl PutMapper<ContentValues> for UserValues {
    fn map_to_insert_query(&self, _values: &ContentValues) -> StowageResult<InsertQuery> {
        Ok(InsertQuery::builder()
            .table("users")
            .affects_tags(["people"])
            .build()?)
    }

    fn map_to_update_query(&self, values: &ContentValues) -> StowageResult<UpdateQuery> {
        Ok(UpdateQuery::builder()
            .table("users")
            .where_clause("id = ?")
            .where_args([values.get("id").cloned().unwrap_or(Value::Null)])
            .affects_tags(["people"])
            .build()?)
    }

    fn map_to_content_values(&self, values: &ContentValues) -> StowageResult<ContentValues> {
        Ok(values.clone())
    }
}

#[test]
fn put_inserts_then_updates_the_same_row() {
    let store = user_store();

    let first = store
        .put()
        .object(User::new("grace"))
        .prepare()
        .execute()
        .unwrap();
    assert!(first.was_inserted());
    assert!(first.was_not_updated());
    let id = first.inserted_id().unwrap();

    let second = store
        .put()
        .object(User::with_id(id, "grace hopper"))
        .prepare()
        .execute()
        .unwrap();
    assert!(second.was_updated());
    assert!(second.was_not_inserted());
    assert_eq!(second.rows_updated(), Some(1));

    assert_eq!(count_users(&store), 1);
    assert_eq!(list_users(&store)[0].name, "grace hopper");
}

#[test]
fn put_with_unknown_key_inserts_at_that_key() {
    let store = user_store();
    let result = store
        .put()
        .object(User::with_id(42, "answer"))
        .prepare()
        .execute()
        .unwrap();
    assert_eq!(result.inserted_id(), Some(42));
}

#[test]
fn ignore_null_column_keeps_stored_value_on_update() {
    let store = user_store();
    let mut user = User::new("linus");
    user.email = Some("linus@example.com".into());
    let id = store
        .put()
        .object(user)
        .prepare()
        .execute()
        .unwrap()
        .inserted_id()
        .unwrap();

    store
        .put()
        .object(User::with_id(id, "linus t"))
        .prepare()
        .execute()
        .unwrap();

    let stored = &list_users(&store)[0];
    assert_eq!(stored.name, "linus t");
    assert_eq!(stored.email.as_deref(), Some("linus@example.com"));
}

#[test]
fn single_put_notifies_once() {
    let (store, counting) = counting_store();
    store
        .put()
        .object(User::new("ken"))
        .prepare()
        .execute()
        .unwrap();
    assert_eq!(counting.notifications(), 1);
    assert_eq!(counting.begins(), 0);
}

#[test]
fn put_that_updates_nothing_does_not_notify() {
    let (store, counting) = counting_store();
    let result = store
        .put()
        .object(User::new("ghost"))
        .with_put_resolver(ZeroRowUpdate)
        .prepare()
        .execute()
        .unwrap();
    assert_eq!(result.rows_updated(), Some(0));
    assert!(!result.changed_anything());
    assert_eq!(counting.notifications(), 0);
}

/// Reports an update that matched no row.
struct ZeroRowUpdate;

impl PutResolver<User> for ZeroRowUpdate {
    fn perform_put(&self, _store: &SqliteStore, _object: &User) -> StowageResult<PutResult> {
        Ok(PutResult::new_update_result(0, "users", ["people"]))
    }
}

#[test]
fn batch_put_in_transaction_notifies_once_after_commit() {
    let (store, counting) = counting_store();
    let results = store
        .put()
        .objects(vec![User::new("a"), User::new("b"), User::new("c")])
        .prepare()
        .execute()
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results.number_of_inserts(), 3);
    assert_eq!(counting.begins(), 1);
    assert_eq!(counting.successes(), 1);
    assert_eq!(counting.ends(), 1);
    assert_eq!(counting.notifications(), 1);
    assert_eq!(count_users(&store), 3);
}

#[test]
fn batch_put_without_transaction_notifies_per_object() {
    let (store, counting) = counting_store();
    let results = store
        .put()
        .objects(vec![User::new("a"), User::new("b")])
        .use_transaction(false)
        .prepare()
        .execute()
        .unwrap();

    assert_eq!(results.number_of_inserts(), 2);
    assert_eq!(counting.begins(), 0);
    assert_eq!(counting.notifications(), 2);
}

#[test]
fn batch_results_are_paired_with_their_objects() {
    let store = user_store();
    let stored = seed_users(&store, &["x"]);
    let existing = stored[0].clone();
    let fresh = User::new("y");

    let results = store
        .put()
        .objects(vec![existing.clone(), fresh.clone()])
        .prepare()
        .execute()
        .unwrap();
    assert!(results.result_for(&existing).unwrap().was_updated());
    assert!(results.result_for(&fresh).unwrap().was_inserted());
    assert_eq!(results.number_of_updates(), 1);
}

#[test]
fn failing_batch_put_rolls_back_every_object() {
    let store = user_store();
    let result = store
        .put()
        .objects(vec![User::new("kept?"), User::with_id(1, "clash")])
        .with_put_resolver(DefaultPutResolver::new(AlwaysInsert))
        .prepare()
        .execute();

    let err = result.unwrap_err();
    assert!(matches!(err.root_cause(), StowageError::Sqlite(_)));
    assert!(err.to_string().contains("Put operation. objects = ["));
    assert_eq!(count_users(&store), 0);
}

/// Inserts without checking for an existing row.
struct AlwaysInsert;

impl PutMapper<User> for AlwaysInsert {
    fn map_to_insert_query(&self, _object: &User) -> StowageResult<InsertQuery> {
        Ok(InsertQuery::builder().table("users").build()?)
    }

    fn map_to_update_query(&self, _object: &User) -> StowageResult<UpdateQuery> {
        Ok(UpdateQuery::builder()
            .table("users")
            .where_clause("0 = 1")
            .build()?)
    }

    fn map_to_content_values(&self, _object: &User) -> StowageResult<ContentValues> {
        ContentValues::new().with("id", 1_i64)?.with("name", "dup")
    }
}

#[tokio::test]
async fn content_values_put_uses_the_given_resolver() {
    let store = user_store();
    let mut changes = store.observe_changes_of_tags(["people"]);

    let values = ContentValues::new()
        .with("id", 7_i64)
        .unwrap()
        .with("name", "raw")
        .unwrap();
    let result = store
        .put()
        .content_values(values.clone())
        .with_put_resolver(DefaultPutResolver::new(UserValues))
        .prepare()
        .execute()
        .unwrap();
    assert_eq!(result.inserted_id(), Some(7));
    assert!(result.affected_tags().contains("people"));

    let update = store
        .put()
        .content_values(values.with("name", "raw again").unwrap())
        .with_put_resolver(DefaultPutResolver::new(UserValues))
        .prepare()
        .execute()
        .unwrap();
    assert!(update.was_updated());

    let first = changes.next().await.unwrap();
    assert!(first.affected_tags().contains("people"));
    assert!(first.affected_tables().contains("users"));
}

#[test]
fn content_values_batch_puts_in_order() {
    let store = user_store();
    let batch: Vec<ContentValues> = ["p", "q"]
        .iter()
        .enumerate()
        .map(|(i, name)| {
            ContentValues::new()
                .with("id", i as i64 + 1)
                .unwrap()
                .with("name", *name)
                .unwrap()
        })
        .collect();

    let results = store
        .put()
        .content_values_iter(batch)
        .with_put_resolver(DefaultPutResolver::new(UserValues))
        .prepare()
        .execute()
        .unwrap();
    assert_eq!(results.number_of_inserts(), 2);
    let names: Vec<String> = list_users(&store).into_iter().map(|u| u.name).collect();
    assert_eq!(names, vec!["p", "q"]);
}

#[test]
fn prepared_put_can_run_more_than_once() {
    let store = user_store();
    let put = store.put().object(User::new("again")).prepare();
    put.execute().unwrap();
    put.execute().unwrap();
    // The object has no key, so each run inserts a new row.
    assert_eq!(count_users(&store), 2);
}
