//! Delete tests.

use super::{count_users, counting_store, list_users, seed_users, user_store, User};
use crate::operations::delete::{DefaultDeleteResolver, DeleteMapper};
use crate::operations::PreparedOperation;
use crate::queries::DeleteQuery;
use crate::{StowageError, StowageResult};

fn users_where(clause: &str, arg: &str) -> DeleteQuery {
    DeleteQuery::builder()
        .table("users")
        .where_clause(clause)
        .where_args([arg.to_string()])
        .build()
        .unwrap()
}

#[test]
fn delete_object_removes_its_row() {
    let store = user_store();
    let users = seed_users(&store, &["keep", "drop"]);

    let result = store
        .delete()
        .object(users[1].clone())
        .prepare()
        .execute()
        .unwrap();
    assert_eq!(result.rows_deleted(), 1);
    assert!(result.affected_tables().contains("users"));
    assert_eq!(list_users(&store), vec![users[0].clone()]);
}

#[test]
fn deleting_a_missing_object_does_not_notify() {
    let (store, counting) = counting_store();
    let result = store
        .delete()
        .object(User::with_id(99, "nobody"))
        .prepare()
        .execute()
        .unwrap();
    assert!(!result.was_deleted());
    assert_eq!(counting.notifications(), 0);
}

#[test]
fn batch_delete_in_transaction_notifies_once() {
    let (store, counting) = counting_store();
    let users = seed_users(&store, &["a", "b", "c"]);
    let before = counting.notifications();

    let results = store
        .delete()
        .objects(users.clone())
        .prepare()
        .execute()
        .unwrap();
    assert_eq!(results.number_of_rows_deleted(), 3);
    assert!(results.was_deleted(&users[2]));
    assert_eq!(counting.notifications() - before, 1);
    assert_eq!(count_users(&store), 0);
}

#[test]
fn batch_delete_without_transaction_skips_missing_objects_in_notifications() {
    let (store, counting) = counting_store();
    let mut users = seed_users(&store, &["a"]);
    users.push(User::with_id(50, "missing"));
    let before = counting.notifications();

    let results = store
        .delete()
        .objects(users.clone())
        .use_transaction(false)
        .prepare()
        .execute()
        .unwrap();
    assert!(results.was_deleted(&users[0]));
    assert!(!results.was_deleted(&users[1]));
    assert_eq!(counting.begins(), 0);
    assert_eq!(counting.notifications() - before, 1);
}

/// Fails on the object named `poison`.
struct FailOnPoison;

impl DeleteMapper<User> for FailOnPoison {
    fn map_to_delete_query(&self, object: &User) -> StowageResult<DeleteQuery> {
        if object.name == "poison" {
            return Err(StowageError::resolver("poisoned object"));
        }
        Ok(users_where("name = ?", &object.name))
    }
}

#[test]
fn failing_transactional_batch_delete_rolls_back() {
    let (store, counting) = counting_store();
    seed_users(&store, &["a", "b"]);
    let before = counting.notifications();

    let err = store
        .delete()
        .objects(vec![User::new("a"), User::new("poison"), User::new("b")])
        .with_delete_resolver(DefaultDeleteResolver::new(FailOnPoison))
        .prepare()
        .execute()
        .unwrap_err();

    assert_eq!(counting.begins(), 1);
    assert_eq!(counting.successes(), 0);
    assert_eq!(counting.ends(), 1);
    assert_eq!(counting.notifications(), before);
    match err.root_cause() {
        StowageError::Resolver(source) => assert_eq!(source.to_string(), "poisoned object"),
        other => panic!("unexpected cause: {other:?}"),
    }
    assert!(err
        .to_string()
        .starts_with("Error has occurred during Delete operation. objects = "));
    assert_eq!(count_users(&store), 2);
}

#[test]
fn delete_by_query_removes_matching_rows() {
    let store = user_store();
    seed_users(&store, &["dup", "dup", "single"]);

    let result = store
        .delete()
        .by_query(users_where("name = ?", "dup"))
        .prepare()
        .execute()
        .unwrap();
    assert_eq!(result.rows_deleted(), 2);
    assert_eq!(count_users(&store), 1);
}

#[test]
fn delete_by_query_matching_nothing_returns_zero_and_stays_silent() {
    let (store, counting) = counting_store();
    seed_users(&store, &["present"]);
    let before = counting.notifications();

    let result = store
        .delete()
        .by_query(users_where("name = ?", "absent"))
        .prepare()
        .execute()
        .unwrap();
    assert_eq!(result.rows_deleted(), 0);
    assert_eq!(counting.notifications(), before);
}

#[test]
fn delete_by_query_carries_tags_into_changes() {
    let store = user_store();
    seed_users(&store, &["tagged"]);

    let result = store
        .delete()
        .by_query(
            DeleteQuery::builder()
                .table("users")
                .affects_tags(["people"])
                .build()
                .unwrap(),
        )
        .prepare()
        .execute()
        .unwrap();
    let changes = result.changes();
    assert!(changes.affected_tables().contains("users"));
    assert!(changes.affected_tags().contains("people"));
}
