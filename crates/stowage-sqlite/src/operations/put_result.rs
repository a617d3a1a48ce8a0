use std::collections::BTreeSet;

use crate::changes::Changes;

/// Outcome of putting one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResult {
    inserted_id: Option<i64>,
    rows_updated: Option<usize>,
    affected_tables: BTreeSet<String>,
    affected_tags: BTreeSet<String>,
}

impl PutResult {
    /// Result of an insert that produced row `inserted_id`.
    pub fn new_insert_result<G, S>(inserted_id: i64, table: impl Into<String>, tags: G) -> Self
    where
        G: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inserted_id: Some(inserted_id),
            rows_updated: None,
            affected_tables: BTreeSet::from([table.into()]),
            affected_tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Result of an update that changed `rows_updated` rows.
    pub fn new_update_result<G, S>(rows_updated: usize, table: impl Into<String>, tags: G) -> Self
    where
        G: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inserted_id: None,
            rows_updated: Some(rows_updated),
            affected_tables: BTreeSet::from([table.into()]),
            affected_tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn inserted_id(&self) -> Option<i64> {
        self.inserted_id
    }

    pub fn rows_updated(&self) -> Option<usize> {
        self.rows_updated
    }

    /// One for an insert, the updated row count for an update.
    pub fn rows_affected(&self) -> usize {
        match (self.inserted_id, self.rows_updated) {
            (Some(_), _) => 1,
            (None, Some(rows)) => rows,
            (None, None) => 0,
        }
    }

    pub fn was_inserted(&self) -> bool {
        self.inserted_id.is_some()
    }

    pub fn was_not_inserted(&self) -> bool {
        !self.was_inserted()
    }

    pub fn was_updated(&self) -> bool {
        self.rows_updated.is_some_and(|rows| rows > 0)
    }

    pub fn was_not_updated(&self) -> bool {
        !self.was_updated()
    }

    /// Whether observers must hear about this put.
    pub fn changed_anything(&self) -> bool {
        self.was_inserted() || self.was_updated()
    }

    pub fn affected_tables(&self) -> &BTreeSet<String> {
        &self.affected_tables
    }

    pub fn affected_tags(&self) -> &BTreeSet<String> {
        &self.affected_tags
    }

    pub fn changes(&self) -> Changes {
        Changes::new(
            self.affected_tables.iter().cloned(),
            self.affected_tags.iter().cloned(),
        )
    }
}

/// Outcome of putting a batch, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct PutResults<T> {
    results: Vec<(T, PutResult)>,
}

impl<T> PutResults<T> {
    pub fn new(results: Vec<(T, PutResult)>) -> Self {
        Self { results }
    }

    pub fn results(&self) -> &[(T, PutResult)] {
        &self.results
    }

    pub fn into_results(self) -> Vec<(T, PutResult)> {
        self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn number_of_inserts(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.was_inserted()).count()
    }

    pub fn number_of_updates(&self) -> usize {
        self.results
            .iter()
            .filter_map(|(_, r)| r.rows_updated())
            .sum()
    }

    /// Union of the changes of every put that changed something.
    pub fn changes(&self) -> Changes {
        let mut changes = Changes::default();
        for (_, result) in self.results.iter().filter(|(_, r)| r.changed_anything()) {
            changes.merge(result.changes());
        }
        changes
    }

    pub fn iter(&self) -> impl Iterator<Item = &(T, PutResult)> {
        self.results.iter()
    }
}

impl<T: PartialEq> PutResults<T> {
    /// Result recorded for `object`.
    pub fn result_for(&self, object: &T) -> Option<&PutResult> {
        self.results
            .iter()
            .find(|(o, _)| o == object)
            .map(|(_, r)| r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_result() {
        let result = PutResult::new_insert_result(7, "users", ["accounts"]);
        assert!(result.was_inserted());
        assert!(result.was_not_updated());
        assert_eq!(result.inserted_id(), Some(7));
        assert_eq!(result.rows_affected(), 1);
        assert_eq!(result.changes(), Changes::new(["users"], ["accounts"]));
    }

    #[test]
    fn update_of_zero_rows_changes_nothing() {
        let result = PutResult::new_update_result(0, "users", Vec::<String>::new());
        assert!(result.was_not_inserted());
        assert!(result.was_not_updated());
        assert!(!result.changed_anything());
    }

    #[test]
    fn batch_counters_and_changes() {
        let results = PutResults::new(vec![
            ("a", PutResult::new_insert_result(1, "users", Vec::<String>::new())),
            ("b", PutResult::new_update_result(2, "users", ["t"])),
            ("c", PutResult::new_update_result(0, "posts", ["ignored"])),
        ]);
        assert_eq!(results.number_of_inserts(), 1);
        assert_eq!(results.number_of_updates(), 2);
        assert_eq!(results.changes(), Changes::new(["users"], ["t"]));
        assert_eq!(results.result_for(&"a").unwrap().inserted_id(), Some(1));
    }
}
