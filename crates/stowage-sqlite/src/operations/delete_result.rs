use std::collections::BTreeSet;

use crate::changes::Changes;

/// Outcome of deleting one object or running one delete query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteResult {
    rows_deleted: usize,
    affected_tables: BTreeSet<String>,
    affected_tags: BTreeSet<String>,
}

impl DeleteResult {
    pub fn new<G, S>(rows_deleted: usize, table: impl Into<String>, tags: G) -> Self
    where
        G: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rows_deleted,
            affected_tables: BTreeSet::from([table.into()]),
            affected_tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn rows_deleted(&self) -> usize {
        self.rows_deleted
    }

    pub fn was_deleted(&self) -> bool {
        self.rows_deleted > 0
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

/// Outcome of deleting a batch, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteResults<T> {
    results: Vec<(T, DeleteResult)>,
}

impl<T> DeleteResults<T> {
    pub fn new(results: Vec<(T, DeleteResult)>) -> Self {
        Self { results }
    }

    pub fn results(&self) -> &[(T, DeleteResult)] {
        &self.results
    }

    pub fn into_results(self) -> Vec<(T, DeleteResult)> {
        self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn number_of_rows_deleted(&self) -> usize {
        self.results.iter().map(|(_, r)| r.rows_deleted()).sum()
    }

    /// Union of the changes of every delete that removed rows.
    pub fn changes(&self) -> Changes {
        let mut changes = Changes::default();
        for (_, result) in self.results.iter().filter(|(_, r)| r.was_deleted()) {
            changes.merge(result.changes());
        }
        changes
    }

    pub fn iter(&self) -> impl Iterator<Item = &(T, DeleteResult)> {
        self.results.iter()
    }
}

impl<T: PartialEq> DeleteResults<T> {
    pub fn result_for(&self, object: &T) -> Option<&DeleteResult> {
        self.results
            .iter()
            .find(|(o, _)| o == object)
            .map(|(_, r)| r)
    }

    pub fn was_deleted(&self, object: &T) -> bool {
        self.result_for(object).is_some_and(DeleteResult::was_deleted)
    }
}
