//! Change sets published after successful writes.

use std::collections::BTreeSet;
use std::fmt;

/// Tables and tags touched by a completed write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Changes {
    affected_tables: BTreeSet<String>,
    affected_tags: BTreeSet<String>,
}

impl Changes {
    pub fn new<T, G, S1, S2>(tables: T, tags: G) -> Self
    where
        T: IntoIterator<Item = S1>,
        G: IntoIterator<Item = S2>,
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            affected_tables: tables.into_iter().map(Into::into).collect(),
            affected_tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// A change of a single table.
    pub fn from_table(table: impl Into<String>) -> Self {
        Self {
            affected_tables: BTreeSet::from([table.into()]),
            affected_tags: BTreeSet::new(),
        }
    }

    /// A change of one table plus tags.
    pub fn from_table_and_tags<G, S>(table: impl Into<String>, tags: G) -> Self
    where
        G: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            affected_tables: BTreeSet::from([table.into()]),
            affected_tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn affected_tables(&self) -> &BTreeSet<String> {
        &self.affected_tables
    }

    pub fn affected_tags(&self) -> &BTreeSet<String> {
        &self.affected_tags
    }

    pub fn is_empty(&self) -> bool {
        self.affected_tables.is_empty() && self.affected_tags.is_empty()
    }

    /// Union of two change sets.
    pub fn merge(&mut self, other: Changes) {
        self.affected_tables.extend(other.affected_tables);
        self.affected_tags.extend(other.affected_tags);
    }
}

impl fmt::Display for Changes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Changes {{ tables = {:?}, tags = {:?} }}",
            self.affected_tables, self.affected_tags
        )
    }
}

/// Tables and tags a subscriber cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedSet {
    tables: BTreeSet<String>,
    tags: BTreeSet<String>,
}

impl ObservedSet {
    pub fn new(tables: BTreeSet<String>, tags: BTreeSet<String>) -> Self {
        Self { tables, tags }
    }

    pub fn tables(&self) -> &BTreeSet<String> {
        &self.tables
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.tags.is_empty()
    }

    /// True when `changes` shares a table or a tag with this set.
    pub fn matches(&self, changes: &Changes) -> bool {
        !self.tables.is_disjoint(&changes.affected_tables)
            || !self.tags.is_disjoint(&changes.affected_tags)
    }
}
