//! Change sets describing affected tables and rows.
//!
//! A [`ChangeSet`] serves both sides of the notification flow:
//!
//! - a write describes what it changed with [`DataDescription::description`]
//! - a live query declares what it depends on with [`DataPattern::pattern`]
//!
//! Tokens are either a bare table name (`users`) or a row (`groups:12`).

use std::fmt;

use crate::pattern::DependencyPattern;

/// Something that can describe a change as a single string.
pub trait DataDescription {
    /// Comma-separated list of affected resources.
    fn description(&self) -> String;
}

/// Something that can declare the changes it depends on.
pub trait DataPattern {
    /// Compile a matcher for change descriptions.
    fn pattern(&self) -> DependencyPattern;
}

/// An ordered set of affected resources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    tokens: Vec<String>,
}

impl ChangeSet {
    /// Create an empty change set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a change set holding one table.
    pub fn from_table(table: impl Into<String>) -> Self {
        Self::empty().add_table(table)
    }

    /// Create a change set holding one row.
    pub fn from_row(table: impl AsRef<str>, id: impl fmt::Display) -> Self {
        Self::empty().add_row(table, id)
    }

    /// Add a table.
    pub fn add_table(mut self, table: impl Into<String>) -> Self {
        self.push(table.into());
        self
    }

    /// Add a row of a table.
    pub fn add_row(mut self, table: impl AsRef<str>, id: impl fmt::Display) -> Self {
        let table = table.as_ref();
        if table.is_empty() {
            tracing::warn!(%id, "ignoring row without a table name");
            return self;
        }
        self.push(format!("{table}:{id}"));
        self
    }

    /// Append every resource of another change set.
    pub fn merge(mut self, other: &ChangeSet) -> Self {
        self.tokens.extend(other.tokens.iter().cloned());
        self
    }

    /// Resource tokens in insertion order.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Number of recorded resources.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns true if no resource was recorded.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn push(&mut self, token: String) {
        if token.is_empty() {
            tracing::warn!("ignoring empty resource name");
            return;
        }
        self.tokens.push(token);
    }
}

impl DataDescription for ChangeSet {
    fn description(&self) -> String {
        self.tokens.join(",")
    }
}

impl DataPattern for ChangeSet {
    fn pattern(&self) -> DependencyPattern {
        DependencyPattern::from(self)
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

impl<S: AsRef<str>> FromIterator<S> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::empty();
        set.extend(iter);
        set
    }
}

impl<S: AsRef<str>> Extend<S> for ChangeSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for table in iter {
            self.push(table.as_ref().to_string());
        }
    }
}
