//! Compiled dependency patterns.
//!
//! A [`DependencyPattern`] decides whether a published change description is
//! relevant to a live query. Each resource token matches when it appears in
//! the description as a whole word, so `users` matches `users,groups:12` and
//! `users:5` but not `xusers`.
//!
//! Compiling is much more expensive than matching; build the pattern once per
//! subscription and reuse it.

use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::change_set::ChangeSet;

/// Compiled size limit for token patterns, the regex crate's default.
const COMPILED_SIZE_LIMIT: usize = 10 * (1 << 20);

#[derive(Clone)]
enum Matcher {
    /// Never matches. Produced by an empty token list.
    Nothing,
    /// Matches every description.
    Everything,
    /// Word-boundary alternation over the tokens.
    Tokens(Regex),
}

/// A compiled matcher over change descriptions.
#[derive(Clone)]
pub struct DependencyPattern {
    matcher: Matcher,
}

impl DependencyPattern {
    /// Compile a pattern from resource tokens (`table` or `table:id`).
    ///
    /// An empty token list produces a pattern that matches nothing. A token
    /// list too large to compile produces a pattern that matches everything.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::compile(tokens, COMPILED_SIZE_LIMIT)
    }

    fn compile<I, S>(tokens: I, size_limit: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let alternatives: Vec<String> = tokens
            .into_iter()
            .filter(|t| !t.as_ref().is_empty())
            .map(|t| regex::escape(t.as_ref()))
            .collect();

        if alternatives.is_empty() {
            return Self::nothing();
        }

        let source = format!(r"\b(?:{})\b", alternatives.join("|"));
        match RegexBuilder::new(&source).size_limit(size_limit).build() {
            Ok(regex) => Self {
                matcher: Matcher::Tokens(regex),
            },
            Err(e) => {
                // Escaped literals always compile unless the size limit is hit.
                tracing::warn!(
                    error = %e,
                    tokens = alternatives.len(),
                    "dependency pattern too large, matching every change"
                );
                Self::everything()
            }
        }
    }

    /// Compile a pattern from a list of table names.
    pub fn from_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: ChangeSet = tables.into_iter().collect();
        Self::from_tokens(set.tokens())
    }

    /// A pattern that matches no description.
    pub fn nothing() -> Self {
        Self {
            matcher: Matcher::Nothing,
        }
    }

    /// A pattern that matches every description.
    pub fn everything() -> Self {
        Self {
            matcher: Matcher::Everything,
        }
    }

    /// Check whether a change description is relevant to this pattern.
    pub fn matches(&self, description: &str) -> bool {
        match &self.matcher {
            Matcher::Nothing => false,
            Matcher::Everything => true,
            Matcher::Tokens(regex) => regex.is_match(description),
        }
    }

    /// Source of the compiled expression, or a marker for the fixed patterns.
    pub fn as_str(&self) -> &str {
        match &self.matcher {
            Matcher::Nothing => "<nothing>",
            Matcher::Everything => "<everything>",
            Matcher::Tokens(regex) => regex.as_str(),
        }
    }
}

impl fmt::Debug for DependencyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DependencyPattern").field(&self.as_str()).finish()
    }
}

impl From<&ChangeSet> for DependencyPattern {
    fn from(set: &ChangeSet) -> Self {
        Self::from_tokens(set.tokens())
    }
}
