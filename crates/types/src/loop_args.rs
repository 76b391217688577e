//! Ordered loop-argument lists and their canonical extension form.
//!
//! Loop arguments travel as comma-separated `name=value` pairs (for example
//! `outer_loop=1,inner_loop=2`). Their canonical form is the node extension:
//! one `+value` segment per enclosing loop, in loop declaration order, so two
//! argument lists naming the same loops in a different order still compare
//! equal after canonicalization.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error produced when a `name=value` list cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoopArgsError {
    /// An entry was missing the `=` separator or had an empty name.
    #[error("invalid loop argument entry: {0:?}")]
    InvalidEntry(String),
}

/// Ordered `name -> value` list of loop iteration arguments.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopArgs(IndexMap<String, String>);

impl LoopArgs {
    /// Create an empty argument list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-separated `name=value` list, preserving entry order.
    ///
    /// Empty input yields an empty list. An entry without `=` or with an
    /// empty name is rejected.
    pub fn parse(spec: &str) -> Result<Self, LoopArgsError> {
        let mut args = IndexMap::new();
        for entry in spec.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (name, value) = entry
                .split_once('=')
                .ok_or_else(|| LoopArgsError::InvalidEntry(entry.to_string()))?;
            if name.trim().is_empty() {
                return Err(LoopArgsError::InvalidEntry(entry.to_string()));
            }
            args.insert(name.trim().to_string(), value.trim().to_string());
        }
        Ok(Self(args))
    }

    /// Value for a loop name, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Insert or overwrite a value, keeping the original position on update.
    pub fn set(&mut self, name: &str, value: &str) {
        self.0.insert(name.to_string(), value.to_string());
    }

    /// True when no arguments are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render back to the `name=value,...` wire form.
    pub fn to_spec(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Canonicalize to the extension form `+v1+v2...`.
    ///
    /// `declaration_order` lists the leaf names of the enclosing loops,
    /// outermost first. Entries are emitted in that order; names not declared
    /// keep their listed order and come last. With an empty declaration order
    /// the listed order is used as-is.
    pub fn canonical_extension(&self, declaration_order: &[String]) -> String {
        let mut entries: Vec<(usize, &str)> = self
            .0
            .iter()
            .map(|(name, value)| {
                let rank = declaration_order
                    .iter()
                    .position(|declared| declared == name)
                    .unwrap_or(usize::MAX);
                (rank, value.as_str())
            })
            .collect();
        entries.sort_by_key(|(rank, _)| *rank);
        entries
            .iter()
            .map(|(_, value)| format!("+{value}"))
            .collect()
    }
}

impl<'a> IntoIterator for &'a LoopArgs {
    type Item = (&'a String, &'a String);
    type IntoIter = indexmap::map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
