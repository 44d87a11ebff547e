use crate::errors::{PhaseqError, PhaseqResult};
use indexmap::IndexSet;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Ordered, deduplicated set of component identifiers.
///
/// The position of an identifier defines the index used by every composition
/// array handled by the solvers. The set is immutable once constructed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ComponentSet(IndexSet<String>);

impl ComponentSet {
    /// Build a component set from an ordered list of identifiers.
    ///
    /// Duplicate identifiers are rejected.
    pub fn new<I: IntoIterator<Item = S>, S: Into<String>>(identifiers: I) -> PhaseqResult<Self> {
        let identifiers: Vec<String> = identifiers.into_iter().map(Into::into).collect();
        let duplicates: Vec<_> = identifiers.iter().duplicates().cloned().collect();
        if !duplicates.is_empty() {
            return Err(PhaseqError::Configuration(format!(
                "duplicate component identifier(s): {}",
                duplicates.join(", ")
            )));
        }
        if identifiers.is_empty() {
            return Err(PhaseqError::Configuration(
                "a component set requires at least one component".into(),
            ));
        }
        Ok(Self(identifiers.into_iter().collect()))
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Position of the given identifier, if present.
    pub fn index_of(&self, identifier: &str) -> Option<usize> {
        self.0.get_index_of(identifier)
    }

    /// Identifier at the given position.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get_index(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl TryFrom<Vec<String>> for ComponentSet {
    type Error = PhaseqError;

    fn try_from(identifiers: Vec<String>) -> PhaseqResult<Self> {
        Self::new(identifiers)
    }
}

impl From<ComponentSet> for Vec<String> {
    fn from(components: ComponentSet) -> Self {
        components.0.into_iter().collect()
    }
}
