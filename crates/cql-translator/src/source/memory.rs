//! Library sources held in memory.

use super::{LibrarySource, LibrarySourceProvider, ProviderError};
use crate::identifier::{compare_versions, VersionedIdentifier};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Map of identifiers to source text.
///
/// An entry stored without a `system` serves requests from any namespace.
/// A request without a version gets the highest stored version.
#[derive(Debug, Default)]
pub struct InMemoryLibraryProvider {
    sources: RwLock<HashMap<VersionedIdentifier, String>>,
}

impl InMemoryLibraryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(self, identifier: VersionedIdentifier, text: impl Into<String>) -> Self {
        self.add(identifier, text);
        self
    }

    pub fn add(&self, identifier: VersionedIdentifier, text: impl Into<String>) {
        self.sources.write().insert(identifier, text.into());
    }

    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.read().is_empty()
    }
}

fn version_order(a: &Option<String>, b: &Option<String>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => compare_versions(a, b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

impl LibrarySourceProvider for InMemoryLibraryProvider {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn library_source(
        &self,
        identifier: &VersionedIdentifier,
    ) -> Result<Option<LibrarySource>, ProviderError> {
        let sources = self.sources.read();

        let found = sources
            .iter()
            .filter(|(stored, _)| stored.id == identifier.id)
            .filter(|(stored, _)| stored.system.is_none() || stored.system == identifier.system)
            .filter(|(stored, _)| identifier.version.is_none() || stored.version == identifier.version)
            // prefer an exact namespace match, then the highest version
            .max_by(|(a, _), (b, _)| {
                (a.system == identifier.system)
                    .cmp(&(b.system == identifier.system))
                    .then_with(|| version_order(&a.version, &b.version))
            });

        Ok(found.map(|(stored, text)| {
            let resolved = VersionedIdentifier {
                id: stored.id.clone(),
                version: stored.version.clone(),
                system: identifier.system.clone().or_else(|| stored.system.clone()),
            };
            LibrarySource::new(resolved, text.clone(), format!("memory:{}", stored))
        }))
    }
}
