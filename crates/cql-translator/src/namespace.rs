//! Namespace registry for a translation session.
//!
//! Maps short namespace names (`FHIR`) to URIs (`http://hl7.org/fhir`) and
//! back. A library identifier gains a `system` only through this registry.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// A registered `name ↔ uri` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespaceInfo {
    pub name: String,
    pub uri: String,
}

impl NamespaceInfo {
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
        }
    }
}

/// Errors from namespace registration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamespaceError {
    /// The URI is already registered under another name
    #[error("Namespace URI {uri} is already registered as {existing_name}, cannot register it as {requested_name}")]
    UriConflict {
        uri: String,
        existing_name: String,
        requested_name: String,
    },

    /// The name is already registered for another URI
    #[error("Namespace {name} is already registered with URI {existing_uri}, cannot register it with URI {requested_uri}")]
    NameConflict {
        name: String,
        existing_uri: String,
        requested_uri: String,
    },

    /// Blank name or URI
    #[error("Namespace name and URI must not be empty")]
    Empty,
}

#[derive(Debug, Default)]
struct Registry {
    by_name: HashMap<String, NamespaceInfo>,
    by_uri: HashMap<String, NamespaceInfo>,
}

/// Session-scoped namespace registry.
///
/// Interior mutability lets source providers register namespaces through a
/// shared `Arc<NamespaceManager>` while a resolution is running.
#[derive(Debug, Default)]
pub struct NamespaceManager {
    registry: RwLock<Registry>,
}

impl NamespaceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `info` unless an identical entry exists.
    ///
    /// Fails without modifying the registry if either the name or the URI is
    /// already bound to something else.
    pub fn ensure_namespace_registered(&self, info: NamespaceInfo) -> Result<(), NamespaceError> {
        if info.name.trim().is_empty() || info.uri.trim().is_empty() {
            return Err(NamespaceError::Empty);
        }

        let mut registry = self.registry.write();

        if let Some(existing) = registry.by_uri.get(&info.uri) {
            if existing.name == info.name {
                return Ok(());
            }
            return Err(NamespaceError::UriConflict {
                uri: info.uri,
                existing_name: existing.name.clone(),
                requested_name: info.name,
            });
        }

        if let Some(existing) = registry.by_name.get(&info.name) {
            return Err(NamespaceError::NameConflict {
                name: info.name,
                existing_uri: existing.uri.clone(),
                requested_uri: info.uri,
            });
        }

        debug!(name = %info.name, uri = %info.uri, "Registered namespace");
        registry.by_name.insert(info.name.clone(), info.clone());
        registry.by_uri.insert(info.uri.clone(), info);
        Ok(())
    }

    /// True once any namespace has been registered
    pub fn has_namespaces(&self) -> bool {
        !self.registry.read().by_uri.is_empty()
    }

    pub fn namespace_info_from_uri(&self, uri: &str) -> Option<NamespaceInfo> {
        self.registry.read().by_uri.get(uri).cloned()
    }

    pub fn namespace_info_from_name(&self, name: &str) -> Option<NamespaceInfo> {
        self.registry.read().by_name.get(name).cloned()
    }

    pub fn resolve_namespace_uri(&self, name: &str) -> Option<String> {
        self.namespace_info_from_name(name).map(|info| info.uri)
    }

    /// All registered namespaces, sorted by name
    pub fn namespaces(&self) -> Vec<NamespaceInfo> {
        let mut all: Vec<_> = self.registry.read().by_name.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

/// Split `Common.Helpers` into `(Some("Common"), "Helpers")`.
///
/// Only the last dot separates: `a.b.C` gives `(Some("a.b"), "C")`.
pub fn split_qualified_identifier(qualified: &str) -> (Option<&str>, &str) {
    match qualified.rfind('.') {
        Some(index) => (Some(&qualified[..index]), &qualified[index + 1..]),
        None => (None, qualified),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_manager_has_no_namespaces() {
        let manager = NamespaceManager::new();
        assert!(!manager.has_namespaces());
        assert!(manager.namespace_info_from_uri("http://hl7.org/fhir").is_none());
    }

    #[test]
    fn test_registration_is_idempotent() {
        let manager = NamespaceManager::new();
        let info = NamespaceInfo::new("FHIR", "http://hl7.org/fhir");

        manager.ensure_namespace_registered(info.clone()).unwrap();
        manager.ensure_namespace_registered(info.clone()).unwrap();

        assert!(manager.has_namespaces());
        assert_eq!(manager.namespaces(), vec![info]);
    }

    #[test]
    fn test_uri_conflict_keeps_original() {
        let manager = NamespaceManager::new();
        manager
            .ensure_namespace_registered(NamespaceInfo::new("FHIR", "http://hl7.org/fhir"))
            .unwrap();

        let result =
            manager.ensure_namespace_registered(NamespaceInfo::new("Other", "http://hl7.org/fhir"));

        assert!(matches!(result, Err(NamespaceError::UriConflict { .. })));
        assert_eq!(
            manager.namespace_info_from_uri("http://hl7.org/fhir").unwrap().name,
            "FHIR"
        );
        assert!(manager.namespace_info_from_name("Other").is_none());
    }

    #[test]
    fn test_name_conflict() {
        let manager = NamespaceManager::new();
        manager
            .ensure_namespace_registered(NamespaceInfo::new("Common", "http://example.org/a"))
            .unwrap();

        let result = manager
            .ensure_namespace_registered(NamespaceInfo::new("Common", "http://example.org/b"));

        assert!(matches!(result, Err(NamespaceError::NameConflict { .. })));
        assert_eq!(
            manager.resolve_namespace_uri("Common").as_deref(),
            Some("http://example.org/a")
        );
    }

    #[test]
    fn test_blank_namespace_rejected() {
        let manager = NamespaceManager::new();
        let result = manager.ensure_namespace_registered(NamespaceInfo::new("", "http://x"));
        assert_eq!(result, Err(NamespaceError::Empty));
        assert!(!manager.has_namespaces());
    }

    #[test]
    fn test_split_qualified_identifier() {
        assert_eq!(split_qualified_identifier("Common.Helpers"), (Some("Common"), "Helpers"));
        assert_eq!(split_qualified_identifier("a.b.C"), (Some("a.b"), "C"));
        assert_eq!(split_qualified_identifier("Helpers"), (None, "Helpers"));
    }
}
