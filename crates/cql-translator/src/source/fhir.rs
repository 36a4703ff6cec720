//! Embedded FHIR helper libraries.

use super::{LibrarySource, LibrarySourceProvider, NamespaceAware, ProviderError};
use crate::identifier::{compare_versions, VersionedIdentifier};
use crate::namespace::{NamespaceInfo, NamespaceManager};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

pub const FHIR_NAMESPACE_NAME: &str = "FHIR";
pub const FHIR_NAMESPACE_URI: &str = "http://hl7.org/fhir";

const RESOURCE_PREFIX: &str = "org/hl7/fhir";

static RESOURCES: &[(&str, &str)] = &[
    (
        "org/hl7/fhir/FHIRHelpers-4.0.1.cql",
        include_str!("../../resources/org/hl7/fhir/FHIRHelpers-4.0.1.cql"),
    ),
    (
        "org/hl7/fhir/FHIRHelpers-3.0.2.cql",
        include_str!("../../resources/org/hl7/fhir/FHIRHelpers-3.0.2.cql"),
    ),
];

fn resource(path: &str) -> Option<&'static str> {
    RESOURCES
        .iter()
        .find(|(candidate, _)| *candidate == path)
        .map(|(_, text)| *text)
}

fn resource_path(id: &str, version: &str) -> String {
    format!("{}/{}-{}.cql", RESOURCE_PREFIX, id, version)
}

/// Highest embedded version of `id`
fn latest_version(id: &str) -> Option<&'static str> {
    let prefix = format!("{}/{}-", RESOURCE_PREFIX, id);
    RESOURCES
        .iter()
        .filter_map(|&(path, _)| path.strip_prefix(prefix.as_str())?.strip_suffix(".cql"))
        .max_by(|a, b| compare_versions(a, b))
}

/// Serves the helper libraries shipped with the translator.
///
/// Once the session uses namespaces, found libraries are qualified with the
/// FHIR namespace, registering `FHIR = http://hl7.org/fhir` on first use.
/// Registering the provider with another loader rebinds it to that loader's
/// namespace manager.
#[derive(Debug, Default)]
pub struct FhirLibrarySourceProvider {
    namespaces: RwLock<Option<Arc<NamespaceManager>>>,
}

impl FhirLibrarySourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn qualify(&self, identifier: VersionedIdentifier) -> Result<VersionedIdentifier, ProviderError> {
        let Some(namespaces) = self.namespaces.read().clone() else {
            return Ok(identifier);
        };
        if !namespaces.has_namespaces() {
            return Ok(identifier);
        }

        if namespaces.namespace_info_from_uri(FHIR_NAMESPACE_URI).is_none() {
            namespaces.ensure_namespace_registered(NamespaceInfo::new(
                FHIR_NAMESPACE_NAME,
                FHIR_NAMESPACE_URI,
            ))?;
        }
        Ok(identifier.with_system(FHIR_NAMESPACE_URI))
    }
}

impl LibrarySourceProvider for FhirLibrarySourceProvider {
    fn name(&self) -> &'static str {
        "fhir"
    }

    fn library_source(
        &self,
        identifier: &VersionedIdentifier,
    ) -> Result<Option<LibrarySource>, ProviderError> {
        let version = match identifier.version.as_deref() {
            Some(version) => version,
            None => match latest_version(&identifier.id) {
                Some(version) => version,
                None => return Ok(None),
            },
        };

        let path = resource_path(&identifier.id, version);
        let Some(text) = resource(&path) else {
            return Ok(None);
        };

        let resolved = self.qualify(identifier.clone().with_version(version))?;
        debug!(requested = %identifier, resolved = %resolved, "Serving embedded library");
        Ok(Some(LibrarySource::new(
            resolved,
            text,
            format!("embedded:{}", path),
        )))
    }

    fn as_namespace_aware(&self) -> Option<&dyn NamespaceAware> {
        Some(self)
    }
}

impl NamespaceAware for FhirLibrarySourceProvider {
    fn set_namespace_manager(&self, manager: Arc<NamespaceManager>) {
        *self.namespaces.write() = Some(manager);
    }
}
