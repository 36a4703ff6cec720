//! Library source providers and the ordered loader that consults them.
//!
//! Providers are tried in registration order; the first one that returns
//! source wins. A provider that also implements [`NamespaceAware`] receives
//! the session's [`NamespaceManager`] when it is registered.

mod directory;
mod fhir;
mod memory;

pub use directory::DirectoryLibraryProvider;
pub use fhir::{FhirLibrarySourceProvider, FHIR_NAMESPACE_NAME, FHIR_NAMESPACE_URI};
pub use memory::InMemoryLibraryProvider;

use crate::identifier::VersionedIdentifier;
use crate::namespace::{NamespaceError, NamespaceManager};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Source text returned by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibrarySource {
    /// Identifier the source was found under.
    ///
    /// May differ from the requested one: a provider can fill in a missing
    /// version or qualify the identifier with a namespace.
    pub identifier: VersionedIdentifier,
    pub text: String,
    /// Where the text came from, for messages (`file path`, `embedded:...`)
    pub origin: String,
}

impl LibrarySource {
    pub fn new(
        identifier: VersionedIdentifier,
        text: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            identifier,
            text: text.into(),
            origin: origin.into(),
        }
    }
}

/// Failures inside a single provider
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Library source {origin} is not valid UTF-8")]
    InvalidUtf8 { origin: String },

    #[error(transparent)]
    Namespace(#[from] NamespaceError),

    #[error("{0}")]
    Other(String),
}

/// A source of library text
pub trait LibrarySourceProvider: Send + Sync {
    /// Short name for logs and messages
    fn name(&self) -> &'static str;

    /// Look up `identifier`.
    ///
    /// `Ok(None)` means "not mine"; the loader moves on to the next
    /// provider. `Err` means the provider matched but could not deliver.
    fn library_source(
        &self,
        identifier: &VersionedIdentifier,
    ) -> Result<Option<LibrarySource>, ProviderError>;

    /// Providers that want the namespace manager return `Some(self)`
    fn as_namespace_aware(&self) -> Option<&dyn NamespaceAware> {
        None
    }
}

/// Capability of providers that rewrite identifiers into a namespace
pub trait NamespaceAware {
    fn set_namespace_manager(&self, manager: Arc<NamespaceManager>);
}

/// Failures of [`LibrarySourceLoader::library_source`]
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Could not load source for library {identifier} (tried: {})", tried.join(", "))]
    NotFound {
        identifier: VersionedIdentifier,
        tried: Vec<&'static str>,
    },

    #[error("Provider {provider} failed to load library {identifier}: {source}")]
    Load {
        identifier: VersionedIdentifier,
        provider: &'static str,
        #[source]
        source: ProviderError,
    },

    #[error("Namespace conflict while loading library {identifier}: {source}")]
    Namespace {
        identifier: VersionedIdentifier,
        #[source]
        source: NamespaceError,
    },
}

/// Ordered provider registry for one session
pub struct LibrarySourceLoader {
    namespaces: Arc<NamespaceManager>,
    providers: RwLock<Vec<Arc<dyn LibrarySourceProvider>>>,
}

impl std::fmt::Debug for LibrarySourceLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibrarySourceLoader")
            .field("providers", &self.provider_names())
            .finish()
    }
}

impl LibrarySourceLoader {
    pub fn new(namespaces: Arc<NamespaceManager>) -> Self {
        Self {
            namespaces,
            providers: RwLock::new(Vec::new()),
        }
    }

    /// Append a provider; namespace-aware providers get the manager first
    pub fn register_provider(&self, provider: Arc<dyn LibrarySourceProvider>) {
        if let Some(aware) = provider.as_namespace_aware() {
            aware.set_namespace_manager(Arc::clone(&self.namespaces));
        }
        debug!(provider = provider.name(), "Registered library source provider");
        self.providers.write().push(provider);
    }

    pub fn clear_providers(&self) {
        self.providers.write().clear();
    }

    pub fn provider_count(&self) -> usize {
        self.providers.read().len()
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.read().iter().map(|p| p.name()).collect()
    }

    /// Ask each provider in order for `identifier`
    pub fn library_source(
        &self,
        identifier: &VersionedIdentifier,
    ) -> Result<LibrarySource, SourceError> {
        // Snapshot so a provider never runs under the registry lock
        let providers: Vec<_> = self.providers.read().clone();

        for provider in &providers {
            trace!(provider = provider.name(), library = %identifier, "Trying provider");
            match provider.library_source(identifier) {
                Ok(Some(source)) => {
                    debug!(
                        provider = provider.name(),
                        requested = %identifier,
                        resolved = %source.identifier,
                        "Found library source"
                    );
                    return Ok(source);
                }
                Ok(None) => continue,
                Err(ProviderError::Namespace(source)) => {
                    return Err(SourceError::Namespace {
                        identifier: identifier.clone(),
                        source,
                    });
                }
                Err(source) => {
                    return Err(SourceError::Load {
                        identifier: identifier.clone(),
                        provider: provider.name(),
                        source,
                    });
                }
            }
        }

        Err(SourceError::NotFound {
            identifier: identifier.clone(),
            tried: providers.iter().map(|p| p.name()).collect(),
        })
    }
}
