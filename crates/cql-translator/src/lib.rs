//! CQL library resolution and translation to ELM
//!
//! The pieces, leaves first:
//! - [`NamespaceManager`]: `name ↔ uri` registry for a session
//! - [`LibrarySourceLoader`]: ordered [`LibrarySourceProvider`]s
//! - [`ModelManager`]: data model metadata, one version per model
//! - [`LibraryManager`]: recursive, cycle-aware, cached include resolution
//! - [`CqlTranslator`]: root translation, diagnostics and ELM output
//!
//! ```
//! use cql_translator::{
//!     CqlTranslator, InMemoryLibraryProvider, LibraryManager, ModelManager,
//!     TranslationOptions, VersionedIdentifier,
//! };
//! use std::sync::Arc;
//!
//! let manager = LibraryManager::new(Arc::new(ModelManager::new()));
//! manager.library_source_loader().register_provider(Arc::new(
//!     InMemoryLibraryProvider::new().with_library(
//!         VersionedIdentifier::new("Base").with_version("1.0"),
//!         "library Base version '1.0'\ndefine Six: Sum({1, 2, 3})\n",
//!     ),
//! ));
//!
//! let result = CqlTranslator::translate(
//!     "library Root\ninclude Base version '1.0' called B\ndefine Seven: B.Six + 1\n",
//!     &manager,
//!     &TranslationOptions::default(),
//! );
//! assert!(result.errors().is_empty());
//! assert_eq!(result.libraries().len(), 1);
//! ```

pub mod annotate;
mod builder;
pub mod config;
pub mod diagnostics;
pub mod elm;
pub mod identifier;
pub mod manager;
pub mod model;
pub mod namespace;
pub mod operators;
pub mod options;
pub mod source;
pub mod translator;
pub mod types;

pub use config::{ConfigError, TranslatorConfig};
pub use diagnostics::{Diagnostic, DiagnosticKind, Severity, SourceLocator};
pub use identifier::VersionedIdentifier;
pub use manager::{LibraryManager, ResolutionSession, ResolveError, TranslatedLibrary};
pub use model::{ModelError, ModelInfo, ModelManager};
pub use namespace::{NamespaceError, NamespaceInfo, NamespaceManager};
pub use options::{SignatureLevel, TranslationOptions, TranslatorOption};
pub use source::{
    DirectoryLibraryProvider, FhirLibrarySourceProvider, InMemoryLibraryProvider, LibrarySource,
    LibrarySourceLoader, LibrarySourceProvider, NamespaceAware, ProviderError, SourceError,
};
pub use translator::{CqlTranslator, TranslationResult, TranslatorError};
pub use types::DataType;
