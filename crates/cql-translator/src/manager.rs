//! Library resolution: source lookup, recursive translation, caching.
//!
//! A [`ResolutionSession`] holds the manager's session lock for the whole of
//! one top-level request, so the check-cache, mark-in-flight and store
//! steps never interleave between threads. Includes are resolved depth-first
//! on the session's in-flight stack, which is also how cycles are found.

use crate::annotate::materialize_errors;
use crate::builder::LibraryBuilder;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::elm::Library;
use crate::identifier::VersionedIdentifier;
use crate::model::ModelManager;
use crate::namespace::NamespaceManager;
use crate::options::{TranslationOptions, TranslatorOption};
use crate::source::{LibrarySourceLoader, SourceError};
use cql_syntax::{parse_library, ParsedLibrary};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Identifier given to a root library without a `library` declaration
pub const ANONYMOUS_LIBRARY: &str = "Anonymous";

/// A translated library; immutable once built
#[derive(Debug)]
pub struct TranslatedLibrary {
    /// Resolved identifier, the cache key
    pub identifier: VersionedIdentifier,
    pub library: Library,
    /// Direct includes
    pub includes: BTreeSet<VersionedIdentifier>,
    /// Direct includes that resolved, in include order
    pub dependencies: Vec<Arc<TranslatedLibrary>>,
    /// This library's diagnostics followed by those of its includes
    pub diagnostics: Vec<Diagnostic>,
    /// Options the library was translated with
    pub options: TranslationOptions,
}

impl TranslatedLibrary {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// Every library reachable through includes, keyed by identifier
    pub fn transitive_dependencies(&self) -> HashMap<VersionedIdentifier, Arc<TranslatedLibrary>> {
        let mut seen = HashMap::new();
        let mut stack: Vec<_> = self.dependencies.iter().cloned().collect();
        while let Some(library) = stack.pop() {
            if seen.contains_key(&library.identifier) {
                continue;
            }
            stack.extend(library.dependencies.iter().cloned());
            seen.insert(library.identifier.clone(), library);
        }
        seen
    }
}

/// Why a library could not be resolved
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Library identifier must have a non-empty id")]
    InvalidIdentifier,

    #[error("Could not load source for library {identifier}")]
    MissingLibrary { identifier: VersionedIdentifier },

    #[error("Circular library reference: {identifier} is already being translated (path: {path})")]
    CircularReference {
        identifier: VersionedIdentifier,
        path: String,
    },

    #[error("{message}")]
    LoadFailed {
        identifier: VersionedIdentifier,
        kind: DiagnosticKind,
        message: String,
    },

    #[error("Library {requested} was requested but the source declares {declared}")]
    VersionMismatch {
        requested: VersionedIdentifier,
        declared: VersionedIdentifier,
    },

    #[error("Include depth limit of {limit} exceeded while resolving {identifier}")]
    DepthExceeded {
        identifier: VersionedIdentifier,
        limit: usize,
    },
}

impl ResolveError {
    /// Diagnostic kind reported at the include statement
    pub fn diagnostic_kind(&self) -> DiagnosticKind {
        match self {
            Self::InvalidIdentifier => DiagnosticKind::Semantic,
            Self::MissingLibrary { .. } => DiagnosticKind::MissingLibrary,
            Self::CircularReference { .. } => DiagnosticKind::CircularLibraryReference,
            Self::LoadFailed { kind, .. } => *kind,
            Self::VersionMismatch { .. } => DiagnosticKind::LibraryVersionMismatch,
            Self::DepthExceeded { .. } => DiagnosticKind::IncludeDepthExceeded,
        }
    }

    fn from_source(identifier: &VersionedIdentifier, err: SourceError) -> Self {
        match err {
            SourceError::NotFound { .. } => Self::MissingLibrary {
                identifier: identifier.clone(),
            },
            SourceError::Namespace { .. } => Self::LoadFailed {
                identifier: identifier.clone(),
                kind: DiagnosticKind::NamespaceConflict,
                message: err.to_string(),
            },
            SourceError::Load { .. } => Self::LoadFailed {
                identifier: identifier.clone(),
                kind: DiagnosticKind::LibraryLoadError,
                message: err.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
enum CacheEntry {
    Translated(Arc<TranslatedLibrary>),
    /// Terminal failure; the provider chain is not consulted again
    Failed(ResolveError),
}

/// State of one top-level resolution.
///
/// Holds the manager's session lock until dropped.
pub struct ResolutionSession<'m> {
    _guard: MutexGuard<'m, ()>,
    options: TranslationOptions,
    in_flight: Vec<VersionedIdentifier>,
    /// Libraries on a detected cycle; never cached
    cyclic: HashSet<VersionedIdentifier>,
    /// Finished libraries from `cyclic`, reused for the rest of the session
    cyclic_results: HashMap<VersionedIdentifier, Arc<TranslatedLibrary>>,
}

impl ResolutionSession<'_> {
    pub fn options(&self) -> &TranslationOptions {
        &self.options
    }

    /// Current include depth (the root counts as 1)
    pub fn depth(&self) -> usize {
        self.in_flight.len()
    }

    fn path(&self, closing: &VersionedIdentifier) -> String {
        self.in_flight
            .iter()
            .chain(std::iter::once(closing))
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// Resolves, translates and caches libraries for a session.
pub struct LibraryManager {
    models: Arc<ModelManager>,
    namespaces: Arc<NamespaceManager>,
    loader: LibrarySourceLoader,
    cache: Mutex<HashMap<VersionedIdentifier, CacheEntry>>,
    /// Requested identifier to the identifier the provider resolved it to
    aliases: Mutex<HashMap<VersionedIdentifier, VersionedIdentifier>>,
    session_lock: Mutex<()>,
}

impl std::fmt::Debug for LibraryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryManager")
            .field("loader", &self.loader)
            .field("cached", &self.cache.lock().len())
            .finish()
    }
}

impl LibraryManager {
    pub fn new(models: Arc<ModelManager>) -> Self {
        let namespaces = Arc::new(NamespaceManager::new());
        Self {
            models,
            loader: LibrarySourceLoader::new(Arc::clone(&namespaces)),
            namespaces,
            cache: Mutex::new(HashMap::new()),
            aliases: Mutex::new(HashMap::new()),
            session_lock: Mutex::new(()),
        }
    }

    pub fn model_manager(&self) -> &Arc<ModelManager> {
        &self.models
    }

    pub fn namespace_manager(&self) -> &Arc<NamespaceManager> {
        &self.namespaces
    }

    pub fn library_source_loader(&self) -> &LibrarySourceLoader {
        &self.loader
    }

    /// Start a top-level resolution; blocks while another one is running
    pub fn begin_session(&self, options: TranslationOptions) -> ResolutionSession<'_> {
        ResolutionSession {
            _guard: self.session_lock.lock(),
            options,
            in_flight: Vec::new(),
            cyclic: HashSet::new(),
            cyclic_results: HashMap::new(),
        }
    }

    /// Resolve `identifier` and everything it includes
    pub fn resolve_library(
        &self,
        identifier: &VersionedIdentifier,
        options: &TranslationOptions,
    ) -> Result<Arc<TranslatedLibrary>, ResolveError> {
        let mut session = self.begin_session(options.clone());
        self.resolve_in(&mut session, identifier)
    }

    /// The cached record for `identifier`, following provider aliases
    pub fn cached_library(&self, identifier: &VersionedIdentifier) -> Option<Arc<TranslatedLibrary>> {
        let key = self.canonical(identifier);
        match self.cache.lock().get(&key) {
            Some(CacheEntry::Translated(library)) => Some(Arc::clone(library)),
            _ => None,
        }
    }

    /// Identifiers with a successfully translated record, sorted
    pub fn cached_identifiers(&self) -> Vec<VersionedIdentifier> {
        let mut identifiers: Vec<_> = self
            .cache
            .lock()
            .iter()
            .filter(|(_, entry)| matches!(entry, CacheEntry::Translated(_)))
            .map(|(identifier, _)| identifier.clone())
            .collect();
        identifiers.sort();
        identifiers
    }

    /// Drop every cached record and failure marker
    pub fn clear_cache(&self) {
        let _session = self.session_lock.lock();
        self.cache.lock().clear();
        self.aliases.lock().clear();
        debug!("Cleared library cache");
    }

    fn canonical(&self, identifier: &VersionedIdentifier) -> VersionedIdentifier {
        self.aliases
            .lock()
            .get(identifier)
            .cloned()
            .unwrap_or_else(|| identifier.clone())
    }

    /// Cached result usable under the session's options, if any
    fn lookup(
        &self,
        session: &ResolutionSession<'_>,
        key: &VersionedIdentifier,
    ) -> Option<Result<Arc<TranslatedLibrary>, ResolveError>> {
        if let Some(library) = session.cyclic_results.get(key) {
            trace!(library = %key, "Session hit for library on a cycle");
            return Some(Ok(Arc::clone(library)));
        }
        match self.cache.lock().get(key)? {
            CacheEntry::Translated(library) if library.options == session.options => {
                trace!(library = %key, "Library cache hit");
                Some(Ok(Arc::clone(library)))
            }
            CacheEntry::Translated(_) => {
                debug!(library = %key, "Cached library built with other options, re-translating");
                None
            }
            CacheEntry::Failed(err) => Some(Err(err.clone())),
        }
    }

    fn check_cycle(
        &self,
        session: &mut ResolutionSession<'_>,
        key: &VersionedIdentifier,
    ) -> Result<(), ResolveError> {
        let Some(position) = session.in_flight.iter().position(|id| id == key) else {
            return Ok(());
        };
        let path = session.path(key);
        warn!(library = %key, path = %path, "Circular library reference");
        let on_cycle: Vec<_> = session.in_flight[position..].to_vec();
        session.cyclic.extend(on_cycle);
        Err(ResolveError::CircularReference {
            identifier: key.clone(),
            path,
        })
    }

    fn fail(&self, keys: &[&VersionedIdentifier], err: ResolveError) -> ResolveError {
        let mut cache = self.cache.lock();
        for key in keys {
            cache.insert((*key).clone(), CacheEntry::Failed(err.clone()));
        }
        err
    }

    /// Resolve `identifier` within an open session
    pub fn resolve_in(
        &self,
        session: &mut ResolutionSession<'_>,
        identifier: &VersionedIdentifier,
    ) -> Result<Arc<TranslatedLibrary>, ResolveError> {
        if !identifier.is_valid() {
            return Err(ResolveError::InvalidIdentifier);
        }

        let key = self.canonical(identifier);
        if let Some(cached) = self.lookup(session, &key) {
            return cached;
        }
        self.check_cycle(session, &key)?;

        if session.depth() > session.options.max_include_depth {
            return Err(ResolveError::DepthExceeded {
                identifier: key,
                limit: session.options.max_include_depth,
            });
        }

        let source = match self.loader.library_source(&key) {
            Ok(source) => source,
            Err(err) => {
                warn!(library = %key, error = %err, "Library source unavailable");
                let err = ResolveError::from_source(&key, err);
                return Err(self.fail(&[&key], err));
            }
        };

        let resolved = source.identifier.clone();
        if resolved != key {
            debug!(requested = %key, resolved = %resolved, "Provider resolved library identifier");
            self.aliases.lock().insert(key.clone(), resolved.clone());
            if let Some(cached) = self.lookup(session, &resolved) {
                return cached;
            }
            self.check_cycle(session, &resolved)?;
        }

        let parsed = parse_library(&source.text);
        if let Some(declared) = self.declared_identifier(&parsed) {
            let id_matches = declared.id == key.id;
            let version_matches = key.version.is_none() || declared.version == key.version;
            if !id_matches || !version_matches {
                let err = ResolveError::VersionMismatch {
                    requested: key.clone(),
                    declared,
                };
                return Err(self.fail(&[&key, &resolved], err));
            }
        }

        let library = Arc::new(self.translate_parsed(session, &parsed, resolved.clone()));

        if session.cyclic.contains(&resolved) {
            debug!(library = %resolved, "Keeping library on a cycle for this session only");
            session
                .cyclic_results
                .insert(resolved.clone(), Arc::clone(&library));
        } else {
            self.cache
                .lock()
                .insert(resolved.clone(), CacheEntry::Translated(Arc::clone(&library)));
            debug!(library = %resolved, errors = library.diagnostics.len(), "Cached translated library");
        }
        Ok(library)
    }

    /// Translate root source text that did not come from a provider.
    ///
    /// The root is never cached, but it is on the in-flight stack so an
    /// include that leads back to it is reported as circular.
    pub fn translate_source(
        &self,
        session: &mut ResolutionSession<'_>,
        text: &str,
    ) -> TranslatedLibrary {
        let parsed = parse_library(text);
        let identifier = self
            .declared_identifier(&parsed)
            .unwrap_or_else(|| VersionedIdentifier::new(ANONYMOUS_LIBRARY));
        self.translate_parsed(session, &parsed, identifier)
    }

    fn translate_parsed(
        &self,
        session: &mut ResolutionSession<'_>,
        parsed: &ParsedLibrary,
        identifier: VersionedIdentifier,
    ) -> TranslatedLibrary {
        debug!(library = %identifier, depth = session.depth(), "Translating library");
        session.in_flight.push(identifier.clone());
        let output = LibraryBuilder::new(self, parsed, identifier.clone(), session.options.clone())
            .build(session);
        session.in_flight.pop();

        let mut library = output.library;
        if session.options.enabled(TranslatorOption::EnableAnnotations) {
            materialize_errors(&mut library, &output.diagnostics);
        }

        TranslatedLibrary {
            identifier,
            library,
            includes: output.includes,
            dependencies: output.dependencies,
            diagnostics: output.diagnostics,
            options: session.options.clone(),
        }
    }

    /// Identifier from the `library` declaration, namespace resolved
    fn declared_identifier(&self, parsed: &ParsedLibrary) -> Option<VersionedIdentifier> {
        let declaration = parsed.declaration()?;
        let mut identifier = VersionedIdentifier::new(declaration.name.name.clone());
        identifier.version = declaration.version.clone();
        identifier.system = declaration
            .name
            .namespace
            .as_deref()
            .and_then(|namespace| self.namespaces.resolve_namespace_uri(namespace));
        Some(identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemoryLibraryProvider;

    fn manager_with(libraries: &[(VersionedIdentifier, &str)]) -> LibraryManager {
        let manager = LibraryManager::new(Arc::new(ModelManager::new()));
        let provider = InMemoryLibraryProvider::new();
        for (identifier, text) in libraries {
            provider.add(identifier.clone(), *text);
        }
        manager.library_source_loader().register_provider(Arc::new(provider));
        manager
    }

    #[test]
    fn test_blank_identifier_is_programmer_error() {
        let manager = manager_with(&[]);
        let result = manager.resolve_library(&VersionedIdentifier::new(""), &TranslationOptions::default());
        assert_eq!(result.unwrap_err(), ResolveError::InvalidIdentifier);
    }

    #[test]
    fn test_missing_library_is_cached_as_failure() {
        let manager = manager_with(&[]);
        let id = VersionedIdentifier::new("Nope").with_version("1.0");

        let first = manager.resolve_library(&id, &TranslationOptions::default()).unwrap_err();
        let second = manager.resolve_library(&id, &TranslationOptions::default()).unwrap_err();

        assert!(matches!(first, ResolveError::MissingLibrary { .. }));
        assert_eq!(first, second);
        assert!(manager.cached_identifiers().is_empty());
    }

    #[test]
    fn test_unversioned_request_is_aliased() {
        let manager = manager_with(&[(
            VersionedIdentifier::new("Base").with_version("1.0"),
            "library Base version '1.0'\ndefine X: 1\n",
        )]);

        let library = manager
            .resolve_library(&VersionedIdentifier::new("Base"), &TranslationOptions::default())
            .unwrap();

        assert_eq!(library.identifier.version.as_deref(), Some("1.0"));
        let cached = manager.cached_library(&VersionedIdentifier::new("Base")).unwrap();
        assert!(Arc::ptr_eq(&library, &cached));
    }

    #[test]
    fn test_declared_version_mismatch() {
        let manager = manager_with(&[(
            VersionedIdentifier::new("Base").with_version("2.0"),
            "library Base version '1.0'\n",
        )]);

        let err = manager
            .resolve_library(
                &VersionedIdentifier::new("Base").with_version("2.0"),
                &TranslationOptions::default(),
            )
            .unwrap_err();

        assert_eq!(err.diagnostic_kind(), DiagnosticKind::LibraryVersionMismatch);
    }

    #[test]
    fn test_other_options_retranslate() {
        let manager = manager_with(&[(
            VersionedIdentifier::new("Base").with_version("1.0"),
            "library Base version '1.0'\ndefine X: 1\n",
        )]);
        let id = VersionedIdentifier::new("Base").with_version("1.0");

        let plain = manager.resolve_library(&id, &TranslationOptions::default()).unwrap();
        let annotated = manager
            .resolve_library(
                &id,
                &TranslationOptions::default().with_option(TranslatorOption::EnableAnnotations),
            )
            .unwrap();

        assert!(!Arc::ptr_eq(&plain, &annotated));
        assert_eq!(plain.library.annotation_count(), 0);
        assert!(annotated.library.annotation_count() > 0);
        assert!(Arc::ptr_eq(&manager.cached_library(&id).unwrap(), &annotated));
    }

    #[test]
    fn test_clear_cache() {
        let manager = manager_with(&[(
            VersionedIdentifier::new("Base").with_version("1.0"),
            "library Base version '1.0'\n",
        )]);
        let id = VersionedIdentifier::new("Base").with_version("1.0");
        manager.resolve_library(&id, &TranslationOptions::default()).unwrap();
        assert_eq!(manager.cached_identifiers(), vec![id.clone()]);

        manager.clear_cache();

        assert!(manager.cached_library(&id).is_none());
    }
}
