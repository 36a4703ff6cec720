//! Top-level translation entry point.

use crate::diagnostics::{Diagnostic, Severity};
use crate::elm::Library;
use crate::identifier::VersionedIdentifier;
use crate::manager::{LibraryManager, TranslatedLibrary};
use crate::options::TranslationOptions;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum TranslatorError {
    #[error("Failed to read library source {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize ELM: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Translates root library sources against a [`LibraryManager`].
pub struct CqlTranslator;

impl CqlTranslator {
    /// Translate `source` and everything it includes.
    ///
    /// Always produces a result; failures are in its diagnostics.
    pub fn translate(
        source: &str,
        manager: &LibraryManager,
        options: &TranslationOptions,
    ) -> TranslationResult {
        let mut session = manager.begin_session(options.clone());
        let root = Arc::new(manager.translate_source(&mut session, source));
        drop(session);

        let libraries = root
            .transitive_dependencies()
            .into_iter()
            .collect::<BTreeMap<_, _>>();

        info!(
            library = %root.identifier,
            included = libraries.len(),
            diagnostics = root.diagnostics.len(),
            "Translated library"
        );

        TranslationResult {
            root,
            libraries,
            options: options.clone(),
        }
    }

    /// Read `path` and translate it
    pub fn translate_file(
        path: impl AsRef<Path>,
        manager: &LibraryManager,
        options: &TranslationOptions,
    ) -> Result<TranslationResult, TranslatorError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| TranslatorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::translate(&source, manager, options))
    }
}

/// Outcome of translating one root library
#[derive(Debug, Clone)]
pub struct TranslationResult {
    root: Arc<TranslatedLibrary>,
    libraries: BTreeMap<VersionedIdentifier, Arc<TranslatedLibrary>>,
    options: TranslationOptions,
}

impl TranslationResult {
    pub fn root(&self) -> &Arc<TranslatedLibrary> {
        &self.root
    }

    pub fn identifier(&self) -> &VersionedIdentifier {
        &self.root.identifier
    }

    /// Every diagnostic of the root and its includes
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.root.diagnostics
    }

    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.with_severity(Severity::Error)
    }

    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.with_severity(Severity::Warning)
    }

    pub fn messages(&self) -> Vec<&Diagnostic> {
        self.with_severity(Severity::Info)
    }

    /// Diagnostics at or above the configured error level
    pub fn reportable(&self) -> Vec<&Diagnostic> {
        self.root
            .diagnostics
            .iter()
            .filter(|d| d.severity >= self.options.error_level)
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        self.root.has_errors()
    }

    fn with_severity(&self, severity: Severity) -> Vec<&Diagnostic> {
        self.root
            .diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .collect()
    }

    /// Included libraries (transitively), keyed by resolved identifier
    pub fn libraries(&self) -> &BTreeMap<VersionedIdentifier, Arc<TranslatedLibrary>> {
        &self.libraries
    }

    /// Included library by id, ignoring version and namespace
    pub fn library(&self, id: &str) -> Option<&Arc<TranslatedLibrary>> {
        self.libraries
            .iter()
            .find(|(identifier, _)| identifier.id == id)
            .map(|(_, library)| library)
    }

    /// ELM of the root library
    pub fn to_elm(&self) -> &Library {
        &self.root.library
    }

    pub fn to_json(&self) -> Result<String, TranslatorError> {
        Ok(serde_json::to_string_pretty(&self.root.library)?)
    }
}
