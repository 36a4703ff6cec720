//! Translator configuration from TOML.
//!
//! ```toml
//! error_level = "warning"
//! signature_level = "overloads"
//! options = ["enable-annotations", "enable-locators"]
//! fhir_helpers = true
//! library_paths = ["cql"]
//!
//! [[namespaces]]
//! name = "Common"
//! uri = "http://example.org/common"
//! ```
//!
//! Relative `library_paths` are resolved against the directory of the
//! config file when loaded with [`TranslatorConfig::load_from_file`].

use crate::diagnostics::Severity;
use crate::manager::LibraryManager;
use crate::model::ModelManager;
use crate::namespace::{NamespaceError, NamespaceInfo};
use crate::options::{
    SignatureLevel, TranslationOptions, TranslatorOption, DEFAULT_MAX_INCLUDE_DEPTH,
};
use crate::source::{DirectoryLibraryProvider, FhirLibrarySourceProvider};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid translator config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error(transparent)]
    Namespace(#[from] NamespaceError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    pub error_level: Severity,
    pub signature_level: SignatureLevel,
    pub options: BTreeSet<TranslatorOption>,
    pub max_include_depth: usize,
    /// Register the embedded FHIR helper libraries
    pub fhir_helpers: bool,
    pub namespaces: Vec<NamespaceInfo>,
    /// Directories searched for `.cql` files, in order
    pub library_paths: Vec<PathBuf>,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            error_level: Severity::Info,
            signature_level: SignatureLevel::None,
            options: BTreeSet::new(),
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
            fhir_helpers: true,
            namespaces: Vec::new(),
            library_paths: Vec::new(),
        }
    }
}

impl TranslatorConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&contents)?;

        if let Some(base) = path.parent() {
            config.library_paths = config
                .library_paths
                .into_iter()
                .map(|p| if p.is_absolute() { p } else { base.join(p) })
                .collect();
        }
        debug!(path = %path.display(), "Loaded translator config");
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_include_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_include_depth".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        for namespace in &self.namespaces {
            if namespace.name.trim().is_empty() || namespace.uri.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "namespaces".to_string(),
                    message: "name and uri must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn translation_options(&self) -> TranslationOptions {
        TranslationOptions {
            error_level: self.error_level,
            signature_level: self.signature_level,
            options: self.options.clone(),
            max_include_depth: self.max_include_depth,
        }
    }

    /// Manager with this config's namespaces and providers registered.
    ///
    /// Library directories come first so they can override the embedded
    /// helper libraries.
    pub fn build_library_manager(
        &self,
        models: Arc<ModelManager>,
    ) -> Result<LibraryManager, ConfigError> {
        let manager = LibraryManager::new(models);

        for namespace in &self.namespaces {
            manager
                .namespace_manager()
                .ensure_namespace_registered(namespace.clone())?;
        }

        let loader = manager.library_source_loader();
        for path in &self.library_paths {
            loader.register_provider(Arc::new(DirectoryLibraryProvider::new(path)));
        }
        if self.fhir_helpers {
            loader.register_provider(Arc::new(FhirLibrarySourceProvider::new()));
        }
        Ok(manager)
    }
}
