//! Data model metadata and the session model cache.
//!
//! A library's `using` statement loads a model through [`ModelManager`].
//! Only one version of a model can be loaded per manager; asking for a
//! second version fails with [`ModelError::VersionConflict`].

use crate::identifier::compare_versions;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Describes one version of a data model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub version: String,
    pub url: String,
    /// Context names the model can establish (`Patient`, ...)
    #[serde(default)]
    pub contexts: Vec<String>,
    /// Class names available to retrieves
    #[serde(default)]
    pub types: Vec<String>,
}

impl ModelInfo {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            url: url.into(),
            contexts: Vec::new(),
            types: Vec::new(),
        }
    }

    pub fn with_contexts(mut self, contexts: &[&str]) -> Self {
        self.contexts = contexts.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_types(mut self, types: &[&str]) -> Self {
        self.types = types.iter().map(|t| t.to_string()).collect();
        self
    }
}

/// A loaded model
#[derive(Debug)]
pub struct Model {
    info: ModelInfo,
    types: HashSet<String>,
}

impl Model {
    fn new(info: ModelInfo) -> Self {
        let types = info.types.iter().cloned().collect();
        Self { info, types }
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn version(&self) -> &str {
        &self.info.version
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.types.contains(name)
    }

    pub fn provides_context(&self, name: &str) -> bool {
        self.info.contexts.iter().any(|c| c == name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Unknown model {name}")]
    UnknownModel { name: String },

    #[error("Model {name} has no version {version} (available: {available})")]
    UnknownVersion {
        name: String,
        version: String,
        available: String,
    },

    #[error("Could not load model {name} version {requested} because version {loaded} is already loaded")]
    VersionConflict {
        name: String,
        requested: String,
        loaded: String,
    },
}

/// Resolves and caches models by name.
#[derive(Debug, Default)]
pub struct ModelManager {
    available: RwLock<HashMap<String, Vec<ModelInfo>>>,
    loaded: Mutex<HashMap<String, Arc<Model>>>,
}

impl ModelManager {
    /// Manager with the built-in FHIR and QDM model infos
    pub fn new() -> Self {
        let manager = Self::empty();
        for info in builtin_models() {
            manager.register_model_info(info);
        }
        manager
    }

    /// Manager that knows no models
    pub fn empty() -> Self {
        Self::default()
    }

    /// Make a model version available; replaces an identical name/version
    pub fn register_model_info(&self, info: ModelInfo) {
        let mut available = self.available.write();
        let versions = available.entry(info.name.clone()).or_default();
        versions.retain(|v| v.version != info.version);
        debug!(model = %info.name, version = %info.version, "Registered model info");
        versions.push(info);
    }

    /// Load `name`, optionally at an exact `version`.
    ///
    /// Without a version the already loaded one is returned, or the highest
    /// available version is loaded.
    pub fn resolve_model(&self, name: &str, version: Option<&str>) -> Result<Arc<Model>, ModelError> {
        let mut loaded = self.loaded.lock();

        if let Some(model) = loaded.get(name) {
            return match version {
                Some(requested) if requested != model.version() => {
                    warn!(model = name, requested, loaded = model.version(), "Model version conflict");
                    Err(ModelError::VersionConflict {
                        name: name.to_string(),
                        requested: requested.to_string(),
                        loaded: model.version().to_string(),
                    })
                }
                _ => Ok(Arc::clone(model)),
            };
        }

        let available = self.available.read();
        let versions = available
            .get(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ModelError::UnknownModel {
                name: name.to_string(),
            })?;

        let info = match version {
            Some(requested) => versions
                .iter()
                .find(|v| v.version == requested)
                .ok_or_else(|| ModelError::UnknownVersion {
                    name: name.to_string(),
                    version: requested.to_string(),
                    available: versions
                        .iter()
                        .map(|v| v.version.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                })?,
            None => versions
                .iter()
                .max_by(|a, b| compare_versions(&a.version, &b.version))
                .ok_or_else(|| ModelError::UnknownModel {
                    name: name.to_string(),
                })?,
        };

        debug!(model = name, version = %info.version, "Loaded model");
        let model = Arc::new(Model::new(info.clone()));
        loaded.insert(name.to_string(), Arc::clone(&model));
        Ok(model)
    }

    /// The loaded version of `name`, if any
    pub fn loaded_model(&self, name: &str) -> Option<Arc<Model>> {
        self.loaded.lock().get(name).cloned()
    }
}

fn builtin_models() -> Vec<ModelInfo> {
    const FHIR_CONTEXTS: &[&str] = &["Patient", "Practitioner", "Unfiltered"];
    const FHIR_COMMON: &[&str] = &[
        "Patient",
        "Practitioner",
        "Encounter",
        "Condition",
        "Observation",
        "Procedure",
        "Coding",
        "CodeableConcept",
    ];

    let fhir = |version: &str, extra: &[&str]| {
        let mut types: Vec<&str> = FHIR_COMMON.to_vec();
        types.extend_from_slice(extra);
        ModelInfo::new("FHIR", version, "http://hl7.org/fhir")
            .with_contexts(FHIR_CONTEXTS)
            .with_types(&types)
    };

    vec![
        fhir("4.0.1", &["MedicationRequest", "ServiceRequest"]),
        fhir("3.0.2", &["MedicationOrder", "ProcedureRequest"]),
        ModelInfo::new("QDM", "5.6", "urn:healthit-gov:qdm:v5_6")
            .with_contexts(&["Patient", "Unfiltered"])
            .with_types(&["Patient", "Diagnosis", "EncounterPerformed", "LaboratoryTestPerformed"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_caches_by_name() {
        let manager = ModelManager::new();
        let first = manager.resolve_model("FHIR", Some("4.0.1")).unwrap();
        let second = manager.resolve_model("FHIR", None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.has_type("Encounter"));
        assert!(first.provides_context("Patient"));
    }

    #[test]
    fn test_second_version_conflicts() {
        let manager = ModelManager::new();
        manager.resolve_model("FHIR", Some("4.0.1")).unwrap();

        let err = manager.resolve_model("FHIR", Some("3.0.2")).unwrap_err();
        assert!(matches!(err, ModelError::VersionConflict { .. }));
        assert_eq!(manager.loaded_model("FHIR").unwrap().version(), "4.0.1");
    }

    #[test]
    fn test_unversioned_picks_latest() {
        let manager = ModelManager::new();
        let model = manager.resolve_model("FHIR", None).unwrap();
        assert_eq!(model.version(), "4.0.1");
    }

    #[test]
    fn test_unknown_model_and_version() {
        let manager = ModelManager::new();
        assert!(matches!(
            manager.resolve_model("Nope", None),
            Err(ModelError::UnknownModel { .. })
        ));
        assert!(matches!(
            manager.resolve_model("QDM", Some("9.9")),
            Err(ModelError::UnknownVersion { .. })
        ));
    }

    #[test]
    fn test_empty_manager_knows_nothing() {
        let manager = ModelManager::empty();
        manager.register_model_info(ModelInfo::new("Simple", "1.0", "urn:simple").with_types(&["Thing"]));
        assert!(manager.resolve_model("FHIR", None).is_err());
        assert!(manager.resolve_model("Simple", Some("1.0")).unwrap().has_type("Thing"));
    }
}
