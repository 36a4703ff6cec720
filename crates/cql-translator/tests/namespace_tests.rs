//! Namespace Tests
//!
//! Namespace-qualified includes and the FHIR helper provider's rewriting of
//! library identifiers into the FHIR namespace.

use cql_translator::source::FHIR_NAMESPACE_URI;
use cql_translator::{
    CqlTranslator, DiagnosticKind, FhirLibrarySourceProvider, InMemoryLibraryProvider,
    LibraryManager, ModelManager, NamespaceInfo, TranslationOptions, VersionedIdentifier,
};
use std::sync::Arc;

const COMMON_URI: &str = "http://example.org/common";

fn manager() -> LibraryManager {
    LibraryManager::new(Arc::new(ModelManager::new()))
}

fn with_common_namespace(manager: &LibraryManager) {
    manager
        .namespace_manager()
        .ensure_namespace_registered(NamespaceInfo::new("Common", COMMON_URI))
        .unwrap();
}

const MEASURE: &str = "library Common.Measure version '1.0'
using FHIR version '4.0.1'
include FHIRHelpers version '4.0.1' called FH
define \"Version\": FH.\"FHIR Version\"
";

#[test]
fn test_fhir_helpers_without_namespaces() {
    let manager = manager();
    manager
        .library_source_loader()
        .register_provider(Arc::new(FhirLibrarySourceProvider::new()));

    let result = CqlTranslator::translate(
        "library Measure version '1.0'\nusing FHIR version '4.0.1'\ninclude FHIRHelpers version '4.0.1' called FH\n",
        &manager,
        &TranslationOptions::default(),
    );

    assert!(result.errors().is_empty(), "{:?}", result.errors());
    let helpers = result.library("FHIRHelpers").unwrap();
    assert_eq!(helpers.identifier.system, None);
    assert!(!manager.namespace_manager().has_namespaces());
}

#[test]
fn test_fhir_helpers_moved_into_fhir_namespace() {
    let manager = manager();
    with_common_namespace(&manager);
    manager
        .library_source_loader()
        .register_provider(Arc::new(FhirLibrarySourceProvider::new()));

    let result = CqlTranslator::translate(MEASURE, &manager, &TranslationOptions::default());

    assert!(result.errors().is_empty(), "{:?}", result.errors());
    assert_eq!(result.identifier().system.as_deref(), Some(COMMON_URI));

    let helpers = result.library("FHIRHelpers").unwrap();
    assert_eq!(helpers.identifier.system.as_deref(), Some(FHIR_NAMESPACE_URI));
    assert_eq!(
        manager.namespace_manager().resolve_namespace_uri("FHIR").as_deref(),
        Some(FHIR_NAMESPACE_URI)
    );

    // the request as written maps onto the rewritten record
    let requested = VersionedIdentifier::new("FHIRHelpers")
        .with_version("4.0.1")
        .with_system(COMMON_URI);
    let cached = manager.cached_library(&requested).unwrap();
    assert!(Arc::ptr_eq(&cached, helpers));

    let include = &result.to_elm().includes[0];
    assert_eq!(include.library.system.as_deref(), Some(FHIR_NAMESPACE_URI));
}

#[test]
fn test_fhir_name_conflict_reported_at_include() {
    let manager = manager();
    manager
        .namespace_manager()
        .ensure_namespace_registered(NamespaceInfo::new("FHIR", "http://example.org/not-fhir"))
        .unwrap();
    with_common_namespace(&manager);
    manager
        .library_source_loader()
        .register_provider(Arc::new(FhirLibrarySourceProvider::new()));

    let result = CqlTranslator::translate(MEASURE, &manager, &TranslationOptions::default());

    let errors = result.errors();
    assert_eq!(errors.len(), 1, "{:?}", errors);
    assert_eq!(errors[0].kind, DiagnosticKind::NamespaceConflict);
    assert_eq!(errors[0].locator.as_ref().map(|l| l.start_line), Some(3));
}

#[test]
fn test_qualified_include() {
    let manager = manager();
    with_common_namespace(&manager);
    manager.library_source_loader().register_provider(Arc::new(
        InMemoryLibraryProvider::new().with_library(
            VersionedIdentifier::new("Shared")
                .with_version("1.0")
                .with_system(COMMON_URI),
            "library Common.Shared version '1.0'\ndefine \"Value\": 1\n",
        ),
    ));

    let result = CqlTranslator::translate(
        "library Root\ninclude Common.Shared version '1.0' called S\ndefine X: S.\"Value\"\n",
        &manager,
        &TranslationOptions::default(),
    );

    assert!(result.errors().is_empty(), "{:?}", result.errors());
    let shared = result.library("Shared").unwrap();
    assert_eq!(shared.identifier.system.as_deref(), Some(COMMON_URI));
}

#[test]
fn test_unqualified_include_inherits_namespace() {
    let manager = manager();
    with_common_namespace(&manager);
    manager.library_source_loader().register_provider(Arc::new(
        InMemoryLibraryProvider::new().with_library(
            VersionedIdentifier::new("Shared")
                .with_version("1.0")
                .with_system(COMMON_URI),
            "library Common.Shared version '1.0'\ndefine \"Value\": 1\n",
        ),
    ));

    let inside = CqlTranslator::translate(
        "library Common.Root\ninclude Shared version '1.0'\n",
        &manager,
        &TranslationOptions::default(),
    );
    assert!(inside.errors().is_empty(), "{:?}", inside.errors());

    let outside = CqlTranslator::translate(
        "library Root\ninclude Shared version '1.0'\n",
        &manager,
        &TranslationOptions::default(),
    );
    assert_eq!(outside.errors().len(), 1);
    assert_eq!(outside.errors()[0].kind, DiagnosticKind::MissingLibrary);
}

#[test]
fn test_unknown_namespace() {
    let manager = manager();
    let result = CqlTranslator::translate(
        "library Root\ninclude Nowhere.Shared version '1.0' called S\ndefine X: S.\"Value\"\n",
        &manager,
        &TranslationOptions::default(),
    );

    let errors = result.errors();
    assert_eq!(errors.len(), 1, "{:?}", errors);
    assert!(errors[0].message.contains("Nowhere"));
}

#[test]
fn test_shared_fhir_provider_follows_each_manager() {
    let provider = Arc::new(FhirLibrarySourceProvider::new());

    let first = manager();
    first.library_source_loader().register_provider(provider.clone());
    let second = manager();
    with_common_namespace(&second);
    second.library_source_loader().register_provider(provider.clone());

    let helpers = VersionedIdentifier::new("FHIRHelpers").with_version("4.0.1");
    let options = TranslationOptions::default();

    let namespaced = second.resolve_library(&helpers, &options).unwrap();
    assert_eq!(namespaced.identifier.system.as_deref(), Some(FHIR_NAMESPACE_URI));
    assert!(second.namespace_manager().namespace_info_from_name("FHIR").is_some());
    assert!(!first.namespace_manager().has_namespaces());
}
