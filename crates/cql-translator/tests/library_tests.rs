//! Library Translation Tests
//!
//! Translates the fixture libraries under `tests/fixtures` through a
//! directory provider and checks the diagnostics and ELM that come out.

use cql_translator::elm::{Annotation, Expression};
use cql_translator::{
    CqlTranslator, DiagnosticKind, DirectoryLibraryProvider, LibraryManager, ModelManager,
    SignatureLevel, TranslationOptions, TranslationResult, TranslatorOption, VersionedIdentifier,
};
use std::path::PathBuf;
use std::sync::Arc;
use test_case::test_case;

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn fixture_manager() -> LibraryManager {
    let manager = LibraryManager::new(Arc::new(ModelManager::new()));
    manager
        .library_source_loader()
        .register_provider(Arc::new(DirectoryLibraryProvider::new(fixtures())));
    manager
}

fn translate_fixture(name: &str, options: &TranslationOptions) -> TranslationResult {
    let manager = fixture_manager();
    CqlTranslator::translate_file(fixtures().join(format!("{}-1.0.cql", name)), &manager, options)
        .expect("fixture should be readable")
}

#[test]
fn test_referencing_library_translates_cleanly() {
    let result = translate_fixture("ReferencingLibrary", &TranslationOptions::default());

    assert!(result.errors().is_empty(), "{:?}", result.errors());
    assert_eq!(result.identifier(), &VersionedIdentifier::new("ReferencingLibrary").with_version("1.0"));
    assert_eq!(result.libraries().len(), 1);

    let base = result.library("BaseLibrary").expect("BaseLibrary should be included");
    assert_eq!(base.identifier.version.as_deref(), Some("1.0"));

    let elm = result.to_elm();
    assert_eq!(elm.includes.len(), 1);
    assert_eq!(elm.includes[0].local_identifier, "Base");
    assert_eq!(elm.statements.len(), 3);
    assert!(elm.statements.iter().all(|def| def.expression.is_some()));
}

#[test_case(SignatureLevel::None, 0, 0 ; "none")]
#[test_case(SignatureLevel::Differences, 0, 2 ; "differences")]
#[test_case(SignatureLevel::Overloads, 1, 0 ; "overloads")]
#[test_case(SignatureLevel::All, 1, 2 ; "all")]
fn test_signature_levels(level: SignatureLevel, sum_signature: usize, half_signature: usize) {
    let options = TranslationOptions::default().with_signature_level(level);
    let result = translate_fixture("ReferencingLibrary", &options);
    assert!(result.errors().is_empty(), "{:?}", result.errors());

    let base = result.library("BaseLibrary").unwrap();
    let signature = |name: &str| {
        base.library
            .definition(name)
            .and_then(|def| def.expression.as_ref())
            .map(|expression| expression.signature().len())
    };

    assert_eq!(signature("BaseLibSum"), Some(sum_signature));
    assert_eq!(signature("Half"), Some(half_signature));
}

#[test]
fn test_integer_division_converts_operands() {
    let result = translate_fixture("ReferencingLibrary", &TranslationOptions::default());
    let base = result.library("BaseLibrary").unwrap();
    let half = base.library.definition("Half").unwrap();

    let Some(Expression::Operator { name, operands, .. }) = &half.expression else {
        panic!("expected an operator, got {:?}", half.expression);
    };
    assert_eq!(name, "Divide");
    assert!(operands
        .iter()
        .all(|operand| matches!(operand, Expression::Conversion { .. })));
}

#[test]
fn test_invalid_reference_reports_each_statement() {
    let result = translate_fixture("InvalidReferencingLibrary", &TranslationOptions::default());

    let errors = result.errors();
    assert_eq!(errors.len(), 2, "{:?}", errors);
    assert!(errors.iter().all(|e| e.kind == DiagnosticKind::Semantic));
    assert!(errors.iter().any(|e| e.message.contains("Not Defined")));
    assert!(errors.iter().any(|e| e.message.contains("private")));
}

#[test]
fn test_unknown_library_alias() {
    let result = translate_fixture("InvalidLibraryReference", &TranslationOptions::default());

    let errors = result.errors();
    assert_eq!(errors.len(), 1, "{:?}", errors);
    assert!(errors[0].message.contains("Nope"));
}

#[test]
fn test_duplicate_expression_reported_once() {
    let result = translate_fixture("DuplicateExpressionLibrary", &TranslationOptions::default());

    let errors = result.errors();
    assert_eq!(errors.len(), 1, "{:?}", errors);
    let locator = errors[0].locator.as_ref().expect("duplicate should be located");
    assert_eq!(locator.start_line, 5);
    assert_eq!(result.to_elm().statements.len(), 1);
}

#[test]
fn test_missing_library_reported_once_at_include() {
    let result = translate_fixture("MissingLibrary", &TranslationOptions::default());

    let errors = result.errors();
    assert_eq!(errors.len(), 1, "{:?}", errors);
    assert_eq!(errors[0].kind, DiagnosticKind::MissingLibrary);
    assert_eq!(
        errors[0].library().map(|id| id.id.as_str()),
        Some("MissingLibrary")
    );
    assert_eq!(errors[0].locator.as_ref().map(|l| l.start_line), Some(3));

    let still = result.to_elm().definition("Still Translated").unwrap();
    assert!(still.expression.is_some());
    assert!(result.libraries().is_empty());
}

#[test]
fn test_errors_in_included_library_are_located_there() {
    let result = translate_fixture("ReferencingInvalidBaseLibrary", &TranslationOptions::default());

    let errors = result.errors();
    assert_eq!(errors.len(), 1, "{:?}", errors);
    assert_eq!(
        errors[0].library().map(|id| id.id.as_str()),
        Some("InvalidBaseLibrary")
    );
    assert_eq!(errors[0].locator.as_ref().map(|l| l.start_line), Some(3));

    // the referencing definitions still translate
    let elm = result.to_elm();
    assert!(elm.definition("Uses Broken").unwrap().expression.is_some());
    assert!(elm.definition("Uses Fine").unwrap().expression.is_some());
}

#[test]
fn test_included_errors_become_annotations() {
    let options = TranslationOptions::default().with_option(TranslatorOption::EnableAnnotations);
    let result = translate_fixture("ReferencingInvalidBaseLibrary", &options);

    let root_errors: Vec<_> = result.to_elm().error_annotations().collect();
    assert_eq!(root_errors.len(), 1);
    assert_eq!(root_errors[0].library_id.as_deref(), Some("InvalidBaseLibrary"));
    assert_eq!(root_errors[0].library_version.as_deref(), Some("1.0"));
    assert_eq!(root_errors[0].start_line, Some(3));

    let base = result.library("InvalidBaseLibrary").unwrap();
    assert_eq!(base.library.error_annotations().count(), 1);

    for library in result.libraries().values() {
        assert!(library.library.annotation_count() > 0, "{}", library.identifier);
    }
}

#[test]
fn test_annotations_off_by_default() {
    let plain = translate_fixture("ReferencingInvalidBaseLibrary", &TranslationOptions::default());
    let annotated = translate_fixture(
        "ReferencingInvalidBaseLibrary",
        &TranslationOptions::default().with_option(TranslatorOption::EnableAnnotations),
    );

    assert_eq!(plain.to_elm().annotation_count(), 0);
    for library in plain.libraries().values() {
        assert_eq!(library.library.annotation_count(), 0, "{}", library.identifier);
    }
    assert!(!plain.to_json().unwrap().contains("annotation"));
    assert_eq!(plain.diagnostics(), annotated.diagnostics());
}

#[test]
fn test_definition_annotations_hold_source_text() {
    let options = TranslationOptions::default().with_option(TranslatorOption::EnableAnnotations);
    let result = translate_fixture("ReferencingLibrary", &options);

    let def = result.to_elm().definition("Sum Plus One").unwrap();
    assert!(matches!(
        def.annotations.as_slice(),
        [Annotation::Narrative { text }] if text.contains("Base.BaseLibSum + 1")
    ));
}

#[test]
fn test_circular_reference_reported_once() {
    let manager = fixture_manager();
    let result = CqlTranslator::translate_file(
        fixtures().join("CircularA-1.0.cql"),
        &manager,
        &TranslationOptions::default(),
    )
    .unwrap();

    let errors = result.errors();
    assert_eq!(errors.len(), 1, "{:?}", errors);
    assert_eq!(errors[0].kind, DiagnosticKind::CircularLibraryReference);
    assert_eq!(errors[0].library().map(|id| id.id.as_str()), Some("CircularB"));

    assert!(manager.cached_identifiers().is_empty());
}

#[test]
fn test_model_version_conflict_in_include() {
    let result = translate_fixture("TestMeasure", &TranslationOptions::default());

    let errors = result.errors();
    assert_eq!(errors.len(), 3, "{:?}", errors);
    for error in &errors {
        assert!(error.locator.is_some(), "{:?}", error);
        assert_eq!(error.library().map(|id| id.id.as_str()), Some("LegacyCommon"));
        assert_eq!(error.kind, DiagnosticKind::ModelLoadFailure);
    }

    let encounters = result.to_elm().definition("Encounters").unwrap();
    assert!(matches!(encounters.expression, Some(Expression::Retrieve { .. })));
}

#[test]
fn test_result_types_and_locators() {
    let options = TranslationOptions::default()
        .with_option(TranslatorOption::EnableResultTypes)
        .with_option(TranslatorOption::EnableLocators);
    let result = translate_fixture("ReferencingLibrary", &options);

    let def = result.to_elm().definition("Sum Plus One").unwrap();
    assert_eq!(def.result_type_name.as_deref(), Some("System.Integer"));
    assert!(def.locator.is_some());
}

#[test]
fn test_json_output_names_library() {
    let result = translate_fixture("ReferencingLibrary", &TranslationOptions::default());
    let json = result.to_json().unwrap();

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(json.contains("ReferencingLibrary"));
    assert!(value.is_object());
}
