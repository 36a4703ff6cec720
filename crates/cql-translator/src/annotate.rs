//! Materialize diagnostics into ELM annotations.

use crate::diagnostics::Diagnostic;
use crate::elm::{Annotation, ErrorAnnotation, Library};

/// Append one [`Annotation::Error`] per diagnostic to `library`.
///
/// Returns the number of annotations added.
pub fn materialize_errors(library: &mut Library, diagnostics: &[Diagnostic]) -> usize {
    let before = library.annotations.len();
    library.annotations.extend(
        diagnostics
            .iter()
            .map(|diagnostic| Annotation::Error(ErrorAnnotation::from(diagnostic))),
    );
    library.annotations.len() - before
}

/// Narrative annotation carrying a definition's source text
pub fn narrative(text: &str) -> Annotation {
    Annotation::Narrative {
        text: text.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticKind;
    use crate::identifier::VersionedIdentifier;

    #[test]
    fn test_one_annotation_per_diagnostic() {
        let mut library = Library::new(VersionedIdentifier::new("Base"));
        let diagnostics = vec![
            Diagnostic::error(DiagnosticKind::Semantic, "one"),
            Diagnostic::warning(DiagnosticKind::Semantic, "two"),
        ];

        assert_eq!(materialize_errors(&mut library, &diagnostics), 2);
        assert_eq!(library.error_annotations().count(), 2);
    }

    #[test]
    fn test_narrative_trims() {
        assert_eq!(
            narrative("  define X: 1\n"),
            Annotation::Narrative {
                text: "define X: 1".into()
            }
        );
    }
}
