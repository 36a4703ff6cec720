//! ELM: the translated representation of a library.
//!
//! Serializes to JSON through serde. Expression nodes are tagged with a
//! `type` field the way ELM JSON names them.

use crate::diagnostics::{Diagnostic, DiagnosticKind, Severity};
use crate::identifier::VersionedIdentifier;
use crate::types::DataType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Library {
    pub identifier: VersionedIdentifier,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usings: Vec<UsingDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<IncludeDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contexts: Vec<ContextDef>,
    #[serde(default)]
    pub statements: Vec<ExpressionDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

impl Library {
    pub fn new(identifier: VersionedIdentifier) -> Self {
        Self {
            identifier,
            usings: Vec::new(),
            includes: Vec::new(),
            contexts: Vec::new(),
            statements: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn definition(&self, name: &str) -> Option<&ExpressionDef> {
        self.statements.iter().find(|def| def.name == name)
    }

    /// Annotations on the library plus those on its definitions
    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
            + self
                .statements
                .iter()
                .map(|def| def.annotations.len())
                .sum::<usize>()
    }

    pub fn error_annotations(&self) -> impl Iterator<Item = &ErrorAnnotation> {
        self.annotations.iter().filter_map(|annotation| match annotation {
            Annotation::Error(error) => Some(error),
            Annotation::Narrative { .. } => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsingDef {
    pub local_identifier: String,
    pub uri: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludeDef {
    pub local_identifier: String,
    /// The resolved library
    pub library: VersionedIdentifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccessLevel {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub access_level: AccessLevel,
    /// `None` when the definition failed to translate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
    /// Inferred type, used when other libraries reference this definition
    #[serde(skip)]
    pub result_type: DataType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Expression {
    Null,
    Literal {
        value_type: DataType,
        value: String,
    },
    List {
        elements: Vec<Expression>,
    },
    ExpressionRef {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        library_name: Option<String>,
    },
    Retrieve {
        data_type: DataType,
    },
    /// Implicit conversion inserted by overload resolution
    Conversion {
        operand: Box<Expression>,
        to_type: DataType,
    },
    Aggregate {
        name: String,
        source: Box<Expression>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        signature: Vec<DataType>,
    },
    Function {
        name: String,
        operands: Vec<Expression>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        signature: Vec<DataType>,
    },
    Operator {
        name: String,
        operands: Vec<Expression>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        signature: Vec<DataType>,
    },
}

impl Expression {
    /// Attached operand signature, empty for nodes without one
    pub fn signature(&self) -> &[DataType] {
        match self {
            Self::Aggregate { signature, .. }
            | Self::Function { signature, .. }
            | Self::Operator { signature, .. } => signature,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Annotation {
    /// Source text of a definition
    Narrative { text: String },
    Error(ErrorAnnotation),
}

/// A diagnostic embedded in the ELM output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorAnnotation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_char: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_char: Option<usize>,
    pub message: String,
    pub error_type: DiagnosticKind,
    pub error_severity: Severity,
}

impl From<&Diagnostic> for ErrorAnnotation {
    fn from(diagnostic: &Diagnostic) -> Self {
        let locator = diagnostic.locator.as_ref();
        let library = diagnostic.library();
        Self {
            library_id: library.map(|l| l.id.clone()),
            library_version: library.and_then(|l| l.version.clone()),
            library_system: library.and_then(|l| l.system.clone()),
            start_line: locator.map(|l| l.start_line),
            start_char: locator.map(|l| l.start_column),
            end_line: locator.map(|l| l.end_line),
            end_char: locator.map(|l| l.end_column),
            message: diagnostic.message.clone(),
            error_type: diagnostic.kind,
            error_severity: diagnostic.severity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::SourceLocator;

    #[test]
    fn test_expression_json_is_tagged() {
        let expr = Expression::Aggregate {
            name: "Sum".into(),
            source: Box::new(Expression::List { elements: vec![] }),
            signature: vec![DataType::list_of(DataType::Integer)],
        };
        let json = serde_json::to_value(&expr).unwrap();
        assert_eq!(json["type"], "Aggregate");
        assert_eq!(json["signature"][0], "List<System.Integer>");
        assert_eq!(json["source"]["type"], "List");
    }

    #[test]
    fn test_error_annotation_from_diagnostic() {
        let library = VersionedIdentifier::new("Base").with_version("1.0");
        let diagnostic = Diagnostic::error(DiagnosticKind::MissingLibrary, "gone").with_locator(
            SourceLocator {
                library: Some(library),
                start_line: 2,
                start_column: 1,
                end_line: 2,
                end_column: 20,
            },
        );

        let annotation = ErrorAnnotation::from(&diagnostic);

        assert_eq!(annotation.library_id.as_deref(), Some("Base"));
        assert_eq!(annotation.library_version.as_deref(), Some("1.0"));
        assert_eq!(annotation.start_line, Some(2));
        assert_eq!(annotation.error_type, DiagnosticKind::MissingLibrary);
    }

    #[test]
    fn test_annotation_count_includes_definitions() {
        let mut library = Library::new(VersionedIdentifier::new("Base"));
        library.annotations.push(Annotation::Narrative { text: "x".into() });
        library.statements.push(ExpressionDef {
            name: "X".into(),
            context: None,
            access_level: AccessLevel::Public,
            expression: None,
            result_type_name: None,
            locator: None,
            annotations: vec![Annotation::Narrative { text: "define X: 1".into() }],
            result_type: DataType::Any,
        });
        assert_eq!(library.annotation_count(), 2);
        assert_eq!(library.error_annotations().count(), 0);
    }
}
