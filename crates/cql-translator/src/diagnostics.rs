//! Translation diagnostics
//!
//! Every failure below the top-level request ends up as a [`Diagnostic`]
//! with a [`SourceLocator`] naming the library it came from.

use crate::identifier::VersionedIdentifier;
use cql_syntax::Location;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Diagnostic severity, ordered `Info < Warning < Error`
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
    Syntax,
    Semantic,
    MissingLibrary,
    CircularLibraryReference,
    NamespaceConflict,
    /// A provider failed or returned unusable source
    LibraryLoadError,
    /// The included library declares another id or version than requested
    LibraryVersionMismatch,
    IncludeDepthExceeded,
    ModelLoadFailure,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Syntax => "syntax",
            Self::Semantic => "semantic",
            Self::MissingLibrary => "missing-library",
            Self::CircularLibraryReference => "circular-library-reference",
            Self::NamespaceConflict => "namespace-conflict",
            Self::LibraryLoadError => "library-load-error",
            Self::LibraryVersionMismatch => "library-version-mismatch",
            Self::IncludeDepthExceeded => "include-depth-exceeded",
            Self::ModelLoadFailure => "model-load-failure",
        })
    }
}

/// Where a diagnostic points: library plus 1-based line/column range
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<VersionedIdentifier>,
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl SourceLocator {
    pub fn new(library: Option<VersionedIdentifier>, location: Location) -> Self {
        Self {
            library,
            start_line: location.start_line,
            start_column: location.start_column,
            end_line: location.end_line,
            end_column: location.end_column,
        }
    }

    pub fn line(&self) -> usize {
        self.start_line
    }

    pub fn column(&self) -> usize {
        self.start_column
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(library) = &self.library {
            write!(f, "{} ", library)?;
        }
        write!(
            f,
            "[{}:{}, {}:{}]",
            self.start_line, self.start_column, self.end_line, self.end_column
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<SourceLocator>,
}

impl Diagnostic {
    pub fn new(severity: Severity, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            locator: None,
        }
    }

    pub fn error(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, kind, message)
    }

    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, kind, message)
    }

    pub fn info(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, kind, message)
    }

    pub fn with_locator(mut self, locator: SourceLocator) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Library the diagnostic originated in, if known
    pub fn library(&self) -> Option<&VersionedIdentifier> {
        self.locator.as_ref().and_then(|l| l.library.as_ref())
    }

    /// Fill in `locator.library` when it is not already set
    pub fn with_default_library(mut self, library: &VersionedIdentifier) -> Self {
        if let Some(locator) = self.locator.as_mut() {
            if locator.library.is_none() {
                locator.library = Some(library.clone());
            }
        }
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.locator {
            Some(locator) => write!(f, "{} {}: {}", self.severity, locator, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

/// Append `incoming` to `target`, skipping exact duplicates.
///
/// Diagnostics without a library get `library` as their origin.
pub fn merge_diagnostics(
    target: &mut Vec<Diagnostic>,
    incoming: &[Diagnostic],
    library: &VersionedIdentifier,
) {
    for diagnostic in incoming {
        let diagnostic = diagnostic.clone().with_default_library(library);
        if !target.contains(&diagnostic) {
            target.push(diagnostic);
        }
    }
}
