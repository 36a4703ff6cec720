//! CQL library syntax
//!
//! Parses the source text of one library into a syntax tree:
//! - Statement splitting so syntax errors stay local to one statement
//! - chumsky grammar for declarations and expressions
//! - Byte spans on every node, with line/column lookup
//!
//! ```
//! use cql_syntax::{parse_library, StatementKind};
//!
//! let parsed = parse_library("library Example version '1.0.0'\ndefine Answer: 42\n");
//! assert!(parsed.errors.is_empty());
//! assert!(matches!(parsed.statements[1].kind, StatementKind::Define(_)));
//! ```

pub mod ast;
pub mod common;
pub mod error;
pub mod location;
pub mod parser;
pub mod split;

pub use ast::{
    AccessModifier, BinaryOp, ContextDecl, DefineDecl, Expr, ExprKind, IncludeDecl, LibraryDecl,
    Literal, QualifiedName, Span, Statement, StatementKind, UnaryOp, UsingDecl,
};
pub use error::SyntaxError;
pub use location::{LineIndex, Location};

use chumsky::Parser;
use common::{format_error, trivia};
use split::split_statements;

/// Result of parsing one library source
#[derive(Debug, Clone)]
pub struct ParsedLibrary {
    source: String,
    line_index: LineIndex,
    /// Statements that parsed, in source order
    pub statements: Vec<Statement>,
    /// At most one error per failed statement
    pub errors: Vec<SyntaxError>,
}

impl ParsedLibrary {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Line/column range of a library-relative span
    pub fn locate(&self, span: Span) -> Location {
        self.line_index.locate(&self.source, span)
    }

    /// Source text covered by a span
    pub fn text(&self, span: Span) -> &str {
        self.source.get(span.start..span.end).unwrap_or_default()
    }

    /// The `library` declaration, if any
    pub fn declaration(&self) -> Option<&LibraryDecl> {
        self.statements.iter().find_map(|s| match &s.kind {
            StatementKind::Library(decl) => Some(decl),
            _ => None,
        })
    }
}

/// Parse a whole library source.
///
/// Never fails: statements with syntax errors are dropped and reported in
/// [`ParsedLibrary::errors`].
pub fn parse_library(source: &str) -> ParsedLibrary {
    let (preamble, chunks) = split_statements(source);
    let mut statements = Vec::with_capacity(chunks.len());
    let mut errors = Vec::new();

    if trivia()
        .then_ignore(chumsky::prelude::end())
        .parse(preamble.text)
        .into_result()
        .is_err()
    {
        let trimmed = preamble.text.trim();
        let start = preamble.text.find(trimmed).unwrap_or(0);
        errors.push(SyntaxError::new(
            "Syntax error: unexpected content before the first statement",
            Span::new(start, start + trimmed.len()),
        ));
    }

    for chunk in chunks {
        let trimmed_len = chunk.text.trim_end().len();
        match parser::statement().parse(chunk.text).into_result() {
            Ok(kind) => {
                statements.push(Statement {
                    kind: rebase(kind, chunk.offset),
                    span: Span::new(chunk.offset, chunk.offset + trimmed_len),
                });
            }
            Err(errs) => {
                if let Some(err) = errs.first() {
                    // end-of-input errors would otherwise land on the next statement's line
                    let span = Span::from(*err.span());
                    let span = Span::new(span.start.min(trimmed_len), span.end.min(trimmed_len));
                    errors.push(SyntaxError::new(
                        format_error(err),
                        span.offset(chunk.offset),
                    ));
                }
            }
        }
    }

    ParsedLibrary {
        source: source.to_string(),
        line_index: LineIndex::new(source),
        statements,
        errors,
    }
}

fn rebase(kind: StatementKind, offset: usize) -> StatementKind {
    match kind {
        StatementKind::Define(mut def) => {
            def.name_span = def.name_span.offset(offset);
            def.body = def.body.offset(offset);
            StatementKind::Define(def)
        }
        other => other,
    }
}
