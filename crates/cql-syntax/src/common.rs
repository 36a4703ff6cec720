//! Shared parser primitives.
//!
//! Small chumsky parsers for trivia, identifiers, literals and keywords that
//! the statement and expression grammars are built from.

use chumsky::extra;
use chumsky::prelude::*;

/// Extra type for parsers - uses Rich errors for better messages
pub type Extra<'src> = extra::Err<Rich<'src, char>>;

/// Words that can never be used as plain identifiers
pub const RESERVED_WORDS: &[&str] = &[
    "and", "called", "context", "define", "exists", "false", "include", "library", "not", "null",
    "or", "private", "public", "true", "using", "version",
];

// ============================================================================
// Trivia
// ============================================================================

/// Whitespace, `// line` and `/* block */` comments (zero or more)
pub fn trivia<'src>() -> impl Parser<'src, &'src str, (), Extra<'src>> + Clone {
    let whitespace = any()
        .filter(|c: &char| c.is_whitespace())
        .repeated()
        .at_least(1)
        .ignored();

    let line_comment = just("//")
        .then(any().and_is(just('\n').not()).repeated())
        .ignored();

    let block_comment = just("/*")
        .then(any().and_is(just("*/").not()).repeated())
        .then(just("*/"))
        .ignored();

    choice((whitespace, line_comment, block_comment))
        .repeated()
        .ignored()
}

// ============================================================================
// Primitive parsers
// ============================================================================

/// Raw identifier text: a letter or underscore followed by alphanumerics
fn raw_ident<'src>() -> impl Parser<'src, &'src str, &'src str, Extra<'src>> + Clone {
    any()
        .filter(|c: &char| c.is_ascii_alphabetic() || *c == '_')
        .then(
            any()
                .filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_')
                .repeated(),
        )
        .to_slice()
}

/// Parser for unquoted identifiers; reserved words are rejected
pub fn ident<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    raw_ident()
        .try_map(|s: &str, span| {
            if RESERVED_WORDS.contains(&s) {
                Err(Rich::custom(
                    span,
                    format!("'{}' is a reserved word and cannot be used as an identifier", s),
                ))
            } else {
                Ok(s.to_string())
            }
        })
        .labelled("identifier")
}

/// Parser for double-quoted identifiers: "Some Name"
pub fn quoted_ident<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    just('"')
        .ignore_then(
            none_of("\"\n")
                .repeated()
                .at_least(1)
                .to_slice()
                .map(|s: &str| s.to_string()),
        )
        .then_ignore(just('"'))
        .labelled("quoted identifier")
}

/// Identifier in either form
pub fn any_ident<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    quoted_ident().or(ident())
}

/// Dotted name: `A`, `A.B`, `A.B.C`
pub fn qualified_parts<'src>() -> impl Parser<'src, &'src str, Vec<String>, Extra<'src>> + Clone {
    any_ident()
        .separated_by(just('.'))
        .at_least(1)
        .collect::<Vec<_>>()
        .labelled("qualified name")
}

/// Parser for single-quoted string literals: 'value'
pub fn string_literal<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    just('\'')
        .ignore_then(
            none_of("'")
                .repeated()
                .to_slice()
                .map(|s: &str| s.to_string()),
        )
        .then_ignore(just('\''))
        .labelled("string literal")
}

/// Numeric literal text; the flag is true for decimals
pub fn number<'src>() -> impl Parser<'src, &'src str, (&'src str, bool), Extra<'src>> + Clone {
    let digits = any()
        .filter(|c: &char| c.is_ascii_digit())
        .repeated()
        .at_least(1);

    digits
        .clone()
        .then(just('.').then(digits).or_not())
        .to_slice()
        .map(|s: &str| (s, s.contains('.')))
        .labelled("number")
}

/// Keyword parser (case-sensitive, whole word)
pub fn kw<'src>(keyword: &'static str) -> impl Parser<'src, &'src str, (), Extra<'src>> + Clone {
    text::keyword::<&str, _, Extra<'src>>(keyword).ignored()
}

/// Closing delimiter; leading trivia only, so the enclosing node's span
/// ends at the delimiter
pub fn close<'src>(delimiter: char) -> impl Parser<'src, &'src str, char, Extra<'src>> + Clone {
    trivia().ignore_then(just(delimiter))
}

/// Token padded with trivia on both sides
pub fn tok<'src, O>(
    parser: impl Parser<'src, &'src str, O, Extra<'src>> + Clone,
) -> impl Parser<'src, &'src str, O, Extra<'src>> + Clone {
    parser.padded_by(trivia())
}

// ============================================================================
// Error formatting
// ============================================================================

/// Format a chumsky error for diagnostics
pub fn format_error(err: &Rich<'_, char>) -> String {
    let found = err
        .found()
        .map_or("end of input".to_string(), |c| format!("'{}'", c));

    match err.reason() {
        chumsky::error::RichReason::Custom(msg) => msg.to_string(),
        _ => {
            let expected = err
                .expected()
                .map(|e| e.to_string())
                .collect::<Vec<_>>();
            if expected.is_empty() {
                format!("Syntax error: unexpected {}", found)
            } else {
                format!(
                    "Syntax error: expected {}, found {}",
                    expected.join(" or "),
                    found
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ident_simple() {
        let result = ident().parse("Foo_1").into_result();
        assert_eq!(result.unwrap(), "Foo_1");
    }

    #[test]
    fn test_ident_rejects_reserved_word() {
        let result = ident().parse("define").into_result();
        assert!(result.is_err());
    }

    #[test]
    fn test_quoted_ident_allows_spaces() {
        let result = any_ident().parse("\"Has Conditions\"").into_result();
        assert_eq!(result.unwrap(), "Has Conditions");
    }

    #[test]
    fn test_qualified_parts() {
        let result = qualified_parts().parse("Common.Helpers").into_result();
        assert_eq!(result.unwrap(), vec!["Common", "Helpers"]);
    }

    #[test]
    fn test_string_literal() {
        let result = string_literal().parse("'1.0.0'").into_result();
        assert_eq!(result.unwrap(), "1.0.0");
    }

    #[test]
    fn test_number_integer_and_decimal() {
        assert_eq!(number().parse("42").into_result().unwrap(), ("42", false));
        assert_eq!(number().parse("4.25").into_result().unwrap(), ("4.25", true));
    }

    #[test]
    fn test_trivia_skips_comments() {
        let parser = trivia().ignore_then(kw("define"));
        let result = parser
            .parse("  // a comment\n /* block\n comment */ define")
            .into_result();
        assert!(result.is_ok());
    }

    #[test]
    fn test_kw_requires_whole_word() {
        assert!(kw("and").parse("android").into_result().is_err());
        assert!(kw("and").parse("and").into_result().is_ok());
    }
}
