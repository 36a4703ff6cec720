//! Statement and expression grammar.
//!
//! Each top-level statement is parsed on its own (see [`crate::split`]), so a
//! syntax error only costs the statement it occurs in.
//!
//! Expression precedence, loosest first:
//! `or` < `and` < `not`/`exists` < comparison < `+ - &` < `* /` < atoms.

use crate::ast::{
    AccessModifier, BinaryOp, ContextDecl, DefineDecl, Expr, ExprKind, IncludeDecl, LibraryDecl,
    Literal, QualifiedName, Span, StatementKind, UnaryOp, UsingDecl,
};
use crate::common::{
    any_ident, close, ident, kw, number, qualified_parts, string_literal, tok, trivia, Extra,
};
use chumsky::prelude::*;

// ============================================================================
// Expressions
// ============================================================================

fn binary(lhs: Expr, (op, rhs): (BinaryOp, Expr)) -> Expr {
    let span = lhs.span.join(rhs.span);
    Expr::new(
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    )
}

fn literal<'src>() -> impl Parser<'src, &'src str, Literal, Extra<'src>> + Clone {
    let boolean = kw("true")
        .to(Literal::Boolean(true))
        .or(kw("false").to(Literal::Boolean(false)));

    let null = kw("null").to(Literal::Null);

    let numeric = number().try_map(|(text, is_decimal), span| {
        if is_decimal {
            Ok(Literal::Decimal(text.to_string()))
        } else {
            text.parse::<i64>()
                .map(Literal::Integer)
                .map_err(|_| Rich::custom(span, format!("Integer literal {} is out of range", text)))
        }
    });

    let string = string_literal().map(Literal::String);

    choice((boolean, null, numeric, string)).labelled("literal")
}

/// Full expression parser
pub fn expression<'src>() -> impl Parser<'src, &'src str, Expr, Extra<'src>> + Clone {
    recursive(|expr| {
        let literal = literal().map_with(|lit, e| Expr::new(ExprKind::Literal(lit), e.span().into()));

        let list = expr
            .clone()
            .separated_by(just(','))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(tok(just('{')), close('}'))
            .map_with(|items, e| Expr::new(ExprKind::List(items), e.span().into()))
            .labelled("list like {1, 2, 3}");

        let retrieve = qualified_parts()
            .padded_by(trivia())
            .delimited_by(just('['), just(']'))
            .try_map(|parts, span| match parts.len() {
                1 => Ok(ExprKind::Retrieve {
                    model: None,
                    type_name: parts[0].clone(),
                }),
                2 => Ok(ExprKind::Retrieve {
                    model: Some(parts[0].clone()),
                    type_name: parts[1].clone(),
                }),
                _ => Err(Rich::custom(
                    span,
                    "retrieve expects [Type] or [Model.Type]",
                )),
            })
            .map_with(|kind, e| Expr::new(kind, e.span().into()))
            .labelled("retrieve like [Encounter]");

        let args = expr
            .clone()
            .separated_by(just(','))
            .collect::<Vec<_>>()
            .delimited_by(tok(just('(')), close(')'));

        let reference = any_ident()
            .then(just('.').ignore_then(any_ident()).or_not())
            .then(args.or_not())
            .map_with(|((first, second), args), e| {
                let kind = match (second, args) {
                    (None, None) => ExprKind::Identifier(first),
                    (Some(name), None) => ExprKind::Qualified {
                        qualifier: first,
                        name,
                    },
                    (None, Some(args)) => ExprKind::Call {
                        qualifier: None,
                        name: first,
                        args,
                    },
                    (Some(name), Some(args)) => ExprKind::Call {
                        qualifier: Some(first),
                        name,
                        args,
                    },
                };
                Expr::new(kind, e.span().into())
            })
            .labelled("identifier or function call");

        let parenthesized = expr
            .clone()
            .delimited_by(tok(just('(')), close(')'));

        let atom = choice((literal, list, retrieve, parenthesized, reference))
            .padded_by(trivia())
            .boxed();

        let product_op = choice((
            just('*').to(BinaryOp::Multiply),
            just('/').to(BinaryOp::Divide),
        ))
        .padded_by(trivia());
        let product = atom
            .clone()
            .foldl(product_op.then(atom).repeated(), binary)
            .boxed();

        let sum_op = choice((
            just('+').to(BinaryOp::Add),
            just('-').to(BinaryOp::Subtract),
            just('&').to(BinaryOp::Concatenate),
        ))
        .padded_by(trivia());
        let sum = product
            .clone()
            .foldl(sum_op.then(product).repeated(), binary)
            .boxed();

        let comparison_op = choice((
            just("!=").to(BinaryOp::NotEqual),
            just("<=").to(BinaryOp::LessOrEqual),
            just(">=").to(BinaryOp::GreaterOrEqual),
            just('=').to(BinaryOp::Equal),
            just('<').to(BinaryOp::Less),
            just('>').to(BinaryOp::Greater),
        ))
        .padded_by(trivia());
        let comparison = sum
            .clone()
            .then(comparison_op.then(sum).or_not())
            .map(|(lhs, rest)| match rest {
                Some(rest) => binary(lhs, rest),
                None => lhs,
            })
            .boxed();

        let prefix_op = choice((
            kw("not").to(UnaryOp::Not),
            kw("exists").to(UnaryOp::Exists),
        ))
        .map_with(|op, e| (op, Span::from(e.span())))
        .padded_by(trivia());
        let prefixed = prefix_op
            .repeated()
            .foldr(comparison, |(op, span), operand: Expr| {
                let span = span.join(operand.span);
                Expr::new(
                    ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    span,
                )
            })
            .boxed();

        let and_op = kw("and").to(BinaryOp::And).padded_by(trivia());
        let conjunction = prefixed
            .clone()
            .foldl(and_op.then(prefixed).repeated(), binary)
            .boxed();

        let or_op = kw("or").to(BinaryOp::Or).padded_by(trivia());
        conjunction
            .clone()
            .foldl(or_op.then(conjunction).repeated(), binary)
    })
}

// ============================================================================
// Statements
// ============================================================================

fn version_clause<'src>() -> impl Parser<'src, &'src str, Option<String>, Extra<'src>> + Clone {
    tok(kw("version")).ignore_then(string_literal()).or_not()
}

fn library_decl<'src>() -> impl Parser<'src, &'src str, StatementKind, Extra<'src>> + Clone {
    kw("library")
        .ignore_then(tok(qualified_parts()))
        .then(version_clause())
        .map(|(parts, version)| {
            StatementKind::Library(LibraryDecl {
                name: QualifiedName::from_parts(parts),
                version,
            })
        })
}

fn using_decl<'src>() -> impl Parser<'src, &'src str, StatementKind, Extra<'src>> + Clone {
    kw("using")
        .ignore_then(tok(ident()))
        .then(version_clause())
        .map(|(model, version)| StatementKind::Using(UsingDecl { model, version }))
}

fn include_decl<'src>() -> impl Parser<'src, &'src str, StatementKind, Extra<'src>> + Clone {
    let alias = tok(kw("called")).ignore_then(any_ident()).or_not();

    kw("include")
        .ignore_then(tok(qualified_parts()))
        .then(version_clause())
        .then(alias)
        .map(|((parts, version), alias)| {
            StatementKind::Include(IncludeDecl {
                name: QualifiedName::from_parts(parts),
                version,
                alias,
            })
        })
}

fn context_decl<'src>() -> impl Parser<'src, &'src str, StatementKind, Extra<'src>> + Clone {
    kw("context")
        .ignore_then(tok(any_ident()))
        .map(|name| StatementKind::Context(ContextDecl { name }))
}

fn define_decl<'src>() -> impl Parser<'src, &'src str, StatementKind, Extra<'src>> + Clone {
    let access = choice((
        kw("public").to(AccessModifier::Public),
        kw("private").to(AccessModifier::Private),
    ))
    .padded_by(trivia())
    .or_not()
    .map(Option::unwrap_or_default);

    let name = any_ident().map_with(|name, e| (name, Span::from(e.span())));

    kw("define")
        .ignore_then(access)
        .then(tok(name))
        .then_ignore(just(':'))
        .then(expression())
        .map(|((access, (name, name_span)), body)| {
            StatementKind::Define(DefineDecl {
                access,
                name,
                name_span,
                body,
            })
        })
}

/// Parser for one complete statement, surrounding trivia included
pub fn statement<'src>() -> impl Parser<'src, &'src str, StatementKind, Extra<'src>> {
    choice((
        library_decl(),
        using_decl(),
        include_decl(),
        context_decl(),
        define_decl(),
    ))
    .padded_by(trivia())
    .then_ignore(end())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_expr(input: &str) -> Expr {
        expression()
            .then_ignore(end())
            .parse(input)
            .into_result()
            .unwrap()
    }

    #[test]
    fn test_precedence_product_binds_tighter() {
        let expr = parse_expr("1 + 2 * 3");
        match expr.kind {
            ExprKind::Binary { op, rhs, .. } => {
                assert_eq!(op, BinaryOp::Add);
                assert!(matches!(
                    rhs.kind,
                    ExprKind::Binary {
                        op: BinaryOp::Multiply,
                        ..
                    }
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse_expr("true or false and true");
        assert!(matches!(
            expr.kind,
            ExprKind::Binary {
                op: BinaryOp::Or,
                ..
            }
        ));
    }

    #[test]
    fn test_qualified_reference_and_call() {
        assert_eq!(
            parse_expr("Base.\"Some Def\"").kind,
            ExprKind::Qualified {
                qualifier: "Base".into(),
                name: "Some Def".into()
            }
        );
        assert!(matches!(
            parse_expr("Sum({1, 2, 3})").kind,
            ExprKind::Call { qualifier: None, ref name, ref args } if name == "Sum" && args.len() == 1
        ));
    }

    #[test]
    fn test_retrieve_with_model() {
        assert_eq!(
            parse_expr("[FHIR.Encounter]").kind,
            ExprKind::Retrieve {
                model: Some("FHIR".into()),
                type_name: "Encounter".into()
            }
        );
    }

    #[test]
    fn test_exists_prefix() {
        let expr = parse_expr("exists [Condition]");
        assert!(matches!(
            expr.kind,
            ExprKind::Unary {
                op: UnaryOp::Exists,
                ..
            }
        ));
    }

    #[test]
    fn test_span_covers_expression() {
        let expr = parse_expr("1 + 20");
        assert_eq!(expr.span, Span::new(0, 6));
    }

    #[test]
    fn test_span_stops_at_closing_delimiter() {
        assert_eq!(parse_expr("Nope(1)  \n").span, Span::new(0, 7));
        assert_eq!(parse_expr("{1, 2}\n").span, Span::new(0, 6));
        assert_eq!(parse_expr("B.\"X\" + Abs(1) \n").span, Span::new(0, 14));
    }

    #[test]
    fn test_include_statement() {
        let stmt = statement()
            .parse("include Common.Helpers version '1.0' called H\n")
            .into_result()
            .unwrap();
        match stmt {
            StatementKind::Include(include) => {
                assert_eq!(include.name.namespace.as_deref(), Some("Common"));
                assert_eq!(include.name.name, "Helpers");
                assert_eq!(include.version.as_deref(), Some("1.0"));
                assert_eq!(include.local_name(), "H");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_private_define() {
        let stmt = statement()
            .parse("define private \"Helper\": 1")
            .into_result()
            .unwrap();
        match stmt {
            StatementKind::Define(def) => {
                assert_eq!(def.access, AccessModifier::Private);
                assert_eq!(def.name, "Helper");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_define_missing_colon_fails() {
        assert!(statement().parse("define Foo 1").into_result().is_err());
    }
}
