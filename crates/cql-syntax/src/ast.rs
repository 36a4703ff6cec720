//! Syntax tree produced by the library parser.
//!
//! Nodes carry byte [`Span`]s into the original source; use
//! [`ParsedLibrary::locate`](crate::ParsedLibrary::locate) to turn them into
//! line/column ranges.

use serde::{Deserialize, Serialize};

/// Byte range into the library source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Shift both ends by `offset` (statement-relative to library-relative)
    pub fn offset(self, offset: usize) -> Self {
        Self {
            start: self.start + offset,
            end: self.end + offset,
        }
    }

    /// Smallest span covering both
    pub fn join(self, other: Span) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl From<chumsky::span::SimpleSpan> for Span {
    fn from(span: chumsky::span::SimpleSpan) -> Self {
        Self {
            start: span.start,
            end: span.end,
        }
    }
}

/// A possibly namespace-qualified name such as `Common.Helpers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Leading parts, joined with `.` (`None` for an unqualified name)
    pub namespace: Option<String>,
    pub name: String,
}

impl QualifiedName {
    pub fn from_parts(mut parts: Vec<String>) -> Self {
        let name = parts.pop().unwrap_or_default();
        let namespace = if parts.is_empty() {
            None
        } else {
            Some(parts.join("."))
        };
        Self { namespace, name }
    }
}

impl std::fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}.{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

// ============================================================================
// Statements
// ============================================================================

/// One top-level statement of a library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub kind: StatementKind,
    /// Span of the whole statement (trailing whitespace excluded)
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatementKind {
    Library(LibraryDecl),
    Using(UsingDecl),
    Include(IncludeDecl),
    Context(ContextDecl),
    Define(DefineDecl),
}

impl StatementKind {
    /// Leading keyword, for messages
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Library(_) => "library",
            Self::Using(_) => "using",
            Self::Include(_) => "include",
            Self::Context(_) => "context",
            Self::Define(_) => "define",
        }
    }
}

/// `library Name version 'x'`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryDecl {
    pub name: QualifiedName,
    pub version: Option<String>,
}

/// `using Model version 'x'`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsingDecl {
    pub model: String,
    pub version: Option<String>,
}

/// `include Name version 'x' called Alias`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncludeDecl {
    pub name: QualifiedName,
    pub version: Option<String>,
    pub alias: Option<String>,
}

impl IncludeDecl {
    /// Local name the library is referenced by
    pub fn local_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name.name)
    }
}

/// `context Patient`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDecl {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccessModifier {
    #[default]
    Public,
    Private,
}

/// `define [public|private] Name: expression`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefineDecl {
    pub access: AccessModifier,
    pub name: String,
    pub name_span: Span,
    pub body: Expr,
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Re-base all spans in the tree by `offset`
    pub fn offset(mut self, offset: usize) -> Self {
        self.span = self.span.offset(offset);
        self.kind = match self.kind {
            ExprKind::List(items) => {
                ExprKind::List(items.into_iter().map(|e| e.offset(offset)).collect())
            }
            ExprKind::Call {
                qualifier,
                name,
                args,
            } => ExprKind::Call {
                qualifier,
                name,
                args: args.into_iter().map(|e| e.offset(offset)).collect(),
            },
            ExprKind::Unary { op, operand } => ExprKind::Unary {
                op,
                operand: Box::new(operand.offset(offset)),
            },
            ExprKind::Binary { op, lhs, rhs } => ExprKind::Binary {
                op,
                lhs: Box::new(lhs.offset(offset)),
                rhs: Box::new(rhs.offset(offset)),
            },
            other => other,
        };
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    /// Kept as text to avoid float rounding in the IR
    Decimal(String),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Literal(Literal),
    /// `{a, b, c}`
    List(Vec<Expr>),
    /// Plain or quoted identifier
    Identifier(String),
    /// `Qualifier.Name`
    Qualified { qualifier: String, name: String },
    /// `Name(args)` or `Qualifier.Name(args)`
    Call {
        qualifier: Option<String>,
        name: String,
        args: Vec<Expr>,
    },
    /// `[Type]` or `[Model.Type]`
    Retrieve {
        model: Option<String>,
        type_name: String,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Exists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Concatenate,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    And,
    Or,
}

impl BinaryOp {
    /// Operator name as it appears in the system operator table
    pub fn operator_name(self) -> &'static str {
        match self {
            Self::Add => "Add",
            Self::Subtract => "Subtract",
            Self::Multiply => "Multiply",
            Self::Divide => "Divide",
            Self::Concatenate => "Concatenate",
            Self::Equal => "Equal",
            Self::NotEqual => "NotEqual",
            Self::Less => "Less",
            Self::LessOrEqual => "LessOrEqual",
            Self::Greater => "Greater",
            Self::GreaterOrEqual => "GreaterOrEqual",
            Self::And => "And",
            Self::Or => "Or",
        }
    }
}

impl UnaryOp {
    pub fn operator_name(self) -> &'static str {
        match self {
            Self::Not => "Not",
            Self::Exists => "Exists",
        }
    }
}
