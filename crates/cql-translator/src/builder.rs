//! Single-library translation.
//!
//! Runs in two phases. The first walks the statements in order: it loads
//! models, resolves includes through the [`LibraryManager`], tracks the
//! current context and declares definitions. The second compiles definition
//! bodies on demand, so a definition can reference one declared later.
//!
//! A failing statement yields exactly one diagnostic. A failed definition
//! is still declared (without an expression) so references to it do not
//! produce follow-on errors.

use crate::annotate::narrative;
use crate::diagnostics::{merge_diagnostics, Diagnostic, DiagnosticKind, SourceLocator};
use crate::elm::{
    AccessLevel, ContextDef, Expression, ExpressionDef, IncludeDef, Library, UsingDef,
};
use crate::identifier::VersionedIdentifier;
use crate::manager::{LibraryManager, ResolutionSession, TranslatedLibrary};
use crate::model::Model;
use crate::operators::{ArgumentMatch, OperatorKind, ResolvedOperator, SYSTEM_OPERATORS};
use crate::options::{SignatureLevel, TranslationOptions, TranslatorOption};
use crate::types::DataType;
use cql_syntax::{
    AccessModifier, ContextDecl, DefineDecl, Expr, ExprKind, IncludeDecl, LibraryDecl, Literal,
    ParsedLibrary, Span, StatementKind, UsingDecl,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// Context that needs no data model
const UNFILTERED_CONTEXT: &str = "Unfiltered";

enum ModelState {
    Loaded(Arc<Model>),
    Failed,
}

enum IncludeState {
    Resolved(Arc<TranslatedLibrary>),
    /// Already reported at the include statement
    Failed,
}

/// Why an expression could not be translated
struct Fault {
    kind: DiagnosticKind,
    message: String,
    span: Span,
}

impl Fault {
    fn semantic(message: impl Into<String>, span: Span) -> Self {
        Self {
            kind: DiagnosticKind::Semantic,
            message: message.into(),
            span,
        }
    }

    fn model(message: impl Into<String>, span: Span) -> Self {
        Self {
            kind: DiagnosticKind::ModelLoadFailure,
            message: message.into(),
            span,
        }
    }
}

struct Typed {
    expression: Expression,
    ty: DataType,
}

#[derive(Clone)]
struct PendingDef<'a> {
    decl: &'a DefineDecl,
    span: Span,
    context: Option<String>,
}

/// What a build produces, before annotation materialization
pub(crate) struct BuildOutput {
    pub library: Library,
    pub includes: BTreeSet<VersionedIdentifier>,
    pub dependencies: Vec<Arc<TranslatedLibrary>>,
    pub diagnostics: Vec<Diagnostic>,
}

pub(crate) struct LibraryBuilder<'a> {
    manager: &'a LibraryManager,
    parsed: &'a ParsedLibrary,
    identifier: VersionedIdentifier,
    options: TranslationOptions,
    library: Library,
    diagnostics: Vec<Diagnostic>,
    /// Merged from resolved includes
    included_diagnostics: Vec<Diagnostic>,
    models: Vec<(String, ModelState)>,
    includes: HashMap<String, IncludeState>,
    included: BTreeSet<VersionedIdentifier>,
    dependencies: Vec<Arc<TranslatedLibrary>>,
    definitions: HashMap<String, PendingDef<'a>>,
    order: Vec<String>,
    compiled: HashMap<String, ExpressionDef>,
    compiling: HashSet<String>,
}

impl<'a> LibraryBuilder<'a> {
    pub fn new(
        manager: &'a LibraryManager,
        parsed: &'a ParsedLibrary,
        identifier: VersionedIdentifier,
        options: TranslationOptions,
    ) -> Self {
        Self {
            manager,
            parsed,
            library: Library::new(identifier.clone()),
            identifier,
            options,
            diagnostics: Vec::new(),
            included_diagnostics: Vec::new(),
            models: Vec::new(),
            includes: HashMap::new(),
            included: BTreeSet::new(),
            dependencies: Vec::new(),
            definitions: HashMap::new(),
            order: Vec::new(),
            compiled: HashMap::new(),
            compiling: HashSet::new(),
        }
    }

    pub fn build(mut self, session: &mut ResolutionSession<'_>) -> BuildOutput {
        let parsed = self.parsed;

        for error in &parsed.errors {
            self.report(DiagnosticKind::Syntax, error.message.clone(), error.span);
        }

        let mut context = None;
        let mut declared_library = false;
        for statement in &parsed.statements {
            let span = statement.span;
            match &statement.kind {
                StatementKind::Library(decl) => {
                    self.library_declaration(decl, span, declared_library);
                    declared_library = true;
                }
                StatementKind::Using(decl) => self.using(decl, span),
                StatementKind::Include(decl) => self.include(session, decl, span),
                StatementKind::Context(decl) => context = Some(self.context(decl, span)),
                StatementKind::Define(decl) => self.declare(decl, span, context.clone()),
            }
        }

        for name in self.order.clone() {
            self.compile_definition(&name);
        }

        let mut statements = Vec::with_capacity(self.order.len());
        for name in &self.order {
            if let Some(def) = self.compiled.remove(name) {
                statements.push(def);
            }
        }
        self.library.statements = statements;

        let mut diagnostics = Vec::with_capacity(self.diagnostics.len());
        merge_diagnostics(&mut diagnostics, &self.diagnostics, &self.identifier);
        for diagnostic in &self.included_diagnostics {
            if !diagnostics.contains(diagnostic) {
                diagnostics.push(diagnostic.clone());
            }
        }

        debug!(
            library = %self.identifier,
            definitions = self.library.statements.len(),
            diagnostics = diagnostics.len(),
            "Built library"
        );

        BuildOutput {
            library: self.library,
            includes: self.included,
            dependencies: self.dependencies,
            diagnostics,
        }
    }

    fn report(&mut self, kind: DiagnosticKind, message: impl Into<String>, span: Span) {
        let message = message.into();
        trace!(library = %self.identifier, %kind, %message, "Diagnostic");
        let locator = SourceLocator::new(Some(self.identifier.clone()), self.parsed.locate(span));
        self.diagnostics
            .push(Diagnostic::error(kind, message).with_locator(locator));
    }

    fn report_warning(&mut self, message: impl Into<String>, span: Span) {
        let locator = SourceLocator::new(Some(self.identifier.clone()), self.parsed.locate(span));
        self.diagnostics
            .push(Diagnostic::warning(DiagnosticKind::Semantic, message).with_locator(locator));
    }

    fn report_fault(&mut self, fault: Fault) {
        self.report(fault.kind, fault.message, fault.span);
    }

    // ------------------------------------------------------------------
    // Phase 1: declarations
    // ------------------------------------------------------------------

    fn library_declaration(&mut self, decl: &LibraryDecl, span: Span, repeated: bool) {
        if repeated {
            self.report(
                DiagnosticKind::Semantic,
                "Only one library declaration is allowed",
                span,
            );
            return;
        }
        if let Some(namespace) = decl.name.namespace.as_deref() {
            if self
                .manager
                .namespace_manager()
                .namespace_info_from_name(namespace)
                .is_none()
            {
                self.report(
                    DiagnosticKind::Semantic,
                    format!("Unknown namespace {}", namespace),
                    span,
                );
            }
        }
    }

    fn using(&mut self, decl: &UsingDecl, span: Span) {
        self.models.retain(|(name, _)| *name != decl.model);

        match self
            .manager
            .model_manager()
            .resolve_model(&decl.model, decl.version.as_deref())
        {
            Ok(model) => {
                if decl.version.is_none() {
                    self.report_warning(
                        format!(
                            "No version given for model {}, using version {}",
                            decl.model,
                            model.version()
                        ),
                        span,
                    );
                }
                self.library.usings.push(UsingDef {
                    local_identifier: model.name().to_string(),
                    uri: model.info().url.clone(),
                    version: model.version().to_string(),
                });
                self.models
                    .push((decl.model.clone(), ModelState::Loaded(model)));
            }
            Err(err) => {
                self.report(DiagnosticKind::ModelLoadFailure, err.to_string(), span);
                self.models.push((decl.model.clone(), ModelState::Failed));
            }
        }
    }

    fn include(&mut self, session: &mut ResolutionSession<'_>, decl: &IncludeDecl, span: Span) {
        let alias = decl.local_name().to_string();
        if self.includes.contains_key(&alias) {
            self.report(
                DiagnosticKind::Semantic,
                format!("Library alias {} is already in use", alias),
                span,
            );
            return;
        }

        // unqualified includes live in the including library's namespace
        let system = match decl.name.namespace.as_deref() {
            Some(namespace) => match self.manager.namespace_manager().resolve_namespace_uri(namespace) {
                Some(uri) => Some(uri),
                None => {
                    self.report(
                        DiagnosticKind::Semantic,
                        format!("Unknown namespace {}", namespace),
                        span,
                    );
                    self.includes.insert(alias, IncludeState::Failed);
                    return;
                }
            },
            None => self.identifier.system.clone(),
        };

        let identifier = VersionedIdentifier {
            id: decl.name.name.clone(),
            version: decl.version.clone(),
            system,
        };

        match self.manager.resolve_in(session, &identifier) {
            Ok(library) => {
                merge_diagnostics(
                    &mut self.included_diagnostics,
                    &library.diagnostics,
                    &library.identifier,
                );
                self.library.includes.push(IncludeDef {
                    local_identifier: alias.clone(),
                    library: library.identifier.clone(),
                });
                self.included.insert(library.identifier.clone());
                self.dependencies.push(Arc::clone(&library));
                self.includes.insert(alias, IncludeState::Resolved(library));
            }
            Err(err) => {
                self.report(err.diagnostic_kind(), err.to_string(), span);
                self.included.insert(identifier);
                self.includes.insert(alias, IncludeState::Failed);
            }
        }
    }

    /// Returns the context name, recorded on later definitions even when the
    /// context could not be established
    fn context(&mut self, decl: &ContextDecl, span: Span) -> String {
        let name = decl.name.clone();

        let provider = self.models.iter().find_map(|(model_name, state)| match state {
            ModelState::Loaded(model) if model.provides_context(&name) => Some(model_name.clone()),
            _ => None,
        });

        match provider {
            Some(model) => self.library.contexts.push(ContextDef {
                name: name.clone(),
                model: Some(model),
            }),
            None => {
                let failed = self.failed_models().join(", ");
                if !failed.is_empty() {
                    self.report(
                        DiagnosticKind::ModelLoadFailure,
                        format!(
                            "Could not resolve context {}: model {} failed to load",
                            name, failed
                        ),
                        span,
                    );
                } else if name == UNFILTERED_CONTEXT {
                    self.library.contexts.push(ContextDef {
                        name: name.clone(),
                        model: None,
                    });
                } else {
                    self.report(
                        DiagnosticKind::Semantic,
                        format!("Could not resolve context name {}", name),
                        span,
                    );
                }
            }
        }
        name
    }

    fn declare(&mut self, decl: &'a DefineDecl, span: Span, context: Option<String>) {
        if self.definitions.contains_key(&decl.name) {
            self.report(
                DiagnosticKind::Semantic,
                format!("Identifier {} is already in use in this library", decl.name),
                decl.name_span,
            );
            return;
        }
        self.order.push(decl.name.clone());
        self.definitions
            .insert(decl.name.clone(), PendingDef { decl, span, context });
    }

    fn failed_models(&self) -> Vec<&str> {
        self.models
            .iter()
            .filter(|(_, state)| matches!(state, ModelState::Failed))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    // ------------------------------------------------------------------
    // Phase 2: definitions
    // ------------------------------------------------------------------

    fn compile_definition(&mut self, name: &str) {
        if self.compiled.contains_key(name) {
            return;
        }
        let Some(pending) = self.definitions.get(name).cloned() else {
            return;
        };

        self.compiling.insert(name.to_string());
        let result = self.expression(&pending.decl.body);
        self.compiling.remove(name);

        let (expression, ty) = match result {
            Ok(typed) => (Some(typed.expression), typed.ty),
            Err(fault) => {
                self.report_fault(fault);
                (None, DataType::Any)
            }
        };

        let def = ExpressionDef {
            name: name.to_string(),
            context: pending.context,
            access_level: match pending.decl.access {
                AccessModifier::Public => AccessLevel::Public,
                AccessModifier::Private => AccessLevel::Private,
            },
            expression,
            result_type_name: self
                .options
                .enabled(TranslatorOption::EnableResultTypes)
                .then(|| ty.to_string()),
            locator: self
                .options
                .enabled(TranslatorOption::EnableLocators)
                .then(|| self.parsed.locate(pending.span).to_string()),
            annotations: if self.options.enabled(TranslatorOption::EnableAnnotations) {
                vec![narrative(self.parsed.text(pending.span))]
            } else {
                Vec::new()
            },
            result_type: ty,
        };
        self.compiled.insert(name.to_string(), def);
    }

    /// Result type of a local definition, compiling it first if needed
    fn definition_type(&mut self, name: &str, span: Span) -> Result<DataType, Fault> {
        if self.compiling.contains(name) {
            return Err(Fault::semantic(
                format!("Cyclic definition: {} refers back to itself", name),
                span,
            ));
        }
        self.compile_definition(name);
        Ok(self
            .compiled
            .get(name)
            .map(|def| def.result_type.clone())
            .unwrap_or_default())
    }

    fn expression(&mut self, expr: &Expr) -> Result<Typed, Fault> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(Self::literal(literal)),

            ExprKind::List(items) => {
                let items = items
                    .iter()
                    .map(|item| self.expression(item))
                    .collect::<Result<Vec<_>, _>>()?;
                let element = items
                    .iter()
                    .map(|item| item.ty.clone())
                    .reduce(|a, b| a.unify(&b))
                    .unwrap_or_default();
                let elements = items
                    .into_iter()
                    .map(|item| {
                        if element == DataType::Decimal && item.ty == DataType::Integer {
                            Expression::Conversion {
                                operand: Box::new(item.expression),
                                to_type: DataType::Decimal,
                            }
                        } else {
                            item.expression
                        }
                    })
                    .collect();
                Ok(Typed {
                    expression: Expression::List { elements },
                    ty: DataType::list_of(element),
                })
            }

            ExprKind::Identifier(name) => {
                if !self.definitions.contains_key(name) {
                    return Err(Fault::semantic(
                        format!("Could not resolve identifier {} in the current library", name),
                        span,
                    ));
                }
                let ty = self.definition_type(name, span)?;
                Ok(Typed {
                    expression: Expression::ExpressionRef {
                        name: name.clone(),
                        library_name: None,
                    },
                    ty,
                })
            }

            ExprKind::Qualified { qualifier, name } => self.library_reference(qualifier, name, span),

            ExprKind::Call {
                qualifier: Some(qualifier),
                name,
                ..
            } => match self.includes.get(qualifier) {
                Some(IncludeState::Failed) => Ok(Typed {
                    expression: Expression::Function {
                        name: name.clone(),
                        operands: Vec::new(),
                        signature: Vec::new(),
                    },
                    ty: DataType::Any,
                }),
                Some(IncludeState::Resolved(_)) => Err(Fault::semantic(
                    format!("Could not resolve function {} in library {}", name, qualifier),
                    span,
                )),
                None => Err(Fault::semantic(
                    format!("Could not resolve library alias {}", qualifier),
                    span,
                )),
            },

            ExprKind::Call {
                qualifier: None,
                name,
                args,
            } => {
                let operands = args
                    .iter()
                    .map(|arg| self.expression(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.operator_call(name, operands, span)
            }

            ExprKind::Retrieve { model, type_name } => {
                self.retrieve(model.as_deref(), type_name, span)
            }

            ExprKind::Unary { op, operand } => {
                let operand = self.expression(operand)?;
                self.operator_call(op.operator_name(), vec![operand], span)
            }

            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.expression(lhs)?;
                let rhs = self.expression(rhs)?;
                self.operator_call(op.operator_name(), vec![lhs, rhs], span)
            }
        }
    }

    fn literal(literal: &Literal) -> Typed {
        let (value_type, value) = match literal {
            Literal::Null => {
                return Typed {
                    expression: Expression::Null,
                    ty: DataType::Any,
                }
            }
            Literal::Boolean(value) => (DataType::Boolean, value.to_string()),
            Literal::Integer(value) => (DataType::Integer, value.to_string()),
            Literal::Decimal(value) => (DataType::Decimal, value.clone()),
            Literal::String(value) => (DataType::String, value.clone()),
        };
        Typed {
            expression: Expression::Literal {
                value_type: value_type.clone(),
                value,
            },
            ty: value_type,
        }
    }

    fn library_reference(&mut self, qualifier: &str, name: &str, span: Span) -> Result<Typed, Fault> {
        let reference = Expression::ExpressionRef {
            name: name.to_string(),
            library_name: Some(qualifier.to_string()),
        };

        match self.includes.get(qualifier) {
            // the include failure is already reported
            Some(IncludeState::Failed) => Ok(Typed {
                expression: reference,
                ty: DataType::Any,
            }),
            Some(IncludeState::Resolved(library)) => match library.library.definition(name) {
                None => Err(Fault::semantic(
                    format!("Could not resolve identifier {} in library {}", name, qualifier),
                    span,
                )),
                Some(def) if def.access_level == AccessLevel::Private => Err(Fault::semantic(
                    format!(
                        "Identifier {} in library {} is marked private and cannot be referenced from another library",
                        name, qualifier
                    ),
                    span,
                )),
                Some(def) => Ok(Typed {
                    expression: reference,
                    ty: def.result_type.clone(),
                }),
            },
            None => Err(Fault::semantic(
                format!("Could not resolve library alias {}", qualifier),
                span,
            )),
        }
    }

    fn retrieve(&mut self, model: Option<&str>, type_name: &str, span: Span) -> Result<Typed, Fault> {
        let model_name = match model {
            Some(model_name) => {
                match self.models.iter().find(|(name, _)| name == model_name) {
                    Some((_, ModelState::Loaded(model))) if model.has_type(type_name) => {
                        model_name.to_string()
                    }
                    Some((_, ModelState::Loaded(_))) => {
                        return Err(Fault::semantic(
                            format!("Could not resolve type name {} in model {}", type_name, model_name),
                            span,
                        ))
                    }
                    Some((_, ModelState::Failed)) => {
                        return Err(Fault::model(
                            format!(
                                "Could not resolve retrieve of {}.{}: model {} failed to load",
                                model_name, type_name, model_name
                            ),
                            span,
                        ))
                    }
                    None => {
                        return Err(Fault::semantic(
                            format!("Model {} is not declared by a using statement", model_name),
                            span,
                        ))
                    }
                }
            }
            None => {
                let found = self.models.iter().find_map(|(name, state)| match state {
                    ModelState::Loaded(model) if model.has_type(type_name) => Some(name.clone()),
                    _ => None,
                });
                match found {
                    Some(name) => name,
                    None => {
                        let failed = self.failed_models();
                        return Err(if failed.is_empty() {
                            Fault::semantic(format!("Could not resolve type name {}", type_name), span)
                        } else {
                            Fault::model(
                                format!(
                                    "Could not resolve retrieve of {}: model {} failed to load",
                                    type_name,
                                    failed.join(", ")
                                ),
                                span,
                            )
                        });
                    }
                }
            }
        };

        let data_type = DataType::model(model_name, type_name);
        Ok(Typed {
            expression: Expression::Retrieve {
                data_type: data_type.clone(),
            },
            ty: DataType::list_of(data_type),
        })
    }

    fn signature_for(&self, resolved: &ResolvedOperator) -> Vec<DataType> {
        let attach = match self.options.signature_level {
            SignatureLevel::None => false,
            SignatureLevel::All => true,
            SignatureLevel::Overloads => resolved.overloaded,
            SignatureLevel::Differences => !resolved.is_exact(),
        };
        if attach {
            resolved.signature.operands.clone()
        } else {
            Vec::new()
        }
    }

    fn operator_call(&mut self, name: &str, operands: Vec<Typed>, span: Span) -> Result<Typed, Fault> {
        let types: Vec<DataType> = operands.iter().map(|operand| operand.ty.clone()).collect();
        let resolved = SYSTEM_OPERATORS
            .resolve(name, &types)
            .map_err(|err| Fault::semantic(err.to_string(), span))?;
        let signature = self.signature_for(&resolved);

        let mut operands: Vec<Expression> = operands
            .into_iter()
            .zip(&resolved.matches)
            .map(|(operand, matched)| match matched {
                ArgumentMatch::Convert(to_type) => Expression::Conversion {
                    operand: Box::new(operand.expression),
                    to_type: to_type.clone(),
                },
                ArgumentMatch::Exact | ArgumentMatch::Generic => operand.expression,
            })
            .collect();

        let expression = match resolved.kind {
            OperatorKind::Aggregate => match (operands.pop(), operands.is_empty()) {
                (Some(source), true) => Expression::Aggregate {
                    name: resolved.name.to_string(),
                    source: Box::new(source),
                    signature,
                },
                _ => {
                    return Err(Fault::semantic(
                        format!("Aggregate {} takes exactly one list argument", name),
                        span,
                    ))
                }
            },
            OperatorKind::Function => Expression::Function {
                name: resolved.name.to_string(),
                operands,
                signature,
            },
            OperatorKind::Operator => Expression::Operator {
                name: resolved.name.to_string(),
                operands,
                signature,
            },
        };

        Ok(Typed {
            expression,
            ty: resolved.signature.result.clone(),
        })
    }
}
