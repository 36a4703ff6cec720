//! System operator table and overload resolution.
//!
//! Each operator has one or more signatures. Resolution picks the overload
//! with the cheapest argument conversions; ties go to the first declared.

use crate::types::DataType;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    /// Takes a list and folds it (`Sum`, `Count`, ...)
    Aggregate,
    /// Named system function (`Length`, `ToString`, ...)
    Function,
    /// Prefix or infix operator (`Not`, `Add`, ...)
    Operator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub operands: Vec<DataType>,
    pub result: DataType,
}

impl Signature {
    fn new(operands: Vec<DataType>, result: DataType) -> Self {
        Self { operands, result }
    }
}

#[derive(Debug, Clone)]
pub struct Operator {
    pub name: &'static str,
    pub kind: OperatorKind,
    pub overloads: Vec<Signature>,
}

/// How an argument fits a declared operand type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentMatch {
    Exact,
    /// Accepted through `Any` on either side, no conversion node needed
    Generic,
    /// Needs an implicit conversion to the given type
    Convert(DataType),
}

impl ArgumentMatch {
    fn cost(&self) -> u32 {
        match self {
            Self::Exact => 0,
            Self::Generic => 1,
            Self::Convert(_) => 2,
        }
    }
}

/// Match an argument type against a declared operand type
pub fn match_argument(argument: &DataType, declared: &DataType) -> Option<ArgumentMatch> {
    match (argument, declared) {
        (a, d) if a == d => Some(ArgumentMatch::Exact),
        (_, DataType::Any) | (DataType::Any, _) => Some(ArgumentMatch::Generic),
        (DataType::Integer, DataType::Decimal) => Some(ArgumentMatch::Convert(DataType::Decimal)),
        (DataType::List(a), DataType::List(d)) => match match_argument(a, d)? {
            ArgumentMatch::Exact => Some(ArgumentMatch::Exact),
            ArgumentMatch::Generic => Some(ArgumentMatch::Generic),
            ArgumentMatch::Convert(_) => Some(ArgumentMatch::Convert(declared.clone())),
        },
        _ => None,
    }
}

/// Outcome of overload resolution
#[derive(Debug, Clone)]
pub struct ResolvedOperator {
    pub name: &'static str,
    pub kind: OperatorKind,
    /// The declared signature that was chosen
    pub signature: Signature,
    /// One entry per argument
    pub matches: Vec<ArgumentMatch>,
    /// The operator has more than one overload
    pub overloaded: bool,
}

impl ResolvedOperator {
    /// Every argument type equals the declared operand type
    pub fn is_exact(&self) -> bool {
        self.matches.iter().all(|m| *m == ArgumentMatch::Exact)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperatorError {
    #[error("Could not resolve call to operator {name}")]
    Unknown { name: String },

    #[error("Could not resolve call to operator {name} with signature ({arguments})")]
    NoMatch { name: String, arguments: String },
}

#[derive(Debug, Default)]
pub struct OperatorTable {
    operators: HashMap<&'static str, Operator>,
}

impl OperatorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &'static str, kind: OperatorKind, overloads: Vec<Signature>) {
        self.operators.insert(
            name,
            Operator {
                name,
                kind,
                overloads,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&Operator> {
        self.operators.get(name)
    }

    pub fn resolve(
        &self,
        name: &str,
        arguments: &[DataType],
    ) -> Result<ResolvedOperator, OperatorError> {
        let operator = self.get(name).ok_or_else(|| OperatorError::Unknown {
            name: name.to_string(),
        })?;

        let mut best: Option<(u32, &Signature, Vec<ArgumentMatch>)> = None;
        for signature in &operator.overloads {
            if signature.operands.len() != arguments.len() {
                continue;
            }
            let matches: Option<Vec<_>> = arguments
                .iter()
                .zip(&signature.operands)
                .map(|(argument, declared)| match_argument(argument, declared))
                .collect();
            let Some(matches) = matches else {
                continue;
            };
            let cost = matches.iter().map(ArgumentMatch::cost).sum();
            if best.as_ref().is_none_or(|(best_cost, _, _)| cost < *best_cost) {
                best = Some((cost, signature, matches));
            }
        }

        let (_, signature, matches) = best.ok_or_else(|| OperatorError::NoMatch {
            name: name.to_string(),
            arguments: arguments
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        })?;

        Ok(ResolvedOperator {
            name: operator.name,
            kind: operator.kind,
            signature: signature.clone(),
            matches,
            overloaded: operator.overloads.len() > 1,
        })
    }
}

/// The built-in operator table
pub static SYSTEM_OPERATORS: Lazy<OperatorTable> = Lazy::new(system_operators);

fn system_operators() -> OperatorTable {
    use DataType::{Any, Boolean, Decimal, Integer, String};
    use OperatorKind::{Aggregate, Function, Operator};

    let list = DataType::list_of;
    let sig = Signature::new;
    let mut table = OperatorTable::new();

    for name in ["Add", "Subtract", "Multiply"] {
        table.register(
            name,
            Operator,
            vec![
                sig(vec![Integer, Integer], Integer),
                sig(vec![Decimal, Decimal], Decimal),
            ],
        );
    }
    table.register("Divide", Operator, vec![sig(vec![Decimal, Decimal], Decimal)]);
    table.register("Concatenate", Operator, vec![sig(vec![String, String], String)]);

    for name in ["Equal", "NotEqual"] {
        table.register(name, Operator, vec![sig(vec![Any, Any], Boolean)]);
    }
    for name in ["Less", "LessOrEqual", "Greater", "GreaterOrEqual"] {
        table.register(
            name,
            Operator,
            vec![
                sig(vec![Integer, Integer], Boolean),
                sig(vec![Decimal, Decimal], Boolean),
                sig(vec![String, String], Boolean),
            ],
        );
    }
    for name in ["And", "Or"] {
        table.register(name, Operator, vec![sig(vec![Boolean, Boolean], Boolean)]);
    }
    table.register("Not", Operator, vec![sig(vec![Boolean], Boolean)]);
    table.register("Exists", Operator, vec![sig(vec![list(Any)], Boolean)]);

    table.register("Count", Aggregate, vec![sig(vec![list(Any)], Integer)]);
    table.register(
        "Sum",
        Aggregate,
        vec![
            sig(vec![list(Integer)], Integer),
            sig(vec![list(Decimal)], Decimal),
        ],
    );
    for name in ["Min", "Max"] {
        table.register(
            name,
            Aggregate,
            vec![
                sig(vec![list(Integer)], Integer),
                sig(vec![list(Decimal)], Decimal),
                sig(vec![list(String)], String),
            ],
        );
    }
    table.register("Avg", Aggregate, vec![sig(vec![list(Decimal)], Decimal)]);

    table.register("Length", Function, vec![sig(vec![String], Integer)]);
    table.register("Upper", Function, vec![sig(vec![String], String)]);
    table.register("Lower", Function, vec![sig(vec![String], String)]);
    table.register(
        "ToString",
        Function,
        vec![
            sig(vec![Integer], String),
            sig(vec![Decimal], String),
            sig(vec![Boolean], String),
        ],
    );
    table.register("ToDecimal", Function, vec![sig(vec![Integer], Decimal)]);
    table.register(
        "Abs",
        Function,
        vec![sig(vec![Integer], Integer), sig(vec![Decimal], Decimal)],
    );

    table
}
