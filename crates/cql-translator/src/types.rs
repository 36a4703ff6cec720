//! Result types of translated expressions.
//!
//! Serialized as their display names (`System.Integer`,
//! `List<FHIR.Encounter>`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataType {
    #[default]
    Any,
    Boolean,
    Integer,
    Decimal,
    String,
    List(Box<DataType>),
    /// A class from a data model, e.g. `FHIR.Encounter`
    Model { model: String, name: String },
}

impl DataType {
    pub fn list_of(element: DataType) -> Self {
        Self::List(Box::new(element))
    }

    pub fn model(model: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Model {
            model: model.into(),
            name: name.into(),
        }
    }

    pub fn element_type(&self) -> Option<&DataType> {
        match self {
            Self::List(element) => Some(element),
            _ => None,
        }
    }

    /// Common supertype used for list literals
    pub fn unify(&self, other: &DataType) -> DataType {
        match (self, other) {
            (a, b) if a == b => a.clone(),
            (Self::Integer, Self::Decimal) | (Self::Decimal, Self::Integer) => Self::Decimal,
            (Self::List(a), Self::List(b)) => Self::list_of(a.unify(b)),
            _ => Self::Any,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("System.Any"),
            Self::Boolean => f.write_str("System.Boolean"),
            Self::Integer => f.write_str("System.Integer"),
            Self::Decimal => f.write_str("System.Decimal"),
            Self::String => f.write_str("System.String"),
            Self::List(element) => write!(f, "List<{}>", element),
            Self::Model { model, name } => write!(f, "{}.{}", model, name),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid type name: {0}")]
pub struct InvalidTypeName(pub String);

impl FromStr for DataType {
    type Err = InvalidTypeName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(inner) = s.strip_prefix("List<").and_then(|r| r.strip_suffix('>')) {
            return Ok(Self::list_of(inner.parse()?));
        }
        match s {
            "System.Any" => Ok(Self::Any),
            "System.Boolean" => Ok(Self::Boolean),
            "System.Integer" => Ok(Self::Integer),
            "System.Decimal" => Ok(Self::Decimal),
            "System.String" => Ok(Self::String),
            _ => match s.split_once('.') {
                Some((model, name)) if !model.is_empty() && !name.is_empty() => {
                    Ok(Self::model(model, name))
                }
                _ => Err(InvalidTypeName(s.to_string())),
            },
        }
    }
}

impl TryFrom<String> for DataType {
    type Error = InvalidTypeName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DataType> for String {
    fn from(value: DataType) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse_agree() {
        for ty in [
            DataType::Integer,
            DataType::list_of(DataType::Decimal),
            DataType::list_of(DataType::model("FHIR", "Encounter")),
        ] {
            assert_eq!(ty.to_string().parse::<DataType>().unwrap(), ty);
        }
    }

    #[test]
    fn test_unify_numeric() {
        assert_eq!(DataType::Integer.unify(&DataType::Decimal), DataType::Decimal);
        assert_eq!(DataType::Integer.unify(&DataType::String), DataType::Any);
    }

    #[test]
    fn test_serializes_as_name() {
        let json = serde_json::to_string(&DataType::list_of(DataType::Integer)).unwrap();
        assert_eq!(json, "\"List<System.Integer>\"");
    }

    #[test]
    fn test_rejects_garbage() {
        assert!("Nope".parse::<DataType>().is_err());
    }
}
