use super::NamedVariants;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A rule-language value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A member of a named enum, e.g. `Skill.Athletics`.
    Enum { kind: String, member: String },
}

impl Value {
    pub fn from_variant<T: NamedVariants>(value: &T) -> Value {
        Value::Enum {
            kind: T::TYPE_NAME.to_string(),
            member: value.variant_name().to_string(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Enum { .. } => "enum",
        }
    }

    /// Booleans as-is; numbers are true when non-zero.
    pub fn truthy(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(n) => Some(*n != 0),
            Value::Float(n) => Some(*n != 0.0),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Interpret an enum member or a member name as `T`.
    pub fn as_variant<T: NamedVariants>(&self) -> Option<T> {
        match self {
            Value::Enum { kind, member } if kind == T::TYPE_NAME => T::from_variant_name(member),
            Value::Str(name) => T::from_variant_name(name),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Enum { member, .. } => write!(f, "{member}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::Skill;

    #[test]
    fn test_truthiness() {
        assert_eq!(Value::Int(0).truthy(), Some(false));
        assert_eq!(Value::Float(0.5).truthy(), Some(true));
        assert_eq!(Value::from("yes").truthy(), None);
    }

    #[test]
    fn test_variant_round_trip() {
        let value = Value::from_variant(&Skill::SleightOfHand);
        assert_eq!(value.to_string(), "SleightOfHand");
        assert_eq!(value.as_variant::<Skill>(), Some(Skill::SleightOfHand));
        assert_eq!(Value::from("stealth").as_variant::<Skill>(), Some(Skill::Stealth));
    }

    #[test]
    fn test_serde_untagged() {
        let values: Vec<Value> = serde_json::from_str(r#"[3, 2.5, true, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Int(3),
                Value::Float(2.5),
                Value::Bool(true),
                Value::Str("x".into())
            ]
        );
    }
}
