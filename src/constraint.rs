use crate::{error::Error, Type, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a leaf scan predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanKind {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Unchanged,
    Changed,
    Increased,
    Decreased,
    IncreasedBy,
    DecreasedBy,
}

impl ScanKind {
    /// Test if this kind carries an immediate value.
    pub fn requires_value(self) -> bool {
        use self::ScanKind::*;

        matches!(self, Eq | Neq | Gt | Gte | Lt | Lte | IncreasedBy | DecreasedBy)
    }

    /// Test if this kind compares against the previous generation.
    pub fn is_relative(self) -> bool {
        use self::ScanKind::*;

        matches!(
            self,
            Unchanged | Changed | Increased | Decreased | IncreasedBy | DecreasedBy
        )
    }

    /// Test if this kind is meaningful for byte arrays.
    ///
    /// Byte arrays have no ordering and no arithmetic; only equality and
    /// byte-wise change detection apply.
    pub fn supports_bytes(self) -> bool {
        use self::ScanKind::*;

        matches!(self, Eq | Neq | Unchanged | Changed)
    }
}

impl fmt::Display for ScanKind {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq => "==".fmt(fmt),
            Self::Neq => "!=".fmt(fmt),
            Self::Gt => ">".fmt(fmt),
            Self::Gte => ">=".fmt(fmt),
            Self::Lt => "<".fmt(fmt),
            Self::Lte => "<=".fmt(fmt),
            Self::Unchanged => "unchanged".fmt(fmt),
            Self::Changed => "changed".fmt(fmt),
            Self::Increased => "increased".fmt(fmt),
            Self::Decreased => "decreased".fmt(fmt),
            Self::IncreasedBy => "increased-by".fmt(fmt),
            Self::DecreasedBy => "decreased-by".fmt(fmt),
        }
    }
}

/// A boolean combinator over two constraint subtrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BooleanOp {
    And,
    Or,
    Xor,
}

impl fmt::Display for BooleanOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => "and".fmt(fmt),
            Self::Or => "or".fmt(fmt),
            Self::Xor => "xor".fmt(fmt),
        }
    }
}

/// A constraint tree evaluated once per element.
///
/// Leaves are typed predicates; interior nodes combine their children's
/// per-element outcomes. The serde shape is the wire format used by CLI and
/// RPC consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Constraint {
    Operation {
        op: BooleanOp,
        left: Box<Constraint>,
        right: Box<Constraint>,
    },
    Scan {
        kind: ScanKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
}

impl Constraint {
    /// Construct a leaf constraint.
    pub fn scan(kind: ScanKind, value: Option<Value>) -> Self {
        Self::Scan { kind, value }
    }

    /// Construct a leaf constraint comparing against an immediate.
    pub fn with_value(kind: ScanKind, value: Value) -> Self {
        Self::Scan {
            kind,
            value: Some(value),
        }
    }

    pub fn and(left: Constraint, right: Constraint) -> Self {
        Self::Operation {
            op: BooleanOp::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn or(left: Constraint, right: Constraint) -> Self {
        Self::Operation {
            op: BooleanOp::Or,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn xor(left: Constraint, right: Constraint) -> Self {
        Self::Operation {
            op: BooleanOp::Xor,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Test if any leaf references the previous generation.
    pub fn is_relative(&self) -> bool {
        match self {
            Self::Operation { left, right, .. } => left.is_relative() || right.is_relative(),
            Self::Scan { kind, .. } => kind.is_relative(),
        }
    }

    /// Validate the tree against the declared scan type.
    ///
    /// This runs before anything is read: immediates must match the declared
    /// type exactly, and byte arrays reject ordering and arithmetic kinds.
    pub fn validate(&self, ty: Type) -> Result<(), Error> {
        match self {
            Self::Operation { left, right, .. } => {
                left.validate(ty)?;
                right.validate(ty)
            }
            Self::Scan { kind, value } => {
                if !ty.is_numeric() && !kind.supports_bytes() {
                    return Err(Error::UnsupportedType { kind: *kind, ty });
                }

                if let Type::Bytes(0) = ty {
                    return Err(Error::InvalidArguments("empty byte pattern".to_string()));
                }

                match (kind.requires_value(), value) {
                    (true, None) => Err(Error::InvalidArguments(format!(
                        "scan kind `{}` requires a value",
                        kind
                    ))),
                    (false, Some(..)) => Err(Error::InvalidArguments(format!(
                        "scan kind `{}` does not take a value",
                        kind
                    ))),
                    (true, Some(value)) if value.ty() != ty => Err(Error::ValueTypeMismatch {
                        expected: ty,
                        found: value.ty(),
                    }),
                    _ => Ok(()),
                }
            }
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation { op, left, right } => write!(fmt, "({} {} {})", left, op, right),
            Self::Scan { kind, value } => match value {
                Some(value) => write!(fmt, "{} {}", kind, value),
                None => write!(fmt, "{}", kind),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Constraint, ScanKind};
    use crate::{Error, Type, Value};

    #[test]
    fn test_wire_format() -> anyhow::Result<()> {
        let constraint = Constraint::and(
            Constraint::with_value(ScanKind::Gt, Value::U32(5)),
            Constraint::with_value(ScanKind::Lt, Value::U32(20)),
        );

        let json = serde_json::to_value(&constraint)?;

        assert_eq!(
            serde_json::json!({
                "op": "and",
                "left": {"kind": "gt", "value": {"type": "u32", "value": 5}},
                "right": {"kind": "lt", "value": {"type": "u32", "value": 20}},
            }),
            json
        );

        let back: Constraint = serde_json::from_value(json)?;
        assert_eq!(constraint, back);
        Ok(())
    }

    #[test]
    fn test_wire_format_leaf_without_value() -> anyhow::Result<()> {
        let constraint: Constraint = serde_json::from_str(r#"{"kind": "changed"}"#)?;
        assert_eq!(Constraint::scan(ScanKind::Changed, None), constraint);
        Ok(())
    }

    #[test]
    fn test_validate() {
        let eq = Constraint::with_value(ScanKind::Eq, Value::I32(1000));
        assert!(eq.validate(Type::I32).is_ok());

        assert!(matches!(
            eq.validate(Type::U32),
            Err(Error::ValueTypeMismatch { .. })
        ));

        let missing = Constraint::scan(ScanKind::Eq, None);
        assert!(matches!(
            missing.validate(Type::I32),
            Err(Error::InvalidArguments(..))
        ));

        let increased_by = Constraint::with_value(ScanKind::IncreasedBy, Value::Bytes(vec![1]));
        assert!(matches!(
            increased_by.validate(Type::Bytes(1)),
            Err(Error::UnsupportedType { .. })
        ));

        let changed = Constraint::scan(ScanKind::Changed, None);
        assert!(changed.validate(Type::Bytes(4)).is_ok());
    }

    #[test]
    fn test_is_relative() {
        let absolute = Constraint::or(
            Constraint::with_value(ScanKind::Eq, Value::U8(1)),
            Constraint::with_value(ScanKind::Neq, Value::U8(1)),
        );
        assert!(!absolute.is_relative());

        let mixed = Constraint::and(
            Constraint::with_value(ScanKind::Gt, Value::U8(1)),
            Constraint::scan(ScanKind::Increased, None),
        );
        assert!(mixed.is_relative());
    }
}
