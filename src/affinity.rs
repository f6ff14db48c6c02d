//! Mapping from declared field types to SQLite type affinities.
//!
//! Every native field type describes itself with a [`FieldType`] (see
//! [`crate::SqlField::field_type`]); [`FieldType::resolve`] reduces that
//! declaration to one of the four storage affinities once, when the table
//! spec is built.

use std::fmt;

use crate::error::DeclarationError;

/// SQLite column type affinity.
///
/// `Custom` carries a user supplied type name that is rendered as is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeAffinity {
    Integer,
    Text,
    Blob,
    Real,
    Custom(String),
}

impl TypeAffinity {
    pub fn as_sql(&self) -> &str {
        match self {
            TypeAffinity::Integer => "INTEGER",
            TypeAffinity::Text => "TEXT",
            TypeAffinity::Blob => "BLOB",
            TypeAffinity::Real => "REAL",
            TypeAffinity::Custom(name) => name,
        }
    }
}

impl fmt::Display for TypeAffinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// The primitive kinds the store can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Integer,
    Text,
    Blob,
    Real,
}

impl PrimitiveKind {
    pub fn affinity(self) -> TypeAffinity {
        match self {
            PrimitiveKind::Integer => TypeAffinity::Integer,
            PrimitiveKind::Text => TypeAffinity::Text,
            PrimitiveKind::Blob => TypeAffinity::Blob,
            PrimitiveKind::Real => TypeAffinity::Real,
        }
    }
}

/// Underlying representation of an enumeration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumRepr {
    Integer,
    Text,
}

/// One member of a literal set.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Integer(i64),
    Text(String),
    Real(f64),
}

impl LiteralValue {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            LiteralValue::Integer(_) => PrimitiveKind::Integer,
            LiteralValue::Text(_) => PrimitiveKind::Text,
            LiteralValue::Real(_) => PrimitiveKind::Real,
        }
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Integer(v) => write!(f, "{v}"),
            LiteralValue::Text(v) => write!(f, "{v:?}"),
            LiteralValue::Real(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<i64> for LiteralValue {
    fn from(value: i64) -> Self {
        LiteralValue::Integer(value)
    }
}

impl From<i32> for LiteralValue {
    fn from(value: i32) -> Self {
        LiteralValue::Integer(value.into())
    }
}

impl From<f64> for LiteralValue {
    fn from(value: f64) -> Self {
        LiteralValue::Real(value)
    }
}

impl From<&str> for LiteralValue {
    fn from(value: &str) -> Self {
        LiteralValue::Text(value.to_string())
    }
}

impl From<String> for LiteralValue {
    fn from(value: String) -> Self {
        LiteralValue::Text(value)
    }
}

/// Declared type of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Primitive(PrimitiveKind),
    Enum(EnumRepr),
    Optional(Box<FieldType>),
    Literal(Vec<LiteralValue>),
    /// User supplied affinity, passed through without resolution.
    Raw(String),
    /// A native type with no storage mapping.
    Opaque(&'static str),
}

impl FieldType {
    pub fn optional(inner: FieldType) -> Self {
        FieldType::Optional(Box::new(inner))
    }

    pub fn literal<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<LiteralValue>,
    {
        FieldType::Literal(values.into_iter().map(Into::into).collect())
    }

    pub fn raw(name: impl Into<String>) -> Self {
        FieldType::Raw(name.into())
    }

    /// Whether the field admits NULL.
    pub fn is_optional(&self) -> bool {
        matches!(self, FieldType::Optional(_))
    }

    /// The allowed values of a literal declaration, optional or not.
    pub fn literal_values(&self) -> Option<&[LiteralValue]> {
        match self {
            FieldType::Literal(values) => Some(values),
            FieldType::Optional(inner) => inner.literal_values(),
            _ => None,
        }
    }

    /// Resolve the declaration to a column affinity.
    pub fn resolve(&self) -> Result<TypeAffinity, DeclarationError> {
        match self {
            FieldType::Primitive(kind) => Ok(kind.affinity()),
            FieldType::Enum(EnumRepr::Integer) => Ok(TypeAffinity::Integer),
            FieldType::Enum(EnumRepr::Text) => Ok(TypeAffinity::Text),
            FieldType::Optional(inner) => inner.resolve(),
            FieldType::Literal(values) => resolve_literal(values),
            FieldType::Raw(name) => {
                validate_raw_affinity(name)?;
                Ok(TypeAffinity::Custom(name.trim().to_string()))
            }
            FieldType::Opaque(name) => Err(DeclarationError::UnsupportedType(name.to_string())),
        }
    }
}

impl From<PrimitiveKind> for FieldType {
    fn from(kind: PrimitiveKind) -> Self {
        FieldType::Primitive(kind)
    }
}

impl From<&str> for FieldType {
    fn from(name: &str) -> Self {
        FieldType::Raw(name.to_string())
    }
}

fn resolve_literal(values: &[LiteralValue]) -> Result<TypeAffinity, DeclarationError> {
    let (first, rest) = values.split_first().ok_or(DeclarationError::EmptyLiteral)?;
    let kind = first.kind();
    if rest.iter().any(|value| value.kind() != kind) {
        let rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
        return Err(DeclarationError::MixedLiteral(format!(
            "Literal[{}]",
            rendered.join(", ")
        )));
    }
    Ok(kind.affinity())
}

fn validate_raw_affinity(name: &str) -> Result<(), DeclarationError> {
    let trimmed = name.trim();
    let mut depth = 0usize;
    let mut valid = trimmed.starts_with(|c: char| c.is_ascii_alphabetic());
    for c in trimmed.chars() {
        valid &= match c {
            '(' => {
                depth += 1;
                true
            }
            ')' if depth > 0 => {
                depth -= 1;
                true
            }
            // commas only separate type arguments, e.g. DECIMAL(10, 2)
            ',' => depth > 0,
            c => c.is_ascii_alphanumeric() || c == '_' || c == ' ',
        };
    }
    if valid && depth == 0 {
        Ok(())
    } else {
        Err(DeclarationError::InvalidAffinity(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_map_to_their_affinity() {
        let cases = [
            (PrimitiveKind::Integer, "INTEGER"),
            (PrimitiveKind::Text, "TEXT"),
            (PrimitiveKind::Blob, "BLOB"),
            (PrimitiveKind::Real, "REAL"),
        ];
        for (kind, expected) in cases {
            let affinity = FieldType::Primitive(kind).resolve().unwrap();
            assert_eq!(affinity.to_string(), expected);
        }
    }

    #[test]
    fn enums_map_through_their_representation() {
        assert_eq!(
            FieldType::Enum(EnumRepr::Integer).resolve().unwrap(),
            TypeAffinity::Integer
        );
        assert_eq!(
            FieldType::Enum(EnumRepr::Text).resolve().unwrap(),
            TypeAffinity::Text
        );
    }

    #[test]
    fn optional_unwraps_before_resolving() {
        let declared = FieldType::optional(FieldType::Enum(EnumRepr::Text));
        assert!(declared.is_optional());
        assert_eq!(declared.resolve().unwrap(), TypeAffinity::Text);

        let nested = FieldType::optional(FieldType::optional(PrimitiveKind::Real.into()));
        assert_eq!(nested.resolve().unwrap(), TypeAffinity::Real);
    }

    #[test]
    fn homogeneous_literals_resolve() {
        assert_eq!(
            FieldType::literal([123, 456, 789]).resolve().unwrap(),
            TypeAffinity::Integer
        );
        assert_eq!(
            FieldType::literal(["H", "I", "J"]).resolve().unwrap(),
            TypeAffinity::Text
        );
        assert_eq!(
            FieldType::literal([1.5, 2.5]).resolve().unwrap(),
            TypeAffinity::Real
        );
    }

    #[test]
    fn mixed_literals_are_rejected() {
        let mixes = [
            vec![LiteralValue::from(1), LiteralValue::from("a")],
            vec![LiteralValue::from("a"), LiteralValue::from(1.0)],
            vec![LiteralValue::from(1), LiteralValue::from(2), LiteralValue::from(3.0)],
        ];
        for values in mixes {
            let err = FieldType::Literal(values).resolve().unwrap_err();
            assert!(matches!(err, DeclarationError::MixedLiteral(_)), "{err}");
        }
        assert_eq!(
            FieldType::Literal(Vec::new()).resolve().unwrap_err(),
            DeclarationError::EmptyLiteral
        );
    }

    #[test]
    fn raw_override_passes_through() {
        assert_eq!(
            FieldType::from("VARCHAR(32)").resolve().unwrap(),
            TypeAffinity::Custom("VARCHAR(32)".to_string())
        );
        assert!(matches!(
            FieldType::raw("TEXT); DROP TABLE x; --").resolve(),
            Err(DeclarationError::InvalidAffinity(_))
        ));
        assert!(FieldType::raw("TEXT, extra INTEGER").resolve().is_err());
        assert!(FieldType::raw("DECIMAL(10, 2)").resolve().is_ok());
    }

    #[test]
    fn opaque_types_fail() {
        assert_eq!(
            FieldType::Opaque("HashMap<String, i64>").resolve().unwrap_err(),
            DeclarationError::UnsupportedType("HashMap<String, i64>".to_string())
        );
    }
}
