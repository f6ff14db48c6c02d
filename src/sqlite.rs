//! Native values, field marshalling and per-call statement parameters.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::affinity::{FieldType, PrimitiveKind};
use crate::error::MarshalError;

/// Core value types for SQLite operations
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
}

impl Value {
    /// Storage class name, used in marshalling errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Integer(_) => "INTEGER",
            Value::Real(_) => "REAL",
            Value::Text(_) => "TEXT",
            Value::Blob(_) => "BLOB",
            Value::Boolean(_) => "BOOLEAN",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Blob(value.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Stored;

        Ok(match self {
            Value::Null => ToSqlOutput::Owned(Stored::Null),
            Value::Integer(v) => ToSqlOutput::Owned(Stored::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Owned(Stored::Real(*v)),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Value::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
            // sqlite has no boolean storage class
            Value::Boolean(v) => ToSqlOutput::Owned(Stored::Integer(i64::from(*v))),
        })
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Integer(v),
            ValueRef::Real(v) => Value::Real(v),
            ValueRef::Text(v) => {
                let text = std::str::from_utf8(v).map_err(|e| FromSqlError::Other(Box::new(e)))?;
                Value::Text(text.to_string())
            }
            ValueRef::Blob(v) => Value::Blob(v.to_vec()),
        })
    }
}

/// A native type that can be stored in a table column.
///
/// `field_type` is the declaration the column affinity is resolved from;
/// `to_value`/`from_value` convert between the native value and what the
/// store holds.
pub trait SqlField: Sized {
    fn field_type() -> FieldType;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self, MarshalError>;
}

macro_rules! integer_field {
    ($($ty:ty),* $(,)?) => {$(
        impl SqlField for $ty {
            fn field_type() -> FieldType {
                FieldType::Primitive(PrimitiveKind::Integer)
            }

            fn to_value(&self) -> Value {
                Value::Integer(i64::from(*self))
            }

            fn from_value(value: Value) -> Result<Self, MarshalError> {
                match value {
                    Value::Integer(v) => <$ty>::try_from(v).map_err(|_| {
                        MarshalError::new(stringify!($ty), format!("out of range integer {v}"))
                    }),
                    other => Err(MarshalError::new(stringify!($ty), other.kind_name())),
                }
            }
        }
    )*};
}

integer_field!(i8, i16, i32, i64, u8, u16, u32);

impl SqlField for bool {
    fn field_type() -> FieldType {
        FieldType::Primitive(PrimitiveKind::Integer)
    }

    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self, MarshalError> {
        match value {
            Value::Boolean(v) => Ok(v),
            Value::Integer(0) => Ok(false),
            Value::Integer(1) => Ok(true),
            Value::Integer(v) => Err(MarshalError::new("bool", format!("integer {v}"))),
            other => Err(MarshalError::new("bool", other.kind_name())),
        }
    }
}

impl SqlField for f64 {
    fn field_type() -> FieldType {
        FieldType::Primitive(PrimitiveKind::Real)
    }

    fn to_value(&self) -> Value {
        Value::Real(*self)
    }

    fn from_value(value: Value) -> Result<Self, MarshalError> {
        match value {
            Value::Real(v) => Ok(v),
            Value::Integer(v) => Ok(v as f64),
            other => Err(MarshalError::new("f64", other.kind_name())),
        }
    }
}

impl SqlField for f32 {
    fn field_type() -> FieldType {
        FieldType::Primitive(PrimitiveKind::Real)
    }

    fn to_value(&self) -> Value {
        Value::Real(f64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self, MarshalError> {
        f64::from_value(value)
            .map(|v| v as f32)
            .map_err(|err| MarshalError::new("f32", err.found))
    }
}

impl SqlField for String {
    fn field_type() -> FieldType {
        FieldType::Primitive(PrimitiveKind::Text)
    }

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, MarshalError> {
        match value {
            Value::Text(v) => Ok(v),
            other => Err(MarshalError::new("String", other.kind_name())),
        }
    }
}

impl SqlField for Vec<u8> {
    fn field_type() -> FieldType {
        FieldType::Primitive(PrimitiveKind::Blob)
    }

    fn to_value(&self) -> Value {
        Value::Blob(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, MarshalError> {
        match value {
            Value::Blob(v) => Ok(v),
            other => Err(MarshalError::new("Vec<u8>", other.kind_name())),
        }
    }
}

impl<T: SqlField> SqlField for Option<T> {
    fn field_type() -> FieldType {
        FieldType::optional(T::field_type())
    }

    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, SqlField::to_value)
    }

    fn from_value(value: Value) -> Result<Self, MarshalError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// SQL statement text with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub statement: String,
    pub params: Vec<Value>,
}

impl SqlQuery {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }
}

/// One statement text bound once per row.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlBatch {
    pub statement: String,
    pub rows: Vec<Vec<Value>>,
}

/// Query operators for building filter predicates
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOperator {
    Equal(Value),
    NotEqual(Value),
    GreaterThan(Value),
    GreaterThanOrEqual(Value),
    LessThan(Value),
    LessThanOrEqual(Value),
    Like(String),
    In(Vec<Value>),
    IsNull,
    IsNotNull,
}

/// Filter conditions, AND-joined in the order they were added.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Query {
    pub conditions: Vec<(String, QueryOperator)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_condition(mut self, field: &str, op: QueryOperator) -> Self {
        self.conditions.push((field.to_string(), op));
        self
    }

    /// Shorthand for an equality condition.
    pub fn with_eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.with_condition(field, QueryOperator::Equal(value.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// Insert-time policy for constraint violations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictMode {
    #[default]
    Abort,
    Fail,
    Ignore,
    Replace,
    Rollback,
}

impl ConflictMode {
    /// The `OR <MODE>` keyword, omitted for the default `abort`.
    pub fn as_sql(self) -> Option<&'static str> {
        match self {
            ConflictMode::Abort => None,
            ConflictMode::Fail => Some("FAIL"),
            ConflictMode::Ignore => Some("IGNORE"),
            ConflictMode::Replace => Some("REPLACE"),
            ConflictMode::Rollback => Some("ROLLBACK"),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReadOperation {
    pub query: Query,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub order_by: Vec<(String, OrderDirection)>,
    pub distinct: bool,
}

impl ReadOperation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn order_by(mut self, field: &str, direction: OrderDirection) -> Self {
        self.order_by.push((field.to_string(), direction));
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct UpdateOperation {
    pub query: Query,
    pub updates: Vec<(String, Value)>,
}

impl UpdateOperation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.updates.push((field.to_string(), value.into()));
        self
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DeleteOperation {
    pub query: Query,
    /// Append `RETURNING` with every column of the table.
    pub returning: bool,
}

impl DeleteOperation {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            returning: false,
        }
    }

    pub fn returning(mut self) -> Self {
        self.returning = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateTableOptions {
    /// Emit `IF NOT EXISTS`, making creation idempotent.
    pub allow_existed: bool,
    pub strict: bool,
    pub without_rowid: bool,
    pub temporary: bool,
}

impl CreateTableOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_existed(mut self, allow: bool) -> Self {
        self.allow_existed = allow;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn without_rowid(mut self, without_rowid: bool) -> Self {
        self.without_rowid = without_rowid;
        self
    }

    pub fn temporary(mut self, temporary: bool) -> Self {
        self.temporary = temporary;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    pub name: String,
    pub columns: Vec<(String, Option<OrderDirection>)>,
    pub unique: bool,
    pub allow_existed: bool,
}

impl IndexDefinition {
    pub fn new<I, S>(name: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            columns: columns.into_iter().map(|c| (c.into(), None)).collect(),
            unique: false,
            allow_existed: false,
        }
    }

    pub fn with_ordered_column(mut self, column: &str, direction: OrderDirection) -> Self {
        self.columns.push((column.to_string(), Some(direction)));
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn allow_existed(mut self, allow: bool) -> Self {
        self.allow_existed = allow;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_fields_marshal_null() {
        assert_eq!(Option::<i64>::None.to_value(), Value::Null);
        assert_eq!(Option::<i64>::from_value(Value::Null).unwrap(), None);
        assert_eq!(
            Option::<String>::from_value(Value::Text("x".into())).unwrap(),
            Some("x".to_string())
        );
        assert!(Option::<i64>::field_type().is_optional());
    }

    #[test]
    fn integers_are_range_checked() {
        assert_eq!(u8::from_value(Value::Integer(255)).unwrap(), 255);
        let err = u8::from_value(Value::Integer(256)).unwrap_err();
        assert_eq!(err.expected, "u8");
        assert!(i32::from_value(Value::Text("1".into())).is_err());
    }

    #[test]
    fn bools_are_stored_as_integers() {
        assert_eq!(true.to_value(), Value::Integer(1));
        assert!(bool::from_value(Value::Integer(1)).unwrap());
        assert!(!bool::from_value(Value::Integer(0)).unwrap());
        assert!(bool::from_value(Value::Integer(2)).is_err());
    }

    #[test]
    fn reals_accept_stored_integers() {
        assert_eq!(f64::from_value(Value::Integer(3)).unwrap(), 3.0);
        assert!(f64::from_value(Value::Blob(vec![1])).is_err());
    }

    #[test]
    fn conflict_mode_keywords() {
        assert_eq!(ConflictMode::default().as_sql(), None);
        assert_eq!(ConflictMode::Replace.as_sql(), Some("REPLACE"));
        assert_eq!(ConflictMode::Rollback.as_sql(), Some("ROLLBACK"));
    }

    #[test]
    fn query_keeps_insertion_order() {
        let query = Query::new()
            .with_eq("b", 2)
            .with_condition("a", QueryOperator::IsNull);
        let fields: Vec<&str> = query.conditions.iter().map(|(f, _)| f.as_str()).collect();
        assert_eq!(fields, ["b", "a"]);
    }
}
