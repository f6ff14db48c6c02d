//! Table specs: the compiled column layout of a row record type.
//!
//! A [`TableSchema`] is built once per record type, either by hand through
//! [`TableSchemaBuilder`] or by the [`table_spec!`](crate::table_spec) macro,
//! and is read-only afterwards.

use std::collections::HashSet;

use crate::affinity::{FieldType, LiteralValue, TypeAffinity};
use crate::constraint::ConstrainRepr;
use crate::error::{DeclarationError, MarshalError, Result};
use crate::sqlite::{SqlField, Value};
use crate::statement::{quote_identifier, validate_identifier};

/// A row record bound to a table schema.
pub trait TableSpec: Sized {
    /// The schema for this record type. Declaration errors are cached and
    /// reported on every call.
    fn table_schema() -> std::result::Result<&'static TableSchema, DeclarationError>;

    /// Column values in declaration order.
    fn to_values(&self) -> Vec<Value>;

    /// Rebuild a record from column values in declaration order.
    fn from_values(values: Vec<Value>) -> Result<Self>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub field_type: FieldType,
    pub affinity: TypeAffinity,
    pub constraints: ConstrainRepr,
    pub nullable: bool,
    pub primary_key: bool,
}

impl ColumnDefinition {
    /// `"<name>" <affinity> <constraints>` as used inside `CREATE TABLE`.
    pub fn definition_sql(&self) -> String {
        let name = quote_identifier(&self.name);
        if self.constraints.is_empty() {
            format!("{name} {}", self.affinity)
        } else {
            format!("{name} {} {}", self.affinity, self.constraints)
        }
    }

    /// Check `value` against the literal set of this column, if it has one.
    ///
    /// NULL is left to the column's nullability.
    pub fn check_value(&self, value: &Value) -> std::result::Result<(), MarshalError> {
        let Some(allowed) = self.field_type.literal_values() else {
            return Ok(());
        };
        if value.is_null() || allowed.iter().any(|literal| literal_matches(literal, value)) {
            return Ok(());
        }
        let found = match value {
            Value::Integer(v) => v.to_string(),
            Value::Real(v) => format!("{v:?}"),
            Value::Text(v) => format!("{v:?}"),
            other => other.kind_name().to_string(),
        };
        Err(MarshalError::new("a declared literal value", found))
    }
}

fn literal_matches(literal: &LiteralValue, value: &Value) -> bool {
    match (literal, value) {
        (LiteralValue::Integer(allowed), Value::Integer(v)) => allowed == v,
        (LiteralValue::Integer(allowed), Value::Boolean(v)) => *allowed == i64::from(*v),
        (LiteralValue::Text(allowed), Value::Text(v)) => allowed == v,
        (LiteralValue::Real(allowed), Value::Real(v)) => allowed == v,
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    name: String,
    columns: Vec<ColumnDefinition>,
    primary_key: Vec<String>,
    table_primary_key: bool,
    strict: bool,
    without_rowid: bool,
}

impl TableSchema {
    pub fn builder(name: &str) -> TableSchemaBuilder {
        TableSchemaBuilder {
            name: name.to_string(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            strict: false,
            without_rowid: false,
        }
    }

    /// Name of the record type this schema was declared for.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    /// Quoted column names joined for select, insert and `RETURNING` lists.
    pub fn column_list_sql(&self) -> String {
        let quoted: Vec<String> = self.columns.iter().map(|c| quote_identifier(&c.name)).collect();
        quoted.join(", ")
    }

    /// Primary key columns, empty when the table has none.
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    pub fn without_rowid(&self) -> bool {
        self.without_rowid
    }

    /// Ensure `column` is declared in this schema.
    pub fn check_column(&self, column: &str) -> std::result::Result<(), DeclarationError> {
        match self.column(column) {
            Some(_) => Ok(()),
            None => Err(DeclarationError::UnknownColumn {
                table: self.name.clone(),
                column: column.to_string(),
            }),
        }
    }

    /// Column definitions joined for `CREATE TABLE`, including a trailing
    /// table-level `PRIMARY KEY (...)` when one was declared.
    pub fn columns_sql(&self) -> String {
        let mut parts: Vec<String> = self.columns.iter().map(|c| c.definition_sql()).collect();
        if self.table_primary_key {
            let keys: Vec<String> = self.primary_key.iter().map(|k| quote_identifier(k)).collect();
            parts.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }
        parts.join(", ")
    }
}

pub struct TableSchemaBuilder {
    name: String,
    columns: Vec<(String, FieldType, ConstrainRepr)>,
    primary_key: Vec<String>,
    strict: bool,
    without_rowid: bool,
}

impl TableSchemaBuilder {
    pub fn column(mut self, name: &str, field_type: FieldType, constraints: ConstrainRepr) -> Self {
        self.columns.push((name.to_string(), field_type, constraints));
        self
    }

    /// Add a column whose declaration comes from its native type.
    pub fn field<T: SqlField>(self, name: &str, constraints: ConstrainRepr) -> Self {
        self.column(name, T::field_type(), constraints)
    }

    /// Declare a table-level (possibly composite) primary key.
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
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

    pub fn build(self) -> std::result::Result<TableSchema, DeclarationError> {
        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(self.columns.len());
        for (name, field_type, constraints) in self.columns {
            validate_identifier(&name)?;
            if !seen.insert(name.clone()) {
                return Err(DeclarationError::DuplicateColumn(name));
            }
            constraints.validate()?;
            let affinity = field_type.resolve()?;
            columns.push(ColumnDefinition {
                nullable: field_type.is_optional(),
                primary_key: constraints.has_keyword("PRIMARY KEY"),
                name,
                field_type,
                affinity,
                constraints,
            });
        }

        let column_keys: Vec<String> = columns
            .iter()
            .filter(|column| column.primary_key)
            .map(|column| column.name.clone())
            .collect();
        if column_keys.len() > 1 {
            return Err(DeclarationError::ConflictingPrimaryKey {
                table: self.name,
                detail: column_keys.join(", "),
            });
        }

        let table_primary_key = !self.primary_key.is_empty();
        let primary_key = if table_primary_key {
            if let Some(column) = column_keys.first() {
                return Err(DeclarationError::ConflictingPrimaryKey {
                    table: self.name,
                    detail: format!("column {column} and PRIMARY KEY ({})", self.primary_key.join(", ")),
                });
            }
            for key in &self.primary_key {
                if !seen.contains(key) {
                    return Err(DeclarationError::UnknownColumn {
                        table: self.name,
                        column: key.clone(),
                    });
                }
            }
            for column in columns.iter_mut() {
                column.primary_key = self.primary_key.contains(&column.name);
            }
            self.primary_key
        } else {
            column_keys
        };

        Ok(TableSchema {
            name: self.name,
            columns,
            primary_key,
            table_primary_key,
            strict: self.strict,
            without_rowid: self.without_rowid,
        })
    }
}

/// Declare a row record struct together with its [`TableSpec`] impl.
///
/// Each field takes its declaration from its type, unless overridden with
/// `as <FieldType or raw type name>`, followed by optional constraint tokens:
///
/// ```
/// use rust_sqlite_orm::{table_spec, FieldType, TableSpec};
///
/// table_spec! {
///     #[derive(Debug, Clone, PartialEq)]
///     pub struct Entry {
///         pub key_id: i64 => ["PRIMARY KEY"],
///         pub prim_key: String => ["NOT NULL", "UNIQUE"],
///         pub level: i64 as FieldType::literal([1, 2, 3]) => [("DEFAULT", "1")],
///         pub note: Option<String>,
///     }
/// }
///
/// let schema = Entry::table_schema().unwrap();
/// assert_eq!(schema.column_names(), ["key_id", "prim_key", "level", "note"]);
/// ```
///
/// A table-level key and table options follow the struct body:
/// `primary_key(a, b);`, `strict = true;`, `without_rowid = true;`.
#[macro_export]
macro_rules! table_spec {
    (@field_type $ty:ty) => {
        <$ty as $crate::SqlField>::field_type()
    };
    (@field_type $ty:ty, $decl:expr) => {{
        let declared = $crate::FieldType::from($decl);
        if <$ty as $crate::SqlField>::field_type().is_optional() && !declared.is_optional() {
            $crate::FieldType::optional(declared)
        } else {
            declared
        }
    }};
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $ty:ty
                    $(as $decl:expr)?
                    $(=> [$($token:expr),* $(,)?])?
            ),* $(,)?
        }
        $(primary_key($($pk:ident),+ $(,)?);)?
        $(strict = $strict:expr;)?
        $(without_rowid = $without_rowid:expr;)?
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $ty,
            )*
        }

        impl $crate::TableSpec for $name {
            fn table_schema(
            ) -> ::std::result::Result<&'static $crate::TableSchema, $crate::DeclarationError> {
                static SCHEMA: ::std::sync::OnceLock<
                    ::std::result::Result<$crate::TableSchema, $crate::DeclarationError>,
                > = ::std::sync::OnceLock::new();
                SCHEMA
                    .get_or_init(|| {
                        let builder = $crate::TableSchema::builder(stringify!($name))
                            $(
                                .column(
                                    stringify!($field),
                                    $crate::table_spec!(@field_type $ty $(, $decl)?),
                                    $crate::ConstrainRepr::new(
                                        ::std::vec::Vec::<$crate::ConstraintToken>::from([
                                            $($($crate::ConstraintToken::from($token)),*)?
                                        ]),
                                    ),
                                )
                            )*;
                        $(let builder = builder.primary_key([$(stringify!($pk)),+]);)?
                        $(let builder = builder.strict($strict);)?
                        $(let builder = builder.without_rowid($without_rowid);)?
                        builder.build()
                    })
                    .as_ref()
                    .map_err(::std::clone::Clone::clone)
            }

            fn to_values(&self) -> ::std::vec::Vec<$crate::Value> {
                ::std::vec![$($crate::SqlField::to_value(&self.$field)),*]
            }

            #[allow(unused_mut, unused_variables)]
            fn from_values(values: ::std::vec::Vec<$crate::Value>) -> $crate::Result<Self> {
                let schema = <Self as $crate::TableSpec>::table_schema()?;
                for (column, value) in schema.columns().iter().zip(values.iter()) {
                    column
                        .check_value(value)
                        .map_err(|source| $crate::OrmError::marshal(column.name.as_str(), source))?;
                }
                let mut values = values.into_iter();
                ::std::result::Result::Ok(Self {
                    $(
                        $field: {
                            let value = values.next().ok_or_else(|| {
                                $crate::OrmError::marshal(
                                    stringify!($field),
                                    $crate::MarshalError::new("a column value", "end of row"),
                                )
                            })?;
                            <$ty as $crate::SqlField>::from_value(value)
                                .map_err(|source| $crate::OrmError::marshal(stringify!($field), source))?
                        },
                    )*
                })
            }
        }
    };
}

/// Declare an enumeration stored through its integer or text representation.
///
/// ```
/// use rust_sqlite_orm::{sql_enum, SqlField, Value};
///
/// sql_enum! {
///     #[derive(Debug, Clone, Copy, PartialEq, Eq)]
///     pub enum Choice123: integer { One = 1, Two = 2, Three = 3 }
/// }
///
/// assert_eq!(Choice123::Two.to_value(), Value::Integer(2));
/// ```
#[macro_export]
macro_rules! sql_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : integer {
            $($variant:ident = $repr:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_repr(&self) -> i64 {
                match self {
                    $($name::$variant => $repr),+
                }
            }

            pub fn from_repr(repr: i64) -> ::std::option::Option<Self> {
                match repr {
                    $($repr => ::std::option::Option::Some($name::$variant),)+
                    _ => ::std::option::Option::None,
                }
            }
        }

        impl $crate::SqlField for $name {
            fn field_type() -> $crate::FieldType {
                $crate::FieldType::Enum($crate::EnumRepr::Integer)
            }

            fn to_value(&self) -> $crate::Value {
                $crate::Value::Integer(self.as_repr())
            }

            fn from_value(value: $crate::Value) -> ::std::result::Result<Self, $crate::MarshalError> {
                match value {
                    $crate::Value::Integer(repr) => Self::from_repr(repr).ok_or_else(|| {
                        $crate::MarshalError::new(stringify!($name), ::std::format!("integer {repr}"))
                    }),
                    other => ::std::result::Result::Err($crate::MarshalError::new(
                        stringify!($name),
                        other.kind_name(),
                    )),
                }
            }
        }
    };
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : text {
            $($variant:ident = $repr:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_repr(&self) -> &'static str {
                match self {
                    $($name::$variant => $repr),+
                }
            }

            pub fn from_repr(repr: &str) -> ::std::option::Option<Self> {
                match repr {
                    $($repr => ::std::option::Option::Some($name::$variant),)+
                    _ => ::std::option::Option::None,
                }
            }
        }

        impl $crate::SqlField for $name {
            fn field_type() -> $crate::FieldType {
                $crate::FieldType::Enum($crate::EnumRepr::Text)
            }

            fn to_value(&self) -> $crate::Value {
                $crate::Value::Text(self.as_repr().to_string())
            }

            fn from_value(value: $crate::Value) -> ::std::result::Result<Self, $crate::MarshalError> {
                match value {
                    $crate::Value::Text(repr) => Self::from_repr(&repr).ok_or_else(|| {
                        $crate::MarshalError::new(stringify!($name), ::std::format!("text {repr:?}"))
                    }),
                    other => ::std::result::Result::Err($crate::MarshalError::new(
                        stringify!($name),
                        other.kind_name(),
                    )),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affinity::{EnumRepr, PrimitiveKind};
    use crate::constraint::ConstraintToken;

    crate::sql_enum! {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        enum Choice: text { A = "A", B = "B" }
    }

    crate::table_spec! {
        #[derive(Debug, Clone, PartialEq)]
        struct Keyed {
            key_id: i64,
            prim_key: String => ["UNIQUE"],
            prim_key_sha256hash: String,
        }
    }

    crate::table_spec! {
        #[derive(Debug, Clone, PartialEq)]
        struct Composite {
            tenant: String => ["NOT NULL"],
            key_id: i64 => ["NOT NULL"],
            choice: Choice => ["NOT NULL", ("DEFAULT", "'A'")],
            note: Option<String> as "VARCHAR(64)",
        }
        primary_key(tenant, key_id);
        without_rowid = true;
    }

    #[test]
    fn column_definitions_follow_declaration_order() {
        let schema = Keyed::table_schema().unwrap();
        assert_eq!(schema.name(), "Keyed");
        assert_eq!(
            schema.columns_sql(),
            r#""key_id" INTEGER, "prim_key" TEXT UNIQUE, "prim_key_sha256hash" TEXT"#
        );
        assert!(schema.primary_key().is_empty());
        assert!(!schema.column("key_id").unwrap().nullable);
    }

    #[test]
    fn table_level_primary_key_and_options() {
        let schema = Composite::table_schema().unwrap();
        assert_eq!(schema.primary_key(), ["tenant", "key_id"]);
        assert!(schema.without_rowid());
        assert!(!schema.strict());
        assert_eq!(
            schema.columns_sql(),
            concat!(
                r#""tenant" TEXT NOT NULL, "key_id" INTEGER NOT NULL, "choice" TEXT NOT NULL "#,
                r#"DEFAULT 'A', "note" VARCHAR(64), PRIMARY KEY ("tenant", "key_id")"#,
            )
        );
        let note = schema.column("note").unwrap();
        assert!(note.nullable);
        assert_eq!(note.affinity, TypeAffinity::Custom("VARCHAR(64)".into()));
        assert!(schema.column("tenant").unwrap().primary_key);
        assert_eq!(schema.column("choice").unwrap().field_type, FieldType::Enum(EnumRepr::Text));
    }

    #[test]
    fn records_convert_to_and_from_values() {
        let row = Composite {
            tenant: "t".into(),
            key_id: 7,
            choice: Choice::B,
            note: None,
        };
        let values = row.to_values();
        assert_eq!(
            values,
            vec![
                Value::Text("t".into()),
                Value::Integer(7),
                Value::Text("B".into()),
                Value::Null
            ]
        );
        assert_eq!(Composite::from_values(values).unwrap(), row);
    }

    crate::table_spec! {
        #[derive(Debug, Clone, PartialEq)]
        struct Levels {
            level: String as FieldType::literal(["H", "I", "J"]),
            rank: Option<i64> as FieldType::literal([1, 2]),
        }
    }

    #[test]
    fn literal_columns_reject_undeclared_values() {
        let err = Levels::from_values(vec![Value::from("Z"), Value::Null]).unwrap_err();
        assert!(matches!(err, crate::OrmError::Marshal { ref column, .. } if column == "level"));

        let loaded = Levels::from_values(vec![Value::from("I"), Value::Null]).unwrap();
        assert_eq!(loaded.rank, None);

        let err = Levels::from_values(vec![Value::from("H"), Value::Integer(3)]).unwrap_err();
        assert!(matches!(err, crate::OrmError::Marshal { ref column, .. } if column == "rank"));

        let rank = Levels::table_schema().unwrap().column("rank").unwrap();
        assert!(rank.check_value(&Value::Integer(2)).is_ok());
        assert_eq!(rank.check_value(&Value::Integer(5)).unwrap_err().found, "5");
    }

    #[test]
    fn short_rows_fail_to_load() {
        let err = Keyed::from_values(vec![Value::Integer(1)]).unwrap_err();
        assert!(matches!(err, crate::OrmError::Marshal { ref column, .. } if column == "prim_key"));
    }

    #[test]
    fn duplicate_columns_are_rejected() {
        let err = TableSchema::builder("Dup")
            .field::<i64>("a", ConstrainRepr::empty())
            .field::<String>("a", ConstrainRepr::empty())
            .build()
            .unwrap_err();
        assert_eq!(err, DeclarationError::DuplicateColumn("a".into()));
    }

    #[test]
    fn conflicting_primary_keys_are_rejected() {
        let two_columns = TableSchema::builder("Two")
            .field::<i64>("a", ConstrainRepr::new(["PRIMARY KEY"]))
            .field::<i64>("b", ConstrainRepr::new(["PRIMARY KEY"]))
            .build();
        assert!(matches!(
            two_columns,
            Err(DeclarationError::ConflictingPrimaryKey { .. })
        ));

        let column_and_table = TableSchema::builder("Both")
            .field::<i64>("a", ConstrainRepr::new(["PRIMARY KEY"]))
            .field::<i64>("b", ConstrainRepr::empty())
            .primary_key(["a", "b"])
            .build();
        assert!(matches!(
            column_and_table,
            Err(DeclarationError::ConflictingPrimaryKey { .. })
        ));
    }

    #[test]
    fn unknown_primary_key_column_is_rejected() {
        let err = TableSchema::builder("Missing")
            .field::<i64>("a", ConstrainRepr::empty())
            .primary_key(["b"])
            .build()
            .unwrap_err();
        assert!(matches!(err, DeclarationError::UnknownColumn { column, .. } if column == "b"));
    }

    #[test]
    fn invalid_declarations_fail_at_build() {
        let bad_name = TableSchema::builder("Bad")
            .column("a b", PrimitiveKind::Integer.into(), ConstrainRepr::empty())
            .build();
        assert!(matches!(bad_name, Err(DeclarationError::InvalidIdentifier(_))));

        let mixed = TableSchema::builder("Mixed")
            .column(
                "a",
                FieldType::Literal(vec![1.into(), "x".into()]),
                ConstrainRepr::empty(),
            )
            .build();
        assert!(matches!(mixed, Err(DeclarationError::MixedLiteral(_))));

        let malformed = TableSchema::builder("Malformed")
            .column(
                "a",
                PrimitiveKind::Text.into(),
                ConstrainRepr::new([ConstraintToken::from(("", "x"))]),
            )
            .build();
        assert!(matches!(malformed, Err(DeclarationError::MalformedConstraint(_))));
    }

    crate::table_spec! {
        struct Broken {
            a: i64 as FieldType::Opaque("Instant"),
        }
    }

    #[test]
    fn declaration_errors_are_cached() {
        let first = Broken::table_schema().unwrap_err();
        let second = Broken::table_schema().unwrap_err();
        assert_eq!(first, second);
        assert_eq!(first, DeclarationError::UnsupportedType("Instant".into()));
    }
}
