//! Typed table specs and a small ORM over SQLite.
//!
//! # Intention
//!
//! - Describe a table once, as a row record type with per-field affinity and
//!   constraints, and derive every statement for it from that description.
//! - Generate parameterized CRUD statements: values are always bound, and
//!   identifiers are validated and quoted before they reach statement text.
//! - Convert between native field values and SQLite storage classes in both
//!   directions.
//!
//! # Architectural Boundaries
//!
//! - [`affinity`], [`constraint`], [`schema`] and [`statement`] are pure and
//!   never touch a connection.
//! - [`orm`] is the only layer that executes statements.
//! - [`worker`] only changes where the facade runs, not what it does.

pub mod affinity;
pub mod config;
pub mod constraint;
pub mod datetime;
pub mod error;
pub mod orm;
pub mod schema;
pub mod sqlite;
pub mod statement;
pub mod utils;
pub mod worker;

pub use affinity::{EnumRepr, FieldType, LiteralValue, PrimitiveKind, TypeAffinity};
pub use config::ConnectionConfig;
pub use constraint::{ConstrainRepr, ConstraintToken};
pub use datetime::{DatetimeIso8601, DatetimeUnix, DatetimeUnixNs};
pub use error::{DeclarationError, MarshalError, OrmError, Result};
pub use orm::{Entries, Orm, SelectCursor};
pub use schema::{ColumnDefinition, TableSchema, TableSchemaBuilder, TableSpec};
pub use sqlite::{
    ConflictMode, CreateTableOptions, DeleteOperation, IndexDefinition, OrderDirection, Query,
    QueryOperator, ReadOperation, SqlBatch, SqlField, SqlQuery, UpdateOperation, Value,
};
pub use statement::TableName;
pub use worker::{AsyncOrm, AsyncOrmWorker, EntryStream, JobHandle, OrmWorker};
