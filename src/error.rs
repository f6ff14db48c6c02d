//! Error types shared by the schema, statement and ORM layers.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrmError>;

/// Errors raised while declaring a table spec or building a statement.
///
/// These never reach the store: they are reported at the point of misuse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclarationError {
    #[error("cannot map {0} to any sqlite3 type affinity")]
    UnsupportedType(String),

    #[error("mix types in literal is not allowed: {0}")]
    MixedLiteral(String),

    #[error("literal declaration needs at least one value")]
    EmptyLiteral,

    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("invalid type affinity override: {0:?}")]
    InvalidAffinity(String),

    #[error("column {column:?} is not defined in table {table}")]
    UnknownColumn { table: String, column: String },

    #[error("column {0:?} is declared more than once")]
    DuplicateColumn(String),

    #[error("table {table} declares more than one primary key: {detail}")]
    ConflictingPrimaryKey { table: String, detail: String },

    #[error("malformed constraint token: {0}")]
    MalformedConstraint(String),

    #[error("{found} is not one of the literal values declared for column {column:?}")]
    LiteralViolation { column: String, found: String },

    #[error("invalid statement: {0}")]
    InvalidStatement(String),
}

/// A stored value could not be converted back into its native field type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected}, found {found}")]
pub struct MarshalError {
    pub expected: &'static str,
    pub found: String,
}

impl MarshalError {
    pub fn new(expected: &'static str, found: impl Into<String>) -> Self {
        Self {
            expected,
            found: found.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum OrmError {
    #[error("declaration error: {0}")]
    Declaration(#[from] DeclarationError),

    /// Errors reported by the store, passed through untouched.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("failed to load column {column:?}: {source}")]
    Marshal {
        column: String,
        #[source]
        source: MarshalError,
    },

    #[error("worker error: {0}")]
    Worker(String),
}

impl OrmError {
    pub fn marshal(column: impl Into<String>, source: MarshalError) -> Self {
        OrmError::Marshal {
            column: column.into(),
            source,
        }
    }

    /// The underlying store error code, if this error came from the store.
    pub fn store_error_code(&self) -> Option<rusqlite::ErrorCode> {
        match self {
            OrmError::Store(err) => err.sqlite_error_code(),
            _ => None,
        }
    }

    pub fn is_constraint_violation(&self) -> bool {
        self.store_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation)
    }
}
