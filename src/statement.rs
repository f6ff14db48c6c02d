//! SQL statement generation.
//!
//! Every function here is pure: it takes a [`TableSchema`], a [`TableName`]
//! and per-call parameters, and returns statement text with `?`
//! placeholders plus the values to bind. Identifiers are validated and
//! double-quoted before they are written into the text; values never are.

use std::fmt;

use crate::error::DeclarationError;
use crate::schema::{ColumnDefinition, TableSchema};
use crate::sqlite::{
    ConflictMode, CreateTableOptions, DeleteOperation, IndexDefinition, Query, QueryOperator,
    ReadOperation, SqlBatch, SqlQuery, UpdateOperation, Value,
};

type BuildResult<T> = std::result::Result<T, DeclarationError>;

/// Accepts `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_identifier(name: &str) -> BuildResult<()> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(DeclarationError::InvalidIdentifier(name.to_string()))
    }
}

/// Double-quote a validated identifier, so keywords such as `order` are
/// usable as names.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{name}\"")
}

/// A table name, optionally qualified with the schema of an attached database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    schema: Option<String>,
    name: String,
}

impl TableName {
    pub fn new(name: &str) -> BuildResult<Self> {
        validate_identifier(name)?;
        Ok(Self {
            schema: None,
            name: name.to_string(),
        })
    }

    pub fn with_schema(schema: &str, name: &str) -> BuildResult<Self> {
        validate_identifier(schema)?;
        validate_identifier(name)?;
        Ok(Self {
            schema: Some(schema.to_string()),
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// `"<schema>"."<object>"` for an object living next to this table.
    fn qualify(&self, object: &str) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_identifier(schema), quote_identifier(object)),
            None => quote_identifier(object),
        }
    }

    /// The quoted, possibly schema-qualified name used in statements.
    pub fn sql(&self) -> String {
        self.qualify(&self.name)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Join non-empty clauses with single spaces and terminate with `;`.
fn gen_stmt(clauses: &[&str]) -> String {
    let parts: Vec<&str> = clauses
        .iter()
        .copied()
        .filter(|clause| !clause.is_empty())
        .collect();
    format!("{};", parts.join(" "))
}

fn where_clause(schema: &TableSchema, query: &Query, params: &mut Vec<Value>) -> BuildResult<String> {
    if query.is_empty() {
        return Ok(String::new());
    }
    let mut predicates = Vec::with_capacity(query.conditions.len());
    for (name, op) in &query.conditions {
        schema.check_column(name)?;
        let column = quote_identifier(name);
        let column = column.as_str();
        let predicate = match op {
            QueryOperator::Equal(value) => binary(column, "=", value, params),
            QueryOperator::NotEqual(value) => binary(column, "!=", value, params),
            QueryOperator::GreaterThan(value) => binary(column, ">", value, params),
            QueryOperator::GreaterThanOrEqual(value) => binary(column, ">=", value, params),
            QueryOperator::LessThan(value) => binary(column, "<", value, params),
            QueryOperator::LessThanOrEqual(value) => binary(column, "<=", value, params),
            QueryOperator::Like(pattern) => {
                params.push(Value::Text(pattern.clone()));
                format!("{column} LIKE ?")
            }
            QueryOperator::In(values) => {
                if values.is_empty() {
                    return Err(DeclarationError::InvalidStatement(format!(
                        "IN condition on {name} needs at least one value"
                    )));
                }
                params.extend(values.iter().cloned());
                let placeholders = vec!["?"; values.len()].join(", ");
                format!("{column} IN ({placeholders})")
            }
            QueryOperator::IsNull => format!("{column} IS NULL"),
            QueryOperator::IsNotNull => format!("{column} IS NOT NULL"),
        };
        predicates.push(predicate);
    }
    Ok(format!("WHERE {}", predicates.join(" AND ")))
}

fn binary(column: &str, op: &str, value: &Value, params: &mut Vec<Value>) -> String {
    params.push(value.clone());
    format!("{column} {op} ?")
}

fn check_columns<'a, I>(schema: &TableSchema, columns: I) -> BuildResult<()>
where
    I: IntoIterator<Item = &'a str>,
{
    columns
        .into_iter()
        .try_for_each(|column| schema.check_column(column))
}

/// `CREATE [TEMPORARY] TABLE [IF NOT EXISTS] <name> (<col-defs>) [STRICT][, WITHOUT ROWID];`
///
/// Table options are taken from the schema declaration or the call options.
pub fn create_table(
    schema: &TableSchema,
    table: &TableName,
    options: &CreateTableOptions,
) -> BuildResult<SqlQuery> {
    let mut table_options = Vec::new();
    if options.strict || schema.strict() {
        table_options.push("STRICT");
    }
    if options.without_rowid || schema.without_rowid() {
        table_options.push("WITHOUT ROWID");
    }

    let statement = gen_stmt(&[
        "CREATE",
        if options.temporary { "TEMPORARY" } else { "" },
        "TABLE",
        if options.allow_existed { "IF NOT EXISTS" } else { "" },
        table.sql().as_str(),
        format!("({})", schema.columns_sql()).as_str(),
        table_options.join(", ").as_str(),
    ]);
    Ok(SqlQuery::new(statement))
}

/// `CREATE [UNIQUE] INDEX [IF NOT EXISTS] <index> ON <table> (<keys>);`
pub fn create_index(
    schema: &TableSchema,
    table: &TableName,
    index: &IndexDefinition,
) -> BuildResult<SqlQuery> {
    validate_identifier(&index.name)?;
    if index.columns.is_empty() {
        return Err(DeclarationError::InvalidStatement(
            "at least one column should be specified for an index".to_string(),
        ));
    }
    let mut keys = Vec::with_capacity(index.columns.len());
    for (column, direction) in &index.columns {
        schema.check_column(column)?;
        let key = quote_identifier(column);
        keys.push(match direction {
            Some(direction) => format!("{key} {}", direction.as_sql()),
            None => key,
        });
    }

    // the schema prefix goes on the index name, the indexed table stays bare
    let statement = gen_stmt(&[
        "CREATE",
        if index.unique { "UNIQUE" } else { "" },
        "INDEX",
        if index.allow_existed { "IF NOT EXISTS" } else { "" },
        table.qualify(&index.name).as_str(),
        "ON",
        quote_identifier(table.name()).as_str(),
        format!("({})", keys.join(", ")).as_str(),
    ]);
    Ok(SqlQuery::new(statement))
}

fn insert_statement(schema: &TableSchema, table: &TableName, conflict: ConflictMode) -> String {
    let placeholders = vec!["?"; schema.columns().len()].join(", ");
    gen_stmt(&[
        "INSERT",
        conflict.as_sql().map(|mode| format!("OR {mode}")).unwrap_or_default().as_str(),
        "INTO",
        table.sql().as_str(),
        format!("({})", schema.column_list_sql()).as_str(),
        format!("VALUES ({placeholders})").as_str(),
    ])
}

fn check_row(schema: &TableSchema, row: &[Value]) -> BuildResult<()> {
    let expected = schema.columns().len();
    if row.len() != expected {
        return Err(DeclarationError::InvalidStatement(format!(
            "row has {} values, table {} has {expected} columns",
            row.len(),
            schema.name()
        )));
    }
    schema
        .columns()
        .iter()
        .zip(row)
        .try_for_each(|(column, value)| check_value(column, value))
}

/// Reject values the column cannot hold: undeclared literals, and NaN,
/// which the store silently turns into NULL.
fn check_value(column: &ColumnDefinition, value: &Value) -> BuildResult<()> {
    if matches!(value, Value::Real(v) if v.is_nan()) {
        return Err(DeclarationError::InvalidStatement(format!(
            "NaN cannot be stored in column {}",
            column.name
        )));
    }
    column
        .check_value(value)
        .map_err(|err| DeclarationError::LiteralViolation {
            column: column.name.clone(),
            found: err.found,
        })
}

/// `INSERT [OR <MODE>] INTO <table> (<cols>) VALUES (<placeholders>);` for one row.
pub fn insert(
    schema: &TableSchema,
    table: &TableName,
    conflict: ConflictMode,
    row: Vec<Value>,
) -> BuildResult<SqlQuery> {
    check_row(schema, &row)?;
    Ok(SqlQuery::new(insert_statement(schema, table, conflict)).with_params(row))
}

/// The insert statement with one parameter set per row.
pub fn insert_batch(
    schema: &TableSchema,
    table: &TableName,
    conflict: ConflictMode,
    rows: Vec<Vec<Value>>,
) -> BuildResult<SqlBatch> {
    for row in &rows {
        check_row(schema, row)?;
    }
    Ok(SqlBatch {
        statement: insert_statement(schema, table, conflict),
        rows,
    })
}

/// `SELECT [DISTINCT] <cols> FROM <table> [WHERE ...] [ORDER BY ...] [LIMIT ? [OFFSET ?]];`
pub fn select(schema: &TableSchema, table: &TableName, op: &ReadOperation) -> BuildResult<SqlQuery> {
    let mut params = Vec::new();
    let where_stmt = where_clause(schema, &op.query, &mut params)?;

    check_columns(schema, op.order_by.iter().map(|(column, _)| column.as_str()))?;
    let order_by_stmt = if op.order_by.is_empty() {
        String::new()
    } else {
        let keys: Vec<String> = op
            .order_by
            .iter()
            .map(|(column, direction)| {
                format!("{} {}", quote_identifier(column), direction.as_sql())
            })
            .collect();
        format!("ORDER BY {}", keys.join(", "))
    };

    let limit_stmt = match (op.limit, op.offset) {
        (None, None) => String::new(),
        (Some(limit), None) => {
            params.push(Value::Integer(to_sql_int(limit)?));
            "LIMIT ?".to_string()
        }
        (limit, Some(offset)) => {
            // OFFSET is only valid after LIMIT; -1 means no limit
            let limit = match limit {
                Some(limit) => to_sql_int(limit)?,
                None => -1,
            };
            params.push(Value::Integer(limit));
            params.push(Value::Integer(to_sql_int(offset)?));
            "LIMIT ? OFFSET ?".to_string()
        }
    };

    let statement = gen_stmt(&[
        "SELECT",
        if op.distinct { "DISTINCT" } else { "" },
        schema.column_list_sql().as_str(),
        "FROM",
        table.sql().as_str(),
        where_stmt.as_str(),
        order_by_stmt.as_str(),
        limit_stmt.as_str(),
    ]);
    Ok(SqlQuery::new(statement).with_params(params))
}

fn to_sql_int(value: u64) -> BuildResult<i64> {
    i64::try_from(value)
        .map_err(|_| DeclarationError::InvalidStatement(format!("{value} exceeds the integer range")))
}

/// `SELECT count(*) FROM <table> [WHERE ...];`
pub fn count(schema: &TableSchema, table: &TableName, query: &Query) -> BuildResult<SqlQuery> {
    let mut params = Vec::new();
    let where_stmt = where_clause(schema, query, &mut params)?;
    let statement = gen_stmt(&[
        "SELECT count(*) FROM",
        table.sql().as_str(),
        where_stmt.as_str(),
    ]);
    Ok(SqlQuery::new(statement).with_params(params))
}

/// `UPDATE <table> SET <col> = ?, ... [WHERE ...];`
pub fn update(schema: &TableSchema, table: &TableName, op: &UpdateOperation) -> BuildResult<SqlQuery> {
    if op.updates.is_empty() {
        return Err(DeclarationError::InvalidStatement(
            "update needs at least one column to set".to_string(),
        ));
    }
    let mut params = Vec::with_capacity(op.updates.len());
    let mut assignments = Vec::with_capacity(op.updates.len());
    for (name, value) in &op.updates {
        let column = schema.column(name).ok_or_else(|| DeclarationError::UnknownColumn {
            table: schema.name().to_string(),
            column: name.clone(),
        })?;
        check_value(column, value)?;
        assignments.push(format!("{} = ?", quote_identifier(name)));
        params.push(value.clone());
    }
    let where_stmt = where_clause(schema, &op.query, &mut params)?;

    let statement = gen_stmt(&[
        "UPDATE",
        table.sql().as_str(),
        format!("SET {}", assignments.join(", ")).as_str(),
        where_stmt.as_str(),
    ]);
    Ok(SqlQuery::new(statement).with_params(params))
}

/// `DELETE FROM <table> [WHERE ...] [RETURNING <cols>];`
///
/// An empty filter deletes every row.
pub fn delete(schema: &TableSchema, table: &TableName, op: &DeleteOperation) -> BuildResult<SqlQuery> {
    let mut params = Vec::new();
    let where_stmt = where_clause(schema, &op.query, &mut params)?;
    let returning_stmt = if op.returning {
        format!("RETURNING {}", schema.column_list_sql())
    } else {
        String::new()
    };
    let statement = gen_stmt(&[
        "DELETE FROM",
        table.sql().as_str(),
        where_stmt.as_str(),
        returning_stmt.as_str(),
    ]);
    Ok(SqlQuery::new(statement).with_params(params))
}
