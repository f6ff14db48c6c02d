//! The ORM facade: one table spec bound to one connection and one table.

use std::borrow::Borrow;
use std::marker::PhantomData;

use log::{debug, info};
use rusqlite::{params_from_iter, Connection, Rows, Statement};

use crate::error::Result;
use crate::schema::{TableSchema, TableSpec};
use crate::sqlite::{
    ConflictMode, CreateTableOptions, DeleteOperation, IndexDefinition, Query, ReadOperation,
    SqlQuery, UpdateOperation, Value,
};
use crate::statement::{self, TableName};

/// CRUD access to one table whose rows are `T`.
///
/// The facade owns its connection and does no locking of its own; see
/// [`crate::worker::OrmWorker`] for running it on a dedicated thread.
pub struct Orm<T> {
    conn: Connection,
    table: TableName,
    schema: &'static TableSchema,
    _spec: PhantomData<fn() -> T>,
}

impl<T: TableSpec> Orm<T> {
    /// Bind `T` to `table_name` on `conn`.
    ///
    /// Fails with a declaration error if the table name is invalid or the
    /// table spec of `T` does not compile.
    pub fn new(conn: Connection, table_name: &str) -> Result<Self> {
        Self::with_table(conn, TableName::new(table_name)?)
    }

    /// Bind to a table in an attached database.
    pub fn with_schema_name(conn: Connection, schema_name: &str, table_name: &str) -> Result<Self> {
        Self::with_table(conn, TableName::with_schema(schema_name, table_name)?)
    }

    pub fn with_table(conn: Connection, table: TableName) -> Result<Self> {
        let schema = T::table_schema()?;
        Ok(Self {
            conn,
            table,
            schema,
            _spec: PhantomData,
        })
    }

    pub fn table_name(&self) -> &TableName {
        &self.table
    }

    pub fn table_schema(&self) -> &'static TableSchema {
        self.schema
    }

    /// The underlying connection, for statements the facade does not build.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Execute `query` and return the number of changed rows.
    pub fn execute(&self, query: &SqlQuery) -> Result<usize> {
        debug!("execute: {}", query.statement);
        let changed = self
            .conn
            .execute(&query.statement, params_from_iter(query.params.iter()))?;
        Ok(changed)
    }

    pub fn create_table(&self, options: &CreateTableOptions) -> Result<()> {
        let query = statement::create_table(self.schema, &self.table, options)?;
        self.execute(&query)?;
        info!("created table {} ({})", self.table, self.schema.name());
        Ok(())
    }

    pub fn create_index(&self, index: &IndexDefinition) -> Result<()> {
        let query = statement::create_index(self.schema, &self.table, index)?;
        self.execute(&query)?;
        info!("created index {} on {}", index.name, self.table);
        Ok(())
    }

    /// Insert one row, returning the number of rows written (0 when the
    /// conflict mode ignored it).
    pub fn insert_entry(&self, entry: &T, conflict: ConflictMode) -> Result<usize> {
        let query = statement::insert(self.schema, &self.table, conflict, entry.to_values())?;
        self.execute(&query)
    }

    /// Insert every entry inside one transaction.
    ///
    /// Any failure rolls back the whole batch. Must not be called while a
    /// transaction is already open on the connection.
    pub fn insert_entries<I>(&self, entries: I, conflict: ConflictMode) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: Borrow<T>,
    {
        let rows: Vec<Vec<Value>> = entries
            .into_iter()
            .map(|entry| entry.borrow().to_values())
            .collect();
        let batch = statement::insert_batch(self.schema, &self.table, conflict, rows)?;
        debug!("execute batch of {}: {}", batch.rows.len(), batch.statement);

        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&batch.statement)?;
            for row in &batch.rows {
                inserted += stmt.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Prepare a select; iterate it with [`SelectCursor::entries`].
    pub fn select_entries(&self, op: &ReadOperation) -> Result<SelectCursor<'_, T>> {
        let query = statement::select(self.schema, &self.table, op)?;
        debug!("select: {}", query.statement);
        let statement = self.conn.prepare(&query.statement)?;
        Ok(SelectCursor {
            statement,
            params: query.params,
            width: self.schema.columns().len(),
            _spec: PhantomData,
        })
    }

    /// Select and collect every matching entry.
    pub fn select_all(&self, op: &ReadOperation) -> Result<Vec<T>> {
        let mut cursor = self.select_entries(op)?;
        let entries = cursor.entries()?.collect();
        entries
    }

    pub fn count_entries(&self, query: &Query) -> Result<usize> {
        let query = statement::count(self.schema, &self.table, query)?;
        debug!("count: {}", query.statement);
        let count: i64 = self.conn.query_row(
            &query.statement,
            params_from_iter(query.params.iter()),
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Returns the number of updated rows.
    pub fn update_entries(&self, op: &UpdateOperation) -> Result<usize> {
        let query = statement::update(self.schema, &self.table, op)?;
        self.execute(&query)
    }

    /// Returns the number of deleted rows. An empty query deletes all rows.
    pub fn delete_entries(&self, query: &Query) -> Result<usize> {
        let op = DeleteOperation::new(query.clone());
        let query = statement::delete(self.schema, &self.table, &op)?;
        self.execute(&query)
    }

    /// Delete matching rows and return them.
    pub fn delete_entries_returning(&self, query: &Query) -> Result<Vec<T>> {
        let op = DeleteOperation::new(query.clone()).returning();
        let query = statement::delete(self.schema, &self.table, &op)?;
        debug!("delete returning: {}", query.statement);

        // rows stay in place unless every deleted row loads
        let tx = self.conn.unchecked_transaction()?;
        let entries = {
            let mut stmt = tx.prepare(&query.statement)?;
            let rows = stmt.query(params_from_iter(query.params.iter()))?;
            let entries: Vec<T> =
                Entries::<T>::new(rows, self.schema.columns().len()).collect::<Result<_>>()?;
            entries
        };
        tx.commit()?;
        Ok(entries)
    }
}

/// A prepared select bound to the facade's connection.
///
/// Each call to [`entries`](Self::entries) runs the statement again and
/// yields a fresh single-pass iterator.
pub struct SelectCursor<'conn, T> {
    statement: Statement<'conn>,
    params: Vec<Value>,
    width: usize,
    _spec: PhantomData<fn() -> T>,
}

impl<'conn, T: TableSpec> SelectCursor<'conn, T> {
    pub fn entries(&mut self) -> Result<Entries<'_, T>> {
        let rows = self.statement.query(params_from_iter(self.params.iter()))?;
        Ok(Entries::new(rows, self.width))
    }
}

/// Rows of a running query, loaded into `T` one at a time.
pub struct Entries<'stmt, T> {
    rows: Rows<'stmt>,
    width: usize,
    _spec: PhantomData<fn() -> T>,
}

impl<'stmt, T: TableSpec> Entries<'stmt, T> {
    fn new(rows: Rows<'stmt>, width: usize) -> Self {
        Self {
            rows,
            width,
            _spec: PhantomData,
        }
    }
}

impl<T: TableSpec> Iterator for Entries<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.rows.next() {
            Ok(Some(row)) => {
                let values = (0..self.width)
                    .map(|idx| row.get::<_, Value>(idx))
                    .collect::<rusqlite::Result<Vec<_>>>();
                Some(values.map_err(Into::into).and_then(T::from_values))
            }
            Ok(None) => None,
            Err(err) => Some(Err(err.into())),
        }
    }
}
