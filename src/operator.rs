//! the table operator: one connection, one table, schema cached once.
//!
//! All writes go through dynamically built parameterized INSERTs.  Every
//! transactional method owns its whole transaction boundary: the transaction
//! commits on success and rolls back on any error exit (dropping an
//! uncommitted `rusqlite::Transaction` rolls it back), so a failure leaves
//! both the table and the insert buffer in their pre-call state.
//!
//! One operator supports one caller at a time; the schema cache and the
//! insert buffer are unsynchronized state, so concurrent users must
//! serialize externally.

use std::collections::HashMap;
use std::path::Path;

use log::{debug, info};
use rusqlite::{params_from_iter, types::Value, Connection};

use crate::defaults::{self, DefaultValue, NOT_NULL_MARKER};
use crate::schema::{self, ColumnDescriptor};
use crate::statement;

pub struct TableOperator {
    conn: Connection,
    table_name: String,
    columns: Vec<ColumnDescriptor>,
    buffer: Vec<InsertRequest>,
}

/// one pending insert, held in the buffer until flushed.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRequest {
    pub column_names: Vec<String>,
    pub values: Vec<Value>,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] schema::Error),
    #[error("{columns} column names but {values} values.")]
    ArityMismatch { columns: usize, values: usize },
    #[error("No columns to insert.")]
    EmptyColumnSet,
    #[error("Statement rejected: {0}")]
    Statement(#[from] rusqlite::Error),
    #[error("Connection error: {0}")]
    Connection(rusqlite::Error),
}

fn check_arity(columns: usize, values: usize) -> Result<(), Error> {
    if columns != values {
        return Err(Error::ArityMismatch { columns, values });
    }
    Ok(())
}

impl TableOperator {
    /// Opens (or creates) the database file at `db_path` and binds to
    /// `table_name`, fetching the table's schema once.
    pub fn open<P: AsRef<Path>>(db_path: P, table_name: &str) -> Result<TableOperator, Error> {
        let conn = Connection::open(db_path).map_err(Error::Connection)?;
        Self::from_connection(conn, table_name)
    }

    /// Binds to `table_name` over an already-open connection.  Fails with a
    /// schema error if the table does not exist.
    pub fn from_connection(conn: Connection, table_name: &str) -> Result<TableOperator, Error> {
        let columns = schema::fetch_schema(&conn, table_name)?;
        Ok(TableOperator {
            conn,
            table_name: String::from(table_name),
            columns,
            buffer: vec![],
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// the cached column descriptors, in declared order.
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// the underlying connection, for reads this operator does not cover.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_types(&self) -> HashMap<String, String> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.declared_type.clone()))
            .collect()
    }

    pub fn not_null_flags(&self) -> HashMap<String, bool> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.not_null))
            .collect()
    }

    /// names of the NOT NULL columns, in declared order.
    pub fn not_null_column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.not_null)
            .map(|c| c.name.clone())
            .collect()
    }

    /// The primary key column name, or `None` if the table has none.
    /// Only a single-column primary key is recognized (see `schema`).
    pub fn primary_key(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.is_primary_key)
            .map(|c| c.name.as_str())
    }

    /// the resolved default map over every column.  See `defaults`.
    pub fn full_default_map(&self) -> Vec<(String, DefaultValue)> {
        defaults::full_default_map(&self.columns)
    }

    /// the resolved default map with the primary key column excluded.
    pub fn non_primary_key_default_map(&self) -> Vec<(String, DefaultValue)> {
        defaults::non_primary_key_default_map(&self.columns)
    }

    /// Inserts one row inside its own transaction.
    pub fn insert_row<S: AsRef<str>>(
        &mut self,
        column_names: &[S],
        values: &[Value],
    ) -> Result<usize, Error> {
        check_arity(column_names.len(), values.len())?;
        let sql = statement::build_insert(&self.table_name, column_names);
        let tx = self.conn.transaction()?;
        let affected = tx.execute(&sql, params_from_iter(values.iter()))?;
        tx.commit()?;
        Ok(affected)
    }

    /// Inserts many rows as one batch: the statement is prepared once and
    /// executed per value-tuple inside one transaction.  Either every row
    /// commits or none do.
    pub fn insert_rows<S: AsRef<str>>(
        &mut self,
        column_names: &[S],
        rows: &[Vec<Value>],
    ) -> Result<usize, Error> {
        for row in rows {
            check_arity(column_names.len(), row.len())?;
        }
        let sql = statement::build_insert(&self.table_name, column_names);
        let tx = self.conn.transaction()?;
        let mut affected = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                affected += stmt.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
        Ok(affected)
    }

    /// Inserts one row built from the defaults of every non-primary-key
    /// column: `Null`/`DefaultNull` tags bind an explicit SQL null, and a
    /// declared default's literal text is bound as-is (SQLite's type affinity
    /// coerces it).
    ///
    /// Columns tagged `NotNull` bind the literal text `"NOT NULL"`.  That is
    /// a placeholder, not a usable value: the schema gives us nothing better,
    /// and callers who need a real value there must insert it themselves.
    pub fn insert_row_with_defaults(&mut self) -> Result<usize, Error> {
        let map = self.non_primary_key_default_map();
        let mut names = Vec::with_capacity(map.len());
        let mut values = Vec::with_capacity(map.len());
        for (name, default) in map {
            let value = match default {
                DefaultValue::Literal(text) => Value::Text(text),
                DefaultValue::Null | DefaultValue::DefaultNull => Value::Null,
                DefaultValue::NotNull => Value::Text(String::from(NOT_NULL_MARKER)),
                // the non-primary-key map never contains this tag.
                DefaultValue::PrimaryKey => continue,
            };
            names.push(name);
            values.push(value);
        }
        if names.is_empty() {
            return Err(Error::EmptyColumnSet);
        }
        self.insert_row(&names, &values)
    }

    /// Inserts one row covering only the NOT NULL columns, every value the
    /// literal text `"NOT NULL"`.  Declared defaults are ignored.  The same
    /// placeholder caveat as `insert_row_with_defaults` applies.
    pub fn insert_row_not_null_markers(&mut self) -> Result<usize, Error> {
        let names = self.not_null_column_names();
        if names.is_empty() {
            return Err(Error::EmptyColumnSet);
        }
        let values: Vec<Value> = names
            .iter()
            .map(|_| Value::Text(String::from(NOT_NULL_MARKER)))
            .collect();
        self.insert_row(&names, &values)
    }

    /// Queues an insert without touching the database.
    pub fn buffer_insert<S: AsRef<str>>(
        &mut self,
        column_names: &[S],
        values: &[Value],
    ) -> Result<(), Error> {
        check_arity(column_names.len(), values.len())?;
        self.buffer.push(InsertRequest {
            column_names: column_names
                .iter()
                .map(|s| String::from(s.as_ref()))
                .collect(),
            values: values.to_vec(),
        });
        Ok(())
    }

    /// the pending requests, in insertion order.
    pub fn buffered(&self) -> &[InsertRequest] {
        &self.buffer
    }

    /// Executes every buffered request in insertion order inside one
    /// transaction and returns the total rows affected.  Flushing an empty
    /// buffer is a no-op.
    ///
    /// The buffer is iterated by reference and cleared only after the commit
    /// succeeds.  If any request fails, the transaction drops (rolling back)
    /// and the buffer is left exactly as it was, so the caller can inspect,
    /// fix, and retry.
    pub fn flush_buffered(&mut self) -> Result<usize, Error> {
        if self.buffer.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut affected = 0;
        for request in self.buffer.iter() {
            let sql = statement::build_insert(&self.table_name, &request.column_names);
            affected += tx.execute(&sql, params_from_iter(request.values.iter()))?;
        }
        tx.commit()?;
        debug!(
            "flushed {} buffered inserts into {}",
            self.buffer.len(),
            self.table_name
        );
        self.buffer.clear();
        Ok(affected)
    }

    /// Deletes every row and vacuums.  Delegates wholly to SQLite.
    pub fn clear_table(&self) -> Result<(), Error> {
        info!("clearing table {}", self.table_name);
        self.conn
            .execute_batch(&format!("DELETE FROM {};VACUUM;", self.table_name))?;
        Ok(())
    }

    /// Closes the connection, consuming the operator.
    pub fn close(self) -> Result<(), Error> {
        self.conn.close().map_err(|(_, e)| Error::Connection(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operator(create_sql: &str, table_name: &str) -> TableOperator {
        let conn = Connection::open_in_memory().expect("Should have opened in-memory db.");
        conn.execute_batch(create_sql)
            .expect("Should have created test table.");
        TableOperator::from_connection(conn, table_name)
            .expect("Should have constructed the operator.")
    }

    fn row_count(op: &TableOperator) -> i64 {
        op.connection()
            .query_row(&format!("SELECT COUNT(*) FROM {}", op.table_name()), [], |r| {
                r.get(0)
            })
            .expect("Should have counted rows.")
    }

    fn people_operator() -> TableOperator {
        operator(
            "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER)",
            "people",
        )
    }

    #[test]
    fn test_metadata_accessors() {
        let op = people_operator();
        assert_eq!(op.column_names(), vec!["id", "name", "age"]);
        assert_eq!(op.column_types()["name"], "TEXT");
        assert_eq!(op.not_null_flags()["name"], true);
        assert_eq!(op.not_null_flags()["age"], false);
        assert_eq!(op.not_null_column_names(), vec!["name"]);
        assert_eq!(op.primary_key(), Some("id"));
    }

    #[test]
    fn test_primary_key_absent() {
        let op = operator("CREATE TABLE bare (a INT, b TEXT)", "bare");
        assert_eq!(op.primary_key(), None);
    }

    #[test]
    fn test_insert_row() {
        let mut op = people_operator();
        let n = op
            .insert_row(
                &["id", "name"],
                &[Value::Integer(1), Value::Text(String::from("ada"))],
            )
            .expect("Should have inserted.");
        assert_eq!(n, 1);
        assert_eq!(row_count(&op), 1);
    }

    #[test]
    fn test_insert_row_arity_mismatch() {
        let mut op = people_operator();
        match op.insert_row(&["id", "name"], &[Value::Integer(1)]) {
            Err(Error::ArityMismatch { columns: 2, values: 1 }) => (),
            other => panic!("Expected ArityMismatch, got {:?}", other),
        }
        assert_eq!(row_count(&op), 0);
    }

    #[test]
    fn test_insert_rows_all_or_nothing() {
        let mut op = people_operator();
        // The third tuple nulls a NOT NULL column, so the whole batch must
        // roll back.
        let result = op.insert_rows(
            &["id", "name"],
            &[
                vec![Value::Integer(1), Value::Text(String::from("a"))],
                vec![Value::Integer(2), Value::Text(String::from("b"))],
                vec![Value::Integer(3), Value::Null],
            ],
        );
        match result {
            Err(Error::Statement(_)) => (),
            other => panic!("Expected Statement error, got {:?}", other),
        }
        assert_eq!(row_count(&op), 0);
    }

    #[test]
    fn test_insert_rows_commits_all() {
        let mut op = people_operator();
        let n = op
            .insert_rows(
                &["id", "name"],
                &[
                    vec![Value::Integer(1), Value::Text(String::from("a"))],
                    vec![Value::Integer(2), Value::Text(String::from("b"))],
                ],
            )
            .expect("Should have inserted the batch.");
        assert_eq!(n, 2);
        assert_eq!(row_count(&op), 2);
    }

    #[test]
    fn test_flush_buffered_then_empty_flush() {
        let mut op = people_operator();
        op.buffer_insert(
            &["id", "name"],
            &[Value::Integer(1), Value::Text(String::from("a"))],
        )
        .expect("Should have buffered.");
        op.buffer_insert(
            &["id", "name"],
            &[Value::Integer(2), Value::Text(String::from("b"))],
        )
        .expect("Should have buffered.");
        assert_eq!(op.buffered().len(), 2);

        let n = op.flush_buffered().expect("Should have flushed.");
        assert_eq!(n, 2);
        assert_eq!(row_count(&op), 2);
        assert!(op.buffered().is_empty());

        // Second flush is a no-op on the now-empty buffer.
        let n = op.flush_buffered().expect("Should have flushed nothing.");
        assert_eq!(n, 0);
        assert_eq!(row_count(&op), 2);
    }

    #[test]
    fn test_failed_flush_preserves_buffer() {
        let mut op = people_operator();
        let requests = [
            (1, Value::Text(String::from("a"))),
            (2, Value::Text(String::from("b"))),
            (3, Value::Null), // violates name NOT NULL
        ];
        for (id, name) in requests {
            op.buffer_insert(&["id", "name"], &[Value::Integer(id), name])
                .expect("Should have buffered.");
        }

        match op.flush_buffered() {
            Err(Error::Statement(_)) => (),
            other => panic!("Expected Statement error, got {:?}", other),
        }
        // Nothing committed, nothing dropped, order preserved.
        assert_eq!(row_count(&op), 0);
        assert_eq!(op.buffered().len(), 3);
        assert_eq!(op.buffered()[0].values[0], Value::Integer(1));
        assert_eq!(op.buffered()[2].values[1], Value::Null);
    }

    #[test]
    fn test_buffer_insert_arity_mismatch() {
        let mut op = people_operator();
        assert!(matches!(
            op.buffer_insert(&["id"], &[Value::Integer(1), Value::Integer(2)]),
            Err(Error::ArityMismatch { .. })
        ));
        assert!(op.buffered().is_empty());
    }

    #[test]
    fn test_insert_row_with_defaults() {
        let mut op = people_operator();
        op.insert_row_with_defaults()
            .expect("Should have inserted the defaults row.");
        let (name, age): (String, Option<i64>) = op
            .connection()
            .query_row("SELECT name, age FROM people", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .expect("Should have read the row back.");
        // name is NOT NULL with no default, so it gets the placeholder text;
        // age has no default, so it gets an explicit null.
        assert_eq!(name, NOT_NULL_MARKER);
        assert_eq!(age, None);
    }

    #[test]
    fn test_insert_row_with_defaults_uses_declared_default() {
        let mut op = operator(
            "CREATE TABLE w (id INTEGER PRIMARY KEY, qty INTEGER DEFAULT 7)",
            "w",
        );
        op.insert_row_with_defaults()
            .expect("Should have inserted the defaults row.");
        let qty: i64 = op
            .connection()
            .query_row("SELECT qty FROM w", [], |r| r.get(0))
            .expect("Should have read the row back.");
        // The declared default text "7" is bound and coerced by affinity.
        assert_eq!(qty, 7);
    }

    #[test]
    fn test_insert_row_with_defaults_empty_column_set() {
        let mut op = operator("CREATE TABLE only_key (id INTEGER PRIMARY KEY)", "only_key");
        assert!(matches!(
            op.insert_row_with_defaults(),
            Err(Error::EmptyColumnSet)
        ));
    }

    #[test]
    fn test_insert_row_not_null_markers() {
        let mut op = people_operator();
        op.insert_row_not_null_markers()
            .expect("Should have inserted the marker row.");
        let name: String = op
            .connection()
            .query_row("SELECT name FROM people", [], |r| r.get(0))
            .expect("Should have read the row back.");
        assert_eq!(name, NOT_NULL_MARKER);
    }

    #[test]
    fn test_insert_row_not_null_markers_empty_column_set() {
        let mut op = operator("CREATE TABLE loose (a TEXT, b TEXT)", "loose");
        assert!(matches!(
            op.insert_row_not_null_markers(),
            Err(Error::EmptyColumnSet)
        ));
    }

    #[test]
    fn test_clear_table() {
        let mut op = people_operator();
        op.insert_row(
            &["id", "name"],
            &[Value::Integer(1), Value::Text(String::from("a"))],
        )
        .expect("Should have inserted.");
        op.clear_table().expect("Should have cleared the table.");
        assert_eq!(row_count(&op), 0);
    }

    #[test]
    fn test_unknown_column_is_a_statement_error() {
        let mut op = people_operator();
        match op.insert_row(&["nosuchcolumn"], &[Value::Integer(1)]) {
            Err(Error::Statement(_)) => (),
            other => panic!("Expected Statement error, got {:?}", other),
        }
    }
}
