//! reads and caches column metadata for one table.
//!
//! `PRAGMA table_info` yields one 6-tuple per column:
//! `(cid, name, type, notnull, dflt_value, pk)`.  The positional layout is
//! mapped into a typed `ColumnDescriptor` at this boundary so that magic
//! indices do not escape this module; downstream code consumes named fields
//! only.

use rusqlite::Connection;

/// one table column, as declared.
///
/// Immutable once fetched; a schema change in the underlying table is only
/// picked up by fetching again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    /// the default expression's literal SQL text, if one was declared.
    pub declared_default: Option<String>,
    pub is_primary_key: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("The table {0} was not found in the database.")]
    TableNotFound(String),
    #[error("Error reading table metadata: {0}")]
    Pragma(#[from] rusqlite::Error),
}

/// Fetches the column metadata for `table_name`, in declared column order.
///
/// The table name is trusted input: it is interpolated into the PRAGMA text,
/// so only pass compile-time-known or otherwise validated names.
///
/// Composite primary keys are not modeled: only the first column SQLite flags
/// as part of the primary key keeps `is_primary_key = true`.
pub fn fetch_schema(conn: &Connection, table_name: &str) -> Result<Vec<ColumnDescriptor>, Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table_name))?;
    let mut columns = stmt
        .query_map([], |row| {
            Ok(ColumnDescriptor {
                name: row.get(1)?,
                declared_type: row.get(2)?,
                not_null: row.get::<_, i64>(3)? != 0,
                declared_default: row.get(4)?,
                is_primary_key: row.get::<_, i64>(5)? != 0,
            })
        })?
        .collect::<Result<Vec<ColumnDescriptor>, rusqlite::Error>>()?;
    // An unknown table gives an empty PRAGMA result rather than an error.
    if columns.is_empty() {
        return Err(Error::TableNotFound(String::from(table_name)));
    }
    let mut seen_primary_key = false;
    for column in columns.iter_mut() {
        if column.is_primary_key {
            if seen_primary_key {
                column.is_primary_key = false;
            }
            seen_primary_key = true;
        }
    }
    Ok(columns)
}

#[cfg(test)]
fn conn_with_schema(create_sql: &str) -> Connection {
    let conn = Connection::open_in_memory().expect("Should have opened in-memory db.");
    conn.execute_batch(create_sql)
        .expect("Should have created test table.");
    conn
}

#[test]
fn test_fetch_schema_maps_all_fields() {
    let conn = conn_with_schema(
        "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score REAL DEFAULT 1.5)",
    );
    let cols = fetch_schema(&conn, "t").expect("Should have fetched schema.");
    assert_eq!(
        cols,
        vec![
            ColumnDescriptor {
                name: String::from("id"),
                declared_type: String::from("INTEGER"),
                not_null: false,
                declared_default: None,
                is_primary_key: true,
            },
            ColumnDescriptor {
                name: String::from("name"),
                declared_type: String::from("TEXT"),
                not_null: true,
                declared_default: None,
                is_primary_key: false,
            },
            ColumnDescriptor {
                name: String::from("score"),
                declared_type: String::from("REAL"),
                not_null: false,
                declared_default: Some(String::from("1.5")),
                is_primary_key: false,
            },
        ]
    );
}

#[test]
fn test_fetch_schema_unknown_table() {
    let conn = conn_with_schema("CREATE TABLE t (a INT)");
    match fetch_schema(&conn, "nosuchtable") {
        Err(Error::TableNotFound(name)) => assert_eq!(name, "nosuchtable"),
        other => panic!("Expected TableNotFound, got {:?}", other),
    }
}

#[test]
fn test_fetch_schema_composite_key_keeps_first_only() {
    let conn = conn_with_schema("CREATE TABLE t (a INT, b INT, PRIMARY KEY (a, b))");
    let cols = fetch_schema(&conn, "t").expect("Should have fetched schema.");
    assert!(cols[0].is_primary_key);
    assert!(!cols[1].is_primary_key);
}

#[test]
fn test_fetch_schema_declared_default_null_text() {
    let conn = conn_with_schema("CREATE TABLE t (a TEXT DEFAULT NULL)");
    let cols = fetch_schema(&conn, "t").expect("Should have fetched schema.");
    assert_eq!(cols[0].declared_default, Some(String::from("NULL")));
}
