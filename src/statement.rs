//! builds parameterized INSERT statements.

use itertools::Itertools;

/// Builds `INSERT INTO <table> (<cols>) VALUES (?, ?, ...)` with one
/// positional placeholder per column.
///
/// Values are never interpolated into the text; they are bound as parameters
/// by the caller.  The table and column identifiers are interpolated and
/// therefore trusted (see crate docs).
pub fn build_insert<S: AsRef<str>>(table_name: &str, column_names: &[S]) -> String {
    let columns = column_names.iter().map(|c| c.as_ref()).join(", ");
    let placeholders = itertools::repeat_n("?", column_names.len()).join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table_name, columns, placeholders
    )
}

#[test]
fn test_build_insert_single_column() {
    assert_eq!(
        build_insert("t", &["a"]),
        "INSERT INTO t (a) VALUES (?)"
    );
}

#[test]
fn test_build_insert_multiple_columns() {
    assert_eq!(
        build_insert("inventory", &["id", "name", "qty"]),
        "INSERT INTO inventory (id, name, qty) VALUES (?, ?, ?)"
    );
}
