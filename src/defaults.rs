//! derives a per-column default-value map from the cached schema.
//!
//! Each column is tagged with either its declared default or a marker saying
//! how the column must be treated.  The tag is the instruction the insert
//! strategies in `operator` consume; there is no separate validation layer.

use crate::schema::ColumnDescriptor;

/// the literal text bound for `NotNull`-tagged columns by the default-insert
/// strategies.  This is a placeholder, not a real value; see
/// `TableOperator::insert_row_with_defaults`.
pub const NOT_NULL_MARKER: &str = "NOT NULL";

/// one entry of a default map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    /// the declared default, as its literal SQL text from the schema.
    Literal(String),
    /// no declared default.
    Null,
    /// a declared default whose literal text was the word `NULL`.
    DefaultNull,
    /// the column is NOT NULL and the schema encodes nothing further.
    NotNull,
    /// the primary key column.
    PrimaryKey,
}

/// Tags every column, the primary key included, in declared column order.
///
/// Not-null tagging is applied after primary-key tagging, so a NOT NULL
/// primary key ends up tagged `NotNull`, not `PrimaryKey`.
pub fn full_default_map(columns: &[ColumnDescriptor]) -> Vec<(String, DefaultValue)> {
    columns
        .iter()
        .map(|c| (c.name.clone(), tag_column(c)))
        .collect()
}

/// Same tagging as `full_default_map`, with the primary key column excluded
/// from the map entirely.
pub fn non_primary_key_default_map(columns: &[ColumnDescriptor]) -> Vec<(String, DefaultValue)> {
    columns
        .iter()
        .filter(|c| !c.is_primary_key)
        .map(|c| (c.name.clone(), tag_column(c)))
        .collect()
}

fn tag_column(column: &ColumnDescriptor) -> DefaultValue {
    if column.not_null {
        return DefaultValue::NotNull;
    }
    if column.is_primary_key {
        return DefaultValue::PrimaryKey;
    }
    match &column.declared_default {
        None => DefaultValue::Null,
        Some(text) if text == "NULL" => DefaultValue::DefaultNull,
        Some(text) => DefaultValue::Literal(text.clone()),
    }
}

#[cfg(test)]
fn descriptor(
    name: &str,
    not_null: bool,
    declared_default: Option<&str>,
    is_primary_key: bool,
) -> ColumnDescriptor {
    ColumnDescriptor {
        name: String::from(name),
        declared_type: String::from("TEXT"),
        not_null,
        declared_default: declared_default.map(String::from),
        is_primary_key,
    }
}

#[test]
fn test_full_default_map_tags() {
    let columns = vec![
        descriptor("id", false, None, true),
        descriptor("name", true, None, false),
        descriptor("age", false, None, false),
        descriptor("note", false, Some("NULL"), false),
        descriptor("kind", false, Some("'widget'"), false),
    ];
    assert_eq!(
        full_default_map(&columns),
        vec![
            (String::from("id"), DefaultValue::PrimaryKey),
            (String::from("name"), DefaultValue::NotNull),
            (String::from("age"), DefaultValue::Null),
            (String::from("note"), DefaultValue::DefaultNull),
            (String::from("kind"), DefaultValue::Literal(String::from("'widget'"))),
        ]
    );
}

#[test]
fn test_not_null_wins_over_primary_key() {
    let columns = vec![descriptor("id", true, None, true)];
    assert_eq!(
        full_default_map(&columns),
        vec![(String::from("id"), DefaultValue::NotNull)]
    );
}

#[test]
fn test_non_primary_key_map_excludes_key() {
    let columns = vec![
        descriptor("id", false, None, true),
        descriptor("age", false, None, false),
    ];
    assert_eq!(
        non_primary_key_default_map(&columns),
        vec![(String::from("age"), DefaultValue::Null)]
    );
}

#[test]
fn test_declared_null_text_is_retagged() {
    // A declared default of literally `NULL` is distinct from no default.
    let columns = vec![
        descriptor("a", false, Some("NULL"), false),
        descriptor("b", false, None, false),
    ];
    let map = full_default_map(&columns);
    assert_eq!(map[0].1, DefaultValue::DefaultNull);
    assert_eq!(map[1].1, DefaultValue::Null);
}
