// Small demo of the operator against a throwaway in-memory database.
use anyhow::Result;
use rowfeed::{TableOperator, Value};

fn main() -> Result<()> {
    env_logger::init();

    let conn = rusqlite::Connection::open_in_memory()?;
    conn.execute_batch(
        "CREATE TABLE inventory (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            qty INTEGER DEFAULT 0,
            note TEXT
        )",
    )?;

    let mut op = TableOperator::from_connection(conn, "inventory")?;
    println!("columns: {:?}", op.column_names());
    println!("primary key: {:?}", op.primary_key());
    println!("defaults: {:?}", op.full_default_map());

    op.insert_row(
        &["id", "name"],
        &[Value::Integer(1), Value::Text(String::from("widget"))],
    )?;

    op.buffer_insert(
        &["id", "name", "qty"],
        &[
            Value::Integer(2),
            Value::Text(String::from("sprocket")),
            Value::Integer(12),
        ],
    )?;
    op.buffer_insert(
        &["id", "name"],
        &[Value::Integer(3), Value::Text(String::from("gear"))],
    )?;
    let flushed = op.flush_buffered()?;
    println!("flushed {} buffered rows", flushed);

    let total: i64 = op
        .connection()
        .query_row("SELECT COUNT(*) FROM inventory", [], |r| r.get(0))?;
    println!("{} rows in inventory", total);

    op.close()?;
    Ok(())
}
