//! rowfeed: schema-driven row insertion for a single SQLite table.
//!
//! A `TableOperator` is bound to one table of one database.  At construction
//! it reads the table's column metadata (`PRAGMA table_info`) once and caches
//! it; everything else is derived from that snapshot: column name/type/nullity
//! projections, per-column default resolution, and dynamically built
//! parameterized INSERT statements for arbitrary column/value pairs.  Inserts
//! can run immediately (one scoped transaction each) or be buffered and later
//! flushed as a single all-or-nothing transaction.
//!
//! The cache is a snapshot: if the table's schema changes while an operator is
//! alive, the operator is stale and must be rebuilt.
//!
//! Values are always bound as positional parameters.  Table and column names
//! are interpolated into the SQL text and therefore trusted; only pass
//! identifiers you control.

pub mod defaults;
pub mod operator;
pub mod schema;
pub mod statement;

pub use operator::{InsertRequest, TableOperator};
pub use rusqlite::types::Value;
