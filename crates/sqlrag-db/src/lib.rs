//! sqlrag-db - MySQL schema introspection and statement execution
//!
//! [`MySqlDatabase`] is both the [`SchemaSource`] the indexer reads table
//! metadata from and the [`SqlExecutor`] generated statements run against.
//! Every call opens its own connection and closes it before returning.

mod mysql;

pub use mysql::MySqlDatabase;

pub use sqlrag_core::{SchemaSource, SqlExecutor};
