//! sqlrag-store - Persistent vector index
//!
//! Stores one record per table (vector, schema document, metadata) in a
//! SQLite file and answers similarity queries with cosine similarity.

mod schema;
mod sqlite;

pub use sqlite::{cosine_similarity, SqliteVectorIndex};

// Re-export schema for testing/migrations
pub use schema::SCHEMA;
