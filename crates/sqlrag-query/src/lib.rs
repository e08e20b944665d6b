//! sqlrag-query - Schema indexing and text-to-SQL orchestration
//!
//! This crate wires the capability traits from `sqlrag-core` into the two
//! pipelines: rebuilding the schema index and answering a question.
//!
//! # Features
//!
//! - Drop-and-rebuild indexing, one record per table
//! - Retrieval of the most similar schema documents
//! - SQL synthesis, read-only guarding and execution
//! - Answer synthesis with empty-result and execution-error short circuits
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlrag_query::{QueryEngine, QueryOptions};
//! use std::sync::Arc;
//!
//! let engine = QueryEngine::new(embedder, generator, index, database, QueryOptions::default());
//! let session = engine.ask("Show me the 3 most recent orders").await?;
//! println!("{}", session.sql);
//! ```

mod engine;
mod guard;
mod indexer;

#[cfg(test)]
mod testing;

pub use engine::{QueryEngine, QueryOptions, QueryOutcome, QuerySession, SessionState};
pub use guard::{check_read_only, GuardError};
pub use indexer::{IndexReport, SchemaIndexer};

// Re-export for convenience
pub use sqlrag_core::{Retrieval, RetrievedSchema};
