//! sqlrag-core - Core types and traits for the text-to-SQL pipeline
//!
//! This crate provides the schema model and its canonical text rendering,
//! the prompt templates, the capability traits implemented by the storage,
//! model, and database crates, plus configuration and error handling.

pub mod config;
pub mod error;
pub mod prompt;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{Result, SqlRagError};
pub use prompt::{strip_code_fences, AnswerPrompt, SqlPrompt};
pub use traits::*;
pub use types::*;
