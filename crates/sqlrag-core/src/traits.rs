//! Core traits defining the interfaces between components.

use async_trait::async_trait;

use crate::error::Result;
use crate::prompt::{strip_code_fences, AnswerPrompt, SqlPrompt};
use crate::types::{EmbeddingRecord, Execution, IndexHit, IndexStats, TableSchema};

/// Relational metadata source.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// All table names, in the order the source reports them.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Columns and foreign keys of one table.
    async fn describe_table(&self, table: &str) -> Result<TableSchema>;
}

/// Runs generated statements.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Execute one statement verbatim.
    ///
    /// A statement the database rejects is `Ok(Execution::Failed)`. `Err` is
    /// reserved for not being able to reach the database at all.
    async fn execute(&self, sql: &str) -> Result<Execution>;
}

/// Embedding model.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier. Indexing and querying must use the same one.
    fn model(&self) -> &str;

    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Text generation capability.
///
/// Providers implement [`TextGenerator::chat`]; the two named operations have
/// default bodies built on it and may be overridden independently.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Model identifier.
    fn model(&self) -> &str;

    /// Single-turn request with one user message.
    async fn chat(&self, prompt: &str) -> Result<String>;

    /// Synthesize one SQL statement. Code fences and surrounding whitespace
    /// are removed from the response.
    async fn generate_sql(&self, prompt: &SqlPrompt) -> Result<String> {
        let response = self.chat(&prompt.render()).await?;
        Ok(strip_code_fences(&response))
    }

    /// Turn executed results into a natural-language answer.
    async fn synthesize_answer(&self, prompt: &AnswerPrompt) -> Result<String> {
        self.chat(&prompt.render()).await
    }
}

/// Persistent vector index holding one record per table.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection if it does not exist.
    async fn ensure_collection(&self) -> Result<()>;

    /// Delete the collection and its records.
    ///
    /// Returns `CollectionNotFound` when there is nothing to delete.
    async fn drop_collection(&self) -> Result<()>;

    /// Insert a record, replacing any record with the same id.
    async fn upsert(&self, record: EmbeddingRecord) -> Result<()>;

    /// Up to `top_n` records, most similar first.
    async fn query(&self, vector: &[f32], top_n: usize) -> Result<Vec<IndexHit>>;

    /// Fetch one record by id.
    async fn get(&self, id: &str) -> Result<Option<EmbeddingRecord>>;

    /// All record ids, sorted.
    async fn list_ids(&self) -> Result<Vec<String>>;

    /// Index statistics.
    async fn stats(&self) -> Result<IndexStats>;
}
