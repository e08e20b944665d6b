//! In-memory doubles for the indexer and engine tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use sqlrag_core::{
    Column, Embedder, EmbeddingRecord, Execution, ForeignKey, IndexHit, IndexStats, Result,
    SchemaSource, SqlExecutor, SqlRagError, TableSchema, TextGenerator, VectorIndex,
};
use sqlrag_llm::MockEmbedder;

/// A small slice of Northwind: Customers, Orders, Shippers.
pub fn northwind() -> Vec<TableSchema> {
    vec![
        TableSchema::new(
            "Customers",
            vec![
                Column::new("CustomerID", "varchar(5)", true, false),
                Column::new("CompanyName", "varchar(40)", false, false),
                Column::new("ContactName", "varchar(30)", false, true),
                Column::new("City", "varchar(15)", false, true),
            ],
            vec![],
        ),
        TableSchema::new(
            "Orders",
            vec![
                Column::new("OrderID", "int(11)", true, false),
                Column::new("CustomerID", "varchar(5)", false, true),
                Column::new("OrderDate", "datetime", false, true),
                Column::new("ShipVia", "int(11)", false, true),
            ],
            vec![
                ForeignKey::new("CustomerID", "Customers", "CustomerID"),
                ForeignKey::new("ShipVia", "Shippers", "ShipperID"),
            ],
        ),
        TableSchema::new(
            "Shippers",
            vec![
                Column::new("ShipperID", "int(11)", true, false),
                Column::new("CompanyName", "varchar(40)", false, false),
                Column::new("Phone", "varchar(24)", false, true),
            ],
            vec![],
        ),
    ]
}

/// Schema source backed by a list of tables.
pub struct MemorySource {
    tables: Vec<TableSchema>,
    unreadable: Option<String>,
}

impl MemorySource {
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self {
            tables,
            unreadable: None,
        }
    }

    /// Make `describe_table` fail for one table.
    pub fn with_unreadable(mut self, table: &str) -> Self {
        self.unreadable = Some(table.to_string());
        self
    }
}

#[async_trait]
impl SchemaSource for MemorySource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.iter().map(|t| t.table_name.clone()).collect())
    }

    async fn describe_table(&self, table: &str) -> Result<TableSchema> {
        if self.unreadable.as_deref() == Some(table) {
            return Err(SqlRagError::database(format!("Lost connection describing {}", table)));
        }
        self.tables
            .iter()
            .find(|t| t.table_name == table)
            .cloned()
            .ok_or_else(|| SqlRagError::TableNotFound {
                name: table.to_string(),
            })
    }
}

/// Executor returning canned results and recording what it ran.
pub struct MemoryExecutor {
    responses: HashMap<String, Execution>,
    fallback: Execution,
    executed: Mutex<Vec<String>>,
}

impl MemoryExecutor {
    pub fn new(fallback: Execution) -> Self {
        Self {
            responses: HashMap::new(),
            fallback,
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn with(mut self, sql: &str, execution: Execution) -> Self {
        self.responses.insert(sql.to_string(), execution);
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlExecutor for MemoryExecutor {
    async fn execute(&self, sql: &str) -> Result<Execution> {
        self.executed.lock().unwrap().push(sql.to_string());
        Ok(self
            .responses
            .get(sql)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Generator that replies with a fixed statement to SQL prompts and a fixed
/// answer to everything else.
pub struct ScriptedGenerator {
    sql_reply: String,
    answer_reply: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(sql_reply: &str, answer_reply: &str) -> Self {
        Self {
            sql_reply: sql_reply.to_string(),
            answer_reply: answer_reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if prompt.starts_with("You are a SQL expert") {
            Ok(self.sql_reply.clone())
        } else {
            Ok(self.answer_reply.clone())
        }
    }
}

/// Generator whose service is down.
pub struct UnavailableGenerator;

#[async_trait]
impl TextGenerator for UnavailableGenerator {
    fn model(&self) -> &str {
        "unavailable"
    }

    async fn chat(&self, _prompt: &str) -> Result<String> {
        Err(SqlRagError::generation("connection refused"))
    }
}

/// Mock embedder that fails on texts containing a marker.
pub struct FailOnEmbedder {
    marker: String,
    inner: MockEmbedder,
}

impl FailOnEmbedder {
    pub fn new(marker: &str) -> Self {
        Self {
            marker: marker.to_string(),
            inner: MockEmbedder::new(),
        }
    }
}

#[async_trait]
impl Embedder for FailOnEmbedder {
    fn model(&self) -> &str {
        "fail-on"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains(&self.marker) {
            return Err(SqlRagError::embedding("model unloaded"));
        }
        self.inner.embed(text).await
    }
}

/// Vector index whose storage is broken.
pub struct FailingIndex;

fn broken() -> SqlRagError {
    SqlRagError::vector_index("disk I/O error")
}

#[async_trait]
impl VectorIndex for FailingIndex {
    async fn ensure_collection(&self) -> Result<()> {
        Err(broken())
    }

    async fn drop_collection(&self) -> Result<()> {
        Err(broken())
    }

    async fn upsert(&self, _record: EmbeddingRecord) -> Result<()> {
        Err(broken())
    }

    async fn query(&self, _vector: &[f32], _top_n: usize) -> Result<Vec<IndexHit>> {
        Err(broken())
    }

    async fn get(&self, _id: &str) -> Result<Option<EmbeddingRecord>> {
        Err(broken())
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        Err(broken())
    }

    async fn stats(&self) -> Result<IndexStats> {
        Err(broken())
    }
}
