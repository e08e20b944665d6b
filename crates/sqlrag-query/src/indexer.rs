//! Schema indexer: database metadata into the vector index.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use sqlrag_core::{
    Embedder, EmbeddingRecord, Result, SchemaDocument, SchemaSource, TableSchema, VectorIndex,
};

/// Summary of one indexing run.
#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    /// Indexed tables, in enumeration order.
    pub tables: Vec<String>,

    /// Document of the first table, if any.
    pub sample_document: Option<SchemaDocument>,

    /// Embedding dimension observed during the run.
    pub dimension: Option<usize>,

    /// Wall time of the run.
    pub elapsed_ms: u64,
}

/// Rebuilds the vector index from the source database.
pub struct SchemaIndexer<S: ?Sized, E: ?Sized, V: ?Sized> {
    source: Arc<S>,
    embedder: Arc<E>,
    index: Arc<V>,
}

impl<S, E, V> SchemaIndexer<S, E, V>
where
    S: SchemaSource + ?Sized,
    E: Embedder + ?Sized,
    V: VectorIndex + ?Sized,
{
    /// Create a new indexer.
    pub fn new(source: Arc<S>, embedder: Arc<E>, index: Arc<V>) -> Self {
        Self {
            source,
            embedder,
            index,
        }
    }

    /// Drop and rebuild the collection with one record per table.
    ///
    /// Any failure aborts the run. Records upserted before the failure stay
    /// in the index.
    pub async fn rebuild(&self) -> Result<IndexReport> {
        let start = Instant::now();

        let tables = self.source.list_tables().await?;
        info!("Found {} tables: {}", tables.len(), tables.join(", "));

        let mut schemas: Vec<(TableSchema, SchemaDocument)> = Vec::with_capacity(tables.len());
        for table in &tables {
            let schema = self.source.describe_table(table).await?;
            let document = schema.render();
            debug!("Rendered {} ({} bytes)", table, document.as_str().len());
            schemas.push((schema, document));
        }

        match self.index.drop_collection().await {
            Ok(()) => debug!("Dropped existing collection"),
            Err(e) if e.is_collection_not_found() => debug!("No existing collection to drop"),
            Err(e) => return Err(e),
        }
        self.index.ensure_collection().await?;

        let sample_document = schemas.first().map(|(_, document)| document.clone());
        let mut dimension = None;

        for (position, (schema, document)) in schemas.into_iter().enumerate() {
            let vector = self.embedder.embed(document.as_str()).await?;
            dimension = Some(vector.len());

            let record = EmbeddingRecord::for_table(&schema, document, vector)?;
            self.index.upsert(record).await?;

            info!(
                "Indexed {} ({}/{})",
                schema.table_name,
                position + 1,
                tables.len()
            );
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!("Indexed {} tables in {}ms", tables.len(), elapsed_ms);

        Ok(IndexReport {
            tables,
            sample_document,
            dimension,
            elapsed_ms,
        })
    }
}
