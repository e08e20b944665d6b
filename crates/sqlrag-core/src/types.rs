//! Core domain types: table schemas, their canonical text rendering, index
//! records, retrieval results, and result rows.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt::Write as _;

use crate::error::Result;

/// One column of a table, in the order the metadata source reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Declared type, as reported by the database (e.g. `int(11)`).
    pub data_type: String,

    /// Part of the primary key.
    pub is_primary_key: bool,

    /// Accepts NULL.
    pub is_nullable: bool,
}

impl Column {
    /// Create a column.
    pub fn new(name: &str, data_type: &str, is_primary_key: bool, is_nullable: bool) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            is_primary_key,
            is_nullable,
        }
    }
}

/// A foreign key from one column to a column of another table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Referencing column in this table.
    pub column: String,

    /// Referenced table.
    pub referenced_table: String,

    /// Referenced column.
    pub referenced_column: String,
}

impl ForeignKey {
    /// Create a foreign key.
    pub fn new(column: &str, referenced_table: &str, referenced_column: &str) -> Self {
        Self {
            column: column.to_string(),
            referenced_table: referenced_table.to_string(),
            referenced_column: referenced_column.to_string(),
        }
    }
}

/// Structural metadata for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub table_name: String,

    /// Columns in source order.
    pub columns: Vec<Column>,

    /// Foreign keys in source order.
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableSchema {
    /// Create a schema.
    pub fn new(table_name: &str, columns: Vec<Column>, foreign_keys: Vec<ForeignKey>) -> Self {
        Self {
            table_name: table_name.to_string(),
            columns,
            foreign_keys,
        }
    }

    /// Render the canonical text description of this table.
    ///
    /// The output is what gets embedded at indexing time and what is handed
    /// to the model as context, so it must be byte-stable: columns and keys
    /// keep their source order and nothing is re-sorted.
    pub fn render(&self) -> SchemaDocument {
        let mut text = String::new();

        // Writing into a String cannot fail.
        let _ = writeln!(text, "Table: {}", self.table_name);
        text.push_str("Columns:\n");

        for col in &self.columns {
            let _ = write!(text, "  - {} ({})", col.name, col.data_type);
            if col.is_primary_key {
                text.push_str(" [PRIMARY KEY]");
            }
            if !col.is_nullable {
                text.push_str(" [NOT NULL]");
            }
            text.push('\n');
        }

        if !self.foreign_keys.is_empty() {
            text.push_str("Foreign Keys:\n");
            for fk in &self.foreign_keys {
                let _ = writeln!(
                    text,
                    "  - {} references {}.{}",
                    fk.column, fk.referenced_table, fk.referenced_column
                );
            }
        }

        SchemaDocument(text)
    }
}

/// Canonical text rendering of a [`TableSchema`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaDocument(String);

impl SchemaDocument {
    /// Wrap already-rendered text (e.g. read back from the index).
    pub fn from_text(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Document text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner text.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for SchemaDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata stored next to each vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Table name (same as the record id).
    pub table_name: String,

    /// JSON serialization of the full [`TableSchema`].
    pub schema: String,
}

impl RecordMetadata {
    /// Build metadata for a schema.
    pub fn for_schema(schema: &TableSchema) -> Result<Self> {
        Ok(Self {
            table_name: schema.table_name.clone(),
            schema: serde_json::to_string(schema)?,
        })
    }

    /// Recover the structured schema without going back to the database.
    pub fn table_schema(&self) -> Result<TableSchema> {
        Ok(serde_json::from_str(&self.schema)?)
    }
}

/// One persisted unit in the vector index, keyed by table name.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    /// Record id; always the table name.
    pub id: String,

    /// Embedding of `document`.
    pub vector: Vec<f32>,

    /// Rendered schema text.
    pub document: SchemaDocument,

    /// Table name and serialized schema.
    pub metadata: RecordMetadata,
}

impl EmbeddingRecord {
    /// Build the record for a table.
    pub fn for_table(
        schema: &TableSchema,
        document: SchemaDocument,
        vector: Vec<f32>,
    ) -> Result<Self> {
        Ok(Self {
            id: schema.table_name.clone(),
            vector,
            document,
            metadata: RecordMetadata::for_schema(schema)?,
        })
    }
}

/// A similarity query hit.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    /// Record id (table name).
    pub id: String,

    /// Stored document.
    pub document: SchemaDocument,

    /// Stored metadata.
    pub metadata: RecordMetadata,

    /// Similarity (higher is closer).
    pub score: f32,
}

/// A schema retrieved for a question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedSchema {
    /// Rank (1-indexed).
    pub rank: u32,

    /// Table name.
    pub table_name: String,

    /// Schema document.
    pub document: SchemaDocument,

    /// Similarity score.
    pub score: f32,
}

/// Ordered retrieval results for one question.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Retrieval {
    /// Schemas, most similar first.
    pub schemas: Vec<RetrievedSchema>,
}

impl Retrieval {
    /// Build from index hits, keeping their order.
    pub fn from_hits(hits: Vec<IndexHit>) -> Self {
        let schemas = hits
            .into_iter()
            .enumerate()
            .map(|(i, hit)| RetrievedSchema {
                rank: i as u32 + 1,
                table_name: hit.metadata.table_name,
                document: hit.document,
                score: hit.score,
            })
            .collect();
        Self { schemas }
    }

    /// Retrieved table names in rank order.
    pub fn table_names(&self) -> Vec<&str> {
        self.schemas.iter().map(|s| s.table_name.as_str()).collect()
    }

    /// Context block: documents in rank order, separated by a blank line.
    pub fn context(&self) -> String {
        self.schemas
            .iter()
            .map(|s| s.document.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }
}

/// One result row: column names mapped to values, in select-list order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowRecord {
    values: Vec<(String, serde_json::Value)>,
}

impl RowRecord {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column value.
    pub fn push(&mut self, column: impl Into<String>, value: serde_json::Value) {
        self.values.push((column.into(), value));
    }

    /// Builder form of [`RowRecord::push`].
    pub fn with(mut self, column: impl Into<String>, value: serde_json::Value) -> Self {
        self.push(column, value);
        self
    }

    /// Look up a value by column name (first match).
    pub fn get(&self, column: &str) -> Option<&serde_json::Value> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Column names in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for RowRecord {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in &self.values {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Serialize rows as the indented JSON array given to the answer prompt.
pub fn rows_to_json(rows: &[RowRecord]) -> Result<String> {
    Ok(serde_json::to_string_pretty(rows)?)
}

/// Result of running one generated statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    /// Statement ran; possibly zero rows.
    Rows(Vec<RowRecord>),

    /// Statement was rejected or failed.
    Failed { message: String },
}

impl Execution {
    /// Create a failed execution.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Statistics about the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    /// Collection name.
    pub collection: String,

    /// Number of records.
    pub records: u64,

    /// Vector dimension of the stored records, if any exist.
    pub dimension: Option<usize>,

    /// Digest over the sorted (id, document) pairs.
    pub fingerprint: String,

    /// Index file size in bytes.
    pub storage_bytes: u64,
}

impl IndexStats {
    /// Digest over `(id, document)` pairs, independent of insertion order.
    pub fn fingerprint_of(entries: &[(String, String)]) -> String {
        let mut sorted: Vec<&(String, String)> = entries.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        let mut hasher = blake3::Hasher::new();
        for (id, document) in sorted {
            hasher.update(id.as_bytes());
            hasher.update(&[0]);
            hasher.update(document.as_bytes());
            hasher.update(&[0]);
        }
        hex::encode(hasher.finalize().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn orders() -> TableSchema {
        TableSchema::new(
            "Orders",
            vec![
                Column::new("OrderID", "int(11)", true, false),
                Column::new("CustomerID", "varchar(5)", false, true),
                Column::new("OrderDate", "datetime", false, true),
            ],
            vec![ForeignKey::new("CustomerID", "Customers", "CustomerID")],
        )
    }

    #[test]
    fn test_render_exact_format() {
        let expected = "Table: Orders\n\
                        Columns:\n  \
                        - OrderID (int(11)) [PRIMARY KEY] [NOT NULL]\n  \
                        - CustomerID (varchar(5))\n  \
                        - OrderDate (datetime)\n\
                        Foreign Keys:\n  \
                        - CustomerID references Customers.CustomerID\n";
        assert_eq!(orders().render().as_str(), expected);
    }

    #[test]
    fn test_render_without_foreign_keys() {
        let customers = TableSchema::new(
            "Customers",
            vec![
                Column::new("CustomerID", "varchar(5)", true, false),
                Column::new("CompanyName", "varchar(40)", false, false),
            ],
            vec![],
        );
        let text = customers.render().into_string();
        assert!(!text.contains("Foreign Keys:"));
        assert!(text.contains("  - CompanyName (varchar(40)) [NOT NULL]\n"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let schema = orders();
        let first = schema.render();
        for _ in 0..10 {
            assert_eq!(schema.clone().render(), first);
        }
    }

    #[test]
    fn test_render_preserves_source_order() {
        let schema = TableSchema::new(
            "t",
            vec![
                Column::new("zeta", "int", false, true),
                Column::new("alpha", "int", false, true),
            ],
            vec![],
        );
        let text = schema.render().into_string();
        assert!(text.find("zeta").unwrap() < text.find("alpha").unwrap());
    }

    #[test]
    fn test_metadata_recovers_schema() {
        let schema = orders();
        let metadata = RecordMetadata::for_schema(&schema).unwrap();
        assert_eq!(metadata.table_name, "Orders");
        assert_eq!(metadata.table_schema().unwrap(), schema);
    }

    #[test]
    fn test_record_id_is_table_name() {
        let schema = orders();
        let record = EmbeddingRecord::for_table(&schema, schema.render(), vec![0.1, 0.2]).unwrap();
        assert_eq!(record.id, "Orders");
        assert_eq!(record.metadata.table_name, "Orders");
    }

    #[test]
    fn test_retrieval_context_joins_with_blank_line() {
        let retrieval = Retrieval {
            schemas: vec![
                RetrievedSchema {
                    rank: 1,
                    table_name: "a".to_string(),
                    document: SchemaDocument::from_text("Table: a\n"),
                    score: 0.9,
                },
                RetrievedSchema {
                    rank: 2,
                    table_name: "b".to_string(),
                    document: SchemaDocument::from_text("Table: b\n"),
                    score: 0.5,
                },
            ],
        };
        assert_eq!(retrieval.context(), "Table: a\n\n\nTable: b\n");
        assert_eq!(retrieval.table_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_row_record_keeps_column_order() {
        let row = RowRecord::new()
            .with("OrderID", json!(11077))
            .with("CompanyName", json!("Rattlesnake Canyon Grocery"))
            .with("ShippedDate", json!(null));

        let text = serde_json::to_string(&row).unwrap();
        assert_eq!(
            text,
            r#"{"OrderID":11077,"CompanyName":"Rattlesnake Canyon Grocery","ShippedDate":null}"#
        );
        assert_eq!(row.get("OrderID"), Some(&json!(11077)));
        assert_eq!(row.columns().collect::<Vec<_>>().len(), 3);
    }

    #[test]
    fn test_rows_to_json_is_indented_array() {
        let rows = vec![RowRecord::new().with("n", json!(1))];
        let text = rows_to_json(&rows).unwrap();
        assert!(text.starts_with("[\n"));
        assert!(text.contains("\"n\": 1"));
    }

    #[test]
    fn test_fingerprint_ignores_insertion_order() {
        let a = vec![
            ("Orders".to_string(), "x".to_string()),
            ("Customers".to_string(), "y".to_string()),
        ];
        let b = vec![a[1].clone(), a[0].clone()];
        assert_eq!(IndexStats::fingerprint_of(&a), IndexStats::fingerprint_of(&b));

        let c = vec![("Orders".to_string(), "changed".to_string()), a[1].clone()];
        assert_ne!(IndexStats::fingerprint_of(&a), IndexStats::fingerprint_of(&c));
    }
}
