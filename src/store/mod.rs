// LanceDB-backed vector store
// One persistent index per source folder, keyed by chunk identity


use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use tracing::{debug, info};

use crate::config::INDEX_DIR_NAME;
use crate::{RagError, Result};

const TABLE_NAME: &str = "chunks";

/// Records are written in sub-batches of this size to bound per-call payloads.
const WRITE_BATCH_SIZE: usize = 500;

/// A chunk plus its embedding, ready to persist.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// Primary key: `{source}_{chunk_index}`.
    pub id: String,
    pub embedding: Vec<f32>,
    pub content: String,
    pub source: String,
    pub chunk_index: u32,
    pub file_type: String,
}

/// One row of a similarity search, ordered ascending by cosine distance.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub content: String,
    pub source: String,
    pub chunk_index: u32,
    pub file_type: String,
    pub distance: f32,
}

/// Persistent vector store for one indexed folder.
///
/// Lives at `<folder>/.ragbox` and is bound to a single embedding dimension
/// for its lifetime. The table is created lazily on the first write; until
/// then the folder counts as unindexed. Not safe for concurrent writers;
/// callers serialize access per folder.
pub struct VectorStore {
    connection: Connection,
    index_path: PathBuf,
    dimension: usize,
}

impl VectorStore {
    /// Open (or lazily create) the store for a folder.
    #[inline]
    pub async fn open<P: AsRef<Path>>(folder: P, dimension: usize) -> Result<Self> {
        let index_path = folder.as_ref().join(INDEX_DIR_NAME);
        debug!("Opening vector store at {}", index_path.display());

        let connection = lancedb::connect(&index_path.to_string_lossy())
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to open vector index: {e}")))?;

        Ok(Self {
            connection,
            index_path,
            dimension,
        })
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    self.dimension as i32,
                ),
                false,
            ),
            Field::new("content", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("file_type", DataType::Utf8, false),
        ]))
    }

    async fn table_exists(&self) -> Result<bool> {
        let names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to list tables: {e}")))?;
        Ok(names.contains(&TABLE_NAME.to_string()))
    }

    async fn open_table(&self) -> Result<Table> {
        self.connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to open table: {e}")))
    }

    async fn ensure_table(&self) -> Result<Table> {
        if self.table_exists().await? {
            return self.open_table().await;
        }

        info!(
            "Creating chunk table with {} dimensions at {}",
            self.dimension,
            self.index_path.display()
        );
        self.connection
            .create_empty_table(TABLE_NAME, self.schema())
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to create table: {e}")))
    }

    /// Upsert records by id.
    ///
    /// Re-adding an existing id replaces its content, embedding, and metadata.
    /// Large batches are written in sub-batches transparently; records are
    /// durable once this returns.
    #[inline]
    pub async fn add(&self, records: &[ChunkRecord]) -> Result<()> {
        if records.is_empty() {
            debug!("No records to store");
            return Ok(());
        }

        for record in records {
            if record.embedding.len() != self.dimension {
                return Err(RagError::Store(format!(
                    "Embedding for {} has {} dimensions, store expects {}",
                    record.id,
                    record.embedding.len(),
                    self.dimension
                )));
            }
        }

        let table = self.ensure_table().await?;

        for batch in records.chunks(WRITE_BATCH_SIZE) {
            let record_batch = self.build_record_batch(batch)?;
            let schema = record_batch.schema();
            let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

            let mut merge = table.merge_insert(&["id"]);
            merge
                .when_matched_update_all(None)
                .when_not_matched_insert_all();
            merge
                .execute(Box::new(reader))
                .await
                .map_err(|e| RagError::Store(format!("Failed to upsert records: {e}")))?;
        }

        info!("Stored {} records", records.len());
        Ok(())
    }

    fn build_record_batch(&self, records: &[ChunkRecord]) -> Result<RecordBatch> {
        let len = records.len();

        let mut ids = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut sources = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut file_types = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * self.dimension);

        for record in records {
            ids.push(record.id.as_str());
            contents.push(record.content.as_str());
            sources.push(record.source.as_str());
            chunk_indices.push(record.chunk_index);
            file_types.push(record.file_type.as_str());
            flat_values.extend_from_slice(&record.embedding);
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(values_array),
            None,
        )
        .map_err(|e| RagError::Store(format!("Failed to build vector array: {e}")))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(sources)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(StringArray::from(file_types)),
        ];

        RecordBatch::try_new(self.schema(), arrays)
            .map_err(|e| RagError::Store(format!("Failed to build record batch: {e}")))
    }

    /// Nearest-neighbor search by cosine distance, ascending (closest first).
    ///
    /// Returns at most `top_k` rows, fewer when the store holds fewer records,
    /// and an empty vec for a store that was never written.
    #[inline]
    pub async fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Err(RagError::Config(
                "top_k must be greater than zero".to_string(),
            ));
        }

        if !self.table_exists().await? {
            return Ok(Vec::new());
        }

        debug!("Searching for {} nearest chunks", top_k);

        let table = self.open_table().await?;
        let results = table
            .vector_search(query_vector)
            .map_err(|e| RagError::Store(format!("Failed to build vector search: {e}")))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(top_k)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to execute search: {e}")))?;

        let mut search_results = Vec::new();
        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| RagError::Store(format!("Failed to read search results: {e}")))?;
        for batch in &batches {
            search_results.extend(parse_search_batch(batch)?);
        }

        debug!("Search returned {} results", search_results.len());
        Ok(search_results)
    }

    /// Delete all records. The store is immediately queryable again as empty.
    #[inline]
    pub async fn clear(&self) -> Result<()> {
        if self.table_exists().await? {
            info!("Clearing vector store at {}", self.index_path.display());
            self.connection
                .drop_table(TABLE_NAME)
                .await
                .map_err(|e| RagError::Store(format!("Failed to drop table: {e}")))?;
        }

        // Recreate empty so the store is never left half-deleted.
        self.ensure_table().await?;
        Ok(())
    }

    /// Exact number of stored records; 0 when the table was never created.
    #[inline]
    pub async fn count(&self) -> Result<usize> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        let table = self.open_table().await?;
        table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Store(format!("Failed to count rows: {e}")))
    }

    /// True only if the index is present on disk and holds at least one
    /// record. An empty-but-initialized store reports false, so "indexed zero
    /// chunks" is distinguishable from "never indexed".
    #[inline]
    pub async fn exists(&self) -> Result<bool> {
        if !self.index_path.exists() {
            return Ok(false);
        }
        Ok(self.count().await? > 0)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Store(format!("Missing {name} column")))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Store(format!("Invalid {name} column type")))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
    let contents = string_column(batch, "content")?;
    let sources = string_column(batch, "source")?;
    let file_types = string_column(batch, "file_type")?;

    let chunk_indices = batch
        .column_by_name("chunk_index")
        .ok_or_else(|| RagError::Store("Missing chunk_index column".to_string()))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| RagError::Store("Invalid chunk_index column type".to_string()))?;

    let distances = batch
        .column_by_name("_distance")
        .map(|col| col.as_any().downcast_ref::<Float32Array>());

    let mut results = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let distance = distances
            .flatten()
            .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

        results.push(SearchResult {
            content: contents.value(row).to_string(),
            source: sources.value(row).to_string(),
            chunk_index: chunk_indices.value(row),
            file_type: file_types.value(row).to_string(),
            distance,
        });
    }

    Ok(results)
}
