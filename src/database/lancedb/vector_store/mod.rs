
use super::{SearchResult, StoredRecord};
use crate::config::{Config, DistanceMetric};
use crate::embeddings::chunking::Metadata;
use crate::{RagError, Result};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use itertools::Itertools;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType, Table};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Vector database store using LanceDB for similarity search.
///
/// A store is bound to one table; call [`VectorStore::create_table`] or
/// [`VectorStore::open_table`] before anything else.
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    metric: DistanceMetric,
    table: Option<Table>,
    vector_dimension: Option<usize>,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("table_name", &self.table_name)
            .field("metric", &self.metric)
            .field("vector_dimension", &self.vector_dimension)
            .finish_non_exhaustive()
    }
}

impl VectorStore {
    /// Connect using the database section of `config`
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        Self::connect(
            &config.vector_database_path(),
            &config.database.table_name,
            config.database.distance_metric,
        )
        .await
    }

    /// Connect to the LanceDB directory at `db_path`, creating it if needed
    #[inline]
    pub async fn connect(db_path: &Path, table_name: &str, metric: DistanceMetric) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path).map_err(|e| {
            RagError::Database(format!("Failed to create vector database directory: {e}"))
        })?;

        let uri = db_path.to_string_lossy().to_string();
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to connect to LanceDB: {e}")))?;

        Ok(Self {
            connection,
            table_name: table_name.to_string(),
            metric,
            table: None,
            vector_dimension: None,
        })
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    #[inline]
    pub const fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Vector width of the attached table, if any
    #[inline]
    pub const fn dimension(&self) -> Option<usize> {
        self.vector_dimension
    }

    /// Create the table, discarding any existing table of the same name
    #[inline]
    pub async fn create_table(&mut self, dimension: usize) -> Result<()> {
        if dimension == 0 {
            return Err(RagError::Configuration(
                "vector dimension must be greater than zero".to_string(),
            ));
        }

        self.drop_table_if_exists().await?;

        let table = self
            .connection
            .create_empty_table(&self.table_name, create_schema(dimension))
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to create table: {e}")))?;

        info!(
            "Created table {} with {} dimensions",
            self.table_name, dimension
        );
        self.table = Some(table);
        self.vector_dimension = Some(dimension);
        Ok(())
    }

    /// Attach to an existing table and detect its vector dimension
    #[inline]
    pub async fn open_table(&mut self) -> Result<()> {
        let table = match self.connection.open_table(&self.table_name).execute().await {
            Ok(table) => table,
            Err(lancedb::Error::TableNotFound { .. }) => {
                return Err(RagError::StoreNotFound(self.table_name.clone()));
            }
            Err(e) => {
                return Err(RagError::Database(format!(
                    "Failed to open table {}: {e}",
                    self.table_name
                )));
            }
        };

        let dimension = detect_vector_dimension(&table).await?;
        debug!(
            "Opened table {} with {} dimensions",
            self.table_name, dimension
        );
        self.table = Some(table);
        self.vector_dimension = Some(dimension);
        Ok(())
    }

    /// Drop the table; the store must be created or opened again afterwards
    #[inline]
    pub async fn drop_table(&mut self) -> Result<()> {
        self.drop_table_if_exists().await?;
        self.table = None;
        self.vector_dimension = None;
        Ok(())
    }

    async fn drop_table_if_exists(&self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {e}")))?;

        if table_names.contains(&self.table_name) {
            info!("Dropping existing table {}", self.table_name);
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| RagError::Database(format!("Failed to drop table: {e}")))?;
        }

        Ok(())
    }

    fn attached(&self) -> Result<(&Table, usize)> {
        match (&self.table, self.vector_dimension) {
            (Some(table), Some(dimension)) => Ok((table, dimension)),
            _ => Err(RagError::StoreUninitialized),
        }
    }

    /// Append records; ids are not checked for uniqueness
    #[inline]
    pub async fn add_records(&self, records: &[StoredRecord]) -> Result<()> {
        let (table, dimension) = self.attached()?;
        if records.is_empty() {
            debug!("No records to store");
            return Ok(());
        }

        if let Some(wrong) = records.iter().find(|r| r.vector.len() != dimension) {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: wrong.vector.len(),
            });
        }

        let record_batch = create_record_batch(records, dimension)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to insert records: {e}")))?;

        debug!("Stored {} records", records.len());
        Ok(())
    }

    /// Up to `top_k` nearest records, closest first.
    ///
    /// `filter` is a LanceDB SQL predicate evaluated by the engine, e.g.
    /// `source_path = 'src/lib.rs'`.
    #[inline]
    pub async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        filter: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        let (table, dimension) = self.attached()?;
        if query_vector.len() != dimension {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: query_vector.len(),
            });
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        debug!("Searching for {} nearest records", top_k);

        let mut query = table
            .vector_search(query_vector)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {e}")))?
            .column("vector")
            .distance_type(distance_type(self.metric))
            .limit(top_k);

        if let Some(predicate) = filter {
            query = query.only_if(predicate);
        }

        let mut stream = query
            .execute()
            .await
            .map_err(|e| map_query_error(&e, filter, "Failed to execute search"))?;

        let mut results = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| map_query_error(&e, filter, "Failed to read result stream"))?
        {
            results.extend(parse_search_batch(&batch)?);
        }

        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        debug!("Search returned {} results", results.len());
        Ok(results)
    }

    /// Delete every record of one source file; a no-op when none match
    #[inline]
    pub async fn delete_by_source_path(&self, source_path: &str) -> Result<()> {
        let (table, _) = self.attached()?;
        let predicate = format!("source_path = '{}'", escape_literal(source_path));

        table
            .delete(&predicate)
            .await
            .map_err(|e| RagError::Database(format!("Failed to delete {source_path}: {e}")))?;

        debug!("Deleted records for {}", source_path);
        Ok(())
    }

    #[inline]
    pub async fn count(&self) -> Result<usize> {
        let (table, _) = self.attached()?;
        table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {e}")))
    }

    /// Sorted, de-duplicated source paths present in the table
    #[inline]
    pub async fn list_distinct_files(&self) -> Result<Vec<String>> {
        let (table, _) = self.attached()?;

        let mut stream = table
            .query()
            .select(Select::columns(&["source_path"]))
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to scan source paths: {e}")))?;

        let mut paths = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read source paths: {e}")))?
        {
            let column = string_column(&batch, "source_path")?;
            paths.extend((0..batch.num_rows()).map(|row| column.value(row).to_string()));
        }

        Ok(paths.into_iter().sorted().dedup().collect())
    }

    /// Compact fragments and prune old versions
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        let (table, _) = self.attached()?;
        debug!("Optimizing vector database");

        table
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| RagError::Database(format!("Failed to optimize table: {e}")))?;

        info!("Vector database optimization completed");
        Ok(())
    }
}

const fn distance_type(metric: DistanceMetric) -> DistanceType {
    match metric {
        DistanceMetric::Cosine => DistanceType::Cosine,
        DistanceMetric::L2 => DistanceType::L2,
        DistanceMetric::Dot => DistanceType::Dot,
    }
}

/// Single quotes are doubled inside SQL string literals
fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Engine errors caused by a user predicate become `FilterSyntax`
fn map_query_error(error: &lancedb::Error, filter: Option<&str>, context: &str) -> RagError {
    let message = error.to_string();
    if let Some(filter) = filter {
        let lower = message.to_lowercase();
        if lower.contains("parse") || lower.contains("sql") || lower.contains("invalid") {
            warn!("Rejected filter {:?}: {}", filter, message);
            return RagError::FilterSyntax {
                filter: filter.to_string(),
                message,
            };
        }
    }
    RagError::Database(format!("{context}: {message}"))
}

fn create_schema(dimension: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension as i32,
            ),
            false,
        ),
        Field::new("source_path", DataType::Utf8, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("metadata", DataType::Utf8, false),
    ]))
}

async fn detect_vector_dimension(table: &Table) -> Result<usize> {
    let schema = table
        .schema()
        .await
        .map_err(|e| RagError::Database(format!("Failed to get table schema: {e}")))?;

    schema
        .fields()
        .iter()
        .find(|field| field.name() == "vector")
        .and_then(|field| match field.data_type() {
            DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
            _ => None,
        })
        .ok_or_else(|| RagError::Database("Could not determine vector dimension".to_string()))
}

fn create_record_batch(records: &[StoredRecord], dimension: usize) -> Result<RecordBatch> {
    let len = records.len();

    let mut ids = Vec::with_capacity(len);
    let mut texts = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * dimension);
    let mut source_paths = Vec::with_capacity(len);
    let mut chunk_indices = Vec::with_capacity(len);
    let mut metadata = Vec::with_capacity(len);

    for record in records {
        ids.push(record.id.as_str());
        texts.push(record.text.as_str());
        flat_values.extend_from_slice(&record.vector);
        source_paths.push(record.source_path.as_str());
        chunk_indices.push(record.chunk_index);
        metadata.push(
            serde_json::to_string(&record.metadata)
                .map_err(|e| RagError::Database(format!("Failed to encode metadata: {e}")))?,
        );
    }

    let field = Arc::new(Field::new("item", DataType::Float32, true));
    let vector_array = FixedSizeListArray::try_new(
        field,
        dimension as i32,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| RagError::Database(format!("Failed to create vector array: {e}")))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(StringArray::from(texts)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(source_paths)),
        Arc::new(UInt32Array::from(chunk_indices)),
        Arc::new(StringArray::from(metadata)),
    ];

    RecordBatch::try_new(create_schema(dimension), arrays)
        .map_err(|e| RagError::Database(format!("Failed to create record batch: {e}")))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {name} column")))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Database(format!("Invalid {name} column type")))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
    let ids = string_column(batch, "id")?;
    let texts = string_column(batch, "text")?;
    let source_paths = string_column(batch, "source_path")?;
    let metadata_json = string_column(batch, "metadata")?;

    let chunk_indices = batch
        .column_by_name("chunk_index")
        .ok_or_else(|| RagError::Database("Missing chunk_index column".to_string()))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| RagError::Database("Invalid chunk_index column type".to_string()))?;

    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    let mut results = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let distance = distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

        let metadata: Metadata = serde_json::from_str(metadata_json.value(row)).unwrap_or_else(|e| {
            warn!("Unreadable metadata for {}: {}", ids.value(row), e);
            Metadata::new()
        });

        results.push(SearchResult {
            id: ids.value(row).to_string(),
            text: texts.value(row).to_string(),
            source_path: source_paths.value(row).to_string(),
            chunk_index: chunk_indices.value(row),
            metadata,
            distance,
        });
    }

    Ok(results)
}
