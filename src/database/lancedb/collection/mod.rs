
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, Table};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::vector_store::bounded;
use super::{CollectionInfo, DistanceMetric, IngestReport, Record, SearchResult};
use crate::embeddings::EmbeddingVector;
use crate::{RagError, Result};

/// Schema metadata key holding the collection's distance metric
const METRIC_METADATA_KEY: &str = "distance_metric";

/// Extra rows fetched past `top_k` on the first pass so equal-distance hits
/// can be reordered by insertion sequence. The window doubles while the
/// last candidate still ties with the `top_k`-th.
const TIE_BREAK_SLACK: usize = 8;

/// A named, independently searchable group of records.
///
/// This handle holds no cached state: every call re-reads the collection's
/// shape from the store. Reads may run concurrently. Concurrent `ingest`
/// calls into the same collection must be serialized by the caller, since
/// insertion sequence numbers are assigned from the current row count.
#[derive(Clone)]
pub struct VectorCollection {
    connection: Connection,
    name: String,
    timeout: Duration,
}

impl VectorCollection {
    pub(crate) fn new(connection: Connection, name: &str, timeout: Duration) -> Self {
        Self {
            connection,
            name: name.to_string(),
            timeout,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ensure the collection exists with the given shape.
    ///
    /// Idempotent: an existing collection with the same dimension and
    /// metric is left untouched. A conflicting shape fails with
    /// `DimensionMismatch` or `MetricMismatch` without modifying anything.
    #[inline]
    pub async fn create(&self, dimension: usize, metric: DistanceMetric) -> Result<CollectionInfo> {
        if dimension == 0 || i32::try_from(dimension).is_err() {
            return Err(RagError::Config(format!(
                "invalid dimension {} for collection '{}'",
                dimension, self.name
            )));
        }

        bounded(self.timeout, "create collection", async {
            if self.exists_unbounded().await? {
                return self.verify_shape(dimension, metric).await;
            }

            let schema = create_schema(dimension, metric);
            match self
                .connection
                .create_empty_table(&self.name, schema)
                .execute()
                .await
            {
                Ok(_) => {
                    info!(
                        "Created collection '{}' ({} dimensions, {})",
                        self.name, dimension, metric
                    );
                    Ok(CollectionInfo {
                        name: self.name.clone(),
                        dimension,
                        metric,
                    })
                }
                Err(lancedb::Error::TableAlreadyExists { .. }) => {
                    debug!("Collection '{}' was created concurrently", self.name);
                    self.verify_shape(dimension, metric).await
                }
                Err(e) => Err(RagError::Database(format!(
                    "Failed to create collection '{}': {}",
                    self.name, e
                ))),
            }
        })
        .await
    }

    /// Whether the collection has been created
    #[inline]
    pub async fn exists(&self) -> Result<bool> {
        bounded(self.timeout, "check collection", self.exists_unbounded()).await
    }

    /// Dimension and metric of the existing collection
    #[inline]
    pub async fn info(&self) -> Result<CollectionInfo> {
        bounded(self.timeout, "read collection info", async {
            let table = self.open_table().await?;
            self.read_info(&table).await
        })
        .await
    }

    /// Number of records stored
    #[inline]
    pub async fn count(&self) -> Result<usize> {
        bounded(self.timeout, "count records", async {
            let table = self.open_table().await?;
            table
                .count_rows(None)
                .await
                .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))
        })
        .await
    }

    /// Append one batch of records.
    ///
    /// The batch is validated in full before anything is written and then
    /// committed as a single write, so either every record lands or none
    /// do. Validation failures list the offending record indices.
    #[inline]
    pub async fn ingest(
        &self,
        vectors: Vec<EmbeddingVector>,
        texts: Vec<String>,
        metadata: Option<Vec<serde_json::Value>>,
    ) -> Result<IngestReport> {
        bounded(self.timeout, "ingest batch", async {
            let table = self.open_table().await?;
            let collection_info = self.read_info(&table).await?;

            self.validate_batch(&collection_info, &vectors, &texts, metadata.as_deref())?;

            if vectors.is_empty() {
                debug!("No records to ingest into '{}'", self.name);
                return Ok(IngestReport {
                    collection: self.name.clone(),
                    ids: Vec::new(),
                    first_seq: 0,
                });
            }

            let first_seq = table
                .count_rows(None)
                .await
                .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))?
                as u64;

            let ids: Vec<String> = (0..vectors.len())
                .map(|_| Uuid::new_v4().to_string())
                .collect();

            let record_batch = build_record_batch(
                &collection_info,
                &ids,
                first_seq,
                &vectors,
                &texts,
                metadata.as_deref(),
            )
            .map_err(|reason| self.ingest_error((0..vectors.len()).collect(), reason))?;

            let schema = record_batch.schema();
            let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
            table.add(reader).execute().await.map_err(|e| {
                self.ingest_error(
                    (0..vectors.len()).collect(),
                    format!("Failed to insert records: {}", e),
                )
            })?;

            info!(
                "Stored {} records in collection '{}'",
                ids.len(),
                self.name
            );
            Ok(IngestReport {
                collection: self.name.clone(),
                ids,
                first_seq,
            })
        })
        .await
    }

    /// The `top_k` nearest records, best first.
    ///
    /// Equal distances are ordered by insertion sequence, earliest first,
    /// however many records share the distance at the cut. An empty collection yields an empty result rather than an error.
    #[inline]
    pub async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        debug!(
            "Querying collection '{}' with top_k {}",
            self.name, top_k
        );

        bounded(self.timeout, "query collection", async {
            let table = self.open_table().await?;
            let collection_info = self.read_info(&table).await?;

            if vector.len() != collection_info.dimension {
                return Err(RagError::DimensionMismatch {
                    collection: self.name.clone(),
                    existing: collection_info.dimension,
                    requested: vector.len(),
                });
            }

            if top_k == 0 {
                return Ok(Vec::new());
            }

            let row_count = table
                .count_rows(None)
                .await
                .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))?;
            if row_count == 0 {
                debug!("Collection '{}' is empty", self.name);
                return Ok(Vec::new());
            }

            // Widen the window until the last candidate no longer ties with
            // the `top_k`-th, so every tied record is compared by sequence
            let mut limit = top_k.saturating_add(TIE_BREAK_SLACK).min(row_count);
            let mut results = loop {
                let mut candidates = self
                    .nearest(&table, vector, collection_info.metric, limit)
                    .await?;
                candidates.sort_by(|a, b| {
                    a.distance
                        .total_cmp(&b.distance)
                        .then(a.record.seq.cmp(&b.record.seq))
                });

                let tie_at_cut = match (candidates.get(top_k - 1), candidates.last()) {
                    (Some(kth), Some(last)) => kth.distance.total_cmp(&last.distance).is_eq(),
                    _ => false,
                };
                if !tie_at_cut || candidates.len() < limit || limit >= row_count {
                    break candidates;
                }
                debug!(
                    "{} candidates tie at the cut in '{}', widening search",
                    limit, self.name
                );
                limit = limit.saturating_mul(2).min(row_count);
            };
            results.truncate(top_k);

            debug!(
                "Collection '{}' returned {} results",
                self.name,
                results.len()
            );
            Ok(results)
        })
        .await
    }

    async fn nearest(
        &self,
        table: &Table,
        vector: &[f32],
        metric: DistanceMetric,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let stream = table
            .vector_search(vector)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(metric.distance_type())
            .limit(limit)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;

        parse_search_results_stream(stream, metric).await
    }

    async fn exists_unbounded(&self) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))?;
        Ok(table_names.contains(&self.name))
    }

    async fn open_table(&self) -> Result<Table> {
        self.connection
            .open_table(&self.name)
            .execute()
            .await
            .map_err(|e| match e {
                lancedb::Error::TableNotFound { .. } => {
                    RagError::CollectionNotFound(self.name.clone())
                }
                other => RagError::Database(format!(
                    "Failed to open collection '{}': {}",
                    self.name, other
                )),
            })
    }

    async fn verify_shape(
        &self,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<CollectionInfo> {
        let table = self.open_table().await?;
        let existing = self.read_info(&table).await?;

        if existing.dimension != dimension {
            warn!(
                "Collection '{}' exists with {} dimensions, refusing {}",
                self.name, existing.dimension, dimension
            );
            return Err(RagError::DimensionMismatch {
                collection: self.name.clone(),
                existing: existing.dimension,
                requested: dimension,
            });
        }

        if existing.metric != metric {
            return Err(RagError::MetricMismatch {
                collection: self.name.clone(),
                existing: existing.metric.to_string(),
                requested: metric.to_string(),
            });
        }

        debug!("Collection '{}' already exists with matching shape", self.name);
        Ok(existing)
    }

    /// Detect dimension and metric from the stored table schema
    async fn read_info(&self, table: &Table) -> Result<CollectionInfo> {
        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::Database(format!("Failed to get table schema: {}", e)))?;

        let dimension = schema
            .field_with_name("vector")
            .ok()
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            })
            .ok_or_else(|| {
                RagError::Database(format!(
                    "Collection '{}' has no fixed-size vector column",
                    self.name
                ))
            })?;

        let metric = match schema.metadata().get(METRIC_METADATA_KEY) {
            Some(value) => value.parse().map_err(RagError::Database)?,
            None => {
                warn!(
                    "Collection '{}' has no stored metric, assuming cosine",
                    self.name
                );
                DistanceMetric::Cosine
            }
        };

        Ok(CollectionInfo {
            name: self.name.clone(),
            dimension,
            metric,
        })
    }

    fn validate_batch(
        &self,
        collection_info: &CollectionInfo,
        vectors: &[EmbeddingVector],
        texts: &[String],
        metadata: Option<&[serde_json::Value]>,
    ) -> Result<()> {
        if texts.len() != vectors.len() {
            let longest = texts.len().max(vectors.len());
            let shortest = texts.len().min(vectors.len());
            return Err(self.ingest_error(
                (shortest..longest).collect(),
                format!(
                    "{} vectors but {} texts in one batch",
                    vectors.len(),
                    texts.len()
                ),
            ));
        }

        if let Some(metadata) = metadata {
            if metadata.len() != vectors.len() {
                let longest = metadata.len().max(vectors.len());
                let shortest = metadata.len().min(vectors.len());
                return Err(self.ingest_error(
                    (shortest..longest).collect(),
                    format!(
                        "{} vectors but {} metadata entries in one batch",
                        vectors.len(),
                        metadata.len()
                    ),
                ));
            }
        }

        let failed: Vec<usize> = vectors
            .iter()
            .enumerate()
            .filter(|(_, vector)| {
                vector.len() != collection_info.dimension || vector.iter().any(|v| !v.is_finite())
            })
            .map(|(index, _)| index)
            .collect();

        if !failed.is_empty() {
            return Err(self.ingest_error(
                failed,
                format!(
                    "vectors must have {} finite components",
                    collection_info.dimension
                ),
            ));
        }

        Ok(())
    }

    fn ingest_error(&self, failed: Vec<usize>, reason: String) -> RagError {
        RagError::Ingest {
            collection: self.name.clone(),
            failed,
            reason,
        }
    }
}

/// Create schema with the specified vector dimension and metric
fn create_schema(vector_dim: usize, metric: DistanceMetric) -> Arc<Schema> {
    let metadata = HashMap::from([(
        METRIC_METADATA_KEY.to_string(),
        metric.as_str().to_string(),
    )]);

    Arc::new(Schema::new_with_metadata(
        vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("seq", DataType::UInt64, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim as i32,
                ),
                false,
            ),
            Field::new("text", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, true),
            Field::new("created_at", DataType::Utf8, false),
        ],
        metadata,
    ))
}

fn build_record_batch(
    collection_info: &CollectionInfo,
    ids: &[String],
    first_seq: u64,
    vectors: &[EmbeddingVector],
    texts: &[String],
    metadata: Option<&[serde_json::Value]>,
) -> std::result::Result<RecordBatch, String> {
    let len = vectors.len();
    let vector_dim = collection_info.dimension;
    let created_at = chrono::Utc::now().to_rfc3339();

    let metadata_json: Vec<Option<String>> = match metadata {
        Some(entries) => entries
            .iter()
            .map(|value| {
                if value.is_null() {
                    Ok(None)
                } else {
                    serde_json::to_string(value).map(Some)
                }
            })
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| format!("Failed to serialize metadata: {}", e))?,
        None => vec![None; len],
    };

    let mut flat_values = Vec::with_capacity(len * vector_dim);
    for vector in vectors {
        flat_values.extend_from_slice(vector);
    }
    let values_array = Float32Array::from(flat_values);
    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array =
        FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
            .map_err(|e| format!("Failed to create vector array: {}", e))?;

    let seqs: Vec<u64> = (first_seq..first_seq + len as u64).collect();

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from_iter_values(ids)),
        Arc::new(UInt64Array::from(seqs)),
        Arc::new(vector_array),
        Arc::new(StringArray::from_iter_values(texts)),
        Arc::new(StringArray::from(metadata_json)),
        Arc::new(StringArray::from(vec![created_at.as_str(); len])),
    ];

    RecordBatch::try_new(
        create_schema(vector_dim, collection_info.metric),
        arrays,
    )
    .map_err(|e| format!("Failed to create record batch: {}", e))
}

async fn parse_search_results_stream(
    mut results: lancedb::arrow::SendableRecordBatchStream,
    metric: DistanceMetric,
) -> Result<Vec<SearchResult>> {
    let mut search_results = Vec::new();

    while let Some(batch) = results
        .try_next()
        .await
        .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
    {
        search_results.extend(parse_search_batch(&batch, metric)?);
    }

    Ok(search_results)
}

fn typed_column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}

fn parse_search_batch(batch: &RecordBatch, metric: DistanceMetric) -> Result<Vec<SearchResult>> {
    let ids = typed_column::<StringArray>(batch, "id")?;
    let seqs = typed_column::<UInt64Array>(batch, "seq")?;
    let vectors = typed_column::<FixedSizeListArray>(batch, "vector")?;
    let texts = typed_column::<StringArray>(batch, "text")?;
    let metadata = typed_column::<StringArray>(batch, "metadata")?;
    let created_ats = typed_column::<StringArray>(batch, "created_at")?;
    let distances = typed_column::<Float32Array>(batch, "_distance")?;

    let mut search_results = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let vector = vectors
            .value(row)
            .as_any()
            .downcast_ref::<Float32Array>()
            .map(|values| values.values().to_vec())
            .ok_or_else(|| RagError::Database("Invalid vector item type".to_string()))?;

        let metadata = if metadata.is_null(row) {
            None
        } else {
            Some(
                serde_json::from_str(metadata.value(row))
                    .map_err(|e| RagError::Database(format!("Corrupt metadata JSON: {}", e)))?,
            )
        };

        let distance = if distances.is_null(row) {
            0.0
        } else {
            distances.value(row)
        };

        search_results.push(SearchResult {
            record: Record {
                id: ids.value(row).to_string(),
                seq: seqs.value(row),
                vector,
                text: texts.value(row).to_string(),
                metadata,
                created_at: created_ats.value(row).to_string(),
            },
            similarity_score: metric.similarity(distance),
            distance,
        });
    }

    Ok(search_results)
}
