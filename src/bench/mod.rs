//! Benchmark orchestration
//!
//! Two phases run against one store through one bounded dispatcher:
//! - Ingest: every base vector becomes a keyed insert, keyed by its position.
//! - Query: every query vector becomes a top-k search whose result ids are
//!   matched against the ground-truth record at the same position.
//!
//! Each phase waits for its operations to drain before returning, including
//! when it stops early on a decode or dispatch error.

use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;

use crate::codec::{GroundTruthReader, VectorReader};
use crate::dispatch::{BoundedDispatcher, DispatchConfig, DispatchStats, LogFailures};
use crate::recall::{RecallAggregator, RecallReport};
use crate::store::VectorStore;
use crate::types::{GroundTruthSet, Vector, VectorId};
use crate::{Error, Result};

/// Optional caps on how much of each input file is used
#[derive(Debug, Clone, Copy, Default)]
pub struct DatasetLimits {
    pub max_vectors: Option<u64>,
    pub max_queries: Option<u64>,
}

/// Outcome of the ingest phase
#[derive(Debug, Clone, Copy, Serialize)]
pub struct IngestReport {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

impl IngestReport {
    /// Completed writes per second
    pub fn throughput(&self) -> f64 {
        per_second(self.succeeded + self.failed, self.elapsed)
    }
}

/// Outcome of the query phase
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueryReport {
    pub k: usize,
    #[serde(flatten)]
    pub recall: RecallReport,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

impl QueryReport {
    /// Completed queries per second
    pub fn throughput(&self) -> f64 {
        per_second(self.recall.queries, self.elapsed)
    }
}

fn per_second(operations: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        0.0
    } else {
        operations as f64 / secs
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}

/// Drives ingest and query phases against a vector store
pub struct Benchmark {
    store: Arc<dyn VectorStore>,
    dispatcher: BoundedDispatcher,
    limits: DatasetLimits,
}

impl Benchmark {
    pub fn new(store: Arc<dyn VectorStore>, config: DispatchConfig) -> Result<Self> {
        Ok(Self {
            store,
            dispatcher: BoundedDispatcher::new(config)?,
            limits: DatasetLimits::default(),
        })
    }

    pub fn with_limits(mut self, limits: DatasetLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn dispatcher(&self) -> &BoundedDispatcher {
        &self.dispatcher
    }

    /// Insert every vector of the base file, keyed by position.
    pub async fn ingest(&self, path: impl AsRef<Path>) -> Result<IngestReport> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "Starting ingest");
        self.ingest_from(VectorReader::open(path).await?).await
    }

    pub async fn ingest_from<R>(&self, reader: VectorReader<R>) -> Result<IngestReport>
    where
        R: AsyncRead + Unpin,
    {
        let vectors = limit(reader.into_stream(), self.limits.max_vectors);
        let before = self.dispatcher.stats();
        let start = Instant::now();

        let store = self.store.clone();
        let outcome = self
            .dispatcher
            .dispatch(
                vectors,
                move |index, vector: Vector| {
                    if vector.is_empty() {
                        return Err(Error::InvalidVector(format!(
                            "base vector {} has no components",
                            index
                        )));
                    }
                    let store = store.clone();
                    Ok(async move { store.insert(index, vector).await })
                },
                LogFailures::new("ingest"),
            )
            .await;

        self.finish_phase("ingest").await?;
        outcome?;

        let stats = self.dispatcher.stats().since(&before);
        let report = IngestReport {
            submitted: stats.dispatched,
            succeeded: stats.succeeded,
            failed: stats.failed,
            elapsed: start.elapsed(),
        };

        tracing::info!(
            submitted = report.submitted,
            failed = report.failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            per_sec = report.throughput(),
            "Ingest complete",
        );
        Ok(report)
    }

    /// Run every query of `query_path` and score it against `ground_truth_path`.
    pub async fn run_queries(
        &self,
        query_path: impl AsRef<Path>,
        ground_truth_path: impl AsRef<Path>,
        k: usize,
    ) -> Result<QueryReport> {
        let query_path = query_path.as_ref();
        let ground_truth_path = ground_truth_path.as_ref();
        tracing::info!(
            queries = %query_path.display(),
            ground_truth = %ground_truth_path.display(),
            k,
            "Starting queries",
        );

        let queries = VectorReader::open(query_path).await?;
        let truth = GroundTruthReader::open(ground_truth_path).await?;
        self.run_queries_from(queries, truth, k).await
    }

    pub async fn run_queries_from<Q, G>(
        &self,
        queries: VectorReader<Q>,
        truth: GroundTruthReader<G>,
        k: usize,
    ) -> Result<QueryReport>
    where
        Q: AsyncRead + Unpin,
        G: AsyncRead + Unpin,
    {
        if k == 0 {
            return Err(Error::InvalidRequest("k must be at least 1".to_string()));
        }

        let pairs = limit(paired(queries, truth), self.limits.max_queries);
        let recall = Arc::new(RecallAggregator::new());
        let start = Instant::now();

        let store = self.store.clone();
        let completed = recall.clone();
        let failed = recall.clone();
        let outcome = self
            .dispatcher
            .dispatch(
                pairs,
                move |_, (vector, truth): (Vector, GroundTruthSet)| {
                    let store = store.clone();
                    let recall = completed.clone();
                    Ok(async move {
                        let found: HashSet<VectorId> =
                            store.top_k(vector, k).await?.into_iter().collect();
                        recall.record_query(found.intersection(&truth).count(), k);
                        Ok::<_, Error>(())
                    })
                },
                move |index: u64, error: Error| {
                    tracing::warn!(phase = "query", index, error = %error, "Query failed");
                    failed.record_failure(k);
                },
            )
            .await;

        self.finish_phase("query").await?;
        outcome?;

        let report = QueryReport {
            k,
            recall: recall.report()?,
            elapsed: start.elapsed(),
        };

        tracing::info!(
            queries = report.recall.queries,
            failures = report.recall.failures,
            recall = report.recall.recall,
            elapsed_ms = report.elapsed.as_millis() as u64,
            per_sec = report.throughput(),
            "Queries complete",
        );
        Ok(report)
    }

    async fn finish_phase(&self, phase: &'static str) -> Result<()> {
        if let Some(oldest) = self.dispatcher.pending_operations().first() {
            tracing::debug!(
                phase,
                in_flight = self.dispatcher.in_flight(),
                oldest_index = oldest.index,
                oldest_age_ms = oldest.started_at.elapsed().as_millis() as u64,
                "Draining outstanding operations",
            );
        }
        self.dispatcher.drain().await
    }

    /// Cumulative counts across both phases
    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }
}

fn limit<S>(items: S, max: Option<u64>) -> impl Stream<Item = S::Item>
where
    S: Stream,
{
    let max = max.map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));
    items.take(max)
}

/// Pair each query with the ground-truth record at the same position.
///
/// Pairing happens in the decode loop, before dispatch, so completion order
/// cannot disturb it.
fn paired<Q, G>(
    queries: VectorReader<Q>,
    truth: GroundTruthReader<G>,
) -> impl Stream<Item = Result<(Vector, GroundTruthSet)>>
where
    Q: AsyncRead + Unpin,
    G: AsyncRead + Unpin,
{
    stream::try_unfold((queries, truth), |(mut queries, mut truth)| async move {
        let vector = match queries.next_vector().await? {
            Some(vector) => vector,
            None => return Ok(None),
        };

        let neighbors = truth.next_set().await?.ok_or_else(|| {
            Error::malformed(
                truth.records_read(),
                format!(
                    "ground truth ended before query {}",
                    queries.records_read() - 1
                ),
            )
        })?;

        Ok::<_, Error>(Some(((vector, neighbors), (queries, truth))))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use bytes::BytesMut;
    use std::io::Cursor;

    fn vectors(records: &[Vec<f32>]) -> VectorReader<Cursor<Vec<u8>>> {
        let mut buf = BytesMut::new();
        for r in records {
            crate::codec::encode_vector_record(&mut buf, r).unwrap();
        }
        VectorReader::new(Cursor::new(buf.to_vec()))
    }

    fn truth(records: &[Vec<VectorId>]) -> GroundTruthReader<Cursor<Vec<u8>>> {
        let mut buf = BytesMut::new();
        for r in records {
            crate::codec::encode_id_record(&mut buf, r).unwrap();
        }
        GroundTruthReader::new(Cursor::new(buf.to_vec()))
    }

    #[tokio::test]
    async fn test_limits_truncate_inputs() {
        let store = Arc::new(MemoryStore::new());
        let bench = Benchmark::new(store.clone(), DispatchConfig::new(4))
            .unwrap()
            .with_limits(DatasetLimits {
                max_vectors: Some(3),
                max_queries: Some(1),
            });

        let base: Vec<Vec<f32>> = (0..10).map(|i| vec![i as f32, 0.0]).collect();
        let ingest = bench.ingest_from(vectors(&base)).await.unwrap();
        assert_eq!(ingest.submitted, 3);
        assert_eq!(store.len(), 3);

        let report = bench
            .run_queries_from(
                vectors(&[vec![0.0, 0.0], vec![2.0, 0.0]]),
                truth(&[vec![0], vec![2]]),
                1,
            )
            .await
            .unwrap();
        assert_eq!(report.recall.queries, 1);
        assert_eq!(report.recall.recall, 1.0);
    }

    #[tokio::test]
    async fn test_empty_vector_aborts_ingest() {
        let store = Arc::new(MemoryStore::new());
        let bench = Benchmark::new(store, DispatchConfig::new(2)).unwrap();

        let result = bench
            .ingest_from(vectors(&[vec![1.0], vec![], vec![2.0]]))
            .await;

        assert!(matches!(result, Err(Error::Dispatch { index: 1, .. })));
        assert_eq!(bench.dispatcher().available_permits(), 2);
        assert_eq!(bench.stats().dispatched, 1);
    }

    #[tokio::test]
    async fn test_zero_k_rejected() {
        let bench = Benchmark::new(Arc::new(MemoryStore::new()), DispatchConfig::new(1)).unwrap();
        let result = bench
            .run_queries_from(vectors(&[vec![1.0]]), truth(&[vec![0]]), 0)
            .await;
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_throughput() {
        let report = IngestReport {
            submitted: 10,
            succeeded: 8,
            failed: 2,
            elapsed: Duration::from_millis(500),
        };
        assert_eq!(report.throughput(), 20.0);
    }
}
