//! Recall@K accumulation
//!
//! Query completions arrive concurrently from dispatcher tasks, so the
//! counters are plain atomics. Values read before the query phase has
//! drained are partial.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{Error, Result};

/// Thread-safe hit/query counters
#[derive(Debug, Default)]
pub struct RecallAggregator {
    hits: AtomicU64,
    queries: AtomicU64,
    /// Sum of k over all recorded queries
    possible: AtomicU64,
    failures: AtomicU64,
}

impl RecallAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one answered query that found `hit_count` of its `k` true neighbors.
    pub fn record_query(&self, hit_count: usize, k: usize) {
        let hits = if hit_count > k {
            tracing::warn!(hit_count, k, "Query matched more neighbors than requested; clamping");
            k
        } else {
            hit_count
        };

        self.queries.fetch_add(1, Ordering::Relaxed);
        self.possible.fetch_add(k as u64, Ordering::Relaxed);
        self.hits.fetch_add(hits as u64, Ordering::Relaxed);
    }

    /// Record a query whose search failed. It counts as a query with no hits.
    pub fn record_failure(&self, k: usize) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.record_query(0, k);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// `hits / (queries * k)`
    pub fn final_recall(&self) -> Result<f64> {
        let queries = self.queries();
        if queries == 0 {
            return Err(Error::Aggregation(
                "recall requested before any query was recorded".to_string(),
            ));
        }

        let possible = self.possible.load(Ordering::Relaxed);
        if possible == 0 {
            return Err(Error::Aggregation(format!(
                "{} queries recorded, all with k = 0",
                queries
            )));
        }

        Ok(self.hits() as f64 / possible as f64)
    }

    pub fn report(&self) -> Result<RecallReport> {
        Ok(RecallReport {
            recall: self.final_recall()?,
            queries: self.queries(),
            hits: self.hits(),
            failures: self.failures(),
        })
    }
}

/// Final recall figures for a query phase
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecallReport {
    pub recall: f64,
    pub queries: u64,
    pub hits: u64,
    pub failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 2_000;
        let recall = RecallAggregator::new();

        std::thread::scope(|scope| {
            for _ in 0..THREADS {
                scope.spawn(|| {
                    for _ in 0..PER_THREAD {
                        recall.record_query(1, 10);
                    }
                });
            }
        });

        let total = (THREADS * PER_THREAD) as u64;
        assert_eq!(recall.queries(), total);
        assert_eq!(recall.hits(), total);
        assert!((recall.final_recall().unwrap() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_zero_queries_is_an_error() {
        let recall = RecallAggregator::new();
        assert!(matches!(recall.final_recall(), Err(Error::Aggregation(_))));
        assert!(recall.report().is_err());
    }

    #[test]
    fn test_failures_count_as_queries() {
        let recall = RecallAggregator::new();
        recall.record_query(4, 4);
        recall.record_failure(4);

        let report = recall.report().unwrap();
        assert_eq!(report.queries, 2);
        assert_eq!(report.failures, 1);
        assert_eq!(report.hits, 4);
        assert_eq!(report.recall, 0.5);
    }

    #[test]
    fn test_hits_never_exceed_k() {
        let recall = RecallAggregator::new();
        recall.record_query(12, 10);
        assert_eq!(recall.hits(), 10);
        assert_eq!(recall.final_recall().unwrap(), 1.0);
    }
}
