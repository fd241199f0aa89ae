//! Core types for annbench

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Vector key type. Keys are the zero-based position of the vector in the base file.
pub type VectorId = u64;

/// Vector type
pub type Vector = Vec<f32>;

/// Exact neighbor ids for one query
pub type GroundTruthSet = HashSet<VectorId>;

/// A keyed vector as sent to and stored by a vector store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: VectorId,
    pub vector: Vector,
}

/// Distance metric for vector search
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    #[default]
    L2,
    Dot,
}

impl DistanceMetric {
    /// Distance between two vectors of equal dimension. Smaller is closer.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let d = x - y;
                    d * d
                })
                .sum(),
            DistanceMetric::Dot => -dot(a, b),
            DistanceMetric::Cosine => {
                let norm = (dot(a, a) * dot(b, b)).sqrt();
                if norm == 0.0 {
                    1.0
                } else {
                    1.0 - dot(a, b) / norm
                }
            }
        }
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "l2" | "euclidean" => Ok(DistanceMetric::L2),
            "cosine" => Ok(DistanceMetric::Cosine),
            "dot" => Ok(DistanceMetric::Dot),
            other => Err(crate::Error::InvalidRequest(format!(
                "unsupported distance metric: {}",
                other
            ))),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[derive(Debug)]
struct Candidate {
    distance: f32,
    id: VectorId,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.id.cmp(&other.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Exact k nearest neighbors of `query`, closest first.
///
/// Ties on distance are broken by ascending id so results are deterministic.
pub fn nearest_neighbors<'a, I>(
    candidates: I,
    query: &[f32],
    k: usize,
    metric: DistanceMetric,
) -> Vec<(VectorId, f32)>
where
    I: IntoIterator<Item = (VectorId, &'a [f32])>,
{
    if k == 0 {
        return Vec::new();
    }

    let candidates = candidates.into_iter();
    // Max-heap holding the k best seen so far; the root is the worst of them.
    // Sized from the candidates, never from k alone.
    let (expected, _) = candidates.size_hint();
    let mut heap = BinaryHeap::with_capacity(k.min(expected).saturating_add(1));
    for (id, vector) in candidates {
        heap.push(Candidate {
            distance: metric.distance(query, vector),
            id,
        });
        if heap.len() > k {
            heap.pop();
        }
    }

    heap.into_sorted_vec()
        .into_iter()
        .map(|c| (c.id, c.distance))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_nearest() {
        let corpus = [vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]];
        let results = nearest_neighbors(
            corpus.iter().enumerate().map(|(i, v)| (i as VectorId, v.as_slice())),
            &[1.0, 0.0],
            1,
            DistanceMetric::L2,
        );
        assert_eq!(results, vec![(0, 0.0)]);
    }

    #[test]
    fn test_ties_broken_by_id() {
        let corpus = [vec![0.0, 1.0], vec![1.0, 0.0], vec![0.0, 1.0]];
        let results = nearest_neighbors(
            corpus.iter().enumerate().map(|(i, v)| (i as VectorId, v.as_slice())),
            &[0.0, 1.0],
            2,
            DistanceMetric::L2,
        );
        let ids: Vec<_> = results.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn test_k_beyond_corpus_returns_every_candidate() {
        let corpus = [vec![1.0, 0.0], vec![3.0, 0.0]];
        for k in [1usize << 40, usize::MAX] {
            let results = nearest_neighbors(
                corpus.iter().enumerate().map(|(i, v)| (i as VectorId, v.as_slice())),
                &[1.0, 0.0],
                k,
                DistanceMetric::L2,
            );
            assert_eq!(results, vec![(0, 0.0), (1, 4.0)]);
        }
    }

    #[test]
    fn test_cosine_ignores_magnitude() {
        let metric = DistanceMetric::Cosine;
        assert!(metric.distance(&[2.0, 0.0], &[5.0, 0.0]).abs() < 1e-6);
        assert_eq!(metric.distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn test_metric_from_str() {
        assert_eq!("L2".parse::<DistanceMetric>().unwrap(), DistanceMetric::L2);
        assert_eq!("dot".parse::<DistanceMetric>().unwrap(), DistanceMetric::Dot);
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }
}
