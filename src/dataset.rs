//! Synthetic benchmark datasets
//!
//! Writes a base file, a query file and an exact ground-truth file in the
//! container format read by [`crate::codec`]. Output is fully determined by
//! the seed.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::codec::{write_ground_truth, write_vectors};
use crate::types::{nearest_neighbors, DistanceMetric, Vector, VectorId};
use crate::{Error, Result};

pub const BASE_FILE: &str = "base.fvecs";
pub const QUERY_FILE: &str = "query.fvecs";
pub const GROUND_TRUTH_FILE: &str = "groundtruth.ivecs";

/// Shape of a generated dataset
#[derive(Debug, Clone, Copy)]
pub struct DatasetSpec {
    pub base: usize,
    pub queries: usize,
    pub dimension: usize,
    pub k: usize,
    pub seed: u64,
    pub metric: DistanceMetric,
}

impl Default for DatasetSpec {
    fn default() -> Self {
        Self {
            base: 10_000,
            queries: 100,
            dimension: 128,
            k: 100,
            seed: 42,
            metric: DistanceMetric::L2,
        }
    }
}

impl DatasetSpec {
    fn validate(&self) -> Result<()> {
        if self.base == 0 || self.queries == 0 {
            return Err(Error::InvalidRequest(
                "dataset needs at least one base and one query vector".to_string(),
            ));
        }
        if self.dimension == 0 {
            return Err(Error::InvalidRequest("dimension must be at least 1".to_string()));
        }
        if self.k == 0 || self.k > self.base {
            return Err(Error::InvalidRequest(format!(
                "k must be within 1..={}, got {}",
                self.base, self.k
            )));
        }
        if self.base > i32::MAX as usize {
            return Err(Error::InvalidRequest(format!(
                "{} base vectors cannot be keyed by 32-bit ids",
                self.base
            )));
        }
        Ok(())
    }
}

/// Files written by [`generate`]
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedDataset {
    pub base_path: PathBuf,
    pub query_path: PathBuf,
    pub ground_truth_path: PathBuf,
    pub base: u64,
    pub queries: u64,
    pub dimension: usize,
    pub k: usize,
}

fn random_vectors(rng: &mut fastrand::Rng, count: usize, dimension: usize) -> Vec<Vector> {
    (0..count)
        .map(|_| (0..dimension).map(|_| rng.f32() * 256.0).collect())
        .collect()
}

/// Generate a dataset under `dir`, creating the directory if needed.
pub async fn generate(dir: impl AsRef<Path>, spec: &DatasetSpec) -> Result<GeneratedDataset> {
    spec.validate()?;
    let dir = dir.as_ref();
    tokio::fs::create_dir_all(dir).await?;

    let mut rng = fastrand::Rng::with_seed(spec.seed);
    let base = random_vectors(&mut rng, spec.base, spec.dimension);
    let queries = random_vectors(&mut rng, spec.queries, spec.dimension);

    let neighbors: Vec<Vec<VectorId>> = queries
        .iter()
        .map(|query| {
            let candidates = base
                .iter()
                .enumerate()
                .map(|(id, v)| (id as VectorId, v.as_slice()));
            nearest_neighbors(candidates, query, spec.k, spec.metric)
                .into_iter()
                .map(|(id, _)| id)
                .collect()
        })
        .collect();

    let dataset = GeneratedDataset {
        base_path: dir.join(BASE_FILE),
        query_path: dir.join(QUERY_FILE),
        ground_truth_path: dir.join(GROUND_TRUTH_FILE),
        base: write_vectors(dir.join(BASE_FILE), &base).await?,
        queries: write_vectors(dir.join(QUERY_FILE), &queries).await?,
        dimension: spec.dimension,
        k: spec.k,
    };
    write_ground_truth(&dataset.ground_truth_path, &neighbors).await?;

    tracing::info!(
        dir = %dir.display(),
        base = dataset.base,
        queries = dataset.queries,
        dimension = dataset.dimension,
        k = dataset.k,
        "Generated dataset",
    );
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{GroundTruthReader, VectorReader};
    use tempfile::TempDir;

    fn small() -> DatasetSpec {
        DatasetSpec {
            base: 200,
            queries: 5,
            dimension: 16,
            k: 10,
            seed: 7,
            metric: DistanceMetric::L2,
        }
    }

    #[tokio::test]
    async fn test_generate_writes_all_files() {
        let dir = TempDir::new().unwrap();
        let dataset = generate(dir.path(), &small()).await.unwrap();

        assert_eq!(dataset.base, 200);
        assert_eq!(dataset.queries, 5);

        let mut truth = GroundTruthReader::open(&dataset.ground_truth_path).await.unwrap();
        let mut sets = 0;
        while let Some(set) = truth.next_set().await.unwrap() {
            assert_eq!(set.len(), 10);
            assert!(set.iter().all(|id| *id < 200));
            sets += 1;
        }
        assert_eq!(sets, 5);
    }

    #[tokio::test]
    async fn test_same_seed_same_output() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        generate(a.path(), &small()).await.unwrap();
        generate(b.path(), &small()).await.unwrap();

        for file in [BASE_FILE, QUERY_FILE, GROUND_TRUTH_FILE] {
            let left = tokio::fs::read(a.path().join(file)).await.unwrap();
            let right = tokio::fs::read(b.path().join(file)).await.unwrap();
            assert_eq!(left, right, "{} differs", file);
        }

        let mut reader = VectorReader::open(a.path().join(BASE_FILE)).await.unwrap();
        assert_eq!(reader.next_vector().await.unwrap().unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_k_larger_than_base_rejected() {
        let dir = TempDir::new().unwrap();
        let spec = DatasetSpec {
            k: 500,
            ..small()
        };
        assert!(matches!(
            generate(dir.path(), &spec).await,
            Err(Error::InvalidRequest(_))
        ));
    }
}
