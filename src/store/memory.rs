//! Exact in-process vector store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::store::{CollectionSpec, VectorStore};
use crate::types::{nearest_neighbors, DistanceMetric, Vector, VectorId};
use crate::{Error, Result};

struct Collection {
    /// Fixed by provisioning, or by the first insert otherwise
    dimension: Option<usize>,
    metric: DistanceMetric,
    vectors: HashMap<VectorId, Vector>,
}

/// Brute-force store returning exact neighbors
///
/// Serves as the recall baseline and as the backing collection of the
/// reference HTTP service.
pub struct MemoryStore {
    collection: RwLock<Collection>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collection: RwLock::new(Collection {
                dimension: None,
                metric: DistanceMetric::default(),
                vectors: HashMap::new(),
            }),
        }
    }

    pub fn with_layout(dimension: usize, metric: DistanceMetric) -> Self {
        let store = Self::new();
        if let Ok(mut collection) = store.collection.write() {
            collection.dimension = Some(dimension);
            collection.metric = metric;
        }
        store
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Collection>> {
        self.collection
            .read()
            .map_err(|_| Error::internal("memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Collection>> {
        self.collection
            .write()
            .map_err(|_| Error::internal("memory store lock poisoned"))
    }

    /// Number of stored vectors
    pub fn len(&self) -> usize {
        self.read().map(|c| c.vectors.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> Option<usize> {
        self.read().ok().and_then(|c| c.dimension)
    }

    pub fn metric(&self) -> DistanceMetric {
        self.read().map(|c| c.metric).unwrap_or_default()
    }

    pub fn upsert(&self, id: VectorId, vector: Vector) -> Result<()> {
        if vector.is_empty() {
            return Err(Error::InvalidVector(format!("vector {} is empty", id)));
        }

        let mut collection = self.write()?;
        match collection.dimension {
            Some(dimension) if dimension != vector.len() => {
                return Err(Error::InvalidVector(format!(
                    "Vector dimension mismatch: expected {}, got {}",
                    dimension,
                    vector.len()
                )));
            }
            Some(_) => {}
            None => collection.dimension = Some(vector.len()),
        }

        collection.vectors.insert(id, vector);
        Ok(())
    }

    /// Exact `k` nearest neighbors with their distances, closest first
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(VectorId, f32)>> {
        let collection = self.read()?;
        if let Some(dimension) = collection.dimension {
            if dimension != query.len() {
                return Err(Error::InvalidVector(format!(
                    "Query dimension mismatch: expected {}, got {}",
                    dimension,
                    query.len()
                )));
            }
        }

        Ok(nearest_neighbors(
            collection
                .vectors
                .iter()
                .map(|(id, vector)| (*id, vector.as_slice())),
            query,
            k,
            collection.metric,
        ))
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn provision(&self, spec: &CollectionSpec) -> Result<()> {
        if spec.dimension == 0 {
            return Err(Error::InvalidRequest(format!(
                "collection '{}' needs a dimension of at least 1",
                spec.name
            )));
        }

        let mut collection = self.write()?;
        collection.dimension = Some(spec.dimension);
        collection.metric = spec.metric;
        collection.vectors.clear();

        tracing::info!(
            collection = %spec.name,
            dimension = spec.dimension,
            metric = ?spec.metric,
            "Provisioned in-memory collection",
        );
        Ok(())
    }

    async fn insert(&self, id: VectorId, vector: Vector) -> Result<()> {
        self.upsert(id, vector)
    }

    async fn top_k(&self, vector: Vector, k: usize) -> Result<Vec<VectorId>> {
        Ok(self
            .search(&vector, k)?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }
}
