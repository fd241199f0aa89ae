//! Vector store abstraction layer
//!
//! The benchmark only needs two remote operations (keyed write and top-k
//! query) plus an explicit lifecycle around them. Stores are constructed
//! once and passed around as `Arc<dyn VectorStore>`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::{DistanceMetric, Vector, VectorId};
use crate::Result;

pub mod http;
pub mod memory;

pub use http::HttpStore;
pub use memory::MemoryStore;

/// Vector store backend trait
///
/// Implementations must be safe to call concurrently and every call must
/// eventually resolve.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if it does not exist, then remove all its vectors
    async fn provision(&self, spec: &CollectionSpec) -> Result<()>;

    /// Write one vector under `id`
    async fn insert(&self, id: VectorId, vector: Vector) -> Result<()>;

    /// Ids of the `k` vectors closest to `vector`
    async fn top_k(&self, vector: Vector, k: usize) -> Result<Vec<VectorId>>;

    /// Release the store's resources
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Shape of the collection the benchmark writes into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
}

/// Store configuration
#[derive(Debug, Clone)]
pub enum StoreConfig {
    /// Exact in-process store
    Memory,
    /// Remote store speaking the reference HTTP API
    Http {
        endpoint: String,
        namespace: String,
        request_timeout: Duration,
    },
}

/// Close `store` once the work that used it has finished.
///
/// An error already in `outcome` wins over a close failure, which is then
/// only logged.
pub async fn close_store<T>(store: &dyn VectorStore, outcome: Result<T>) -> Result<T> {
    let closed = store.close().await;
    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(err), closed) => {
            if let Err(close_err) = closed {
                tracing::warn!(error = %close_err, "Failed to close store after an aborted run");
            }
            Err(err)
        }
    }
}

/// Create store backend from config
pub async fn create_store(config: StoreConfig) -> Result<Box<dyn VectorStore>> {
    match config {
        StoreConfig::Memory => Ok(Box::new(MemoryStore::new())),
        StoreConfig::Http {
            endpoint,
            namespace,
            request_timeout,
        } => {
            let store = HttpStore::new(endpoint, namespace, request_timeout)?;
            store.check_health().await?;
            Ok(Box::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct UnclosableStore {
        close_called: AtomicBool,
    }

    #[async_trait]
    impl VectorStore for UnclosableStore {
        async fn provision(&self, _spec: &CollectionSpec) -> Result<()> {
            Ok(())
        }

        async fn insert(&self, _id: VectorId, _vector: Vector) -> Result<()> {
            Ok(())
        }

        async fn top_k(&self, _vector: Vector, _k: usize) -> Result<Vec<VectorId>> {
            Ok(Vec::new())
        }

        async fn close(&self) -> Result<()> {
            self.close_called.store(true, Ordering::SeqCst);
            Err(Error::store("connection reset during close"))
        }
    }

    #[tokio::test]
    async fn test_run_error_wins_over_close_error() {
        let store = UnclosableStore::default();
        let outcome: Result<()> = Err(Error::malformed(3, "truncated payload"));

        let result = close_store(&store, outcome).await;
        assert!(matches!(result, Err(Error::MalformedRecord { record: 3, .. })));
        assert!(store.close_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_close_error_surfaces_after_success() {
        let store = UnclosableStore::default();
        let result = close_store(&store, Ok(7)).await;
        assert!(matches!(result, Err(Error::Store(_))));
    }

    #[tokio::test]
    async fn test_clean_close_returns_value() {
        let store = MemoryStore::new();
        assert_eq!(close_store(&store, Ok(7)).await.unwrap(), 7);
    }
}
