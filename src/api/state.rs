//! API server state

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use crate::store::MemoryStore;
use crate::types::DistanceMetric;
use crate::{Error, Result};

/// API server state: one exact store per namespace
#[derive(Clone, Default)]
pub struct AppState {
    namespaces: Arc<DashMap<String, Arc<MemoryStore>>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a namespace. Returns `false` if an identical one already exists.
    pub fn create_namespace(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<bool> {
        if dimension == 0 {
            return Err(Error::InvalidRequest(
                "dimension must be at least 1".to_string(),
            ));
        }

        match self.namespaces.entry(name.to_string()) {
            Entry::Occupied(existing) => {
                let store = existing.get();
                if store.dimension() != Some(dimension) || store.metric() != metric {
                    return Err(Error::InvalidRequest(format!(
                        "Namespace '{}' already exists with a different layout",
                        name
                    )));
                }
                Ok(false)
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(MemoryStore::with_layout(dimension, metric)));
                Ok(true)
            }
        }
    }

    /// Drop a namespace and all of its vectors
    pub fn drop_namespace(&self, name: &str) -> Result<()> {
        self.namespaces
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::NamespaceNotFound(name.to_string()))
    }

    pub fn get_namespace(&self, name: &str) -> Result<Arc<MemoryStore>> {
        self.namespaces
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::NamespaceNotFound(name.to_string()))
    }

    pub fn namespace_count(&self) -> usize {
        self.namespaces.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_lifecycle() {
        let state = AppState::new();

        assert!(state.create_namespace("sift", 4, DistanceMetric::L2).unwrap());
        assert!(!state.create_namespace("sift", 4, DistanceMetric::L2).unwrap());
        assert!(state.create_namespace("sift", 8, DistanceMetric::L2).is_err());
        assert_eq!(state.namespace_count(), 1);

        state.drop_namespace("sift").unwrap();
        assert!(matches!(
            state.get_namespace("sift"),
            Err(Error::NamespaceNotFound(_))
        ));
        assert!(state.drop_namespace("sift").is_err());
    }
}
