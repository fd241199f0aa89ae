//! Query wire types shared by the reference service and the HTTP store client

use serde::{Deserialize, Serialize};

use crate::types::{Vector, VectorId};

/// Query request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub vector: Vector,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    10
}

/// Query response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub results: Vec<QueryResult>,
    pub took_ms: u64,
}

/// Single query result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub id: VectorId,
    pub score: f32,
}

impl QueryResponse {
    /// Result ids, closest first
    pub fn ids(&self) -> Vec<VectorId> {
        self.results.iter().map(|r| r.id).collect()
    }
}
