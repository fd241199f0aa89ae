//! annbench - Recall benchmark harness for approximate nearest-neighbor stores
//!
//! annbench streams a base vector file into a vector store, replays a query
//! file against it and scores the results against exact ground truth:
//! - Lazy decoding of little-endian `fvecs`/`ivecs` containers
//! - Bounded concurrent dispatch with a drain barrier
//! - Lock-free recall aggregation
//! - Pluggable stores (exact in-memory, or any service speaking the HTTP API)
//! - A reference HTTP service and a synthetic dataset generator

pub mod api;
pub mod bench;
pub mod codec;
pub mod config;
pub mod dataset;
pub mod dispatch;
pub mod error;
pub mod query;
pub mod recall;
pub mod store;
pub mod types;

pub use error::{Error, Result};
