use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::bench::DatasetLimits;
use crate::dispatch::{DispatchConfig, DEFAULT_MAX_IN_FLIGHT};
use crate::store::{CollectionSpec, StoreConfig};
use crate::types::DistanceMetric;

const DEFAULT_CONFIG_PATH: &str = "annbench.toml";
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Top-level application configuration loaded from file + environment.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub dataset: DatasetSection,
    pub dispatch: DispatchSection,
    pub benchmark: BenchmarkSection,
    pub store: StoreSection,
    pub server: ServerConfig,
    pub logging: LoggingSection,
}

impl AppConfig {
    /// Load configuration from disk and environment.
    ///
    /// The file is `path` if given, else `$ANNBENCH_CONFIG`, else
    /// `annbench.toml`; a missing default file is skipped. Environment
    /// variables such as `ANNBENCH_DISPATCH__MAX_IN_FLIGHT` override it.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        match path {
            Some(path) => {
                if !path.exists() {
                    bail!("config file {} does not exist", path.display());
                }
                builder = builder.add_source(config::File::from(path.to_path_buf()));
            }
            None => {
                let config_path = env::var("ANNBENCH_CONFIG")
                    .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
                if Path::new(&config_path).exists() {
                    builder = builder.add_source(config::File::from(PathBuf::from(&config_path)));
                }
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ANNBENCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder.build()?;
        let mut config: Self = settings.try_deserialize()?;

        if config.logging.level.trim().is_empty() {
            config.logging.level = "info".to_string();
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.max_in_flight == 0 {
            bail!("dispatch.max_in_flight must be at least 1");
        }
        if self.benchmark.top_k == 0 {
            bail!("benchmark.top_k must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.benchmark.min_recall) {
            bail!(
                "benchmark.min_recall must be within [0, 1], got {}",
                self.benchmark.min_recall
            );
        }
        if self.benchmark.namespace.trim().is_empty() {
            bail!("benchmark.namespace must not be empty");
        }
        if matches!(self.store.backend, StoreBackendKind::Http) {
            self.store.http_section()?;
        }
        Ok(())
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        let timeout = match self.dispatch.operation_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        DispatchConfig::new(self.dispatch.max_in_flight).with_timeout(timeout)
    }

    /// Resolve the store backend to connect to.
    pub fn store_runtime(&self) -> Result<StoreConfig> {
        match self.store.backend {
            StoreBackendKind::Memory => Ok(StoreConfig::Memory),
            StoreBackendKind::Http => {
                let http = self.store.http_section()?;
                Ok(StoreConfig::Http {
                    endpoint: http.endpoint.trim().to_string(),
                    namespace: self.benchmark.namespace.clone(),
                    request_timeout: Duration::from_millis(http.request_timeout_ms),
                })
            }
        }
    }

    pub fn collection_spec(&self, dimension: usize) -> CollectionSpec {
        CollectionSpec {
            name: self.benchmark.namespace.clone(),
            dimension,
            metric: self.benchmark.metric,
        }
    }

    pub fn limits(&self) -> DatasetLimits {
        DatasetLimits {
            max_vectors: self.dataset.max_vectors,
            max_queries: self.dataset.max_queries,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatasetSection {
    pub base_path: PathBuf,
    pub query_path: PathBuf,
    pub ground_truth_path: PathBuf,
    pub max_vectors: Option<u64>,
    pub max_queries: Option<u64>,
}

impl Default for DatasetSection {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("sift-data/base.fvecs"),
            query_path: PathBuf::from("sift-data/query.fvecs"),
            ground_truth_path: PathBuf::from("sift-data/groundtruth.ivecs"),
            max_vectors: None,
            max_queries: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
    pub max_in_flight: usize,
    /// 0 disables the per-operation timeout
    pub operation_timeout_ms: u64,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BenchmarkSection {
    pub top_k: usize,
    pub min_recall: f64,
    pub namespace: String,
    pub metric: DistanceMetric,
}

impl Default for BenchmarkSection {
    fn default() -> Self {
        Self {
            top_k: 100,
            min_recall: 0.975,
            namespace: "sifttest".to_string(),
            metric: DistanceMetric::L2,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StoreSection {
    pub backend: StoreBackendKind,
    pub http: Option<HttpStoreSection>,
}

impl StoreSection {
    fn http_section(&self) -> Result<&HttpStoreSection> {
        let http = self
            .http
            .as_ref()
            .context("store.http configuration required when backend is 'http'")?;

        if http.endpoint.trim().is_empty() {
            bail!("store.http.endpoint must be specified");
        }
        Ok(http)
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendKind {
    #[default]
    Memory,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpStoreSection {
    pub endpoint: String,
    pub request_timeout_ms: u64,
}

impl Default for HttpStoreSection {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Text,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();

        assert_eq!(config.benchmark.top_k, 100);
        assert_eq!(config.dispatch.max_in_flight, 100);
        assert!(matches!(config.store_runtime().unwrap(), StoreConfig::Memory));

        let dispatch = config.dispatch_config();
        assert_eq!(dispatch.operation_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_zero_timeout_disables_it() {
        let mut config = AppConfig::default();
        config.dispatch.operation_timeout_ms = 0;
        assert_eq!(config.dispatch_config().operation_timeout, None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
[dataset]
base_path = "data/base.fvecs"
max_queries = 50

[dispatch]
max_in_flight = 8

[benchmark]
top_k = 10
metric = "cosine"

[store]
backend = "http"

[store.http]
endpoint = "http://localhost:3000"
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.dataset.base_path, PathBuf::from("data/base.fvecs"));
        assert_eq!(config.limits().max_queries, Some(50));
        assert_eq!(config.dispatch.max_in_flight, 8);
        assert_eq!(config.collection_spec(128).metric, DistanceMetric::Cosine);

        match config.store_runtime().unwrap() {
            StoreConfig::Http {
                endpoint,
                namespace,
                request_timeout,
            } => {
                assert_eq!(endpoint, "http://localhost:3000");
                assert_eq!(namespace, "sifttest");
                assert_eq!(request_timeout, Duration::from_secs(10));
            }
            other => panic!("unexpected store config: {other:?}"),
        }
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(AppConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
