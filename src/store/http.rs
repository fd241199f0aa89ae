//! HTTP vector store client
//!
//! Talks to any service exposing the reference namespace API (see
//! [`crate::api`]).

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

use crate::api::handlers::{CreateNamespaceRequest, HealthResponse, UpsertRequest, UpsertResponse};
use crate::query::{QueryRequest, QueryResponse};
use crate::store::{CollectionSpec, VectorStore};
use crate::types::{Document, Vector, VectorId};
use crate::{Error, Result};

/// HTTP store bound to one namespace
pub struct HttpStore {
    client: Client,
    base_url: String,
    namespace: String,
}

impl HttpStore {
    pub fn new(
        endpoint: impl Into<String>,
        namespace: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        let endpoint = endpoint.into();

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
            namespace: namespace.into(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn namespace_url(&self, suffix: &str) -> String {
        format!("{}/v1/namespaces/{}{}", self.base_url, self.namespace, suffix)
    }

    /// Fail fast when the service is unreachable or unhealthy
    pub async fn check_health(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        let health: HealthResponse = self.ensure_success(response).await?.json().await?;

        tracing::info!(
            endpoint = %self.base_url,
            status = %health.status,
            version = %health.version,
            "Connected to vector service",
        );
        Ok(())
    }

    async fn ensure_success(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::NOT_FOUND {
            return Err(Error::NamespaceNotFound(self.namespace.clone()));
        }

        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        Err(Error::store(format!("{} returned {}: {}", url, status, body)))
    }
}

#[async_trait]
impl VectorStore for HttpStore {
    async fn provision(&self, spec: &CollectionSpec) -> Result<()> {
        if spec.name != self.namespace {
            return Err(Error::InvalidRequest(format!(
                "store is bound to namespace '{}', cannot provision '{}'",
                self.namespace, spec.name
            )));
        }

        // Dropping and recreating is the truncate; a missing namespace is fine.
        let response = self.client.delete(self.namespace_url("")).send().await?;
        if response.status() != StatusCode::NOT_FOUND {
            self.ensure_success(response).await?;
        }

        let response = self
            .client
            .put(self.namespace_url(""))
            .json(&CreateNamespaceRequest {
                dimension: spec.dimension,
                metric: spec.metric,
            })
            .send()
            .await?;
        self.ensure_success(response).await?;

        tracing::info!(
            namespace = %self.namespace,
            dimension = spec.dimension,
            metric = ?spec.metric,
            "Provisioned remote namespace",
        );
        Ok(())
    }

    async fn insert(&self, id: VectorId, vector: Vector) -> Result<()> {
        let response = self
            .client
            .post(self.namespace_url("/upsert"))
            .json(&UpsertRequest {
                documents: vec![Document { id, vector }],
            })
            .send()
            .await?;

        let ack: UpsertResponse = self.ensure_success(response).await?.json().await?;
        if ack.count != 1 {
            return Err(Error::store(format!(
                "upsert of vector {} acknowledged {} documents",
                id, ack.count
            )));
        }
        Ok(())
    }

    async fn top_k(&self, vector: Vector, k: usize) -> Result<Vec<VectorId>> {
        let response = self
            .client
            .post(self.namespace_url("/query"))
            .json(&QueryRequest { vector, top_k: k })
            .send()
            .await?;

        let results: QueryResponse = self.ensure_success(response).await?.json().await?;
        Ok(results.ids())
    }

    async fn close(&self) -> Result<()> {
        tracing::debug!(endpoint = %self.base_url, "Closing HTTP store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_url_trims_trailing_slash() {
        let store = HttpStore::new("http://localhost:3000/", "sifttest", Duration::from_secs(1))
            .unwrap();
        assert_eq!(
            store.namespace_url("/query"),
            "http://localhost:3000/v1/namespaces/sifttest/query"
        );
    }
}
