//! JSON-RPC plumbing
//!
//! `HttpRpc` is an HTTP JSON-RPC client with URL failover and a bounded
//! request timeout. The `JsonRpc` trait is the seam used by the account
//! builder and middleware clients, and is what tests mock.

use crate::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Object-safe JSON-RPC transport
#[async_trait]
pub trait JsonRpc: Send + Sync {
    /// Perform a single JSON-RPC call, returning the raw `result` value
    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value>;
}

/// Perform a call and deserialize the result
pub async fn call_typed<T: DeserializeOwned>(
    rpc: &dyn JsonRpc,
    method: &str,
    params: serde_json::Value,
) -> Result<T> {
    let value = rpc.call(method, params).await?;
    serde_json::from_value(value)
        .map_err(|e| Error::Rpc(format!("Failed to deserialize result: {}", e)))
}

/// HTTP JSON-RPC client with failover support
#[derive(Clone)]
pub struct HttpRpc {
    urls: Vec<String>,
    client: reqwest::Client,
    current_index: Arc<AtomicUsize>,
}

impl HttpRpc {
    /// Create a new client with failover URLs and the default timeout
    pub fn new(urls: Vec<String>) -> Result<Self> {
        Self::with_timeout(urls, 30)
    }

    /// Create a new client with an explicit request timeout
    pub fn with_timeout(urls: Vec<String>, timeout_secs: u64) -> Result<Self> {
        if urls.is_empty() || urls.iter().any(|u| u.trim().is_empty()) {
            return Err(Error::InvalidConfig(
                "At least one non-empty RPC URL required".into(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::Rpc(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            urls,
            client,
            current_index: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Create a client for a single endpoint
    pub fn single(url: impl Into<String>) -> Result<Self> {
        Self::new(vec![url.into()])
    }

    /// Get the current RPC URL
    fn current_url(&self) -> &str {
        let idx = self.current_index.load(Ordering::Relaxed);
        &self.urls[idx % self.urls.len()]
    }

    /// Rotate to the next RPC URL
    fn rotate_url(&self) {
        self.current_index.fetch_add(1, Ordering::Relaxed);
    }

    async fn make_request(
        &self,
        url: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let request_body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let response = self
            .client
            .post(url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| Error::Rpc(format!("RPC request failed: {}", e)))?;

        let response_body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Rpc(format!("Failed to parse RPC response: {}", e)))?;

        if let Some(error) = response_body.get("error") {
            return Err(Error::Rpc(format!("RPC error: {}", error)));
        }

        response_body
            .get("result")
            .cloned()
            .ok_or_else(|| Error::Rpc("Missing result in RPC response".into()))
    }
}

#[async_trait]
impl JsonRpc for HttpRpc {
    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let mut last_error = None;

        for _ in 0..self.urls.len() {
            let url = self.current_url().to_string();

            match self.make_request(&url, method, params.clone()).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    tracing::warn!(%url, %method, error = %e, "RPC request failed");
                    last_error = Some(e);
                    self.rotate_url();
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Rpc("All RPC endpoints failed".into())))
    }
}

impl std::fmt::Debug for HttpRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRpc")
            .field("urls", &self.urls)
            .field("current_index", &self.current_index.load(Ordering::Relaxed))
            .finish()
    }
}
