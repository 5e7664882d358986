//! HTTP client for the registry API

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use tracing::debug;

use super::error::RegistryError;
use super::types::{CodeId, CodeRecord, ErrorBody};
use super::Registry;
use crate::config::RegistryClientConfig;

/// reqwest-backed implementation of [`Registry`]
pub struct HttpRegistry {
    base_url: String,
    http: reqwest::Client,
}

impl HttpRegistry {
    pub fn new(config: &RegistryClientConfig) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                RegistryError::Unavailable(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map a non-success response to the registry error taxonomy, keeping
    /// the server's error message when the body carries one.
    async fn error_from(response: reqwest::Response, context: &str) -> RegistryError {
        let status = response.status();
        let detail = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| format!("{} returned {}", context, status));

        match status {
            StatusCode::CONFLICT => RegistryError::Conflict(detail),
            StatusCode::NOT_FOUND => RegistryError::NotFound(detail),
            StatusCode::UNPROCESSABLE_ENTITY => RegistryError::Rejected(detail),
            _ => RegistryError::Unavailable(detail),
        }
    }

    fn transport(error: reqwest::Error) -> RegistryError {
        RegistryError::Unavailable(error.to_string())
    }
}

#[async_trait]
impl Registry for HttpRegistry {
    async fn add(&self, text: &str) -> Result<CodeRecord, RegistryError> {
        let response = self
            .http
            .post(self.url("/codes"))
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(Self::transport)?;

        if !response.status().is_success() {
            return Err(Self::error_from(response, "add").await);
        }

        response
            .json()
            .await
            .map_err(|e| RegistryError::Unavailable(format!("malformed add response: {}", e)))
    }

    async fn list(&self) -> Result<Vec<CodeRecord>, RegistryError> {
        let response = self
            .http
            .get(self.url("/codes"))
            .send()
            .await
            .map_err(Self::transport)?;

        if !response.status().is_success() {
            return Err(Self::error_from(response, "list").await);
        }

        let records: Vec<CodeRecord> = response
            .json()
            .await
            .map_err(|e| RegistryError::Unavailable(format!("malformed list response: {}", e)))?;

        debug!(records = records.len(), "fetched registry records");
        Ok(records)
    }

    async fn confirm(&self, id: &CodeId) -> Result<CodeRecord, RegistryError> {
        let response = self
            .http
            .put(self.url("/codes/confirm"))
            .json(&json!({ "id": id.as_str() }))
            .send()
            .await
            .map_err(Self::transport)?;

        if !response.status().is_success() {
            return Err(Self::error_from(response, "confirm").await);
        }

        response
            .json()
            .await
            .map_err(|e| RegistryError::Unavailable(format!("malformed confirm response: {}", e)))
    }

    async fn remove(&self, id: &CodeId) -> Result<(), RegistryError> {
        let response = self
            .http
            .delete(self.url(&format!("/codes/{}", id)))
            .send()
            .await
            .map_err(Self::transport)?;

        if !response.status().is_success() {
            return Err(Self::error_from(response, "remove").await);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryClientConfig;

    #[test]
    fn test_base_url_is_normalized() {
        let config = RegistryClientConfig {
            base_url: "http://localhost:8321/".to_string(),
            timeout_secs: 5,
        };

        let client = HttpRegistry::new(&config).unwrap();
        assert_eq!(client.url("/codes"), "http://localhost:8321/codes");
    }

    #[tokio::test]
    async fn test_unreachable_registry_is_unavailable() {
        // Reserved TEST-NET-1 address; nothing listens there.
        let config = RegistryClientConfig {
            base_url: "http://192.0.2.1:9".to_string(),
            timeout_secs: 1,
        };

        let client = HttpRegistry::new(&config).unwrap();
        let error = client.list().await.unwrap_err();
        assert!(matches!(error, RegistryError::Unavailable(_)));
    }
}
