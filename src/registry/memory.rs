//! In-process registry over the local code store, bypassing HTTP. Used by
//! tests and anywhere the store and the scanner share a process.

use async_trait::async_trait;
use std::sync::Arc;

use super::error::RegistryError;
use super::store::CodeStore;
use super::types::{CodeId, CodeRecord};
use super::Registry;

pub struct MemoryRegistry {
    store: Arc<CodeStore>,
}

impl MemoryRegistry {
    pub fn new(store: Arc<CodeStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<CodeStore> {
        Arc::clone(&self.store)
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn add(&self, text: &str) -> Result<CodeRecord, RegistryError> {
        self.store.add(text).await.map_err(Into::into)
    }

    async fn list(&self) -> Result<Vec<CodeRecord>, RegistryError> {
        Ok(self.store.list().await)
    }

    async fn confirm(&self, id: &CodeId) -> Result<CodeRecord, RegistryError> {
        self.store.confirm(id).await.map_err(Into::into)
    }

    async fn remove(&self, id: &CodeId) -> Result<(), RegistryError> {
        self.store.remove(id).await.map(|_| ()).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_batch_add_reports_each_failure_by_text() {
        let registry = MemoryRegistry::new(Arc::new(CodeStore::new()));
        let texts = vec!["X".to_string(), "Y".to_string(), "X".to_string()];

        let report = registry.add_batch(&texts).await;

        assert_eq!(report.issued.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].text, "X");
        assert!(matches!(
            report.failures[0].error,
            RegistryError::Conflict(_)
        ));
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_remove_of_confirmed_record_is_conflict() {
        let registry = MemoryRegistry::new(Arc::new(CodeStore::new()));
        let record = registry.add("A").await.unwrap();
        registry.confirm(&record.id).await.unwrap();

        let error = registry.remove(&record.id).await.unwrap_err();
        assert!(matches!(error, RegistryError::Conflict(_)));
        assert_eq!(registry.list().await.unwrap().len(), 1);
    }
}
