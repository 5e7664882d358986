//! In-memory, insertion-ordered code store

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use super::types::{CodeId, CodeRecord};

/// Error type for store operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("code text already exists: {text}")]
    DuplicateText { text: String },

    #[error("no code record with id {id}")]
    NotFound { id: String },

    #[error("record {id} is confirmed and cannot be deleted")]
    ConfirmedImmutable { id: String },

    #[error("code text must not be empty")]
    EmptyText,
}

/// The document collection behind the registry API. Enforces the registry
/// invariants: unique non-empty `text`, one-way confirm, and confirmed
/// records immutable to deletion.
#[derive(Debug, Default)]
pub struct CodeStore {
    records: RwLock<Vec<CodeRecord>>,
}

impl CodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record for `text` with `confirmed = false`
    pub async fn add(&self, text: &str) -> Result<CodeRecord, StoreError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(StoreError::EmptyText);
        }

        let mut records = self.records.write().await;
        if records.iter().any(|record| record.text == text) {
            return Err(StoreError::DuplicateText {
                text: text.to_string(),
            });
        }

        let record = CodeRecord {
            id: CodeId::generate(),
            text: text.to_string(),
            confirmed: false,
        };
        debug!(id = %record.id, text = %record.text, "code record created");
        records.push(record.clone());

        Ok(record)
    }

    /// All records in insertion order
    pub async fn list(&self) -> Vec<CodeRecord> {
        self.records.read().await.clone()
    }

    /// Mark the record as confirmed. The transition is one-way; confirming
    /// an already-confirmed record returns it unchanged.
    pub async fn confirm(&self, id: &CodeId) -> Result<CodeRecord, StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|record| &record.id == id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;

        record.confirmed = true;
        Ok(record.clone())
    }

    /// Remove an unconfirmed record
    pub async fn remove(&self, id: &CodeId) -> Result<CodeRecord, StoreError> {
        let mut records = self.records.write().await;
        let position = records
            .iter()
            .position(|record| &record.id == id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;

        if records[position].confirmed {
            return Err(StoreError::ConfirmedImmutable { id: id.to_string() });
        }

        Ok(records.remove(position))
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_rejects_duplicate_text() {
        let store = CodeStore::new();
        store.add("A").await.unwrap();

        let error = store.add("A").await.unwrap_err();
        assert_eq!(
            error,
            StoreError::DuplicateText {
                text: "A".to_string()
            }
        );
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_add_rejects_empty_text() {
        let store = CodeStore::new();
        assert_eq!(store.add("   ").await.unwrap_err(), StoreError::EmptyText);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_preserves_insertion_order() {
        let store = CodeStore::new();
        store.add("A").await.unwrap();
        store.add("B").await.unwrap();
        store.add("C").await.unwrap();

        let texts: Vec<_> = store
            .list()
            .await
            .into_iter()
            .map(|record| record.text)
            .collect();
        assert_eq!(texts, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_confirm_is_one_way_and_idempotent() {
        let store = CodeStore::new();
        let record = store.add("A").await.unwrap();
        assert!(!record.confirmed);

        let confirmed = store.confirm(&record.id).await.unwrap();
        assert!(confirmed.confirmed);

        // Second confirm returns the already-confirmed record
        let again = store.confirm(&record.id).await.unwrap();
        assert!(again.confirmed);
    }

    #[tokio::test]
    async fn test_confirm_unknown_id_is_not_found() {
        let store = CodeStore::new();
        let error = store.confirm(&CodeId::from("missing")).await.unwrap_err();
        assert!(matches!(error, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_remove_rejects_confirmed_record() {
        let store = CodeStore::new();
        let record = store.add("A").await.unwrap();
        store.confirm(&record.id).await.unwrap();

        let error = store.remove(&record.id).await.unwrap_err();
        assert!(matches!(error, StoreError::ConfirmedImmutable { .. }));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_unconfirmed_record() {
        let store = CodeStore::new();
        let record = store.add("A").await.unwrap();

        let removed = store.remove(&record.id).await.unwrap();
        assert_eq!(removed.text, "A");
        assert!(store.is_empty().await);
    }
}
