use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::error::RegistryError;

/// Opaque identifier assigned to a code record by the store on creation,
/// immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeId(String);

impl CodeId {
    /// Generate a fresh store-assigned identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A persisted code record. `text` is unique across all records; only the
/// one-way confirm transition mutates a record after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRecord {
    pub id: CodeId,
    pub text: String,
    pub confirmed: bool,
}

/// JSON error body used by the registry API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// One failed submission within a batch
#[derive(Debug)]
pub struct IssueFailure {
    pub text: String,
    pub error: RegistryError,
}

/// Outcome of a bulk issue or import: per-text successes and failures
#[derive(Debug, Default)]
pub struct IssueReport {
    pub issued: Vec<CodeRecord>,
    pub failures: Vec<IssueFailure>,
}

impl IssueReport {
    /// Whether every submission succeeded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_id_is_opaque_and_unique() {
        let a = CodeId::generate();
        let b = CodeId::generate();
        assert_ne!(a, b);
        assert_eq!(CodeId::from(a.as_str()), a);
    }

    #[test]
    fn test_record_serialization_shape() {
        let record = CodeRecord {
            id: CodeId::from("abc"),
            text: "CRATE-0001".to_string(),
            confirmed: false,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "abc");
        assert_eq!(json["text"], "CRATE-0001");
        assert_eq!(json["confirmed"], false);
    }
}
