//! Code registry: the typed client interface, its HTTP and in-process
//! implementations, and the insertion-ordered store behind the bundled
//! server.

pub mod error;
pub mod http;
pub mod memory;
pub mod store;
pub mod types;

pub use error::RegistryError;
pub use http::HttpRegistry;
pub use memory::MemoryRegistry;
pub use store::CodeStore;
pub use types::{CodeId, CodeRecord, ErrorBody, IssueFailure, IssueReport};

use async_trait::async_trait;

/// Typed interface to the remote code registry. Every operation is a
/// single round-trip with no client-side retry; retry policy belongs to
/// the caller.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Create a record for `text`; fails with `Conflict` if the text
    /// already exists
    async fn add(&self, text: &str) -> Result<CodeRecord, RegistryError>;

    /// All records, in insertion order
    async fn list(&self) -> Result<Vec<CodeRecord>, RegistryError>;

    /// Mark the record as confirmed (one-way); fails with `NotFound` if
    /// the id is unknown
    async fn confirm(&self, id: &CodeId) -> Result<CodeRecord, RegistryError>;

    /// Delete a record; fails with `Conflict` if the record is confirmed
    async fn remove(&self, id: &CodeId) -> Result<(), RegistryError>;

    /// Submit each text individually, collecting every failure by text
    /// rather than collapsing the batch into one aggregate error
    async fn add_batch(&self, texts: &[String]) -> IssueReport {
        let mut report = IssueReport::default();
        for text in texts {
            match self.add(text).await {
                Ok(record) => report.issued.push(record),
                Err(error) => report.failures.push(IssueFailure {
                    text: text.clone(),
                    error,
                }),
            }
        }
        report
    }
}
