pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod registry;
pub mod detect;
pub mod session;
pub mod engine;
pub mod import;

#[cfg(feature = "server")]
pub mod server;

pub use config::ScanmarkConfig;
pub use error::{Result, ScanmarkError};
pub use events::{EventBus, SessionEvent};
pub use ledger::DedupLedger;
pub use registry::{
    CodeId, CodeRecord, HttpRegistry, IssueFailure, IssueReport, MemoryRegistry, Registry,
    RegistryError,
};
pub use detect::{DecodeEvent, DecodeStream, DetectError, DetectionSource, DeviceDescriptor};
pub use session::{CodeState, ScanSession};
pub use engine::{ReconciliationEngine, SessionSummary};
pub use import::import_file;

#[cfg(feature = "server")]
pub use server::RegistryServer;
