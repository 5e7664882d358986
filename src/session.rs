use std::collections::HashMap;
use tracing::info;

use crate::ledger::DedupLedger;
use crate::registry::{CodeRecord, Registry, RegistryError};

/// Per-text confirmation state, scoped to one session. A text with no
/// entry has not been seen this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeState {
    /// Decoded, but no record with this text exists in the registry
    SeenNotInRegistry,
    /// A confirm round-trip is in flight; at most one per text
    PendingConfirm,
    /// Confirm succeeded; terminal
    Confirmed,
    /// Confirm failed; the next detection retries the confirmation
    ConfirmFailed,
}

/// Mutable state owned by one scanning session: the record cache fetched
/// once at session start, the dedup ledger, and the per-text state
/// machine. Discarded at session end.
pub struct ScanSession {
    records: HashMap<String, CodeRecord>,
    states: HashMap<String, CodeState>,
    ledger: DedupLedger,
}

impl ScanSession {
    /// Fetch the registry's record list once and build the session cache.
    /// Records already confirmed seed the ledger when `seed_confirmed` is
    /// set, so codes from prior sessions report as duplicates up front.
    pub async fn bootstrap(
        registry: &dyn Registry,
        seed_confirmed: bool,
    ) -> Result<Self, RegistryError> {
        let records = registry.list().await?;
        Ok(Self::from_records(records, seed_confirmed))
    }

    pub fn from_records(records: Vec<CodeRecord>, seed_confirmed: bool) -> Self {
        let mut ledger = DedupLedger::new();
        let mut cache = HashMap::with_capacity(records.len());

        for record in records {
            if seed_confirmed && record.confirmed {
                ledger.add(record.text.clone());
            }
            cache.insert(record.text.clone(), record);
        }

        info!(
            records = cache.len(),
            seeded = ledger.len(),
            "scan session bootstrapped"
        );

        Self {
            records: cache,
            states: HashMap::new(),
            ledger,
        }
    }

    /// Cached record for a text, if the registry knows it
    pub fn record(&self, text: &str) -> Option<&CodeRecord> {
        self.records.get(text)
    }

    pub fn state(&self, text: &str) -> Option<&CodeState> {
        self.states.get(text)
    }

    pub fn set_state(&mut self, text: impl Into<String>, state: CodeState) {
        self.states.insert(text.into(), state);
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut DedupLedger {
        &mut self.ledger
    }

    /// Apply a successful confirm: flip the cached record, record the text
    /// in the ledger, and move the state machine to its terminal state.
    pub fn apply_confirmed(&mut self, text: &str) {
        if let Some(record) = self.records.get_mut(text) {
            record.confirmed = true;
        }
        self.ledger.add(text.to_string());
        self.states.insert(text.to_string(), CodeState::Confirmed);
    }

    /// Number of texts with a confirm round-trip still in flight
    pub fn pending_confirms(&self) -> usize {
        self.states
            .values()
            .filter(|state| **state == CodeState::PendingConfirm)
            .count()
    }

    pub fn cached_records(&self) -> usize {
        self.records.len()
    }
}
