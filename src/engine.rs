use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::detect::{DecodeEvent, DecodeStream};
use crate::events::{EventBus, SessionEvent};
use crate::registry::{CodeRecord, Registry, RegistryError};
use crate::session::{CodeState, ScanSession};

/// Counts of session outcomes, produced when the decode stream ends
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub confirmed: u64,
    pub duplicates: u64,
    pub unknown: u64,
    pub confirm_failures: u64,
    pub decode_faults: u64,
}

/// Result of one confirm round-trip, delivered back to the engine loop
struct ConfirmOutcome {
    text: String,
    result: Result<CodeRecord, RegistryError>,
}

/// The scan-reconciliation core: consumes decode events, applies the
/// per-text confirmation state machine, calls the registry, and publishes
/// session events.
///
/// The engine loop is the only mutator of the session. Confirm round-trips
/// run as spawned tasks feeding an outcome channel, so the decode stream
/// is never blocked while a confirmation is in flight; the
/// `PendingConfirm` state keeps confirms single-flight per text.
pub struct ReconciliationEngine {
    registry: Arc<dyn Registry>,
    events: Arc<EventBus>,
    confirm_timeout: Duration,
}

impl ReconciliationEngine {
    pub fn new(
        registry: Arc<dyn Registry>,
        events: Arc<EventBus>,
        confirm_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            events,
            confirm_timeout,
        }
    }

    /// Consume the decode stream until it ends, reconciling each detection
    /// against the session and the registry.
    pub async fn run(
        &self,
        session: &mut ScanSession,
        stream: &mut DecodeStream,
    ) -> SessionSummary {
        let (confirm_tx, mut confirm_rx) = mpsc::channel::<ConfirmOutcome>(32);
        let mut summary = SessionSummary::default();

        loop {
            tokio::select! {
                event = stream.next() => match event {
                    Some(DecodeEvent::Matched(text)) => {
                        self.on_matched(session, text, &confirm_tx, &mut summary);
                    }
                    Some(DecodeEvent::NoMatchThisFrame) => {
                        // Absorbed: an empty frame is not an error
                    }
                    Some(DecodeEvent::Fault(detail)) => {
                        summary.decode_faults += 1;
                        self.events.publish(SessionEvent::DecodeFault {
                            detail,
                            timestamp: Utc::now(),
                        });
                    }
                    None => break,
                },
                Some(outcome) = confirm_rx.recv() => {
                    self.on_confirm_outcome(session, outcome, &mut summary);
                }
            }
        }

        // The stream is done; let in-flight confirms land against the live
        // session before the summary is final. Results arriving after the
        // receiver is gone are discarded.
        drop(confirm_tx);
        let drain_deadline = self.confirm_timeout + Duration::from_secs(1);
        while session.pending_confirms() > 0 {
            match tokio::time::timeout(drain_deadline, confirm_rx.recv()).await {
                Ok(Some(outcome)) => self.on_confirm_outcome(session, outcome, &mut summary),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        pending = session.pending_confirms(),
                        "confirmations still in flight at session end; discarding"
                    );
                    break;
                }
            }
        }

        info!(
            confirmed = summary.confirmed,
            duplicates = summary.duplicates,
            unknown = summary.unknown,
            confirm_failures = summary.confirm_failures,
            decode_faults = summary.decode_faults,
            "scan session finished"
        );

        summary
    }

    fn on_matched(
        &self,
        session: &mut ScanSession,
        text: String,
        confirm_tx: &mpsc::Sender<ConfirmOutcome>,
        summary: &mut SessionSummary,
    ) {
        let timestamp = Utc::now();

        // Decode jitter guard: a stationary code re-decodes many times per
        // second; only the first detection does any work.
        if session.ledger().contains(&text) {
            summary.duplicates += 1;
            self.events.publish(SessionEvent::Duplicate { text, timestamp });
            return;
        }

        // Duplicate-in-flight: never issue a second concurrent confirm
        // for the same text.
        if session.state(&text) == Some(&CodeState::PendingConfirm) {
            summary.duplicates += 1;
            self.events.publish(SessionEvent::Duplicate { text, timestamp });
            return;
        }

        let cached = session
            .record(&text)
            .map(|record| (record.id.clone(), record.confirmed));

        match cached {
            None => {
                session.set_state(text.clone(), CodeState::SeenNotInRegistry);
                summary.unknown += 1;
                self.events.publish(SessionEvent::Unknown { text, timestamp });
            }
            Some((_, true)) => {
                // Confirmed in a prior session; from now on it is a plain
                // ledger hit.
                session.ledger_mut().add(text.clone());
                summary.duplicates += 1;
                self.events.publish(SessionEvent::Duplicate { text, timestamp });
            }
            Some((id, false)) => {
                session.set_state(text.clone(), CodeState::PendingConfirm);
                debug!(%text, id = %id, "confirming code");

                let registry = Arc::clone(&self.registry);
                let tx = confirm_tx.clone();
                let confirm_timeout = self.confirm_timeout;
                tokio::spawn(async move {
                    let result =
                        match tokio::time::timeout(confirm_timeout, registry.confirm(&id)).await {
                            Ok(result) => result,
                            Err(_) => Err(RegistryError::Unavailable(format!(
                                "confirm timed out after {:?}",
                                confirm_timeout
                            ))),
                        };
                    // A closed receiver means the session ended; the
                    // result is discarded.
                    let _ = tx.send(ConfirmOutcome { text, result }).await;
                });
            }
        }
    }

    fn on_confirm_outcome(
        &self,
        session: &mut ScanSession,
        outcome: ConfirmOutcome,
        summary: &mut SessionSummary,
    ) {
        let ConfirmOutcome { text, result } = outcome;
        let timestamp = Utc::now();

        match result {
            Ok(_) => {
                session.apply_confirmed(&text);
                summary.confirmed += 1;
                self.events.publish(SessionEvent::Confirmed { text, timestamp });
            }
            Err(error) => {
                // Not added to the ledger: the next detection of this text
                // retries the confirmation instead of reporting it unknown.
                session.set_state(text.clone(), CodeState::ConfirmFailed);
                summary.confirm_failures += 1;
                self.events.publish(SessionEvent::ConfirmFailed {
                    text,
                    error: error.to_string(),
                    timestamp,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::DecodeStream;
    use crate::registry::{CodeId, CodeStore, MemoryRegistry};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    /// Registry wrapper that counts confirm calls and can fail the first
    /// N of them, optionally after a delay.
    struct FlakyRegistry {
        inner: MemoryRegistry,
        confirm_calls: AtomicUsize,
        failures_remaining: AtomicUsize,
        confirm_delay: Option<Duration>,
    }

    impl FlakyRegistry {
        fn new(store: Arc<CodeStore>) -> Self {
            Self {
                inner: MemoryRegistry::new(store),
                confirm_calls: AtomicUsize::new(0),
                failures_remaining: AtomicUsize::new(0),
                confirm_delay: None,
            }
        }

        fn failing_first(store: Arc<CodeStore>, failures: usize) -> Self {
            let mut registry = Self::new(store);
            registry.failures_remaining = AtomicUsize::new(failures);
            registry
        }

        fn with_delay(store: Arc<CodeStore>, delay: Duration) -> Self {
            let mut registry = Self::new(store);
            registry.confirm_delay = Some(delay);
            registry
        }

        fn confirm_calls(&self) -> usize {
            self.confirm_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Registry for FlakyRegistry {
        async fn add(&self, text: &str) -> Result<CodeRecord, RegistryError> {
            self.inner.add(text).await
        }

        async fn list(&self) -> Result<Vec<CodeRecord>, RegistryError> {
            self.inner.list().await
        }

        async fn confirm(&self, id: &CodeId) -> Result<CodeRecord, RegistryError> {
            self.confirm_calls.fetch_add(1, Ordering::SeqCst);

            if let Some(delay) = self.confirm_delay {
                tokio::time::sleep(delay).await;
            }

            let failures = self.failures_remaining.load(Ordering::SeqCst);
            if failures > 0 {
                self.failures_remaining.store(failures - 1, Ordering::SeqCst);
                return Err(RegistryError::Unavailable(
                    "injected confirm failure".to_string(),
                ));
            }

            self.inner.confirm(id).await
        }

        async fn remove(&self, id: &CodeId) -> Result<(), RegistryError> {
            self.inner.remove(id).await
        }
    }

    /// A pre-buffered decode stream that ends after the given events
    fn stream_of(events: Vec<DecodeEvent>) -> DecodeStream {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            tx.try_send(event).unwrap();
        }
        DecodeStream::new(rx, CancellationToken::new(), None)
    }

    fn engine(registry: Arc<dyn Registry>) -> (ReconciliationEngine, Arc<EventBus>) {
        let events = Arc::new(EventBus::new(64));
        let engine =
            ReconciliationEngine::new(registry, Arc::clone(&events), Duration::from_secs(2));
        (engine, events)
    }

    async fn seeded_registry(texts: &[&str]) -> Arc<CodeStore> {
        let store = Arc::new(CodeStore::new());
        for text in texts {
            store.add(text).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_first_detection_confirms_exactly_once() {
        let store = seeded_registry(&["A"]).await;
        let registry = Arc::new(FlakyRegistry::new(Arc::clone(&store)));
        let (engine, events) = engine(Arc::clone(&registry) as Arc<dyn Registry>);
        let mut receiver = events.subscribe();

        let mut session = ScanSession::bootstrap(registry.as_ref(), true).await.unwrap();
        let mut stream = stream_of(vec![DecodeEvent::Matched("A".to_string())]);

        let summary = engine.run(&mut session, &mut stream).await;

        assert_eq!(summary.confirmed, 1);
        assert_eq!(registry.confirm_calls(), 1);
        assert!(store.list().await[0].confirmed);

        let event = receiver.recv().await.unwrap();
        assert!(matches!(event, SessionEvent::Confirmed { ref text, .. } if text == "A"));
    }

    #[tokio::test]
    async fn test_repeated_detections_mutate_once_and_duplicate_rest() {
        let store = seeded_registry(&["A"]).await;
        let registry = Arc::new(FlakyRegistry::new(Arc::clone(&store)));
        let (engine, _events) = engine(Arc::clone(&registry) as Arc<dyn Registry>);

        let mut session = ScanSession::bootstrap(registry.as_ref(), true).await.unwrap();
        let mut stream = stream_of(vec![
            DecodeEvent::Matched("A".to_string()),
            DecodeEvent::Matched("A".to_string()),
            DecodeEvent::Matched("A".to_string()),
        ]);

        let summary = engine.run(&mut session, &mut stream).await;

        // N detections: one registry mutation, N-1 duplicates
        assert_eq!(summary.confirmed, 1);
        assert_eq!(summary.duplicates, 2);
        assert_eq!(registry.confirm_calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_text_never_calls_confirm() {
        let store = seeded_registry(&["A"]).await;
        let registry = Arc::new(FlakyRegistry::new(Arc::clone(&store)));
        let (engine, events) = engine(Arc::clone(&registry) as Arc<dyn Registry>);
        let mut receiver = events.subscribe();

        let mut session = ScanSession::bootstrap(registry.as_ref(), true).await.unwrap();
        let mut stream = stream_of(vec![DecodeEvent::Matched("B".to_string())]);

        let summary = engine.run(&mut session, &mut stream).await;

        assert_eq!(summary.unknown, 1);
        assert_eq!(summary.confirmed, 0);
        assert_eq!(registry.confirm_calls(), 0);
        assert!(!store.list().await[0].confirmed);

        let event = receiver.recv().await.unwrap();
        assert!(matches!(event, SessionEvent::Unknown { ref text, .. } if text == "B"));
    }

    #[tokio::test]
    async fn test_record_confirmed_in_prior_session_is_duplicate() {
        let store = seeded_registry(&["A"]).await;
        let id = store.list().await[0].id.clone();
        store.confirm(&id).await.unwrap();

        let registry = Arc::new(FlakyRegistry::new(Arc::clone(&store)));
        let (engine, _events) = engine(Arc::clone(&registry) as Arc<dyn Registry>);

        // Unseeded ledger: the cached record itself carries confirmed=true
        let mut session = ScanSession::bootstrap(registry.as_ref(), false).await.unwrap();
        let mut stream = stream_of(vec![
            DecodeEvent::Matched("A".to_string()),
            DecodeEvent::Matched("A".to_string()),
        ]);

        let summary = engine.run(&mut session, &mut stream).await;

        assert_eq!(summary.duplicates, 2);
        assert_eq!(summary.confirmed, 0);
        assert_eq!(registry.confirm_calls(), 0);
        assert!(session.ledger().contains("A"));
    }

    #[tokio::test]
    async fn test_failed_confirm_stays_out_of_ledger_and_retries() {
        let store = seeded_registry(&["A"]).await;
        let registry = Arc::new(FlakyRegistry::failing_first(Arc::clone(&store), 1));
        let (engine, _events) = engine(Arc::clone(&registry) as Arc<dyn Registry>);

        let mut session = ScanSession::bootstrap(registry.as_ref(), true).await.unwrap();

        // Feed detections with a gap so the failed outcome is processed
        // before the retry detection arrives.
        let (tx, rx) = mpsc::channel(4);
        let mut stream = DecodeStream::new(rx, CancellationToken::new(), None);
        let feeder = tokio::spawn(async move {
            tx.send(DecodeEvent::Matched("A".to_string())).await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
            tx.send(DecodeEvent::Matched("A".to_string())).await.unwrap();
        });

        let summary = engine.run(&mut session, &mut stream).await;
        feeder.await.unwrap();

        assert_eq!(summary.confirm_failures, 1);
        assert_eq!(summary.confirmed, 1);
        assert_eq!(registry.confirm_calls(), 2);
        assert!(session.ledger().contains("A"));
        assert!(store.list().await[0].confirmed);
    }

    #[tokio::test]
    async fn test_failed_confirm_alone_leaves_ledger_empty() {
        let store = seeded_registry(&["A"]).await;
        let registry = Arc::new(FlakyRegistry::failing_first(Arc::clone(&store), usize::MAX));
        let (engine, events) = engine(Arc::clone(&registry) as Arc<dyn Registry>);
        let mut receiver = events.subscribe();

        let mut session = ScanSession::bootstrap(registry.as_ref(), true).await.unwrap();
        let mut stream = stream_of(vec![DecodeEvent::Matched("A".to_string())]);

        let summary = engine.run(&mut session, &mut stream).await;

        assert_eq!(summary.confirm_failures, 1);
        assert!(!session.ledger().contains("A"));
        assert_eq!(session.state("A"), Some(&CodeState::ConfirmFailed));
        assert!(!store.list().await[0].confirmed);

        let event = receiver.recv().await.unwrap();
        assert!(matches!(event, SessionEvent::ConfirmFailed { ref text, .. } if text == "A"));
    }

    #[tokio::test]
    async fn test_detection_while_confirm_in_flight_is_single_flight() {
        let store = seeded_registry(&["A"]).await;
        let registry = Arc::new(FlakyRegistry::with_delay(
            Arc::clone(&store),
            Duration::from_millis(100),
        ));
        let (engine, _events) = engine(Arc::clone(&registry) as Arc<dyn Registry>);

        let mut session = ScanSession::bootstrap(registry.as_ref(), true).await.unwrap();
        // Both detections arrive before the delayed confirm can land
        let mut stream = stream_of(vec![
            DecodeEvent::Matched("A".to_string()),
            DecodeEvent::Matched("A".to_string()),
        ]);

        let summary = engine.run(&mut session, &mut stream).await;

        assert_eq!(registry.confirm_calls(), 1);
        assert_eq!(summary.confirmed, 1);
        assert_eq!(summary.duplicates, 1);
    }

    #[tokio::test]
    async fn test_decode_faults_and_empty_frames_do_not_disturb_state() {
        let store = seeded_registry(&["A"]).await;
        let registry = Arc::new(FlakyRegistry::new(Arc::clone(&store)));
        let (engine, _events) = engine(Arc::clone(&registry) as Arc<dyn Registry>);

        let mut session = ScanSession::bootstrap(registry.as_ref(), true).await.unwrap();
        let mut stream = stream_of(vec![
            DecodeEvent::Fault("glare".to_string()),
            DecodeEvent::NoMatchThisFrame,
            DecodeEvent::Matched("A".to_string()),
            DecodeEvent::NoMatchThisFrame,
        ]);

        let summary = engine.run(&mut session, &mut stream).await;

        assert_eq!(summary.decode_faults, 1);
        assert_eq!(summary.confirmed, 1);
        assert_eq!(summary.unknown, 0);
    }

    #[tokio::test]
    async fn test_full_scenario_confirm_duplicate_unknown() {
        let store = seeded_registry(&["A"]).await;
        let registry = Arc::new(FlakyRegistry::new(Arc::clone(&store)));
        let (engine, events) = engine(Arc::clone(&registry) as Arc<dyn Registry>);
        let mut receiver = events.subscribe();

        let mut session = ScanSession::bootstrap(registry.as_ref(), true).await.unwrap();

        let (tx, rx) = mpsc::channel(4);
        let mut stream = DecodeStream::new(rx, CancellationToken::new(), None);
        let feeder = tokio::spawn(async move {
            tx.send(DecodeEvent::Matched("A".to_string())).await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            tx.send(DecodeEvent::Matched("A".to_string())).await.unwrap();
            tx.send(DecodeEvent::Matched("B".to_string())).await.unwrap();
        });

        let summary = engine.run(&mut session, &mut stream).await;
        feeder.await.unwrap();

        assert_eq!(summary.confirmed, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.unknown, 1);
        assert!(store.list().await[0].confirmed);

        let kinds: Vec<&'static str> = vec![
            receiver.recv().await.unwrap().event_type(),
            receiver.recv().await.unwrap().event_type(),
            receiver.recv().await.unwrap().event_type(),
        ];
        assert_eq!(kinds, vec!["confirmed", "duplicate", "unknown"]);
    }
}
