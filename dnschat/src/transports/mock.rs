//! In-memory mock transport (spec.md §3's Transport Kind enum; used only by
//! this crate's own test suite to drive dispatcher fallback ordering and
//! exactly-once completion deterministically, without real sockets).

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::{Fqdn, TransportKind};

use super::Transport;

#[derive(Debug, Clone)]
pub enum MockOutcome {
    Success(Vec<String>),
    Error(TransportError),
    /// Exceeds the given deadline, forcing the caller's timeout path.
    Hang,
}

/// A transport whose behavior is scripted one outcome per call. Panics if
/// called more times than scripted, which is itself a useful assertion that
/// the dispatcher doesn't retry more than expected.
pub struct MockTransport {
    kind: TransportKind,
    outcomes: Mutex<VecDeque<MockOutcome>>,
    call_count: std::sync::atomic::AtomicUsize,
}

impl MockTransport {
    pub fn new(kind: TransportKind, outcomes: Vec<MockOutcome>) -> Self {
        MockTransport {
            kind,
            outcomes: Mutex::new(outcomes.into()),
            call_count: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn query(
        &self,
        _server: &str,
        _fqdn: &Fqdn,
        deadline: Duration,
    ) -> Result<Vec<String>, TransportError> {
        self.call_count
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(MockOutcome::Error(TransportError::NetworkUnavailable {
                detail: "mock transport exhausted its scripted outcomes".to_string(),
            }));

        match outcome {
            MockOutcome::Success(segments) => Ok(segments),
            MockOutcome::Error(error) => Err(error),
            MockOutcome::Hang => {
                tokio::time::sleep(deadline + Duration::from_secs(1)).await;
                unreachable!("caller should have timed out first")
            }
        }
    }
}

/// Races `timeout`, `data` and `error` futures against a single
/// [`super::CompletionGate`] the way a callback-based platform resolver
/// would, asserting the caller observes exactly one terminal outcome
/// regardless of arrival order (spec.md §4.4, §8).
pub async fn race_events_through_gate(
    timeout_first: bool,
) -> Result<Vec<String>, TransportError> {
    use super::CompletionGate;
    use std::sync::Arc;

    let gate = Arc::new(CompletionGate::new());
    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = Arc::new(Mutex::new(Some(tx)));

    let fire = |gate: Arc<CompletionGate>,
                tx: Arc<Mutex<Option<tokio::sync::oneshot::Sender<Result<Vec<String>, TransportError>>>>>,
                outcome: Result<Vec<String>, TransportError>| {
        if gate.try_complete() {
            if let Some(sender) = tx.lock().unwrap().take() {
                let _ = sender.send(outcome);
            }
        }
    };

    let (first, second) = if timeout_first {
        (
            Err(TransportError::Timeout),
            Ok(vec!["late data".to_string()]),
        )
    } else {
        (
            Ok(vec!["early data".to_string()]),
            Err(TransportError::Timeout),
        )
    };

    fire(Arc::clone(&gate), Arc::clone(&tx), first);
    fire(gate, tx, second);

    rx.await
        .expect("gate guarantees exactly one terminal send")
}

#[tokio::test]
async fn test_mock_transport_exhausts_scripted_outcomes_in_order() {
    let mock = MockTransport::new(
        TransportKind::Udp,
        vec![
            MockOutcome::Error(TransportError::Timeout),
            MockOutcome::Success(vec!["ok".to_string()]),
        ],
    );
    let fqdn = Fqdn("hello.ch.at".to_string());

    let first = mock
        .query("ch.at:53", &fqdn, Duration::from_secs(1))
        .await;
    assert_eq!(first, Err(TransportError::Timeout));

    let second = mock
        .query("ch.at:53", &fqdn, Duration::from_secs(1))
        .await;
    assert_eq!(second, Ok(vec!["ok".to_string()]));
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn test_exactly_once_regardless_of_event_order() {
    // Whichever event is delivered to the gate first wins, and only that one.
    let timeout_first = race_events_through_gate(true).await;
    assert_eq!(timeout_first, Err(TransportError::Timeout));

    let data_first = race_events_through_gate(false).await;
    assert_eq!(data_first, Ok(vec!["early data".to_string()]));
}
