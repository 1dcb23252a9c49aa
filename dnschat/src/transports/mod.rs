//! Transport Adapters (spec.md §4.4): native resolver, raw UDP, raw TCP and
//! DoH, each exposing the same `query(server, fqdn, deadline)` contract.
//!
//! # Exactly-once completion
//!
//! Every adapter MUST yield exactly one terminal outcome per `query()` call,
//! regardless of how many underlying events fire (timeout, data, socket
//! error, cancellation — spec.md §4.4, §5, §9). In plain `async fn`s that
//! `.await` a single future this falls out naturally; [`CompletionGate`]
//! exists for the cases where more than one task can plausibly race to
//! produce a result (see `mock` and the dispatcher's cancellation race) so
//! the guarantee is enforced explicitly rather than left to chance.

pub mod doh;
pub mod mock;
pub mod native;
pub mod tcp;
pub mod udp;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::{Fqdn, TransportKind};

/// A single atomic gate guarding terminal completion. The first caller to
/// win `try_complete` should act on it (send a result, release resources);
/// every later caller's event is discarded.
#[derive(Debug, Default)]
pub struct CompletionGate {
    completed: AtomicBool,
}

impl CompletionGate {
    pub fn new() -> Self {
        CompletionGate {
            completed: AtomicBool::new(false),
        }
    }

    /// Returns `true` exactly once across all callers, for whichever call
    /// wins the race.
    pub fn try_complete(&self) -> bool {
        self.completed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// A mechanism for sending one DNS TXT query and receiving its raw answer
/// segments (spec.md §4.4).
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Attempt the query once, failing with a specific subset of
    /// `TransportError` variants. Must complete within `deadline`.
    async fn query(
        &self,
        server: &str,
        fqdn: &Fqdn,
        deadline: Duration,
    ) -> Result<Vec<String>, TransportError>;
}

#[test]
fn test_completion_gate_yields_exactly_one_winner() {
    let gate = CompletionGate::new();
    assert!(gate.try_complete());
    assert!(!gate.try_complete());
    assert!(!gate.try_complete());
}

#[tokio::test]
async fn test_completion_gate_under_concurrent_racers() {
    use std::sync::Arc;

    let gate = Arc::new(CompletionGate::new());
    let mut handles = Vec::new();
    for _ in 0..16 {
        let gate = Arc::clone(&gate);
        handles.push(tokio::spawn(async move { gate.try_complete() }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}
