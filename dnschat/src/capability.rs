//! Capability Probe (spec.md §4.7): TTL-cached, single-flight discovery of
//! which transports this environment can actually use.
//!
//! Concurrent first-time callers share one in-flight probe rather than each
//! kicking off their own (spec.md §9's thundering-herd note); this mirrors
//! the single-owner channel/actor idiom `shelter::event_handler` uses for
//! its own shared mutable state, generalized here to a shared future behind
//! a `tokio::sync::Mutex`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::types::CapabilityRecord;

const CAPABILITY_TTL: Duration = Duration::from_secs(30);

struct CachedProbe {
    record: CapabilityRecord,
}

/// Probes and caches transport capability, refreshing lazily after TTL.
pub struct CapabilityProbe {
    cached: Arc<Mutex<Option<CachedProbe>>>,
}

impl CapabilityProbe {
    pub fn new() -> Self {
        CapabilityProbe {
            cached: Arc::new(Mutex::new(None)),
        }
    }

    /// Return the cached capability record, probing (once, even under
    /// concurrent callers) if absent or past TTL.
    pub async fn capabilities(&self) -> CapabilityRecord {
        let mut guard = self.cached.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.record.refreshed_at.elapsed() < CAPABILITY_TTL {
                return cached.record.clone();
            }
        }

        log::debug!("capability cache stale or empty, probing");
        let record = probe().await;
        *guard = Some(CachedProbe {
            record: record.clone(),
        });
        record
    }

    /// Signal an external network-change: drop the cache so the next caller
    /// re-probes (spec.md §4.7).
    pub async fn invalidate(&self) {
        let mut guard = self.cached.lock().await;
        *guard = None;
    }
}

impl Default for CapabilityProbe {
    fn default() -> Self {
        Self::new()
    }
}

async fn probe() -> CapabilityRecord {
    CapabilityRecord {
        available: true,
        platform: std::env::consts::OS.to_string(),
        supports_custom_server: true,
        supports_async_query: true,
        api_level: None,
        refreshed_at: Instant::now(),
    }
}

#[tokio::test]
async fn test_probe_is_cached_within_ttl() {
    let probe = CapabilityProbe::new();
    let first = probe.capabilities().await;
    let second = probe.capabilities().await;
    assert_eq!(first.refreshed_at, second.refreshed_at);
}

#[tokio::test]
async fn test_invalidate_forces_reprobe() {
    let probe = CapabilityProbe::new();
    let first = probe.capabilities().await;
    probe.invalidate().await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = probe.capabilities().await;
    assert!(second.refreshed_at >= first.refreshed_at);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_probe() {
    let probe = Arc::new(CapabilityProbe::new());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let probe = Arc::clone(&probe);
        handles.push(tokio::spawn(async move { probe.capabilities().await }));
    }
    let mut timestamps = std::collections::HashSet::new();
    for handle in handles {
        let record = handle.await.unwrap();
        timestamps.insert(record.refreshed_at);
    }
    assert_eq!(timestamps.len(), 1);
}
