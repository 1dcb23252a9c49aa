//! Shared data types for the DNS chat core: labels, FQDNs, segments, transports,
//! lifecycle and capability records.
//!
//! These are plain data carriers; the logic that produces and consumes them lives
//! in `sanitize`, `codec`, `reassemble`, `transports`, `dispatcher`, `rate_limit`
//! and `capability`.

use std::fmt;
use std::time::Instant;

/// A DNS label sanitized by [`crate::sanitize::sanitize`]: `[a-z0-9-]`, 1..=63 bytes,
/// never starting/ending with `-`, never containing `--`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label(pub(crate) String);

impl Label {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fully qualified query name: the sanitized label followed by the zone's labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fqdn(pub(crate) String);

impl Fqdn {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fqdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One TXT character-string as seen by the reassembler, classified by content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// `n/N:content`
    Numbered {
        part_number: u32,
        total_parts: u32,
        content: String,
    },
    /// Anything else.
    Plain(String),
}

/// Which transport carried (or attempted to carry) a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Native,
    Udp,
    Tcp,
    Https,
    Mock,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportKind::Native => "native",
            TransportKind::Udp => "udp",
            TransportKind::Tcp => "tcp",
            TransportKind::Https => "https",
            TransportKind::Mock => "mock",
        };
        f.write_str(s)
    }
}

/// Whether a transport kind is enabled in a preference list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportPreferenceEntry {
    pub kind: TransportKind,
    pub enabled: bool,
}

/// An ordered, possibly-disabled, list of transports to try.
#[derive(Debug, Clone)]
pub struct TransportPreference(pub Vec<TransportPreferenceEntry>);

impl TransportPreference {
    pub fn enabled_in_order(&self) -> Vec<TransportKind> {
        self.0
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.kind)
            .collect()
    }
}

impl Default for TransportPreference {
    fn default() -> Self {
        TransportPreference(
            [
                TransportKind::Native,
                TransportKind::Udp,
                TransportKind::Tcp,
                TransportKind::Https,
            ]
            .into_iter()
            .map(|kind| TransportPreferenceEntry { kind, enabled: true })
            .collect(),
        )
    }
}

/// Write-only record of a single transport attempt, surfaced to the host via
/// the `onLog` callback (see `Config::log_sender`).
#[derive(Debug, Clone)]
pub struct DnsQueryLogEntry {
    pub id: u64,
    pub message_id: u64,
    pub kind: TransportKind,
    pub server: String,
    pub fqdn: String,
    pub status: QueryStatus,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Started,
    Success,
    Failed,
}

/// `{available, platform, supportsCustomServer, supportsAsyncQuery, apiLevel}` plus
/// the monotonic instant it was captured, per spec.md §3.
#[derive(Debug, Clone)]
pub struct CapabilityRecord {
    pub available: bool,
    pub platform: String,
    pub supports_custom_server: bool,
    pub supports_async_query: bool,
    pub api_level: Option<u32>,
    pub refreshed_at: Instant,
}

/// Foreground/background lifecycle state. Queries may only be initiated while
/// `Foreground` (spec.md §4.5 Admission step ii).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Foreground,
    Background,
}

/// A chat request handed to [`crate::dispatcher::ChatDnsClient::execute`].
#[derive(Debug, Clone)]
pub struct Request {
    pub text: String,
    pub zone: Option<String>,
    pub preference: Option<TransportPreference>,
}

impl Request {
    pub fn new(text: impl Into<String>) -> Self {
        Request {
            text: text.into(),
            zone: None,
            preference: None,
        }
    }
}

/// Outcome of one transport attempt, recorded for `AllTransportsFailed`'s
/// per-transport last-error list and for the literal fallback scenarios of
/// spec.md §8.
#[derive(Debug, Clone)]
pub struct AttemptLog {
    pub kind: TransportKind,
    pub error: Option<String>,
}

/// The dispatcher's successful result: ordered records, which transport
/// produced them, and the attempt trail leading up to success.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub request_id: u64,
    pub reassembled: String,
    pub transport_used: TransportKind,
    pub attempts: Vec<AttemptLog>,
}
