//! `dnschat` — a DNS-over-transport chat client core.
//!
//! Turns arbitrary user text into a DNS label, dispatches TXT queries across
//! native/UDP/TCP/DoH transports with fallback, retry and backoff,
//! reassembles multi-part TXT responses, and enforces rate limiting,
//! lifecycle gating, deduplication and exactly-once completion behind a
//! closed error taxonomy.
//!
//! - [`sanitize`] / [`types::Label`] / [`types::Fqdn`]: text-to-query-name pipeline.
//! - [`codec`]: RFC 1035 wire encode/decode for TXT queries and responses.
//! - [`reassemble`]: multi-part TXT segment reconstruction.
//! - [`transports`]: the native/UDP/TCP/DoH adapters behind one `Transport` trait.
//! - [`dispatcher::ChatDnsClient`]: admission, fallback, retry, dedup — the public entry point.
//! - [`rate_limit`] / [`capability`]: the sliding-window admission gate and the cached capability probe.
//! - [`config::Config`]: defaults and policy (allowed servers, DoH-disabled zones, timeouts).
//! - [`error`]: the closed error taxonomy every layer reports through.

pub mod capability;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod rate_limit;
pub mod reassemble;
pub mod sanitize;
pub mod transports;
pub mod types;

pub use config::Config;
pub use dispatcher::{CancellationToken, ChatDnsClient};
pub use error::{DispatchError, Result};
pub use types::{CapabilityRecord, DispatchResult, Lifecycle, Request, TransportKind};
