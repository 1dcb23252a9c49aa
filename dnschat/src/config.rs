//! Crate-wide configuration and defaults (spec.md §6).
//!
//! A plain `Config` struct with a `Default` impl mirroring the product
//! defaults, constructible programmatically by library consumers or via the
//! `clap`-derived CLI args of the demo binary (`commands::base::Cli`).

use std::time::Duration;

use crate::rate_limit::{RATE_LIMIT_CAPACITY, RATE_LIMIT_WINDOW};
use crate::types::TransportPreference;

/// Per-attempt deadline before a transport's `query()` is abandoned
/// (spec.md §6: `QUERY_TIMEOUT_MS = 10_000`).
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(10);
/// Retry passes across the full transport preference list (spec.md §6).
pub const MAX_RETRIES: u32 = 3;
/// Base backoff between retry passes, doubled each pass, capped at 2s
/// (spec.md §4.5, §6).
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);
pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(2);

/// Servers queries may be sent to; anything else is refused at the
/// dispatcher boundary (spec.md §6).
pub const ALLOWED_SERVERS: &[&str] = &[
    "ch.at",
    "llm.pieter.com",
    "8.8.8.8",
    "8.8.4.4",
    "1.1.1.1",
    "1.0.0.1",
];

/// Zones for which DoH is disabled by policy because the zone's TXT answers
/// are only reachable through its own authoritative server (spec.md §4.4,
/// §6 — `ch.at` is one such zone by default).
pub const DOH_DISABLED_ZONES: &[&str] = &["ch.at"];

pub const DEFAULT_ZONE: &str = "ch.at";
pub const DEFAULT_SERVER: &str = "ch.at";
pub const DEFAULT_DNS_PORT: u16 = 53;
pub const DEFAULT_DOH_ENDPOINT: &str = "https://dns.google/dns-query";

#[derive(Debug, Clone)]
pub struct Config {
    pub zone: String,
    pub server: String,
    pub dns_port: u16,
    pub doh_endpoint: String,
    pub preference: TransportPreference,
    pub query_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub rate_limit_window: Duration,
    pub rate_limit_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            zone: DEFAULT_ZONE.to_string(),
            server: DEFAULT_SERVER.to_string(),
            dns_port: DEFAULT_DNS_PORT,
            doh_endpoint: DEFAULT_DOH_ENDPOINT.to_string(),
            preference: TransportPreference::default(),
            query_timeout: QUERY_TIMEOUT,
            max_retries: MAX_RETRIES,
            retry_base_delay: RETRY_BASE_DELAY,
            retry_max_delay: RETRY_MAX_DELAY,
            rate_limit_window: RATE_LIMIT_WINDOW,
            rate_limit_capacity: RATE_LIMIT_CAPACITY,
        }
    }
}

impl Config {
    /// Whether `server` is in the configured allow-list (spec.md §6).
    pub fn server_allowed(&self, server: &str) -> bool {
        ALLOWED_SERVERS.contains(&server)
    }

    /// Whether DoH is permitted for `zone` (spec.md §4.4).
    pub fn doh_allowed_for_zone(&self, zone: &str) -> bool {
        !DOH_DISABLED_ZONES.contains(&zone)
    }
}

#[test]
fn test_default_config_matches_spec_defaults() {
    let config = Config::default();
    assert_eq!(config.zone, "ch.at");
    assert_eq!(config.server, "ch.at");
    assert_eq!(config.max_retries, 3);
    assert_eq!(config.rate_limit_capacity, 60);
    assert!(config.server_allowed("8.8.8.8"));
    assert!(!config.server_allowed("evil.example.com"));
    assert!(!config.doh_allowed_for_zone("ch.at"));
    assert!(config.doh_allowed_for_zone("example.com"));
}
