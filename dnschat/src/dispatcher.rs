//! Dispatcher (spec.md §4.5): admission, ordered transport fallback with
//! retry, deduplication, lifecycle gating and cooperative cancellation.
//!
//! Grounded in `shelter::event_handler`'s background-task/channel
//! orchestration idiom (tasks communicating over `mpsc`/`broadcast`) and
//! `runner::commands::base::Cli`'s ownership-based dispatch, generalized
//! from a single exfiltration flow to a concurrent, cancellable,
//! deduplicating one.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex, Notify};

use crate::capability::CapabilityProbe;
use crate::config::Config;
use crate::error::{DispatchError, SanitizeError, TransportAttemptError, TransportError};
use crate::rate_limit::RateLimiter;
use crate::reassemble;
use crate::sanitize;
use crate::transports::{doh::DohTransport, native::NativeTransport, tcp::TcpTransport, udp::UdpTransport, Transport};
use crate::types::{
    AttemptLog, CapabilityRecord, DispatchResult, DnsQueryLogEntry, Fqdn, Label, Lifecycle,
    QueryStatus, Request, TransportKind,
};

/// Cooperative cancellation handle. `cancel()` may be called from any
/// clone; `cancelled()` resolves for every clone once it has been (spec.md
/// §4.5, §5).
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token is (or becomes) cancelled. Raced against a
    /// transport's `query()` future via `tokio::select!` — the first of the
    /// two to complete is the one terminal outcome the caller sees, which is
    /// this crate's async-native expression of the exactly-once-completion
    /// gate every adapter must honor (spec.md §4.4, §5, §9).
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

type DispatchOutcome = Result<DispatchResult, DispatchError>;
type InFlightMap = HashMap<(String, String), broadcast::Sender<Arc<DispatchOutcome>>>;

/// The DNS chat client core: `execute`, `sanitize`, `capabilities`,
/// `invalidate_capabilities` (spec.md §6).
pub struct ChatDnsClient {
    config: Config,
    transports: HashMap<TransportKind, Arc<dyn Transport>>,
    rate_limiter: RateLimiter,
    capability_probe: CapabilityProbe,
    lifecycle: Arc<Mutex<Lifecycle>>,
    in_flight: Arc<Mutex<InFlightMap>>,
    next_request_id: AtomicU64,
    next_log_id: AtomicU64,
    log_sender: Option<mpsc::Sender<DnsQueryLogEntry>>,
    capability_sender: Option<tokio::sync::watch::Sender<CapabilityRecord>>,
}

fn default_transports(config: &Config) -> HashMap<TransportKind, Arc<dyn Transport>> {
    let mut map: HashMap<TransportKind, Arc<dyn Transport>> = HashMap::new();
    map.insert(TransportKind::Native, Arc::new(NativeTransport));
    map.insert(TransportKind::Udp, Arc::new(UdpTransport));
    map.insert(TransportKind::Tcp, Arc::new(TcpTransport));
    map.insert(
        TransportKind::Https,
        Arc::new(DohTransport::new(config.doh_endpoint.clone())),
    );
    map
}

impl ChatDnsClient {
    pub fn new(config: Config) -> Self {
        let transports = default_transports(&config);
        Self::with_transports(config, transports)
    }

    /// Construct with an explicit transport map — the seam the test suite
    /// uses to substitute `transports::mock::MockTransport` for real sockets.
    pub fn with_transports(
        config: Config,
        transports: HashMap<TransportKind, Arc<dyn Transport>>,
    ) -> Self {
        ChatDnsClient {
            rate_limiter: RateLimiter::new(config.rate_limit_window, config.rate_limit_capacity),
            config,
            transports,
            capability_probe: CapabilityProbe::new(),
            lifecycle: Arc::new(Mutex::new(Lifecycle::Foreground)),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_request_id: AtomicU64::new(1),
            next_log_id: AtomicU64::new(1),
            log_sender: None,
            capability_sender: None,
        }
    }

    pub fn with_log_sender(mut self, sender: mpsc::Sender<DnsQueryLogEntry>) -> Self {
        self.log_sender = Some(sender);
        self
    }

    /// Host hook for `onCapabilityChanged` (spec.md §6): notified every time
    /// a capability probe refreshes, whether or not the record changed.
    pub fn with_capability_watch(
        mut self,
        sender: tokio::sync::watch::Sender<CapabilityRecord>,
    ) -> Self {
        self.capability_sender = Some(sender);
        self
    }

    /// Debug hook echoing the sanitized label (spec.md §4.1, §9).
    pub fn sanitize(&self, text: &str) -> Result<Label, SanitizeError> {
        sanitize::sanitize(text)
    }

    pub async fn set_lifecycle(&self, lifecycle: Lifecycle) {
        *self.lifecycle.lock().await = lifecycle;
    }

    pub async fn capabilities(&self) -> CapabilityRecord {
        let record = self.capability_probe.capabilities().await;
        if let Some(sender) = &self.capability_sender {
            let _ = sender.send(record.clone());
        }
        record
    }

    pub async fn invalidate_capabilities(&self) {
        self.capability_probe.invalidate().await;
    }

    fn log(
        &self,
        message_id: u64,
        kind: TransportKind,
        server: &str,
        fqdn: &str,
        status: QueryStatus,
        error: Option<String>,
    ) {
        let Some(sender) = &self.log_sender else {
            return;
        };
        let entry = DnsQueryLogEntry {
            id: self.next_log_id.fetch_add(1, Ordering::SeqCst),
            message_id,
            kind,
            server: server.to_string(),
            fqdn: fqdn.to_string(),
            status,
            started_at: chrono::Utc::now(),
            ended_at: if status == QueryStatus::Started {
                None
            } else {
                Some(chrono::Utc::now())
            },
            error,
        };
        let _ = sender.try_send(entry);
    }

    /// Execute a chat request end to end: admission, fallback, retry,
    /// reassembly (spec.md §4.5).
    pub async fn execute(
        &self,
        request: Request,
        token: &CancellationToken,
    ) -> DispatchOutcome {
        let request_id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        log::debug!("dispatch #{request_id}: admitting request");

        // Admission step (i): sanitize and compose the FQDN before anything else.
        let label = sanitize::sanitize(&request.text)?;
        let zone = request.zone.clone().unwrap_or_else(|| self.config.zone.clone());
        let fqdn = sanitize::compose_fqdn(&label, &zone)?;

        // Admission step (ii): capture lifecycle once, at entry.
        let paused = matches!(*self.lifecycle.lock().await, Lifecycle::Background);
        if paused {
            log::info!("dispatch #{request_id}: refused, client is backgrounded");
            return Err(DispatchError::Backgrounded);
        }

        // Admission step (iii): rate limit.
        if let Err(retry_after) = self.rate_limiter.admit() {
            log::warn!("dispatch #{request_id}: rate limited, retry after {retry_after:?}");
            return Err(DispatchError::RateLimited { retry_after });
        }

        let server = self.config.server.clone();
        if !self.config.server_allowed(&server) {
            log::warn!("dispatch #{request_id}: server {server:?} not in allow-list");
            return Err(DispatchError::DisallowedServer { server });
        }

        // Admission step (iv): deduplicate by (server, fqdn).
        let key = (server.clone(), fqdn.as_str().to_string());
        let mut in_flight = self.in_flight.lock().await;
        if let Some(existing) = in_flight.get(&key) {
            log::debug!("dispatch #{request_id}: joining in-flight query for {fqdn}");
            let mut rx = existing.subscribe();
            drop(in_flight);
            return match rx.recv().await {
                Ok(outcome) => (*outcome).clone(),
                Err(_) => Err(DispatchError::Cancelled),
            };
        }
        let (tx, _rx) = broadcast::channel(1);
        in_flight.insert(key.clone(), tx.clone());
        drop(in_flight);

        let preference = request.preference.clone().unwrap_or_else(|| self.config.preference.clone());
        let result = self
            .run_attempts(request_id, &server, &fqdn, &zone, &preference, token)
            .await;

        match &result {
            Ok(dispatch) => log::info!(
                "dispatch #{request_id}: succeeded via {}",
                dispatch.transport_used
            ),
            Err(error) => log::error!("dispatch #{request_id}: failed: {error}"),
        }

        self.in_flight.lock().await.remove(&key);
        let _ = tx.send(Arc::new(result.clone()));
        result
    }

    async fn resolve_server_addr(&self, server: &str) -> Result<SocketAddr, TransportError> {
        let host_port = format!("{server}:{}", self.config.dns_port);
        let mut addrs = tokio::net::lookup_host(&host_port)
            .await
            .map_err(TransportError::from)?;
        addrs
            .next()
            .ok_or_else(|| TransportError::ServerUnreachable {
                detail: format!("no addresses resolved for {server}"),
            })
    }

    async fn run_attempts(
        &self,
        request_id: u64,
        server: &str,
        fqdn: &Fqdn,
        zone: &str,
        preference: &crate::types::TransportPreference,
        token: &CancellationToken,
    ) -> DispatchOutcome {
        let enabled = preference.enabled_in_order();
        // Resolved lazily: a preference list made entirely of Https/Mock
        // entries (as the test suite's does) never touches the network here.
        let mut resolved: Option<Result<SocketAddr, TransportError>> = None;

        let mut last_errors: HashMap<TransportKind, TransportError> = HashMap::new();
        let mut attempts_log: Vec<AttemptLog> = Vec::new();

        for attempt in 1..=self.config.max_retries {
            for kind in &enabled {
                if *kind == TransportKind::Https && !self.config.doh_allowed_for_zone(zone) {
                    continue;
                }
                let Some(transport) = self.transports.get(kind) else {
                    continue;
                };

                // Only the native resolver needs a bare `SocketAddr` (it feeds
                // hickory's `NameServerConfig`); UDP/TCP accept `host:port`
                // strings directly via `ToSocketAddrs`, resolving themselves.
                let server_arg = if *kind == TransportKind::Native {
                    if resolved.is_none() {
                        resolved = Some(self.resolve_server_addr(server).await);
                    }
                    match resolved.as_ref().unwrap() {
                        Ok(addr) => addr.to_string(),
                        Err(error) => {
                            attempts_log.push(AttemptLog {
                                kind: *kind,
                                error: Some(error.to_string()),
                            });
                            last_errors.insert(*kind, error.clone());
                            continue;
                        }
                    }
                } else {
                    format!("{server}:{}", self.config.dns_port)
                };

                log::trace!("dispatch #{request_id}: attempt {attempt} via {kind} to {server}");
                self.log(
                    request_id,
                    *kind,
                    server,
                    fqdn.as_str(),
                    QueryStatus::Started,
                    None,
                );

                let outcome = tokio::select! {
                    res = transport.query(&server_arg, fqdn, self.config.query_timeout) => res,
                    _ = token.cancelled() => Err(TransportError::Cancelled),
                };

                match outcome {
                    Ok(segments) => match reassemble::reassemble(&segments) {
                        Ok(text) => {
                            self.log(
                                request_id,
                                *kind,
                                server,
                                fqdn.as_str(),
                                QueryStatus::Success,
                                None,
                            );
                            attempts_log.push(AttemptLog {
                                kind: *kind,
                                error: None,
                            });
                            return Ok(DispatchResult {
                                request_id,
                                reassembled: text,
                                transport_used: *kind,
                                attempts: attempts_log,
                            });
                        }
                        Err(reassemble_error) => {
                            let error = TransportError::InvalidResponse(reassemble_error);
                            self.log(
                                request_id,
                                *kind,
                                server,
                                fqdn.as_str(),
                                QueryStatus::Failed,
                                Some(error.to_string()),
                            );
                            attempts_log.push(AttemptLog {
                                kind: *kind,
                                error: Some(error.to_string()),
                            });
                            last_errors.insert(*kind, error);
                        }
                    },
                    Err(TransportError::Cancelled) => return Err(DispatchError::Cancelled),
                    Err(error) => {
                        self.log(
                            request_id,
                            *kind,
                            server,
                            fqdn.as_str(),
                            QueryStatus::Failed,
                            Some(error.to_string()),
                        );
                        attempts_log.push(AttemptLog {
                            kind: *kind,
                            error: Some(error.to_string()),
                        });
                        last_errors.insert(*kind, error);
                    }
                }

                if token.is_cancelled() {
                    return Err(DispatchError::Cancelled);
                }
            }

            if attempt < self.config.max_retries {
                let backoff = std::cmp::min(
                    self.config.retry_base_delay * 2u32.pow(attempt - 1),
                    self.config.retry_max_delay,
                );
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = token.cancelled() => return Err(DispatchError::Cancelled),
                }
            }
        }

        Err(DispatchError::AllTransportsFailed {
            last_errors: last_errors
                .into_iter()
                .map(|(kind, error)| TransportAttemptError { kind, error })
                .collect(),
        })
    }
}

#[cfg(test)]
mod dispatcher_tests {
    use super::*;
    use crate::transports::mock::{MockOutcome, MockTransport};
    use crate::types::{TransportPreference, TransportPreferenceEntry};
    use std::time::Duration;

    fn preference_of(kinds: &[TransportKind]) -> TransportPreference {
        TransportPreference(
            kinds
                .iter()
                .map(|k| TransportPreferenceEntry {
                    kind: *k,
                    enabled: true,
                })
                .collect(),
        )
    }

    fn client_with(
        transports: HashMap<TransportKind, Arc<dyn Transport>>,
        preference: TransportPreference,
    ) -> ChatDnsClient {
        let config = Config {
            preference,
            max_retries: 1,
            ..Config::default()
        };
        ChatDnsClient::with_transports(config, transports)
    }

    #[tokio::test]
    async fn test_happy_path_returns_reassembled_text() {
        let udp = Arc::new(MockTransport::new(
            TransportKind::Udp,
            vec![MockOutcome::Success(vec![
                "1/2:Hello ".to_string(),
                "2/2:World!".to_string(),
            ])],
        ));
        let mut transports: HashMap<TransportKind, Arc<dyn Transport>> = HashMap::new();
        transports.insert(TransportKind::Udp, udp);
        let client = client_with(transports, preference_of(&[TransportKind::Udp]));

        let result = client
            .execute(Request::new("hi"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.reassembled, "Hello World!");
        assert_eq!(result.transport_used, TransportKind::Udp);
    }

    #[tokio::test]
    async fn test_falls_back_to_next_transport_on_failure() {
        let udp = Arc::new(MockTransport::new(
            TransportKind::Udp,
            vec![MockOutcome::Error(TransportError::NetworkUnavailable {
                detail: "refused".to_string(),
            })],
        ));
        let tcp = Arc::new(MockTransport::new(
            TransportKind::Tcp,
            vec![MockOutcome::Success(vec!["ok".to_string()])],
        ));
        let mut transports: HashMap<TransportKind, Arc<dyn Transport>> = HashMap::new();
        transports.insert(TransportKind::Udp, udp);
        transports.insert(TransportKind::Tcp, tcp);
        let client = client_with(
            transports,
            preference_of(&[TransportKind::Udp, TransportKind::Tcp]),
        );

        let result = client
            .execute(Request::new("hi"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.reassembled, "ok");
        assert_eq!(result.transport_used, TransportKind::Tcp);
    }

    #[tokio::test]
    async fn test_all_transports_failed_carries_per_transport_errors() {
        let udp = Arc::new(MockTransport::new(
            TransportKind::Udp,
            vec![MockOutcome::Error(TransportError::Timeout)],
        ));
        let tcp = Arc::new(MockTransport::new(
            TransportKind::Tcp,
            vec![MockOutcome::Error(TransportError::ServerUnreachable {
                detail: "no route".to_string(),
            })],
        ));
        let mut transports: HashMap<TransportKind, Arc<dyn Transport>> = HashMap::new();
        transports.insert(TransportKind::Udp, udp);
        transports.insert(TransportKind::Tcp, tcp);
        let client = client_with(
            transports,
            preference_of(&[TransportKind::Udp, TransportKind::Tcp]),
        );

        let error = client
            .execute(Request::new("hi"), &CancellationToken::new())
            .await
            .unwrap_err();
        match error {
            DispatchError::AllTransportsFailed { last_errors } => {
                assert_eq!(last_errors.len(), 2);
                assert!(last_errors.iter().any(|e| e.kind == TransportKind::Udp));
                assert!(last_errors.iter().any(|e| e.kind == TransportKind::Tcp));
            }
            other => panic!("expected AllTransportsFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_backgrounded_lifecycle_blocks_new_queries() {
        let client = client_with(HashMap::new(), preference_of(&[TransportKind::Udp]));
        client.set_lifecycle(Lifecycle::Background).await;

        let error = client
            .execute(Request::new("hi"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(error, DispatchError::Backgrounded));
    }

    #[tokio::test]
    async fn test_rate_limit_denies_past_capacity() {
        let udp = Arc::new(MockTransport::new(
            TransportKind::Udp,
            vec![
                MockOutcome::Success(vec!["one".to_string()]),
                MockOutcome::Success(vec!["two".to_string()]),
            ],
        ));
        let mut transports: HashMap<TransportKind, Arc<dyn Transport>> = HashMap::new();
        transports.insert(TransportKind::Udp, udp);
        let config = Config {
            preference: preference_of(&[TransportKind::Udp]),
            rate_limit_capacity: 1,
            max_retries: 1,
            ..Config::default()
        };
        let client = ChatDnsClient::with_transports(config, transports);

        client
            .execute(Request::new("first"), &CancellationToken::new())
            .await
            .unwrap();
        let error = client
            .execute(Request::new("second"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(error, DispatchError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_disallowed_server_is_refused_before_dispatch() {
        let config = Config {
            server: "evil.example.com".to_string(),
            preference: preference_of(&[TransportKind::Udp]),
            ..Config::default()
        };
        let client = ChatDnsClient::with_transports(config, HashMap::new());

        let error = client
            .execute(Request::new("hi"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(error, DispatchError::DisallowedServer { .. }));
    }

    #[tokio::test]
    async fn test_oversize_input_is_rejected_at_admission_without_dispatch() {
        let client = client_with(HashMap::new(), preference_of(&[TransportKind::Udp]));
        let error = client
            .execute(
                Request::new("a".repeat(200)),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(error, DispatchError::InputTooLong { .. }));
    }

    #[tokio::test]
    async fn test_unicode_chat_text_round_trips_through_dispatch() {
        let udp = Arc::new(MockTransport::new(
            TransportKind::Udp,
            vec![MockOutcome::Success(vec!["resposta".to_string()])],
        ));
        let mut transports: HashMap<TransportKind, Arc<dyn Transport>> = HashMap::new();
        transports.insert(TransportKind::Udp, udp);
        let client = client_with(transports, preference_of(&[TransportKind::Udp]));

        let result = client
            .execute(Request::new("Água São Paulo"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.reassembled, "resposta");
    }

    #[tokio::test]
    async fn test_cancellation_short_circuits_in_flight_attempt() {
        struct NeverReturns;
        #[async_trait::async_trait]
        impl Transport for NeverReturns {
            fn kind(&self) -> TransportKind {
                TransportKind::Udp
            }
            async fn query(
                &self,
                _server: &str,
                _fqdn: &Fqdn,
                _deadline: Duration,
            ) -> Result<Vec<String>, TransportError> {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }

        let mut transports: HashMap<TransportKind, Arc<dyn Transport>> = HashMap::new();
        transports.insert(TransportKind::Udp, Arc::new(NeverReturns));
        let client = client_with(transports, preference_of(&[TransportKind::Udp]));

        let token = CancellationToken::new();
        let token_for_cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token_for_cancel.cancel();
        });

        let error = client
            .execute(Request::new("hi"), &token)
            .await
            .unwrap_err();
        assert!(matches!(error, DispatchError::Cancelled));
    }

    #[tokio::test]
    async fn test_deduplicates_concurrent_identical_requests() {
        struct SlowTransport {
            calls: std::sync::atomic::AtomicUsize,
        }
        #[async_trait::async_trait]
        impl Transport for SlowTransport {
            fn kind(&self) -> TransportKind {
                TransportKind::Udp
            }
            async fn query(
                &self,
                _server: &str,
                _fqdn: &Fqdn,
                _deadline: Duration,
            ) -> Result<Vec<String>, TransportError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(vec!["shared answer".to_string()])
            }
        }

        let slow = Arc::new(SlowTransport {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let mut transports: HashMap<TransportKind, Arc<dyn Transport>> = HashMap::new();
        transports.insert(TransportKind::Udp, slow.clone() as Arc<dyn Transport>);
        let client = client_with(transports, preference_of(&[TransportKind::Udp]));

        let token_a = CancellationToken::new();
        let token_b = CancellationToken::new();
        let (first, second) = tokio::join!(
            client.execute(Request::new("same text"), &token_a),
            client.execute(Request::new("same text"), &token_b),
        );

        assert_eq!(first.unwrap().reassembled, "shared answer");
        assert_eq!(second.unwrap().reassembled, "shared answer");
        assert_eq!(slow.calls.load(Ordering::SeqCst), 1);
    }
}
