//! Native resolver transport (spec.md §4.4).
//!
//! Uses `hickory_resolver` pointed at the requested server — the lowest
//! overhead path and the preferred first attempt when available. Grounded
//! in `runner::commands::exfiltrate::DNSExfiltrationSubCommand::handle`'s
//! resolver construction, made fully async (no `block_on`) since this crate
//! requires cooperative cancellation and concurrent dispatch (spec.md §5).

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, ResolverConfig};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::xfer::Protocol;
use hickory_resolver::Resolver;

use crate::error::TransportError;
use crate::types::{Fqdn, TransportKind};

use super::Transport;

pub struct NativeTransport;

#[async_trait]
impl Transport for NativeTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Native
    }

    async fn query(
        &self,
        server: &str,
        fqdn: &Fqdn,
        deadline: Duration,
    ) -> Result<Vec<String>, TransportError> {
        let socket_addr = SocketAddr::from_str(server).map_err(|e| {
            TransportError::NetworkUnavailable {
                detail: format!("invalid server address {server:?}: {e}"),
            }
        })?;

        let mut resolver_config = ResolverConfig::new();
        resolver_config.add_name_server(NameServerConfig::new(socket_addr, Protocol::Udp));

        let resolver =
            Resolver::builder_with_config(resolver_config, TokioConnectionProvider::default())
                .build();

        let lookup = tokio::time::timeout(deadline, resolver.txt_lookup(fqdn.as_str().to_owned()))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(TransportError::from)?;

        let segments = lookup
            .iter()
            .flat_map(|txt| txt.iter().map(|chars| String::from_utf8_lossy(chars).into_owned()))
            .collect();

        Ok(segments)
    }
}
