//! DNS-over-HTTPS transport (spec.md §4.4, §6; RFC 8484).
//!
//! POSTs the wire-encoded query with `Content-Type: application/dns-message`
//! to the configured DoH endpoint — the only transport usable from an
//! environment that forbids outbound port-53 traffic. Grounded in `reqwest`,
//! already the teacher's HTTP stack for its own exfiltration path
//! (`runner::commands::exfiltrate::HTTPExfiltrationSubCommand`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::codec::{build_txt_query, extract_txt_segments, validate_envelope};
use crate::error::TransportError;
use crate::types::{Fqdn, TransportKind};

use super::Transport;

const DNS_MESSAGE_MIME: &str = "application/dns-message";

pub struct DohTransport {
    client: Client,
    endpoint: String,
}

impl DohTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        DohTransport {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Transport for DohTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Https
    }

    async fn query(
        &self,
        _server: &str,
        fqdn: &Fqdn,
        deadline: Duration,
    ) -> Result<Vec<String>, TransportError> {
        let query = build_txt_query(fqdn);

        let request = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, DNS_MESSAGE_MIME)
            .header(reqwest::header::ACCEPT, DNS_MESSAGE_MIME)
            .body(query.bytes.clone());

        let response_bytes = tokio::time::timeout(deadline, async {
            let response = request.send().await?;
            let response = response.error_for_status()?;
            response.bytes().await
        })
        .await
        .map_err(|_| TransportError::Timeout)?
        .map_err(TransportError::from)?;

        let answer_offset = validate_envelope(&response_bytes, &query)
            .map_err(TransportError::InvalidResponse)?;
        extract_txt_segments(&response_bytes, answer_offset)
            .map_err(TransportError::InvalidResponse)
    }
}
