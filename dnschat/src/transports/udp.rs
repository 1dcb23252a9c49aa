//! Raw UDP transport (spec.md §4.4).
//!
//! One datagram out, one datagram in, validated against the query's
//! transaction ID and echoed question before any TXT extraction happens.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use crate::codec::{build_txt_query, extract_txt_segments, validate_envelope};
use crate::error::TransportError;
use crate::types::{Fqdn, TransportKind};

use super::Transport;

pub struct UdpTransport;

#[async_trait]
impl Transport for UdpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Udp
    }

    async fn query(
        &self,
        server: &str,
        fqdn: &Fqdn,
        deadline: Duration,
    ) -> Result<Vec<String>, TransportError> {
        let query = build_txt_query(fqdn);

        let attempt = async {
            let socket = UdpSocket::bind("0.0.0.0:0").await?;
            socket.connect(server).await?;
            socket.send(&query.bytes).await?;

            let mut buf = [0u8; 4096];
            let n = socket.recv(&mut buf).await?;
            Ok::<_, TransportError>(buf[..n].to_vec())
        };

        let response = tokio::time::timeout(deadline, attempt)
            .await
            .map_err(|_| TransportError::Timeout)??;

        let answer_offset = validate_envelope(&response, &query)
            .map_err(TransportError::InvalidResponse)?;
        extract_txt_segments(&response, answer_offset).map_err(TransportError::InvalidResponse)
    }
}
