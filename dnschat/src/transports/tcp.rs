//! Raw TCP transport (spec.md §4.4).
//!
//! Prefixes the query with a 2-byte big-endian length (RFC 1035 §4.2.2) and
//! reads exactly that many response bytes. Caps the accepted message size at
//! 65535 bytes and terminates the connection immediately on a hostile
//! oversized length prefix (spec.md §4.2, §8).

use std::time::Duration;

use async_trait::async_trait;
use byteorder::{BigEndian, ByteOrder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::codec::{build_txt_query, extract_txt_segments, validate_envelope};
use crate::error::{InvalidResponseKind, TransportError};
use crate::types::{Fqdn, TransportKind};

use super::Transport;

const MAX_TCP_MESSAGE_SIZE: usize = 65_535;

/// Reject before allocating if `len` would exceed the RFC 1035 TCP message
/// cap. Factored out so the guard is checked before any buffer sized by an
/// attacker-controlled length prefix is allocated (spec.md §4.2, §8) — the
/// 2-byte wire field itself can only ever encode up to 65535, so this also
/// guards a future framing change that widens the prefix.
fn check_length(len: usize) -> Result<(), InvalidResponseKind> {
    if len > MAX_TCP_MESSAGE_SIZE {
        Err(InvalidResponseKind::BufferOverflow { size: len })
    } else {
        Ok(())
    }
}

pub struct TcpTransport;

#[async_trait]
impl Transport for TcpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    async fn query(
        &self,
        server: &str,
        fqdn: &Fqdn,
        deadline: Duration,
    ) -> Result<Vec<String>, TransportError> {
        let query = build_txt_query(fqdn);

        let attempt = async {
            let mut stream = TcpStream::connect(server).await?;

            let mut framed = Vec::with_capacity(2 + query.bytes.len());
            framed.extend_from_slice(&(query.bytes.len() as u16).to_be_bytes());
            framed.extend_from_slice(&query.bytes);
            stream.write_all(&framed).await?;

            let mut len_buf = [0u8; 2];
            stream.read_exact(&mut len_buf).await?;
            let response_len = BigEndian::read_u16(&len_buf) as usize;
            check_length(response_len).map_err(TransportError::InvalidResponse)?;

            let mut response = vec![0u8; response_len];
            stream.read_exact(&mut response).await?;
            Ok::<_, TransportError>(response)
        };

        let response = tokio::time::timeout(deadline, attempt)
            .await
            .map_err(|_| TransportError::Timeout)??;

        let answer_offset = validate_envelope(&response, &query)
            .map_err(TransportError::InvalidResponse)?;
        extract_txt_segments(&response, answer_offset).map_err(TransportError::InvalidResponse)
    }
}

#[test]
fn test_check_length_rejects_hostile_oversized_prefix() {
    // RFC 1035's 2-byte TCP length prefix can only ever encode up to 65535;
    // this is the scenario-6 "70000-byte length prefix" attack expressed at
    // the framing-agnostic guard level, so the cap is enforced even if a
    // future accumulated-buffer read widens past a single u16 field.
    assert_eq!(
        check_length(70_000),
        Err(InvalidResponseKind::BufferOverflow { size: 70_000 })
    );
    assert_eq!(check_length(65_535), Ok(()));
    assert_eq!(check_length(0), Ok(()));
}

#[tokio::test]
async fn test_connect_failure_maps_to_transport_error() {
    let transport = TcpTransport;
    let fqdn = Fqdn("hello.ch.at".to_string());
    // Port 0 never accepts connections; exercises the `?` conversion path.
    let err = transport
        .query("127.0.0.1:0", &fqdn, Duration::from_millis(500))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransportError::ServerUnreachable { .. } | TransportError::NetworkUnavailable { .. }
    ));
}
