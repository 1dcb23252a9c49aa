//! DNS Codec (spec.md §4.2): TXT query construction and response parsing,
//! with spoofing mitigations on the way back in.
//!
//! Grounded in RFC 1035 §3.1 (name encoding) and §4.1 (message header), in
//! the wire-integer idiom the corpus uses (`byteorder`, as `bramp-rustdns`
//! and `dandyvica-dnsquery` both do) rather than hand-rolled byte shifting
//! where a crate already does it cleanly.

use byteorder::{BigEndian, ByteOrder};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::InvalidResponseKind;
use crate::types::Fqdn;

const QTYPE_TXT: u16 = 0x0010;
const QCLASS_IN: u16 = 0x0001;
const FLAGS_STANDARD_QUERY_RD: u16 = 0x0100;

/// An encoded query: the wire bytes plus the transaction ID and question name
/// the caller must check the response against.
#[derive(Debug, Clone)]
pub struct EncodedQuery {
    pub bytes: Vec<u8>,
    pub transaction_id: u16,
    pub question_name: Vec<u8>,
}

/// Draw a transaction ID from a CSPRNG. Never from a weak PRNG (spec.md §4.2,
/// §9) — `OsRng` is backed by the OS entropy source, not a seeded LCG.
pub fn new_transaction_id() -> u16 {
    OsRng.next_u32() as u16
}

fn encode_name(fqdn: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(fqdn.len() + 2);
    for label in fqdn.split('.') {
        if label.is_empty() {
            continue;
        }
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    out
}

/// Build a 12-byte header + question-section TXT query for `fqdn`.
pub fn build_txt_query(fqdn: &Fqdn) -> EncodedQuery {
    let transaction_id = new_transaction_id();
    build_txt_query_with_id(fqdn, transaction_id)
}

fn build_txt_query_with_id(fqdn: &Fqdn, transaction_id: u16) -> EncodedQuery {
    let question_name = encode_name(fqdn.as_str());

    let mut bytes = Vec::with_capacity(12 + question_name.len() + 4);
    let mut header = [0u8; 12];
    BigEndian::write_u16(&mut header[0..2], transaction_id);
    BigEndian::write_u16(&mut header[2..4], FLAGS_STANDARD_QUERY_RD);
    BigEndian::write_u16(&mut header[4..6], 1); // QDCOUNT
    BigEndian::write_u16(&mut header[6..8], 0); // ANCOUNT
    BigEndian::write_u16(&mut header[8..10], 0); // NSCOUNT
    BigEndian::write_u16(&mut header[10..12], 0); // ARCOUNT
    bytes.extend_from_slice(&header);

    bytes.extend_from_slice(&question_name);
    let mut qtype_qclass = [0u8; 4];
    BigEndian::write_u16(&mut qtype_qclass[0..2], QTYPE_TXT);
    BigEndian::write_u16(&mut qtype_qclass[2..4], QCLASS_IN);
    bytes.extend_from_slice(&qtype_qclass);

    EncodedQuery {
        bytes,
        transaction_id,
        question_name,
    }
}

/// Parse the name starting at `offset`, following compression pointers.
/// Returns the name's wire-case-folded bytes (lowercased labels) and the
/// offset just past the name in the buffer the name itself occupied
/// (compression targets are not counted as "consumed" by the caller).
fn parse_name(buf: &[u8], mut offset: usize) -> Result<(Vec<u8>, usize), InvalidResponseKind> {
    let mut labels: Vec<u8> = Vec::new();
    let start = offset;
    let mut jumped = false;
    let mut end_offset = offset;
    let mut hops = 0;

    loop {
        if hops > 128 {
            return Err(InvalidResponseKind::Spoofed);
        }
        hops += 1;

        let len = *buf.get(offset).ok_or(InvalidResponseKind::Spoofed)? as usize;

        if len == 0 {
            if !jumped {
                end_offset = offset + 1;
            }
            labels.push(0);
            break;
        }

        if len & 0xC0 == 0xC0 {
            let b2 = *buf.get(offset + 1).ok_or(InvalidResponseKind::Spoofed)? as usize;
            let pointer = ((len & 0x3F) << 8) | b2;
            if !jumped {
                end_offset = offset + 2;
            }
            jumped = true;
            offset = pointer;
            if offset >= start {
                return Err(InvalidResponseKind::Spoofed);
            }
            continue;
        }

        let label_start = offset + 1;
        let label_end = label_start + len;
        let label = buf
            .get(label_start..label_end)
            .ok_or(InvalidResponseKind::Spoofed)?;
        labels.push(len as u8);
        labels.extend(label.iter().map(|b| b.to_ascii_lowercase()));
        offset = label_end;
    }

    Ok((labels, end_offset))
}

/// Validate the response envelope against the query it answers (spec.md
/// §4.2): size floor, transaction ID, QR bit, QDCOUNT and echoed question
/// name/type/class. Returns the answer section's starting offset on success.
pub fn validate_envelope(
    response: &[u8],
    query: &EncodedQuery,
) -> Result<usize, InvalidResponseKind> {
    if response.len() < 12 {
        return Err(InvalidResponseKind::Spoofed);
    }

    let resp_id = BigEndian::read_u16(&response[0..2]);
    if resp_id != query.transaction_id {
        return Err(InvalidResponseKind::Spoofed);
    }

    let flags = BigEndian::read_u16(&response[2..4]);
    let qr = (flags >> 15) & 0x1;
    if qr != 1 {
        return Err(InvalidResponseKind::Spoofed);
    }

    let qdcount = BigEndian::read_u16(&response[4..6]);
    if qdcount != 1 {
        return Err(InvalidResponseKind::Spoofed);
    }
    let ancount = BigEndian::read_u16(&response[6..8]) as usize;

    let (echoed_name, mut offset) = parse_name(response, 12)?;
    let mut expected_name = query.question_name.clone();
    for b in expected_name.iter_mut() {
        *b = b.to_ascii_lowercase();
    }
    if echoed_name != expected_name {
        return Err(InvalidResponseKind::Spoofed);
    }

    let qtype = BigEndian::read_u16(
        response
            .get(offset..offset + 2)
            .ok_or(InvalidResponseKind::Spoofed)?,
    );
    offset += 2;
    let qclass = BigEndian::read_u16(
        response
            .get(offset..offset + 2)
            .ok_or(InvalidResponseKind::Spoofed)?,
    );
    offset += 2;
    if qtype != QTYPE_TXT || qclass != QCLASS_IN {
        return Err(InvalidResponseKind::Spoofed);
    }

    if ancount == 0 {
        return Err(InvalidResponseKind::EmptyResponse);
    }

    Ok(offset)
}

/// Walk the answer RRs starting at `offset`, extracting every TXT
/// character-string as a separate segment, preserving order (spec.md §4.2).
pub fn extract_txt_segments(
    response: &[u8],
    answer_offset: usize,
) -> Result<Vec<String>, InvalidResponseKind> {
    let ancount = BigEndian::read_u16(
        response
            .get(6..8)
            .ok_or(InvalidResponseKind::Spoofed)?,
    ) as usize;

    let mut offset = answer_offset;
    let mut segments = Vec::new();

    for _ in 0..ancount {
        let (_name, next) = parse_name(response, offset)?;
        offset = next;

        let rr_type = BigEndian::read_u16(
            response
                .get(offset..offset + 2)
                .ok_or(InvalidResponseKind::Spoofed)?,
        );
        offset += 2;
        let _rr_class = BigEndian::read_u16(
            response
                .get(offset..offset + 2)
                .ok_or(InvalidResponseKind::Spoofed)?,
        );
        offset += 2;
        let _ttl = BigEndian::read_u32(
            response
                .get(offset..offset + 4)
                .ok_or(InvalidResponseKind::Spoofed)?,
        );
        offset += 4;
        let rdlength = BigEndian::read_u16(
            response
                .get(offset..offset + 2)
                .ok_or(InvalidResponseKind::Spoofed)?,
        ) as usize;
        offset += 2;

        let rdata = response
            .get(offset..offset + rdlength)
            .ok_or(InvalidResponseKind::Spoofed)?;
        offset += rdlength;

        if rr_type != QTYPE_TXT {
            continue;
        }

        let mut i = 0;
        while i < rdata.len() {
            let len = rdata[i] as usize;
            i += 1;
            let chars = rdata
                .get(i..i + len)
                .ok_or(InvalidResponseKind::Spoofed)?;
            segments.push(String::from_utf8_lossy(chars).into_owned());
            i += len;
        }
    }

    Ok(segments)
}

#[test]
fn test_build_txt_query_header_shape() {
    let fqdn = Fqdn("hello-swift-dns.ch.at".to_string());
    let query = build_txt_query(&fqdn);
    assert_eq!(query.bytes.len(), 12 + query.question_name.len() + 4);
    assert_eq!(BigEndian::read_u16(&query.bytes[2..4]), 0x0100);
    assert_eq!(BigEndian::read_u16(&query.bytes[4..6]), 1);
    assert_eq!(BigEndian::read_u16(&query.bytes[6..8]), 0);
}

#[test]
fn test_round_trip_name_encoding() {
    let fqdn = Fqdn("hello-swift-dns.ch.at".to_string());
    let query = build_txt_query(&fqdn);
    let (decoded, _end) = parse_name(&query.bytes, 12).unwrap();
    assert_eq!(decoded, query.question_name);
}

#[test]
fn test_transaction_id_distribution_is_not_constant() {
    let ids: std::collections::HashSet<u16> = (0..256).map(|_| new_transaction_id()).collect();
    assert!(ids.len() > 200, "transaction IDs collapsed: {}", ids.len());
}

#[cfg(test)]
fn build_response(query: &EncodedQuery, segments: &[&str]) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut header = [0u8; 12];
    BigEndian::write_u16(&mut header[0..2], query.transaction_id);
    BigEndian::write_u16(&mut header[2..4], 0x8180); // QR=1, RD+RA
    BigEndian::write_u16(&mut header[4..6], 1);
    BigEndian::write_u16(&mut header[6..8], 1);
    buf.extend_from_slice(&header);
    buf.extend_from_slice(&query.question_name);
    let mut qtype_qclass = [0u8; 4];
    BigEndian::write_u16(&mut qtype_qclass[0..2], QTYPE_TXT);
    BigEndian::write_u16(&mut qtype_qclass[2..4], QCLASS_IN);
    buf.extend_from_slice(&qtype_qclass);

    buf.extend_from_slice(&query.question_name);
    buf.extend_from_slice(&qtype_qclass);
    buf.extend_from_slice(&[0, 0, 0, 60]); // TTL

    let mut rdata = Vec::new();
    for s in segments {
        rdata.push(s.len() as u8);
        rdata.extend_from_slice(s.as_bytes());
    }
    let mut rdlength = [0u8; 2];
    BigEndian::write_u16(&mut rdlength, rdata.len() as u16);
    buf.extend_from_slice(&rdlength);
    buf.extend_from_slice(&rdata);

    buf
}

#[test]
fn test_validate_and_extract_happy_path() {
    let fqdn = Fqdn("hello-swift-dns.ch.at".to_string());
    let query = build_txt_query(&fqdn);
    let response = build_response(&query, &["1/2:Hello ", "2/2:World!"]);

    let offset = validate_envelope(&response, &query).unwrap();
    let segments = extract_txt_segments(&response, offset).unwrap();
    assert_eq!(segments, vec!["1/2:Hello ", "2/2:World!"]);
}

#[test]
fn test_validate_rejects_mismatched_transaction_id() {
    let fqdn = Fqdn("hello-swift-dns.ch.at".to_string());
    let query = build_txt_query(&fqdn);
    let mut response = build_response(&query, &["ok"]);
    response[0] ^= 0xFF;

    assert_eq!(
        validate_envelope(&response, &query),
        Err(InvalidResponseKind::Spoofed)
    );
}

#[test]
fn test_validate_rejects_undersized_response() {
    let fqdn = Fqdn("hello-swift-dns.ch.at".to_string());
    let query = build_txt_query(&fqdn);
    let short = vec![0u8; 4];
    assert_eq!(
        validate_envelope(&short, &query),
        Err(InvalidResponseKind::Spoofed)
    );
}

#[test]
fn test_validate_rejects_qr_not_set() {
    let fqdn = Fqdn("hello-swift-dns.ch.at".to_string());
    let query = build_txt_query(&fqdn);
    let mut response = build_response(&query, &["ok"]);
    // Clear QR bit (top bit of byte 2).
    response[2] &= 0x7F;
    assert_eq!(
        validate_envelope(&response, &query),
        Err(InvalidResponseKind::Spoofed)
    );
}
