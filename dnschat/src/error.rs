//! Closed error taxonomy for the DNS chat core (spec.md §4.8).
//!
//! Errors are structured per concern, in the struct-per-kind idiom this
//! crate's predecessor used for its own closed taxonomy, not collapsed into
//! a single stringly-typed kind. Each struct carries only the context its
//! recovery path needs.

use std::fmt;

pub type Result<T> = std::result::Result<T, DispatchError>;

/// Errors from `sanitize`/`composeFqdn` (spec.md §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanitizeError {
    /// Raw input exceeded 120 characters before any sanitization ran.
    InputTooLong { len: usize },
    /// The sanitized result was empty after stripping disallowed bytes.
    LabelEmpty,
    /// The sanitized result exceeded 63 bytes.
    LabelTooLong { len: usize },
    /// A zone label failed validation at `composeFqdn` time.
    InvalidZoneLabel { label: String },
    /// The composed FQDN exceeded 253 bytes encoded.
    FqdnTooLong { len: usize },
}

impl fmt::Display for SanitizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SanitizeError::InputTooLong { len } => {
                write!(f, "input too long: {len} chars (max 120)")
            }
            SanitizeError::LabelEmpty => write!(f, "sanitized label is empty"),
            SanitizeError::LabelTooLong { len } => {
                write!(f, "sanitized label too long: {len} bytes (max 63)")
            }
            SanitizeError::InvalidZoneLabel { label } => {
                write!(f, "invalid zone label: {label:?}")
            }
            SanitizeError::FqdnTooLong { len } => {
                write!(f, "composed FQDN too long: {len} bytes (max 253)")
            }
        }
    }
}

impl std::error::Error for SanitizeError {}

/// The reassembly-specific subkinds of `InvalidResponse` (spec.md §4.3, §4.8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidResponseKind {
    Spoofed,
    EmptyResponse,
    InconsistentTotal,
    ConflictingPart { part_number: u32 },
    IncompleteResponse { missing: Vec<u32> },
    BufferOverflow { size: usize },
}

impl fmt::Display for InvalidResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidResponseKind::Spoofed => write!(f, "spoofed or mismatched response envelope"),
            InvalidResponseKind::EmptyResponse => write!(f, "reassembled response is empty"),
            InvalidResponseKind::InconsistentTotal => {
                write!(f, "numbered segments disagree on total part count")
            }
            InvalidResponseKind::ConflictingPart { part_number } => {
                write!(f, "conflicting content for part {part_number}")
            }
            InvalidResponseKind::IncompleteResponse { missing } => {
                write!(f, "missing parts: {missing:?}")
            }
            InvalidResponseKind::BufferOverflow { size } => {
                write!(f, "response buffer exceeded 65535 bytes ({size} seen)")
            }
        }
    }
}

impl std::error::Error for InvalidResponseKind {}

/// Errors a single transport adapter attempt can fail with (spec.md §4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Timeout,
    NetworkUnavailable { detail: String },
    ServerUnreachable { detail: String },
    InvalidResponse(InvalidResponseKind),
    PermissionDenied { detail: String },
    Cancelled,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "timeout"),
            TransportError::NetworkUnavailable { detail } => {
                write!(f, "network unavailable: {detail}")
            }
            TransportError::ServerUnreachable { detail } => {
                write!(f, "server unreachable: {detail}")
            }
            TransportError::InvalidResponse(kind) => write!(f, "invalid response: {kind}"),
            TransportError::PermissionDenied { detail } => {
                write!(f, "permission denied: {detail}")
            }
            TransportError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match error.kind() {
            PermissionDenied => TransportError::PermissionDenied {
                detail: error.to_string(),
            },
            TimedOut => TransportError::Timeout,
            ConnectionRefused | NotConnected | AddrNotAvailable => {
                TransportError::ServerUnreachable {
                    detail: error.to_string(),
                }
            }
            _ => TransportError::NetworkUnavailable {
                detail: error.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout
        } else if error.is_connect() {
            TransportError::ServerUnreachable {
                detail: error.to_string(),
            }
        } else {
            TransportError::NetworkUnavailable {
                detail: error.to_string(),
            }
        }
    }
}

impl From<hickory_resolver::ResolveError> for TransportError {
    fn from(error: hickory_resolver::ResolveError) -> Self {
        let is_timeout = error
            .proto()
            .is_some_and(|proto| proto.to_string().to_lowercase().contains("timed out"));
        if is_timeout {
            TransportError::Timeout
        } else if error.is_nx_domain() || error.is_no_records_found() {
            TransportError::InvalidResponse(InvalidResponseKind::EmptyResponse)
        } else {
            TransportError::NetworkUnavailable {
                detail: error.to_string(),
            }
        }
    }
}

/// Per-transport last error, carried by `AllTransportsFailed` (spec.md §4.8).
#[derive(Debug, Clone)]
pub struct TransportAttemptError {
    pub kind: crate::types::TransportKind,
    pub error: TransportError,
}

/// The dispatcher's closed error set (spec.md §4.5, §4.8).
#[derive(Debug, Clone)]
pub enum DispatchError {
    InputTooLong { len: usize },
    LabelEmpty,
    LabelTooLong { len: usize },
    RateLimited { retry_after: std::time::Duration },
    Backgrounded,
    Cancelled,
    AllTransportsFailed {
        last_errors: Vec<TransportAttemptError>,
    },
    DisallowedServer { server: String },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::InputTooLong { len } => {
                write!(f, "input too long: {len} chars (max 120)")
            }
            DispatchError::LabelEmpty => write!(f, "sanitized label is empty"),
            DispatchError::LabelTooLong { len } => {
                write!(f, "sanitized label too long: {len} bytes (max 63)")
            }
            DispatchError::RateLimited { retry_after } => {
                write!(f, "rate limited, retry after {retry_after:?}")
            }
            DispatchError::Backgrounded => write!(f, "query initiated while backgrounded"),
            DispatchError::Cancelled => write!(f, "cancelled"),
            DispatchError::AllTransportsFailed { last_errors } => {
                write!(f, "all transports failed: ")?;
                for (i, e) in last_errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", e.kind, e.error)?;
                }
                Ok(())
            }
            DispatchError::DisallowedServer { server } => {
                write!(f, "server not in allow-list: {server}")
            }
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<SanitizeError> for DispatchError {
    fn from(error: SanitizeError) -> Self {
        match error {
            SanitizeError::InputTooLong { len } => DispatchError::InputTooLong { len },
            SanitizeError::LabelEmpty => DispatchError::LabelEmpty,
            SanitizeError::LabelTooLong { len } => DispatchError::LabelTooLong { len },
            SanitizeError::InvalidZoneLabel { label } => {
                DispatchError::DisallowedServer { server: label }
            }
            SanitizeError::FqdnTooLong { len } => DispatchError::LabelTooLong { len },
        }
    }
}
