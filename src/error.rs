//! Crate-wide error taxonomy.
//!
//! One enum threads through transports, protocols and discovery, the way
//! `RLPxError` is the single error type for the teacher's RLPx stack. Unlike
//! that internal enum, this one is `pub`: it is the thing callers match on.

use std::fmt;

use crate::codec::error_code::ErrorCode;

/// Classification of a low-level connect/IO failure, used to decide whether
/// a retry makes sense (spec §4.3, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// `EHOSTDOWN` — device is off. Never retried.
    HostDown,
    /// `EHOSTUNREACH` — no route to device. Never retried.
    HostUnreachable,
    /// `ECONNREFUSED` — nothing listening on the port. Never retried.
    ConnectionRefused,
    /// Connection reset or broken pipe mid-request. Retryable.
    Reset,
    /// Any other transport-level I/O failure. Retryable.
    Other,
}

impl ConnectionErrorKind {
    /// The no-retry set from spec §4.3: `{EHOSTDOWN, EHOSTUNREACH, ECONNREFUSED}`.
    pub fn is_retryable(self) -> bool {
        !matches!(
            self,
            ConnectionErrorKind::HostDown
                | ConnectionErrorKind::HostUnreachable
                | ConnectionErrorKind::ConnectionRefused
        )
    }

    pub fn classify_io(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionRefused => ConnectionErrorKind::ConnectionRefused,
            ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => ConnectionErrorKind::Reset,
            ErrorKind::HostUnreachable => ConnectionErrorKind::HostUnreachable,
            ErrorKind::NotConnected | ErrorKind::AddrNotAvailable => {
                ConnectionErrorKind::HostUnreachable
            }
            _ => {
                // `ErrorKind::HostDown`/`NetworkDown` are still unstable on some
                // targets; fall back to matching the OS error number directly.
                #[cfg(target_os = "linux")]
                if err.raw_os_error() == Some(libc_ehostdown()) {
                    return ConnectionErrorKind::HostDown;
                }
                ConnectionErrorKind::Other
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn libc_ehostdown() -> i32 {
    64 // EHOSTDOWN on Linux
}

/// The error kinds surfaced to a caller, matching spec §6/§7 exactly.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Operation exceeded `DeviceConfig::timeout`. Retryable.
    #[error("operation timed out")]
    Timeout,

    /// Socket reset, refused, or unreachable. Retryable except for the
    /// connect-time no-retry set (see `ConnectionErrorKind`).
    #[error("connection error: {message}")]
    Connection {
        kind: ConnectionErrorKind,
        message: String,
    },

    /// Handshake tag mismatch, login failure, or a response error code in
    /// the auth partition. Drops the session.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Session expired, device busy, HTTP 403 at runtime, batch JSON-decode
    /// failure, or other condition the retry loop should spend a budget on.
    #[error("retryable error: {0}")]
    Retryable(String),

    /// Any other non-success device response code, code preserved.
    #[error("device error {code}: {message}")]
    Device { code: i64, message: String },

    /// Discovery/selection could not match a protocol/transport, or an
    /// unknown device family.
    #[error("unsupported device: {0}")]
    Unsupported(String),

    /// Decryption/parsing produced garbage after authentication succeeded.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Turn a raw TP-Link error code into a tagged `Error`, consulting the
    /// closed registry (spec §9 "Error-code registry"). `message` becomes
    /// the method name or context string for a useful log line.
    pub fn from_device_code(code: i64, message: impl Into<String>) -> Self {
        match ErrorCode::classify(code) {
            ErrorCode::Retryable => Error::Retryable(format!("device returned code {code}")),
            ErrorCode::Auth => Error::Auth(format!("device returned code {code}")),
            ErrorCode::Other => Error::Device {
                code,
                message: message.into(),
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Retryable(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::TimedOut {
            return Error::Timeout;
        }
        let kind = ConnectionErrorKind::classify_io(&err);
        Error::Connection {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(format!("JSON error: {err}"))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Error::Timeout;
        }
        if err.is_connect() {
            return Error::Connection {
                kind: ConnectionErrorKind::Other,
                message: err.to_string(),
            };
        }
        Error::Internal(err.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::Internal(format!("base64 decode error: {err}"))
    }
}

impl From<rsa::Error> for Error {
    fn from(err: rsa::Error) -> Self {
        Error::Internal(format!("RSA error: {err}"))
    }
}

impl From<rsa::pkcs8::Error> for Error {
    fn from(err: rsa::pkcs8::Error) -> Self {
        Error::Internal(format!("PKCS8 error: {err}"))
    }
}

impl From<rsa::pkcs8::spki::Error> for Error {
    fn from(err: rsa::pkcs8::spki::Error) -> Self {
        Error::Internal(format!("SPKI error: {err}"))
    }
}

impl fmt::Display for ConnectionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionErrorKind::HostDown => "host down",
            ConnectionErrorKind::HostUnreachable => "host unreachable",
            ConnectionErrorKind::ConnectionRefused => "connection refused",
            ConnectionErrorKind::Reset => "connection reset",
            ConnectionErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}
