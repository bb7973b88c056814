//! The three wire transports (spec §4.3-§4.5), each owning its own
//! connection/session material. A `Protocol` owns exactly one `Transport`
//! (spec §9 "unidirectional ownership").

pub mod aes_transport;
pub mod klap_transport;
pub mod xor_tcp;

use async_trait::async_trait;

use crate::error::Error;

/// Common shape every transport exposes to the protocol layer above it:
/// send one JSON request, get one JSON response back. Session/handshake
/// bookkeeping is entirely internal.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, request: &serde_json::Value) -> Result<serde_json::Value, Error>;

    /// Drops session/handshake state (cookies, derived keys) but keeps any
    /// underlying HTTP client/socket alive (spec §3 "Lifecycles").
    async fn reset(&mut self);

    /// Tears down the transport entirely; no further `send` calls are valid.
    async fn close(&mut self);

    /// Opaque base64 blob a caller can persist and later feed back via
    /// `DeviceConfig.credentials_hash` (spec §3, §4.4 "Credentials hash").
    /// `None` for transports with no notion of login (plain XOR).
    fn credentials_hash(&self) -> Option<String> {
        None
    }
}
