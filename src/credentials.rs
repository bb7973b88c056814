//! Device login credentials, plus the embedded default-credential sets
//! tried during KLAP handshake-1 and the AES login fallback (spec §3, §4.5,
//! §7 "Default-credentials fallback").

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// A `(username, password)` pair. Equality is structural; an empty username
/// *and* empty password is the "blank" sentinel identity some firmware
/// accepts in place of real credentials.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The blank identity: `username == "" && password == ""`.
    pub fn blank() -> Self {
        Self::default()
    }

    pub fn is_blank(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }
}

/// The well-known consumer Kasa app account, used as a KLAP handshake-1
/// fallback when the caller's own credentials don't validate.
pub fn default_kasa() -> Credentials {
    Credentials::new("kasa@tp-link.net", "kasaSetup")
}

/// The well-known consumer Tapo app account, used both as a KLAP
/// handshake-1 fallback and the AES-passthrough login retry (spec §4.4
/// "Login error triggers one retry with the well-known Tapo default
/// credentials").
pub fn default_tapo() -> Credentials {
    Credentials::new("tapo@tp-link.net", "tapoSetup")
}

/// The camera-firmware default account, offered as a third KLAP
/// handshake-1 fallback for IPCAMERA/doorbell families.
pub fn default_camera() -> Credentials {
    Credentials::new("admin", "camera2020Setup")
}

/// The fallback order KLAP handshake-1 walks after the caller's own
/// credentials fail to validate (spec §4.5: "user auth_hash; then each
/// default-credential auth_hash; then blank-credential auth_hash").
pub fn fallback_order() -> [Credentials; 4] {
    [
        default_kasa(),
        default_tapo(),
        default_camera(),
        Credentials::blank(),
    ]
}

/// Opaque, protocol-specific replacement for live credentials (spec §3:
/// "alternative to live credentials"). Stored as base64 on `DeviceConfig`;
/// each transport defines its own inner JSON shape.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialsHash(String);

impl fmt::Debug for CredentialsHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CredentialsHash").field(&"[redacted]").finish()
    }
}

impl CredentialsHash {
    pub fn from_base64(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn encode_json(value: &serde_json::Value) -> Self {
        Self(BASE64.encode(value.to_string()))
    }

    pub fn decode_json(&self) -> Result<serde_json::Value, crate::error::Error> {
        let raw = BASE64.decode(&self.0)?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_is_structurally_equal_to_default() {
        assert_eq!(Credentials::blank(), Credentials::default());
        assert!(Credentials::blank().is_blank());
        assert!(!default_tapo().is_blank());
    }

    #[test]
    fn fallback_order_ends_with_blank() {
        let order = fallback_order();
        assert_eq!(order[3], Credentials::blank());
        assert_eq!(order[0], default_kasa());
        assert_eq!(order[1], default_tapo());
    }

    #[test]
    fn credentials_hash_round_trips_through_base64_json() {
        let value = serde_json::json!({"username": "dQ==", "password2": "cGFzcw=="});
        let hash = CredentialsHash::encode_json(&value);
        assert_eq!(hash.decode_json().unwrap(), value);
    }
}
