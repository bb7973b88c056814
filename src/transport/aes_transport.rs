//! The AES-passthrough transport (spec §4.4): RSA handshake agrees on an
//! AES-128-CBC session, login exchanges it for a token, and every request
//! afterwards is tunnelled inside a `securePassthrough` envelope.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH};
use reqwest::Url;
use serde_json::json;

use crate::codec::{aes as aes_codec, hashes, pkcs7, rsa::RsaKeyPair};
use crate::credentials::{default_tapo, Credentials, CredentialsHash};
use crate::defaults::{
    AES_DEFAULT_SESSION_TIMEOUT, AES_HANDSHAKE_CONTENT_LENGTH, AES_SESSION_EXPIRY_SAFETY_MARGIN,
};
use crate::device_config::DeviceConfig;
use crate::error::Error;
use crate::http_client::{Body, HttpClient};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportState {
    HandshakeRequired,
    LoginRequired,
    Established,
}

/// Symmetric AES-128-CBC session material agreed during handshake (spec
/// §3 "EncryptionSession: AES"). A plain value object; PKCS7 padding and
/// base64 framing live here since every passthrough envelope needs both.
struct AesSession {
    key: [u8; 16],
    iv: [u8; 16],
}

impl AesSession {
    fn encrypt(&self, plaintext: &[u8]) -> String {
        let padded = pkcs7::pad(plaintext);
        let cipher = aes_codec::encrypt_cbc_raw(&self.key, &self.iv, &padded);
        BASE64.encode(cipher)
    }

    fn decrypt(&self, b64_ciphertext: &str) -> Result<Vec<u8>, Error> {
        let cipher = BASE64.decode(b64_ciphertext)?;
        let padded = aes_codec::decrypt_cbc_raw(&self.key, &self.iv, &cipher);
        Ok(pkcs7::unpad(&padded))
    }
}

pub struct AesTransport {
    http: HttpClient,
    credentials: Credentials,
    login_version: u8,
    state: TransportState,
    session: Option<AesSession>,
    session_expires_at: Option<Instant>,
    token: Option<String>,
    keypair: Option<RsaKeyPair>,
    tried_default_credentials: bool,
}

impl AesTransport {
    pub fn new(config: &DeviceConfig) -> Result<Self, Error> {
        config.check_authable()?;
        let scheme = if config.connection_type.https { "https" } else { "http" };
        let base = Url::parse(&format!("{scheme}://{}:{}/", config.host, config.effective_port()))
            .map_err(|e| Error::Internal(format!("invalid host {:?}: {e}", config.host)))?;
        let http = HttpClient::new(base, config.timeout, config.connection_type.https)?;
        let keypair = match &config.aes_keys {
            Some(b64) => Some(RsaKeyPair::from_base64_der(b64)?),
            None => None,
        };
        Ok(Self {
            http,
            credentials: config.credentials.clone().unwrap_or_default(),
            login_version: config.connection_type.login_version.unwrap_or(1),
            state: TransportState::HandshakeRequired,
            session: None,
            session_expires_at: None,
            token: None,
            keypair,
            tried_default_credentials: false,
        })
    }

    fn session_expired(&self) -> bool {
        matches!(self.session_expires_at, Some(at) if Instant::now() >= at)
    }

    async fn ensure_ready(&mut self) -> Result<(), Error> {
        if self.state == TransportState::Established && self.session_expired() {
            self.state = TransportState::HandshakeRequired;
        }
        if self.state == TransportState::HandshakeRequired {
            self.handshake().await?;
        }
        if self.state == TransportState::LoginRequired {
            self.login(&self.credentials.clone()).await?;
        }
        Ok(())
    }

    async fn handshake(&mut self) -> Result<(), Error> {
        let keypair = match self.keypair.take() {
            Some(kp) => kp,
            None => RsaKeyPair::generate(crate::codec::rsa::HANDSHAKE_KEY_BITS)?,
        };
        let pem = keypair.public_key_pem()?;
        let body = json!({"method": "handshake", "params": {"key": pem}}).to_string();

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_LENGTH,
            HeaderValue::from_static(AES_HANDSHAKE_CONTENT_LENGTH),
        );

        let response = self
            .http
            .post("app", Body::Bytes(body.into_bytes()), Some(headers))
            .await?;
        if response.status != 200 {
            return Err(Error::Device {
                code: response.status as i64,
                message: "handshake failed".into(),
            });
        }
        let parsed = response.json()?;
        let encrypted_key = parsed["result"]["key"]
            .as_str()
            .ok_or_else(|| Error::Internal("handshake response missing result.key".into()))?;
        let key_bytes = BASE64.decode(encrypted_key)?;
        let blob = keypair.decrypt_pkcs1v15(&key_bytes)?;
        if blob.len() < 32 {
            return Err(Error::Internal("handshake key blob shorter than 32 bytes".into()));
        }
        let mut key = [0u8; 16];
        let mut iv = [0u8; 16];
        key.copy_from_slice(&blob[..16]);
        iv.copy_from_slice(&blob[16..32]);
        self.session = Some(AesSession { key, iv });
        self.keypair = Some(keypair);

        let timeout_secs = self
            .http
            .get_cookie("TIMEOUT")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(AES_DEFAULT_SESSION_TIMEOUT);
        self.session_expires_at =
            Some(Instant::now() + timeout_secs.saturating_sub(AES_SESSION_EXPIRY_SAFETY_MARGIN));

        self.state = TransportState::LoginRequired;
        Ok(())
    }

    fn login_password_param(&self, credentials: &Credentials) -> (&'static str, String) {
        if self.login_version == 2 {
            ("password2", BASE64.encode(hashes::sha1(credentials.password.as_bytes())))
        } else {
            ("password", BASE64.encode(credentials.password.as_bytes()))
        }
    }

    async fn login(&mut self, credentials: &Credentials) -> Result<(), Error> {
        let (password_key, password_value) = self.login_password_param(credentials);
        let username = BASE64.encode(hashes::sha1(credentials.username.as_bytes()));
        let request_time_milis = now_millis();
        let params = json!({"username": username, password_key: password_value});
        let body = json!({
            "method": "login_device",
            "params": params,
            "request_time_milis": request_time_milis,
        });

        let response = self.secure_passthrough_raw(&body).await?;
        let code = response["error_code"].as_i64().unwrap_or(0);
        if code != 0 {
            if !self.tried_default_credentials {
                self.tried_default_credentials = true;
                self.handshake().await?;
                return Box::pin(self.login(&default_tapo())).await;
            }
            return Err(Error::from_device_code(code, "login_device"));
        }

        let token = response["result"]["token"]
            .as_str()
            .ok_or_else(|| Error::Internal("login response missing result.token".into()))?;
        self.token = Some(token.to_string());
        self.state = TransportState::Established;
        Ok(())
    }

    /// Sends `request` wrapped in `securePassthrough`, returning the
    /// decrypted inner JSON (spec §4.4 "Secure passthrough").
    async fn secure_passthrough_raw(&self, request: &serde_json::Value) -> Result<serde_json::Value, Error> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| Error::Internal("no AES session established".into()))?;
        let encrypted = session.encrypt(request.to_string().as_bytes());
        let envelope = json!({"method": "securePassthrough", "params": {"request": encrypted}});

        let full_path = match (&self.state, &self.token) {
            (TransportState::Established, Some(token)) => format!("app?token={token}"),
            _ => "app".to_string(),
        };

        let response = self.http.post(&full_path, Body::Json(&envelope), None).await?;
        let parsed = response.json()?;

        let inner = &parsed["result"]["response"];
        if let Some(b64) = inner.as_str() {
            match session.decrypt(b64) {
                Ok(bytes) => return Ok(serde_json::from_slice(&bytes)?),
                Err(_) => {
                    // Already-unwrapped JSON fallback (spec §4.4): some
                    // firmware skips encryption under some conditions.
                    if let Ok(value) = serde_json::from_str::<serde_json::Value>(b64) {
                        return Ok(value);
                    }
                    return Err(Error::Internal("securePassthrough response undecryptable".into()));
                }
            }
        }
        Ok(parsed)
    }
}

fn now_millis() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[async_trait]
impl Transport for AesTransport {
    async fn send(&mut self, request: &serde_json::Value) -> Result<serde_json::Value, Error> {
        self.ensure_ready().await?;
        match self.secure_passthrough_raw(request).await {
            Ok(value) => Ok(value),
            Err(err) => {
                self.state = TransportState::HandshakeRequired;
                Err(err)
            }
        }
    }

    async fn reset(&mut self) {
        self.state = TransportState::HandshakeRequired;
        self.session = None;
        self.session_expires_at = None;
        self.token = None;
    }

    async fn close(&mut self) {
        self.reset().await;
    }

    fn credentials_hash(&self) -> Option<String> {
        let (key, value) = self.login_password_param(&self.credentials);
        let username = BASE64.encode(hashes::sha1(self.credentials.username.as_bytes()));
        let hash = CredentialsHash::encode_json(&json!({"username": username, key: value}));
        Some(hash.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_v2_hashes_password_with_sha1() {
        let config = test_config(2);
        let transport = AesTransport::new(&config).unwrap();
        let (key, value) = transport.login_password_param(&Credentials::new("user", "pass"));
        assert_eq!(key, "password2");
        assert_eq!(value, BASE64.encode(hashes::sha1(b"pass")));
    }

    #[test]
    fn login_v1_sends_plain_base64_password() {
        let config = test_config(1);
        let transport = AesTransport::new(&config).unwrap();
        let (key, value) = transport.login_password_param(&Credentials::new("user", "pass"));
        assert_eq!(key, "password");
        assert_eq!(value, BASE64.encode(b"pass"));
    }

    fn test_config(login_version: u8) -> DeviceConfig {
        use crate::device_config::{ConnectionType, DeviceConfigBuilder, DeviceFamily, Encryption};
        DeviceConfigBuilder::new(
            "10.0.0.5",
            ConnectionType::new(DeviceFamily::SmartTapoPlug, Encryption::Aes).with_login_version(login_version),
        )
        .credentials(Credentials::new("user", "pass"))
        .build()
    }

    #[test]
    fn session_encrypt_decrypt_round_trip() {
        let session = AesSession { key: [0x55u8; 16], iv: [0x11u8; 16] };
        let plaintext = br#"{"method":"get_device_info"}"#;
        let encrypted = session.encrypt(plaintext);
        let decrypted = session.decrypt(&encrypted).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn handshake_content_length_constant_matches_spec() {
        assert_eq!(AES_HANDSHAKE_CONTENT_LENGTH, "314");
    }
}
