//! The KLAP transport (spec §4.5): a two-stage seed+auth-hash handshake
//! derives a session key/IV/signature, then every request carries a
//! strictly increasing sequence number baked into the IV and signature.

use async_trait::async_trait;
use rand::RngCore;

use crate::codec::{aes as aes_codec, hashes, pkcs7};
use crate::credentials::{fallback_order, Credentials};
use crate::device_config::DeviceConfig;
use crate::error::Error;
use crate::http_client::{Body, HttpClient};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportState {
    HandshakeRequired,
    Established,
}

/// `auth_hash` derivation version. v1 devices use MD5; v2 use SHA1+SHA256
/// (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KlapVersion {
    V1,
    V2,
}

fn auth_hash(version: KlapVersion, credentials: &Credentials) -> Vec<u8> {
    match version {
        KlapVersion::V1 => {
            let u = hashes::md5(credentials.username.as_bytes());
            let p = hashes::md5(credentials.password.as_bytes());
            hashes::md5(&[u.as_slice(), p.as_slice()].concat()).to_vec()
        }
        KlapVersion::V2 => {
            let u = hashes::sha1(credentials.username.as_bytes());
            let p = hashes::sha1(credentials.password.as_bytes());
            hashes::sha256(&[u.as_slice(), p.as_slice()].concat()).to_vec()
        }
    }
}

fn handshake1_tag(version: KlapVersion, local_seed: &[u8], remote_seed: &[u8], auth_hash: &[u8]) -> [u8; 32] {
    match version {
        KlapVersion::V1 => hashes::sha256_concat(&[local_seed, auth_hash]),
        KlapVersion::V2 => hashes::sha256_concat(&[local_seed, remote_seed, auth_hash]),
    }
}

/// spec §4.5 "handshake2_payload" — note the v1 branch deliberately
/// ignores `local_seed`, matching observed firmware (spec §9 open
/// question: "the AES transport's handshake2SeedAuthHash in the v1 code
/// path ignores remote_seed"; here it is KLAP's handshake-2 payload that
/// drops a seed in v1, preserved as specified rather than unified with v2).
fn handshake2_payload(version: KlapVersion, local_seed: &[u8], remote_seed: &[u8], auth_hash: &[u8]) -> [u8; 32] {
    match version {
        KlapVersion::V1 => hashes::sha256_concat(&[remote_seed, auth_hash]),
        KlapVersion::V2 => hashes::sha256_concat(&[remote_seed, local_seed, auth_hash]),
    }
}

/// Derived session material (spec §3 "EncryptionSession: KLAP"). `seq` is
/// the only field that mutates, incremented before each encrypt.
struct KlapSession {
    key: [u8; 16],
    iv_base: [u8; 12],
    sig: [u8; 28],
    seq: i32,
}

impl KlapSession {
    fn new(local_seed: &[u8; 16], remote_seed: &[u8; 16], auth_hash: &[u8]) -> Self {
        let key = {
            let full = hashes::sha256_concat(&[b"lsk", local_seed, remote_seed, auth_hash]);
            let mut k = [0u8; 16];
            k.copy_from_slice(&full[..16]);
            k
        };
        let iv_full = hashes::sha256_concat(&[b"iv", local_seed, remote_seed, auth_hash]);
        let mut iv_base = [0u8; 12];
        iv_base.copy_from_slice(&iv_full[..12]);
        let seq = i32::from_be_bytes(iv_full[28..32].try_into().unwrap());
        let sig = {
            let full = hashes::sha256_concat(&[b"ldk", local_seed, remote_seed, auth_hash]);
            let mut s = [0u8; 28];
            s.copy_from_slice(&full[..28]);
            s
        };
        Self { key, iv_base, sig, seq }
    }

    /// Encrypts one request, returning `(seq, wire_body)` where
    /// `wire_body = signature[32] || ciphertext` (spec §4.5 "Per-request
    /// envelope").
    fn encrypt(&mut self, plaintext: &[u8]) -> (i32, Vec<u8>) {
        self.seq += 1;
        let mut iv_full = [0u8; 16];
        iv_full[..12].copy_from_slice(&self.iv_base);
        iv_full[12..].copy_from_slice(&self.seq.to_be_bytes());

        let padded = pkcs7::pad(plaintext);
        let cipher = aes_codec::encrypt_cbc_raw(&self.key, &iv_full, &padded);

        let mut seq_and_cipher = Vec::with_capacity(4 + cipher.len());
        seq_and_cipher.extend_from_slice(&self.seq.to_be_bytes());
        seq_and_cipher.extend_from_slice(&cipher);
        let signature = hashes::sha256_concat(&[&self.sig, &seq_and_cipher]);

        let mut wire = Vec::with_capacity(32 + cipher.len());
        wire.extend_from_slice(&signature);
        wire.extend_from_slice(&cipher);
        (self.seq, wire)
    }

    fn decrypt(&self, seq: i32, wire_body: &[u8]) -> Result<Vec<u8>, Error> {
        if wire_body.len() < 32 {
            return Err(Error::Internal("KLAP response shorter than signature".into()));
        }
        let cipher = &wire_body[32..];
        let mut iv_full = [0u8; 16];
        iv_full[..12].copy_from_slice(&self.iv_base);
        iv_full[12..].copy_from_slice(&seq.to_be_bytes());
        let padded = aes_codec::decrypt_cbc_raw(&self.key, &iv_full, cipher);
        Ok(pkcs7::unpad(&padded))
    }
}

pub struct KlapTransport {
    http: HttpClient,
    version: KlapVersion,
    credentials: Credentials,
    state: TransportState,
    session: Option<KlapSession>,
}

impl KlapTransport {
    pub fn new(config: &DeviceConfig, version: KlapVersion) -> Result<Self, Error> {
        config.check_authable()?;
        let scheme = if config.connection_type.https { "https" } else { "http" };
        let base = reqwest::Url::parse(&format!("{scheme}://{}:{}/", config.host, config.effective_port()))
            .map_err(|e| Error::Internal(format!("invalid host {:?}: {e}", config.host)))?;
        let http = HttpClient::new(base, config.timeout, config.connection_type.https)?;
        Ok(Self {
            http,
            version,
            credentials: config.credentials.clone().unwrap_or_default(),
            state: TransportState::HandshakeRequired,
            session: None,
        })
    }

    /// Handshake 1 + 2 (spec §4.5). Tries the caller's credentials, then
    /// the default-credential fallback order, then blank.
    async fn handshake(&mut self) -> Result<(), Error> {
        let mut local_seed = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut local_seed);

        let response = self
            .http
            .post("app/handshake1", Body::Bytes(local_seed.to_vec()), None)
            .await?;
        if response.status != 200 {
            return Err(Error::Device {
                code: response.status as i64,
                message: "handshake1 failed".into(),
            });
        }
        if response.body.len() != 16 + 32 {
            return Err(Error::Internal(format!(
                "handshake1 reply had unexpected length {}",
                response.body.len()
            )));
        }
        let remote_seed: [u8; 16] = response.body[..16].try_into().unwrap();
        let server_tag = &response.body[16..48];

        let mut candidates: Vec<Credentials> = vec![self.credentials.clone()];
        candidates.extend(fallback_order());
        let effective_hash = candidates
            .iter()
            .map(|c| auth_hash(self.version, c))
            .find(|hash| handshake1_tag(self.version, &local_seed, &remote_seed, hash) == *server_tag)
            .ok_or_else(|| Error::Auth("KLAP handshake-1 tag did not match any known credentials".into()))?;

        let payload = handshake2_payload(self.version, &local_seed, &remote_seed, &effective_hash);
        let response = self
            .http
            .post("app/handshake2", Body::Bytes(payload.to_vec()), None)
            .await?;
        if response.status != 200 {
            return Err(Error::Device {
                code: response.status as i64,
                message: "handshake2 failed".into(),
            });
        }

        self.session = Some(KlapSession::new(&local_seed, &remote_seed, &effective_hash));
        self.state = TransportState::Established;
        Ok(())
    }
}

#[async_trait]
impl Transport for KlapTransport {
    async fn send(&mut self, request: &serde_json::Value) -> Result<serde_json::Value, Error> {
        if self.state == TransportState::HandshakeRequired {
            self.handshake().await?;
        }

        let session = self.session.as_mut().expect("handshake guarantees a session");
        let (seq, wire) = session.encrypt(request.to_string().as_bytes());
        let path = format!("app/request?seq={seq}");

        let response = self.http.post(&path, Body::Bytes(wire), None).await;
        let response = match response {
            Ok(r) => r,
            Err(err) => {
                self.state = TransportState::HandshakeRequired;
                return Err(err);
            }
        };

        if response.status == 403 {
            // spec §4.5/§8: "session dead" — force a new handshake next call.
            self.state = TransportState::HandshakeRequired;
            return Err(Error::Retryable("KLAP session rejected with HTTP 403".into()));
        }
        if response.status != 200 {
            return Err(Error::Device {
                code: response.status as i64,
                message: "KLAP request failed".into(),
            });
        }

        let session = self.session.as_ref().expect("handshake guarantees a session");
        let plain = session.decrypt(seq, &response.body)?;
        Ok(serde_json::from_slice(&plain)?)
    }

    async fn reset(&mut self) {
        self.state = TransportState::HandshakeRequired;
        self.session = None;
    }

    async fn close(&mut self) {
        self.reset().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_is_strictly_monotonic() {
        let mut session = KlapSession::new(&[1u8; 16], &[2u8; 16], &auth_hash(KlapVersion::V2, &Credentials::new("a", "b")));
        let initial = session.seq;
        let (seq1, _) = session.encrypt(b"{}");
        let (seq2, _) = session.encrypt(b"{}");
        let (seq3, _) = session.encrypt(b"{}");
        assert_eq!(seq1, initial + 1);
        assert_eq!(seq2, initial + 2);
        assert_eq!(seq3, initial + 3);
    }

    /// Spec §8 scenario 2: `local_seed = 16×0x01`, `remote_seed = 16×0x02`,
    /// `username="a"`, `password="b"`.
    #[test]
    fn handshake1_tag_matches_spec_scenario_2() {
        let local_seed = [0x01u8; 16];
        let remote_seed = [0x02u8; 16];
        let credentials = Credentials::new("a", "b");
        let hash = auth_hash(KlapVersion::V2, &credentials);
        let expected_hash = hashes::sha256_concat(&[&hashes::sha1(b"a")[..], &hashes::sha1(b"b")[..]]);
        assert_eq!(hash, expected_hash);

        let tag = handshake1_tag(KlapVersion::V2, &local_seed, &remote_seed, &hash);
        let manual = hashes::sha256_concat(&[&local_seed, &remote_seed, &hash]);
        assert_eq!(tag, manual);
    }

    #[test]
    fn session_round_trips_encrypt_decrypt() {
        let auth = auth_hash(KlapVersion::V2, &Credentials::new("x", "y"));
        let mut session = KlapSession::new(&[9u8; 16], &[8u8; 16], &auth);
        let (seq, wire) = session.encrypt(br#"{"method":"get_device_info"}"#);
        let decrypted = session.decrypt(seq, &wire).unwrap();
        assert_eq!(decrypted, br#"{"method":"get_device_info"}"#);
    }

    #[test]
    fn v1_and_v2_auth_hash_use_different_algorithms() {
        let credentials = Credentials::new("user", "pass");
        let v1 = auth_hash(KlapVersion::V1, &credentials);
        let v2 = auth_hash(KlapVersion::V2, &credentials);
        assert_eq!(v1.len(), 16); // MD5 digest
        assert_eq!(v2.len(), 32); // SHA256 digest
        assert_ne!(v1, v2);
    }
}
