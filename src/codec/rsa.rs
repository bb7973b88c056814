//! RSA key generation and decryption for the AES-passthrough handshake and
//! the 20002 discovery probe (spec §4.1).
//!
//! Two distinct key sizes are used: 1024-bit for the AES transport
//! handshake (PKCS1 v1.5), 2048-bit for discovery (OAEP-SHA1). Both are
//! modeled by the same `RsaKeyPair` wrapper; the caller picks the bit size
//! and padding scheme at the call site, matching the way the teacher's
//! `k256::SecretKey` is one type used for both the static node key and
//! ephemeral per-message keys in `rlpx/handshake.rs`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;

use crate::error::Error;

pub const HANDSHAKE_KEY_BITS: usize = 1024;
pub const DISCOVERY_KEY_BITS: usize = 2048;

/// An RSA keypair, generated fresh or restored from cached DER bytes
/// (`DeviceConfig::aes_keys`, spec §4.4 "Cached keys").
pub struct RsaKeyPair {
    private: RsaPrivateKey,
}

impl RsaKeyPair {
    pub fn generate(bits: usize) -> Result<Self, Error> {
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| Error::Internal(format!("RSA keygen failed: {e}")))?;
        Ok(Self { private })
    }

    /// Public key in PEM, embedded in the handshake/discovery request body.
    pub fn public_key_pem(&self) -> Result<String, Error> {
        let public = RsaPublicKey::from(&self.private);
        Ok(public.to_public_key_pem(LineEnding::LF)?)
    }

    /// PKCS1-DER encoding of the private key, for `DeviceConfig::aes_keys`.
    pub fn to_der(&self) -> Result<Vec<u8>, Error> {
        let doc = self
            .private
            .to_pkcs1_der()
            .map_err(|e| Error::Internal(format!("RSA DER encode failed: {e}")))?;
        Ok(doc.as_bytes().to_vec())
    }

    pub fn from_der(der: &[u8]) -> Result<Self, Error> {
        let private = RsaPrivateKey::from_pkcs1_der(der)
            .map_err(|e| Error::Internal(format!("RSA DER decode failed: {e}")))?;
        Ok(Self { private })
    }

    /// Base64 round-trip helpers for the `DeviceConfig.aes_keys` field,
    /// which stores "base64 DER-encoded RSA keypair".
    pub fn to_base64_der(&self) -> Result<String, Error> {
        Ok(BASE64.encode(self.to_der()?))
    }

    pub fn from_base64_der(b64: &str) -> Result<Self, Error> {
        let der = BASE64.decode(b64)?;
        Self::from_der(&der)
    }

    /// PKCS1 v1.5 decryption, used by the AES transport handshake to
    /// recover the 32-byte AES key+IV blob (spec §4.4).
    pub fn decrypt_pkcs1v15(&self, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(self.private.decrypt(Pkcs1v15Encrypt, ciphertext)?)
    }

    /// OAEP-SHA1 decryption, used by discovery to recover the encrypted
    /// symmetric key material in `encrypt_info` (spec §4.10).
    pub fn decrypt_oaep_sha1(&self, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(self.private.decrypt(Oaep::new::<Sha1>(), ciphertext)?)
    }
}

/// Parses a PEM-encoded SubjectPublicKeyInfo public key, as received from a
/// peer (e.g. decoded from a handshake response is never needed here since
/// this crate only ever *sends* its own public key; kept for completeness
/// and for tests that round-trip a generated key through PEM).
pub fn parse_public_key_pem(pem: &str) -> Result<RsaPublicKey, Error> {
    Ok(RsaPublicKey::from_public_key_pem(pem)?)
}
