//! Thin wrappers around the hash primitives spec §4.1 calls for: MD5
//! (legacy auth), SHA1 (v1 KLAP) and SHA256 (v2 KLAP + session
//! derivations). Kept as free functions rather than re-exporting the
//! crates directly so callers never have to import three different
//! `Digest` traits.

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

pub fn md5(data: &[u8]) -> [u8; 16] {
    Md5::digest(data).into()
}

pub fn sha1(data: &[u8]) -> [u8; 20] {
    Sha1::digest(data).into()
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// `SHA256` over the concatenation of several byte slices, used throughout
/// the KLAP derivations (spec §4.5) where inputs are built by
/// concatenating seeds/hashes rather than a single buffer.
pub fn sha256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn md5_known_vector() {
        assert_eq!(md5(b""), hex!("d41d8cd98f00b204e9800998ecf8427e"));
    }

    #[test]
    fn sha1_known_vector() {
        assert_eq!(sha1(b""), hex!("da39a3ee5e6b4b0d3255bfef95601890afd80709"));
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256(b""),
            hex!("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
    }

    #[test]
    fn sha256_concat_matches_manual_concatenation() {
        let a = b"hello";
        let b = b"world";
        let mut concat = Vec::new();
        concat.extend_from_slice(a);
        concat.extend_from_slice(b);
        assert_eq!(sha256_concat(&[a, b]), sha256(&concat));
    }
}
