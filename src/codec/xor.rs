//! The legacy XOR stream cipher used by the IoT (TCP 9999 / UDP 9999/20002
//! legacy) wire format. Spec §4.1, §6, §8 scenario (1).

const SEED: u8 = 0xAB;

/// `encrypt_byte[i] = key XOR plain[i]; key' = encrypt_byte[i]`.
pub fn encrypt(plaintext: &[u8]) -> Vec<u8> {
    let mut key = SEED;
    plaintext
        .iter()
        .map(|&b| {
            let c = key ^ b;
            key = c;
            c
        })
        .collect()
}

/// `plain = key XOR cipher; key' = cipher`. Mirrors `encrypt` with roles
/// of plain/cipher swapped in the key update.
pub fn decrypt(ciphertext: &[u8]) -> Vec<u8> {
    let mut key = SEED;
    ciphertext
        .iter()
        .map(|&c| {
            let p = key ^ c;
            key = c;
            p
        })
        .collect()
}

/// `u32be(len(plain)) || xor_stream(plain)` — the framed request used by
/// the XOR-TCP transport. The UDP legacy discovery probe uses the stream
/// without this length prefix; see `crate::discovery::packet`.
pub fn encrypt_request(plaintext: &str) -> Vec<u8> {
    let body = encrypt(plaintext.as_bytes());
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    out
}

/// Decrypts a payload that does *not* carry the length prefix (the caller
/// has already read exactly `length` bytes off the wire).
pub fn decrypt_response(payload: &[u8]) -> Vec<u8> {
    decrypt(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_round_trip() {
        let plain = br#"{"system":{"get_sysinfo":{}}}"#;
        let framed = encrypt_request(std::str::from_utf8(plain).unwrap());
        let len = u32::from_be_bytes(framed[..4].try_into().unwrap()) as usize;
        assert_eq!(len, plain.len());
        let decrypted = decrypt_response(&framed[4..]);
        assert_eq!(decrypted, plain);
    }

    /// Scenario (1) from spec §8: concrete byte vector for the 31-byte
    /// get_sysinfo probe (the canonical request body has a space after
    /// each `:`, making it 31 bytes rather than 29).
    #[test]
    fn known_vector_get_sysinfo() {
        let plain = r#"{"system": {"get_sysinfo": {}}}"#;
        assert_eq!(plain.len(), 31);
        let framed = encrypt_request(plain);
        assert_eq!(&framed[..4], &[0x00, 0x00, 0x00, 0x1F]);
        assert_eq!(
            &framed[4..12],
            &[0xD0, 0xF2, 0x81, 0xF8, 0x8B, 0xFF, 0x9A, 0xF7]
        );
        assert_eq!(decrypt_response(&framed[4..]), plain.as_bytes());
    }

    #[test]
    fn decrypt_is_inverse_for_all_bytes() {
        let plain: Vec<u8> = (0..=255u8).collect();
        let cipher = encrypt(&plain);
        assert_eq!(decrypt(&cipher), plain);
    }
}
