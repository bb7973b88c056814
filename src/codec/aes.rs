//! Raw AES-128-CBC block operations. Padding (PKCS7) and base64 framing
//! are layered on top by the AES-passthrough and KLAP transports
//! respectively — this module only ever sees block-aligned buffers.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;

const BLOCK_SIZE: usize = 16;

fn xor_block(a: &mut [u8], b: &[u8]) {
    for (x, y) in a.iter_mut().zip(b) {
        *x ^= y;
    }
}

/// Encrypts `plaintext`, which must already be a multiple of 16 bytes
/// (callers pad with `codec::pkcs7::pad` first). Standard CBC chaining:
/// each plaintext block is XORed with the previous ciphertext block (the
/// IV for the first) before the block cipher is applied.
pub fn encrypt_cbc_raw(key: &[u8; 16], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    debug_assert_eq!(plaintext.len() % BLOCK_SIZE, 0, "CBC input must be block-aligned");
    let cipher = Aes128::new(key.into());
    let mut prev = *iv;
    let mut out = Vec::with_capacity(plaintext.len());
    for chunk in plaintext.chunks(BLOCK_SIZE) {
        let mut block = [0u8; BLOCK_SIZE];
        block.copy_from_slice(chunk);
        xor_block(&mut block, &prev);
        cipher.encrypt_block((&mut block).into());
        out.extend_from_slice(&block);
        prev = block;
    }
    out
}

/// Decrypts `ciphertext` (must be block-aligned); the result still carries
/// PKCS7 padding, which the caller strips with `codec::pkcs7::unpad`.
pub fn decrypt_cbc_raw(key: &[u8; 16], iv: &[u8; 16], ciphertext: &[u8]) -> Vec<u8> {
    debug_assert_eq!(ciphertext.len() % BLOCK_SIZE, 0, "CBC input must be block-aligned");
    let cipher = Aes128::new(key.into());
    let mut prev = *iv;
    let mut out = Vec::with_capacity(ciphertext.len());
    for chunk in ciphertext.chunks(BLOCK_SIZE) {
        let mut block = [0u8; BLOCK_SIZE];
        block.copy_from_slice(chunk);
        let next_prev = block;
        cipher.decrypt_block((&mut block).into());
        xor_block(&mut block, &prev);
        out.extend_from_slice(&block);
        prev = next_prev;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::pkcs7;

    #[test]
    fn cbc_round_trip_across_multiple_blocks() {
        let key = [0x42u8; 16];
        let iv = [0x24u8; 16];
        let plaintext = b"a message that spans multiple 16-byte AES blocks";
        let padded = pkcs7::pad(plaintext);
        let cipher = encrypt_cbc_raw(&key, &iv, &padded);
        let decrypted = decrypt_cbc_raw(&key, &iv, &cipher);
        assert_eq!(pkcs7::unpad(&decrypted), plaintext);
    }

    #[test]
    fn different_iv_changes_ciphertext() {
        let key = [0x11u8; 16];
        let plaintext = pkcs7::pad(b"0123456789abcdef");
        let c1 = encrypt_cbc_raw(&key, &[0u8; 16], &plaintext);
        let c2 = encrypt_cbc_raw(&key, &[1u8; 16], &plaintext);
        assert_ne!(c1, c2);
    }

    #[test]
    fn changing_a_byte_in_one_block_only_affects_that_block_forward_on_decrypt() {
        // CBC error propagation sanity check: corrupting ciphertext block i
        // scrambles plaintext block i entirely but only flips the
        // corresponding bits of block i+1 (since it's XORed in, not
        // re-encrypted) — this is the standard CBC property, verified here
        // to catch an accidental ECB-mode regression.
        let key = [0x77u8; 16];
        let iv = [0x88u8; 16];
        let plaintext = pkcs7::pad(b"0123456789abcdef0123456789abcdef");
        let mut cipher = encrypt_cbc_raw(&key, &iv, &plaintext);
        cipher[0] ^= 0xFF;
        let decrypted = decrypt_cbc_raw(&key, &iv, &cipher);
        assert_ne!(&decrypted[0..16], &plaintext[0..16]);
        assert_eq!(&decrypted[32..], &plaintext[32..]);
    }
}
