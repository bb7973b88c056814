//! PKCS7 padding for 16-byte AES blocks. Spec §4.1, §8, §9.
//!
//! `unpad` is deliberately tolerant of malformed padding: rather than
//! erroring, it returns the input unchanged. This mirrors a known
//! looseness in the source this spec was distilled from (see spec §9,
//! "The PKCS7-tolerant decrypt ... obscures corruption") — preserved here
//! rather than silently hardened, with `unpad_strict` offered alongside
//! for callers that want the stricter behavior.

const BLOCK_SIZE: usize = 16;

pub fn pad(data: &[u8]) -> Vec<u8> {
    let pad_len = BLOCK_SIZE - (data.len() % BLOCK_SIZE);
    let mut out = Vec::with_capacity(data.len() + pad_len);
    out.extend_from_slice(data);
    out.extend(std::iter::repeat(pad_len as u8).take(pad_len));
    out
}

/// Tolerant unpad: returns `data` unchanged if the trailing padding isn't
/// well-formed, instead of failing. This is the default used by the AES
/// and KLAP transports when decrypting device responses.
pub fn unpad(data: &[u8]) -> Vec<u8> {
    match unpad_strict(data) {
        Some(unpadded) => unpadded.to_vec(),
        None => data.to_vec(),
    }
}

/// Strict unpad: `None` on malformed padding instead of passing the input
/// through. Exposed per spec §9's note that "a strict mode is worth
/// exposing".
pub fn unpad_strict(data: &[u8]) -> Option<&[u8]> {
    let &last = data.last()?;
    let pad_len = last as usize;
    if pad_len == 0 || pad_len > BLOCK_SIZE || pad_len > data.len() {
        return None;
    }
    let (body, padding) = data.split_at(data.len() - pad_len);
    if padding.iter().all(|&b| b == last) {
        Some(body)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_unpad_round_trip_for_all_aligned_lengths() {
        for len in 0..64 {
            let data: Vec<u8> = (0..len as u8).collect();
            let padded = pad(&data);
            assert_eq!(padded.len() % BLOCK_SIZE, 0);
            assert_eq!(unpad(&padded), data);
            assert_eq!(unpad_strict(&padded), Some(data.as_slice()));
        }
    }

    #[test]
    fn malformed_padding_is_returned_unchanged_by_tolerant_unpad() {
        let garbage = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 0xFF];
        assert_eq!(unpad(&garbage), garbage);
        assert_eq!(unpad_strict(&garbage), None);
    }

    #[test]
    fn full_block_of_padding_is_valid() {
        let data = vec![0u8; 16];
        let padded = pad(&data);
        assert_eq!(padded.len(), 32);
        assert_eq!(unpad(&padded), data);
    }
}
