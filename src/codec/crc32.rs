//! CRC32 (IEEE 802.3 polynomial `0xEDB88320`, init/final xor `0xFFFFFFFF`)
//! used to checksum the 20002 discovery probe (spec §4.1, §6).

pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // CRC32("123456789") == 0xCBF43926, the standard IEEE check value.
        assert_eq!(checksum(b"123456789"), 0xCBF43926);
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(checksum(b""), 0);
    }
}
