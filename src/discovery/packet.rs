//! Discovery probe/reply framing for both UDP ports (spec §4.10, §6).

use rand::RngCore;

use crate::codec::{crc32, xor};

/// The fixed discovery probe body every device answers (spec §4.10, §6).
pub const LEGACY_PROBE_JSON: &str = r#"{"system":{"get_sysinfo":{}}}"#;

/// Legacy probe on port 9999: XOR-encrypted JSON **without** the 4-byte
/// length prefix the TCP transport uses.
pub fn legacy_probe() -> Vec<u8> {
    xor::encrypt(LEGACY_PROBE_JSON.as_bytes())
}

pub fn legacy_decrypt_reply(payload: &[u8]) -> Vec<u8> {
    xor::decrypt(payload)
}

const HEADER_LEN: usize = 16;
const SEED_CRC: u32 = 0x5A6B_7C8D;

/// The 20002 probe header (spec §4.10, §6): `ver=2, type=0, op=1, flags=17`,
/// a random 32-bit serial, and a CRC32 covering the whole datagram (header
/// included, with the CRC field itself seeded to a fixed value first).
#[derive(Debug, Clone, Copy)]
pub struct NewProbeHeader {
    pub version: u8,
    pub msg_type: u8,
    pub op_code: u16,
    pub msg_size: u16,
    pub flags: u8,
    pub serial: u32,
    pub crc32: u32,
}

impl NewProbeHeader {
    fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = self.version;
        out[1] = self.msg_type;
        out[2..4].copy_from_slice(&self.op_code.to_be_bytes());
        out[4..6].copy_from_slice(&self.msg_size.to_be_bytes());
        out[6] = self.flags;
        out[7] = 0; // pad
        out[8..12].copy_from_slice(&self.serial.to_be_bytes());
        out[12..16].copy_from_slice(&self.crc32.to_be_bytes());
        out
    }

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        Some(Self {
            version: bytes[0],
            msg_type: bytes[1],
            op_code: u16::from_be_bytes(bytes[2..4].try_into().ok()?),
            msg_size: u16::from_be_bytes(bytes[4..6].try_into().ok()?),
            flags: bytes[6],
            serial: u32::from_be_bytes(bytes[8..12].try_into().ok()?),
            crc32: u32::from_be_bytes(bytes[12..16].try_into().ok()?),
        })
    }
}

/// Builds the 20002 probe datagram: header + UTF-8 JSON body carrying the
/// client's RSA public key (spec §4.10, §6).
pub fn new_probe(rsa_public_key_pem: &str) -> Vec<u8> {
    let body = serde_json::json!({"params": {"rsa_key": rsa_public_key_pem}})
        .to_string()
        .into_bytes();

    let mut header = NewProbeHeader {
        version: 2,
        msg_type: 0,
        op_code: 1,
        msg_size: body.len() as u16,
        flags: 17,
        serial: rand::thread_rng().next_u32(),
        crc32: SEED_CRC,
    };

    let mut datagram = header.to_bytes().to_vec();
    datagram.extend_from_slice(&body);

    let checksum = crc32::checksum(&datagram);
    header.crc32 = checksum;
    let final_header = header.to_bytes();
    datagram[..HEADER_LEN].copy_from_slice(&final_header);
    datagram
}

/// Splits a 20002 reply into its header and JSON body (spec §4.10: "Unknown
/// format -> invalid").
pub fn parse_new_reply(datagram: &[u8]) -> Option<(NewProbeHeader, &[u8])> {
    let header = NewProbeHeader::parse(datagram)?;
    let body = datagram.get(HEADER_LEN..)?;
    Some((header, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_probe_round_trips_through_xor() {
        let probe = legacy_probe();
        assert_eq!(legacy_decrypt_reply(&probe), LEGACY_PROBE_JSON.as_bytes());
    }

    #[test]
    fn legacy_probe_has_no_length_prefix() {
        let probe = legacy_probe();
        assert_eq!(probe.len(), LEGACY_PROBE_JSON.len());
    }

    #[test]
    fn new_probe_header_round_trips() {
        let pem = "-----BEGIN PUBLIC KEY-----\nabc\n-----END PUBLIC KEY-----\n";
        let datagram = new_probe(pem);
        let (header, body) = parse_new_reply(&datagram).unwrap();
        assert_eq!(header.version, 2);
        assert_eq!(header.msg_type, 0);
        assert_eq!(header.op_code, 1);
        assert_eq!(header.flags, 17);
        assert_eq!(header.msg_size as usize, body.len());

        let parsed: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(parsed["params"]["rsa_key"], pem);
    }

    #[test]
    fn new_probe_crc_covers_whole_datagram_with_seeded_field() {
        let datagram = new_probe("pem");
        let header = NewProbeHeader::parse(&datagram).unwrap();

        let mut reconstructed = datagram.clone();
        reconstructed[12..16].copy_from_slice(&SEED_CRC.to_be_bytes());
        let expected = crc32::checksum(&reconstructed);
        assert_eq!(header.crc32, expected);
    }
}
