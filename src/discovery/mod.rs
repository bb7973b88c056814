//! UDP broadcast/unicast discovery (spec §4.10). One shared socket probes
//! both the legacy (9999) and new (20002) ports; replies are deduplicated
//! by source IP and bucketed into discovered/unsupported/invalid/requires-auth.

pub mod packet;
pub mod result;

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::OnceLock;
use std::time::Duration;

use socket2::{Domain, Protocol as SockProtocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::codec::error_code::ErrorCode;
use crate::codec::rsa::{RsaKeyPair, DISCOVERY_KEY_BITS};
use crate::defaults::DISCOVERY_MIN_PACKET_SPACING;
use crate::error::Error;

pub use result::{DeviceConnectionParameters, DiscoveryResult, ProbeOutcome};
pub use crate::defaults::DISCOVERY_PACKET_COUNT;

const LEGACY_PORT: u16 = 9999;
const NEW_PORT: u16 = 20002;

/// Process-wide RSA keypair for 20002 probes, generated lazily once (spec
/// §4.10 "lazily generated once per process", §9 "Global/process-wide state").
static DISCOVERY_KEYPAIR: OnceLock<RsaKeyPair> = OnceLock::new();

fn discovery_keypair_pem() -> Result<String, Error> {
    if let Some(kp) = DISCOVERY_KEYPAIR.get() {
        return kp.public_key_pem();
    }
    let kp = RsaKeyPair::generate(DISCOVERY_KEY_BITS)?;
    let pem = kp.public_key_pem()?;
    // Another task may have raced us; either insertion wins, both keys are
    // equally valid since nothing has used the loser's PEM yet.
    let _ = DISCOVERY_KEYPAIR.set(kp);
    Ok(pem)
}

fn bind_broadcast_socket() -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(SockProtocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
    socket.bind(&addr.into())?;
    UdpSocket::from_std(socket.into())
}

fn packet_spacing(timeout: Duration, packet_count: u32) -> Duration {
    let per_packet = timeout / packet_count.max(1);
    per_packet.max(DISCOVERY_MIN_PACKET_SPACING)
}

async fn send_probes(socket: &UdpSocket, target: IpAddr, packet_count: u32, spacing: Duration) -> Result<(), Error> {
    let pem = discovery_keypair_pem()?;
    for i in 0..packet_count {
        let legacy = packet::legacy_probe();
        socket.send_to(&legacy, (target, LEGACY_PORT)).await?;
        let new_probe = packet::new_probe(&pem);
        socket.send_to(&new_probe, (target, NEW_PORT)).await?;
        if i + 1 < packet_count {
            tokio::time::sleep(spacing).await;
        }
    }
    Ok(())
}

fn classify_reply(ip: IpAddr, src_port: u16, datagram: &[u8]) -> ProbeOutcome {
    let parsed = if src_port == LEGACY_PORT {
        let plain = packet::legacy_decrypt_reply(datagram);
        serde_json::from_slice::<serde_json::Value>(&plain)
    } else {
        match packet::parse_new_reply(datagram) {
            Some((_, body)) => serde_json::from_slice::<serde_json::Value>(body),
            None => {
                return ProbeOutcome::Invalid {
                    ip: ip.to_string(),
                    reason: "20002 reply too short for header".into(),
                }
            }
        }
    };

    match parsed {
        Ok(body) => {
            // Some firmware answers a discovery probe with a bare error
            // code instead of sysinfo when it requires authentication
            // before it'll divulge anything (spec §4.10 "authentication
            // error during early probe -> requires_auth").
            if let Some(code) = body.get("error_code").and_then(serde_json::Value::as_i64) {
                if ErrorCode::classify(code) == ErrorCode::Auth {
                    let device_type = DiscoveryResult::from_reply_body(&ip.to_string(), &body)
                        .ok()
                        .map(|r| r.device_type);
                    return ProbeOutcome::RequiresAuth {
                        ip: ip.to_string(),
                        device_type,
                    };
                }
            }

            match DiscoveryResult::from_reply_body(&ip.to_string(), &body) {
                Ok(result) => match result.connection_params() {
                    Ok(_) => ProbeOutcome::Discovered(result),
                    Err(Error::Unsupported(reason)) => ProbeOutcome::Unsupported { ip: ip.to_string(), reason },
                    Err(err) => ProbeOutcome::Invalid {
                        ip: ip.to_string(),
                        reason: err.to_string(),
                    },
                },
                Err(Error::Unsupported(reason)) => ProbeOutcome::Unsupported { ip: ip.to_string(), reason },
                Err(err) => ProbeOutcome::Invalid {
                    ip: ip.to_string(),
                    reason: err.to_string(),
                },
            }
        }
        Err(err) => ProbeOutcome::Invalid {
            ip: ip.to_string(),
            reason: format!("reply was not valid JSON: {err}"),
        },
    }
}

/// Broadcasts discovery probes and collects replies for the full
/// `timeout` window (spec §4.10: "On broadcast discovery, the socket runs
/// for the full timeout").
pub async fn discover(timeout: Duration, packet_count: u32) -> Result<HashMap<IpAddr, ProbeOutcome>, Error> {
    let socket = bind_broadcast_socket()?;
    let spacing = packet_spacing(timeout, packet_count);
    send_probes(&socket, IpAddr::V4(Ipv4Addr::BROADCAST), packet_count, spacing).await?;

    let mut seen = HashSet::new();
    let mut outcomes = HashMap::new();
    let mut buf = [0u8; 2048];

    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let recv = tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await;
        let (len, from) = match recv {
            Ok(Ok(pair)) => pair,
            Ok(Err(err)) => {
                warn!(%err, "discovery recv_from failed");
                continue;
            }
            Err(_) => break,
        };
        if !seen.insert(from.ip()) {
            continue; // spec §4.10 "Dedup": first reply per IP wins.
        }
        let outcome = classify_reply(from.ip(), from.port(), &buf[..len]);
        debug!(ip = %from.ip(), "discovery reply classified");
        outcomes.insert(from.ip(), outcome);
    }

    Ok(outcomes)
}

/// Probes exactly one IP, completing as soon as that IP answers rather
/// than waiting for the full timeout (spec §4.10, §8 scenario 6), falling
/// back to a brute-force protocol probe if nothing arrives.
pub async fn discover_single(target: Ipv4Addr, timeout: Duration, packet_count: u32) -> Result<ProbeOutcome, Error> {
    let socket = bind_broadcast_socket()?;
    let spacing = packet_spacing(timeout, packet_count);
    send_probes(&socket, IpAddr::V4(target), packet_count, spacing).await?;

    let mut buf = [0u8; 2048];
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let recv = tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await;
        let (len, from) = match recv {
            Ok(Ok(pair)) => pair,
            Ok(Err(_)) => continue,
            Err(_) => break,
        };
        if from.ip() != IpAddr::V4(target) {
            continue;
        }
        return Ok(classify_reply(from.ip(), from.port(), &buf[..len]));
    }

    discover_single_fallback(target, timeout).await
}

/// The ordered `(family, encryption, https, port)` combinations spec
/// §4.10's "discover_single fallback" walks by brute force when UDP
/// discovery yields nothing for a single target.
pub const FALLBACK_ATTEMPT_ORDER: &[(crate::device_config::DeviceFamily, crate::device_config::Encryption, bool, u16)] = &[
    (crate::device_config::DeviceFamily::SmartTapoPlug, crate::device_config::Encryption::Klap, false, 80),
    (crate::device_config::DeviceFamily::SmartTapoPlug, crate::device_config::Encryption::Aes, false, 80),
    (crate::device_config::DeviceFamily::SmartKasaPlug, crate::device_config::Encryption::Klap, false, 80),
    (crate::device_config::DeviceFamily::IotSmartPlugSwitch, crate::device_config::Encryption::Xor, false, 9999),
];

/// Tries each of `FALLBACK_ATTEMPT_ORDER` in turn, instantiating the
/// matching protocol/transport directly against `target` and returning
/// the first that completes a query successfully (spec §4.10
/// "discover_single fallback"). Callers that don't need the full
/// brute-force behavior can skip straight to `ProbeOutcome::TimedOut`.
pub async fn discover_single_fallback(target: Ipv4Addr, timeout: Duration) -> Result<ProbeOutcome, Error> {
    use crate::device_config::{ConnectionType, DeviceConfigBuilder};
    use crate::protocol::select_protocol;

    for &(family, encryption, https, port) in FALLBACK_ATTEMPT_ORDER {
        let connection_type = ConnectionType::new(family, encryption).with_https(https).with_http_port(port);
        let config = DeviceConfigBuilder::new(target.to_string(), connection_type)
            .timeout(timeout)
            .credentials(crate::credentials::Credentials::blank())
            .build();
        let Ok(protocol) = select_protocol(config) else { continue };
        if protocol
            .query(serde_json::json!({"method": "get_device_info"}))
            .await
            .is_ok()
        {
            return Ok(ProbeOutcome::Discovered(DiscoveryResult {
                ip: target.to_string(),
                device_type: family.as_str().to_string(),
                device_model: None,
                device_id: None,
                mac: None,
                mgt_encrypt_schm: result::MgtEncryptSchema {
                    is_support_https: https,
                    encrypt_type: None,
                    http_port: Some(port),
                    lv: None,
                },
                encrypt_info: None,
                decrypted_data: None,
            }));
        }
    }

    Ok(ProbeOutcome::TimedOut {
        ip: target.to_string(),
        alias: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_spacing_respects_minimum() {
        assert_eq!(packet_spacing(Duration::from_millis(30), 3), DISCOVERY_MIN_PACKET_SPACING);
        assert_eq!(packet_spacing(Duration::from_secs(9), 3), Duration::from_secs(3));
    }

    #[test]
    fn classify_reply_handles_legacy_probe() {
        let probe = packet::legacy_probe();
        let _ = probe;
        let reply_json = br#"{"system":{"get_sysinfo":{"type":"IOT.SMARTPLUGSWITCH","mgt_encrypt_schm":{"encrypt_type":"NONE"}}}}"#;
        let encrypted_reply = crate::codec::xor::encrypt(reply_json);
        let outcome = classify_reply("10.0.0.9".parse().unwrap(), LEGACY_PORT, &encrypted_reply);
        assert!(matches!(outcome, ProbeOutcome::Discovered(_)));
    }

    #[test]
    fn classify_reply_flags_garbage_as_invalid() {
        let outcome = classify_reply("10.0.0.9".parse().unwrap(), LEGACY_PORT, &[0xFF, 0xEE]);
        assert!(matches!(outcome, ProbeOutcome::Invalid { .. }));
    }

    #[test]
    fn classify_reply_flags_unrecognized_family_as_unsupported() {
        let reply_json = br#"{"device_type":"BOGUS.THING","mgt_encrypt_schm":{"encrypt_type":"NONE"}}"#;
        let encrypted_reply = crate::codec::xor::encrypt(reply_json);
        let outcome = classify_reply("10.0.0.9".parse().unwrap(), LEGACY_PORT, &encrypted_reply);
        assert!(matches!(outcome, ProbeOutcome::Unsupported { .. }));
    }

    #[test]
    fn classify_reply_flags_auth_error_code_as_requires_auth() {
        let reply_json = format!(r#"{{"error_code":{}}}"#, crate::codec::error_code::LOGIN_ERROR);
        let encrypted_reply = crate::codec::xor::encrypt(reply_json.as_bytes());
        let outcome = classify_reply("10.0.0.9".parse().unwrap(), LEGACY_PORT, &encrypted_reply);
        assert!(matches!(
            outcome,
            ProbeOutcome::RequiresAuth { device_type: None, .. }
        ));
    }
}
