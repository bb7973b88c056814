//! Tunables that would otherwise be magic numbers scattered through the
//! transport/protocol/discovery modules (spec §4.13), the way the teacher
//! centralizes constants like `MAX_DISC_PACKET_SIZE` at module scope rather
//! than inlining them at each call site.

use std::time::Duration;

/// `DeviceConfig::timeout` when a caller doesn't set one.
pub const DEVICE_TIMEOUT: Duration = Duration::from_secs(10);

/// IoT/Smart/SmartCam protocol retry budget (spec §4.6, §4.7).
pub const PROTOCOL_RETRIES: u32 = 3;

/// Backoff between retried attempts after a `Timeout`/`Retryable` error.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Smart protocol's starting batch size before any sticky demotion (spec
/// §4.7).
pub const SMART_BATCH_SIZE: usize = 5;

/// `Content-Length` the AES transport's handshake request must carry
/// verbatim (spec §4.4, §8 scenario 4).
pub const AES_HANDSHAKE_CONTENT_LENGTH: &str = "314";

/// Safety margin subtracted from the device-reported `TIMEOUT` cookie
/// before the AES session is considered expired (spec §4.4).
pub const AES_SESSION_EXPIRY_SAFETY_MARGIN: Duration = Duration::from_secs(20 * 60);

/// Default AES session lifetime when the device sends no `TIMEOUT` cookie
/// (spec §4.4 "default one day").
pub const AES_DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Fixed post-reset HTTP delay (spec §4.2 device-quirk workaround).
pub const HTTP_POST_RESET_DELAY: Duration = Duration::from_millis(250);

/// Discovery probe count per target and the floor on inter-probe spacing
/// (spec §4.10).
pub const DISCOVERY_PACKET_COUNT: u32 = 3;
pub const DISCOVERY_MIN_PACKET_SPACING: Duration = Duration::from_millis(100);

/// Restricted TLS cipher suite list the HTTPS variant of the AES/KLAP
/// transports is expected to offer (spec §4.2, §6).
pub const HTTPS_CIPHER_SUITES: &[&str] = &[
    "AES256-GCM-SHA384",
    "AES256-SHA256",
    "AES128-GCM-SHA256",
    "AES128-SHA256",
    "AES256-SHA",
];
