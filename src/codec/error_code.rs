//! The closed registry of TP-Link response error codes, partitioned into
//! three sets per spec §9 ("Error-code registry"). Unknown codes collapse
//! to `Partition::Other`, which `Error::from_device_code` turns into a
//! `Error::Device { code, .. }` carrying the raw code for the caller.

/// Named codes referenced directly by spec.md (§5 scenario, §7 taxonomy).
/// Values follow the numbering observed on real Smart/Tapo firmware.
pub const SUCCESS: i64 = 0;
pub const JSON_DECODE_FAIL_ERROR: i64 = -1003;
pub const INTERNAL_UNKNOWN_ERROR: i64 = -1;
pub const LOGIN_ERROR: i64 = -1301;
pub const LOGIN_FAILED_ERROR: i64 = -1501;
pub const AUTH_FAILED_ERROR: i64 = 9999;
pub const SESSION_TIMEOUT_ERROR: i64 = -1509;
pub const DEVICE_ERROR: i64 = -1000;
pub const TRANSPORT_NOT_AVAILABLE_ERROR: i64 = -1010;
pub const UNSPECIFIC_ERROR: i64 = -9999;
pub const HTTP_TRANSPORT_FAILED_ERROR: i64 = 1112;

const RETRYABLE: &[i64] = &[
    JSON_DECODE_FAIL_ERROR,
    INTERNAL_UNKNOWN_ERROR,
    SESSION_TIMEOUT_ERROR,
    TRANSPORT_NOT_AVAILABLE_ERROR,
];

const AUTH: &[i64] = &[
    LOGIN_ERROR,
    LOGIN_FAILED_ERROR,
    AUTH_FAILED_ERROR,
];

/// Which partition a code falls into (spec §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Retryable,
    Auth,
    Other,
}

impl ErrorCode {
    pub fn classify(code: i64) -> Self {
        if RETRYABLE.contains(&code) {
            ErrorCode::Retryable
        } else if AUTH.contains(&code) {
            ErrorCode::Auth
        } else {
            ErrorCode::Other
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_decode_failure_is_retryable() {
        assert_eq!(ErrorCode::classify(JSON_DECODE_FAIL_ERROR), ErrorCode::Retryable);
        assert_eq!(ErrorCode::classify(INTERNAL_UNKNOWN_ERROR), ErrorCode::Retryable);
    }

    #[test]
    fn login_errors_are_auth() {
        assert_eq!(ErrorCode::classify(LOGIN_ERROR), ErrorCode::Auth);
    }

    #[test]
    fn unknown_code_is_other() {
        assert_eq!(ErrorCode::classify(-424242), ErrorCode::Other);
    }

    #[test]
    fn success_is_other_not_auth_or_retryable() {
        // SUCCESS should never be routed through `Error::from_device_code`
        // in practice, but classification must still be well-defined.
        assert_eq!(ErrorCode::classify(SUCCESS), ErrorCode::Other);
    }
}
