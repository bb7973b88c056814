//! The IoT protocol (spec §4.6): a stateless JSON request/response over
//! whichever transport discovery selected, with a fixed retry policy.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::defaults::{PROTOCOL_RETRIES, RETRY_BACKOFF};
use crate::error::Error;
use crate::protocol::Protocol;
use crate::transport::Transport;

pub struct IotProtocol {
    transport: Mutex<Box<dyn Transport>>,
    retries: u32,
}

impl IotProtocol {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport: Mutex::new(transport),
            retries: PROTOCOL_RETRIES,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

#[async_trait]
impl Protocol for IotProtocol {
    /// Retry policy from spec §4.6: `Timeout` resets and retries after a
    /// 1s backoff; `Connection` retries immediately; `Retryable` resets and
    /// retries after a 1s backoff; `Auth` resets and surfaces immediately;
    /// anything else resets and surfaces.
    async fn query(&self, request: serde_json::Value) -> Result<serde_json::Value, Error> {
        let mut transport = self.transport.lock().await;
        let mut attempt = 0;
        loop {
            match transport.send(&request).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    attempt += 1;
                    if attempt > self.retries {
                        return Err(err);
                    }
                    match &err {
                        Error::Timeout => {
                            debug!(attempt, "IoT query timed out, retrying after backoff");
                            transport.reset().await;
                            tokio::time::sleep(RETRY_BACKOFF).await;
                        }
                        Error::Connection { .. } => {
                            debug!(attempt, "IoT query connection error, retrying immediately");
                        }
                        Error::Retryable(_) => {
                            debug!(attempt, "IoT query retryable error, retrying after backoff");
                            transport.reset().await;
                            tokio::time::sleep(RETRY_BACKOFF).await;
                        }
                        Error::Auth(_) => {
                            warn!("IoT query authentication failed, not retrying");
                            transport.reset().await;
                            return Err(err);
                        }
                        _ => {
                            transport.reset().await;
                            return Err(err);
                        }
                    }
                }
            }
        }
    }

    async fn reset(&self) {
        self.transport.lock().await.reset().await;
    }

    async fn close(&self) {
        self.transport.lock().await.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait as at;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyTransport {
        fail_times: AtomicU32,
        error: fn() -> Error,
        reset_count: AtomicU32,
    }

    #[at]
    impl Transport for FlakyTransport {
        async fn send(&mut self, _request: &serde_json::Value) -> Result<serde_json::Value, Error> {
            let remaining = self.fail_times.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_times.fetch_sub(1, Ordering::SeqCst);
                return Err((self.error)());
            }
            Ok(serde_json::json!({"ok": true}))
        }

        async fn reset(&mut self) {
            self.reset_count.fetch_add(1, Ordering::SeqCst);
        }

        async fn close(&mut self) {}
    }

    #[tokio::test]
    async fn connection_error_retries_immediately_and_succeeds() {
        let transport = FlakyTransport {
            fail_times: AtomicU32::new(1),
            error: || Error::Connection {
                kind: crate::error::ConnectionErrorKind::Reset,
                message: "reset".into(),
            },
            reset_count: AtomicU32::new(0),
        };
        let protocol = IotProtocol::new(Box::new(transport));
        let result = protocol.query(serde_json::json!({"method": "get_sysinfo"})).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn auth_error_is_not_retried() {
        let transport = FlakyTransport {
            fail_times: AtomicU32::new(5),
            error: || Error::Auth("bad creds".into()),
            reset_count: AtomicU32::new(0),
        };
        let protocol = IotProtocol::new(Box::new(transport)).with_retries(3);
        let result = protocol.query(serde_json::json!({"method": "get_sysinfo"})).await;
        assert!(matches!(result, Err(Error::Auth(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_exhausted_and_error_surfaces() {
        let transport = FlakyTransport {
            fail_times: AtomicU32::new(100),
            error: || Error::Retryable("busy".into()),
            reset_count: AtomicU32::new(0),
        };
        let protocol = IotProtocol::new(Box::new(transport)).with_retries(2);
        let result = protocol.query(serde_json::json!({"method": "get_sysinfo"})).await;
        assert!(matches!(result, Err(Error::Retryable(_))));
    }
}
