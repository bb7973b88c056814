//! The legacy XOR transport (spec §4.3): raw length-prefixed XOR stream
//! over TCP 9999, or a plain-JSON HTTP tunnel when the device answers on
//! port 80 instead. No credentials, no session — every `send` is
//! independent.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::codec::xor;
use crate::device_config::DeviceConfig;
use crate::error::{ConnectionErrorKind, Error};
use crate::http_client::{Body, HttpClient};
use crate::transport::Transport;

pub struct XorTcpTransport {
    host: String,
    port: u16,
    timeout: std::time::Duration,
    http: Option<HttpClient>,
}

impl XorTcpTransport {
    pub fn new(config: &DeviceConfig) -> Result<Self, Error> {
        let port = config.effective_port();
        let http = if port == 80 {
            let base = reqwest::Url::parse(&format!("http://{}:{}/", config.host, port))
                .map_err(|e| Error::Internal(format!("invalid host {:?}: {e}", config.host)))?;
            Some(HttpClient::new(base, config.timeout, false)?)
        } else {
            None
        };
        Ok(Self {
            host: config.host.clone(),
            port,
            timeout: config.timeout,
            http,
        })
    }

    async fn send_tcp(&self, request: &str) -> Result<String, Error> {
        let addr = format!("{}:{}", self.host, self.port);
        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(classify_connect_error)?;
        stream
            .set_nodelay(true)
            .map_err(|e| Error::Internal(format!("failed to set TCP_NODELAY: {e}")))?;

        let frame = xor::encrypt_request(request);
        tokio::time::timeout(self.timeout, stream.write_all(&frame))
            .await
            .map_err(|_| Error::Timeout)??;

        let mut len_buf = [0u8; 4];
        tokio::time::timeout(self.timeout, stream.read_exact(&mut len_buf))
            .await
            .map_err(|_| Error::Timeout)??;
        let len = u32::from_be_bytes(len_buf) as usize;

        let mut body = vec![0u8; len];
        tokio::time::timeout(self.timeout, stream.read_exact(&mut body))
            .await
            .map_err(|_| Error::Timeout)??;

        let plain = xor::decrypt_response(&body);
        String::from_utf8(plain.clone())
            .map_err(|e| Error::Internal(format!("non-UTF8 response ({e}): {}", hex::encode(&plain))))
    }
}

/// Classifies TCP connect failures against the no-retry set from spec
/// §4.3: `{EHOSTDOWN, EHOSTUNREACH, ECONNREFUSED}`.
fn classify_connect_error(err: std::io::Error) -> Error {
    let kind = ConnectionErrorKind::classify_io(&err);
    Error::Connection {
        kind,
        message: err.to_string(),
    }
}

#[async_trait]
impl Transport for XorTcpTransport {
    async fn send(&mut self, request: &serde_json::Value) -> Result<serde_json::Value, Error> {
        let body = request.to_string();
        if let Some(http) = &self.http {
            let response = http.post("", Body::Json(request), None).await?;
            return response.json();
        }
        let reply = self.send_tcp(&body).await?;
        Ok(serde_json::from_str(&reply)?)
    }

    async fn reset(&mut self) {
        // Stateless: nothing to drop. A fresh TCP connection is made per `send`.
    }

    async fn close(&mut self) {
        self.http = None;
    }
}
