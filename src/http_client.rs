//! Thin `reqwest`-based POST client shared by the AES-passthrough and KLAP
//! transports (spec §4.2). Owns a cookie jar callers can introspect by
//! name (`TP_SESSIONID`/`SESSIONID`/`TIMEOUT`) and classifies connection
//! failures the way the outer retry loops expect.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;
use reqwest::{Client, Url};

use crate::error::{ConnectionErrorKind, Error};

/// A minimal name-addressable cookie jar. `reqwest::cookie::Jar` doesn't
/// expose stored cookies back to the caller, so transports that need to
/// read `TIMEOUT`/`TP_SESSIONID` implement this trait themselves instead.
#[derive(Debug, Default)]
struct CookieJar {
    cookies: Mutex<HashMap<String, String>>,
}

impl reqwest::cookie::CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &reqwest::header::HeaderValue>, _url: &Url) {
        let mut store = self.cookies.lock().unwrap();
        for header in cookie_headers {
            if let Ok(s) = header.to_str() {
                if let Some((name, value)) = parse_set_cookie(s) {
                    store.insert(name, value);
                }
            }
        }
    }

    fn cookies(&self, _url: &Url) -> Option<reqwest::header::HeaderValue> {
        let store = self.cookies.lock().unwrap();
        if store.is_empty() {
            return None;
        }
        let joined = store
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        reqwest::header::HeaderValue::from_str(&joined).ok()
    }
}

fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let first = header.split(';').next()?;
    let (name, value) = first.split_once('=')?;
    Some((name.trim().to_string(), value.trim().to_string()))
}

/// Either a JSON body (most Smart/AES traffic) or a raw byte body (XOR/KLAP
/// envelopes), matching spec §4.2's `{json | bytes}`.
pub enum Body<'a> {
    Json(&'a serde_json::Value),
    Bytes(Vec<u8>),
}

pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn json(&self) -> Result<serde_json::Value, Error> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// One client per transport instance, kept alive across queries (spec §5
/// "Shared resources"). Tracks whether the last request ended in a
/// reset/broken-pipe so the sticky 250ms delay applies to the next one.
pub struct HttpClient {
    client: Client,
    jar: Arc<CookieJar>,
    base_url: Url,
    timeout: Duration,
    needs_reset_delay: Mutex<bool>,
}

impl HttpClient {
    pub fn new(base_url: Url, timeout: Duration, https: bool) -> Result<Self, Error> {
        let jar = Arc::new(CookieJar::default());
        let mut builder = Client::builder()
            .timeout(timeout)
            .cookie_provider(jar.clone() as Arc<dyn reqwest::cookie::CookieStore>);
        if https {
            builder = builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            jar,
            base_url,
            timeout,
            needs_reset_delay: Mutex::new(false),
        })
    }

    pub fn get_cookie(&self, name: &str) -> Option<String> {
        let store = self.jar.cookies.lock().unwrap();
        store.get(name).cloned()
    }

    /// `POST <base_url><path>` with an optional query string already baked
    /// into `path` (e.g. `/app/request?seq=12`). Applies the sticky
    /// post-reset delay before sending if the previous call reset the
    /// connection (spec §4.2).
    pub async fn post(&self, path: &str, body: Body<'_>, extra_headers: Option<HeaderMap>) -> Result<Response, Error> {
        if *self.needs_reset_delay.lock().unwrap() {
            tokio::time::sleep(crate::defaults::HTTP_POST_RESET_DELAY).await;
        }

        let url = self
            .base_url
            .join(path)
            .map_err(|e| Error::Internal(format!("invalid request path {path:?}: {e}")))?;

        let mut request = self.client.post(url);
        if let Some(headers) = extra_headers {
            request = request.headers(headers);
        }
        request = match &body {
            Body::Json(value) => request.json(value),
            Body::Bytes(bytes) => request.body(bytes.clone()),
        };

        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, request.send()).await;

        let send_result = match result {
            Ok(inner) => inner,
            Err(_) => {
                self.set_reset_delay(false);
                return Err(Error::Timeout);
            }
        };

        let response = match send_result {
            Ok(response) => response,
            Err(err) => {
                let retry_after_reset = err.is_connect() || err.is_request();
                self.set_reset_delay(retry_after_reset);
                return Err(classify_reqwest_error(err, started.elapsed(), self.timeout));
            }
        };

        self.set_reset_delay(false);
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(Error::from)?
            .to_vec();
        Ok(Response { status, body })
    }

    fn set_reset_delay(&self, value: bool) {
        *self.needs_reset_delay.lock().unwrap() = value;
    }
}

fn classify_reqwest_error(err: reqwest::Error, elapsed: Duration, timeout: Duration) -> Error {
    if err.is_timeout() || elapsed >= timeout {
        return Error::Timeout;
    }
    if err.is_connect() {
        return Error::Connection {
            kind: ConnectionErrorKind::Reset,
            message: err.to_string(),
        };
    }
    Error::from(err)
}
