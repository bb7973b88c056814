//! The SmartCam protocol (spec §4.8): Smart's batching/retry semantics,
//! but single-method requests are reshaped into `get`/`set`/`do` wrappers,
//! and child devices are addressed through a `controlChild` envelope.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Error;
use crate::protocol::smart::SmartProtocol;
use crate::protocol::Protocol;
use crate::transport::Transport;

/// Methods that look like `get*`/`set*` but must still be wrapped as `do`
/// (spec §4.8: "forced-do names such as `getSdCardFormatStatus`").
const FORCE_DO: &[&str] = &["getSdCardFormatStatus"];

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.char_indices() {
        if ch.is_uppercase() {
            if i != 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Reshapes one `(method, params)` pair into the `{method: "get"|"set"|"do",
/// <section>: params}` envelope SmartCam firmware expects (spec §4.8).
fn reshape(method: &str, params: Value) -> Value {
    if method == "multipleRequest" {
        return json!({"method": "multipleRequest", "params": params});
    }

    let is_get_set = (method.starts_with("get") || method.starts_with("set")) && !FORCE_DO.contains(&method);
    if is_get_set {
        let verb = &method[..3];
        let section = to_snake_case(&method[3..]);
        json!({"method": verb, section: params})
    } else {
        let section = to_snake_case(method);
        json!({"method": "do", section: params})
    }
}

/// `reshape` produces the on-the-wire shape SmartCam firmware expects for
/// a single-method request, where the params live under a `<section>` key
/// rather than `"params"`. `SmartProtocol::query` always reads its input
/// as a top-level `{"method", "params"}` envelope, so the reshaped section
/// has to become the `params` value before handing it off (`multipleRequest`
/// already carries a `"params"` key and passes through unchanged).
fn envelope_for_inner(reshaped: Value) -> Value {
    let method = reshaped["method"].clone();
    if let Some(params) = reshaped.get("params") {
        return json!({"method": method, "params": params.clone()});
    }
    let mut section = reshaped.as_object().cloned().unwrap_or_default();
    section.remove("method");
    json!({"method": method, "params": Value::Object(section)})
}

pub struct SmartCamProtocol {
    inner: SmartProtocol,
}

impl SmartCamProtocol {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            inner: SmartProtocol::new(transport),
        }
    }

    /// Wraps `request_data` for a specific child device (spec §4.8
    /// "Child-device wrapper").
    pub async fn query_child(&self, device_id: &str, method: &str, params: Value) -> Result<Value, Error> {
        let envelope = json!({
            "method": "controlChild",
            "params": {
                "childControl": {
                    "device_id": device_id,
                    "request_data": reshape(method, params),
                }
            }
        });
        let response = self.inner.query(envelope).await?;
        response
            .get("response_data")
            .cloned()
            .ok_or_else(|| Error::Internal("controlChild response missing response_data".into()))
    }
}

#[async_trait]
impl Protocol for SmartCamProtocol {
    async fn query(&self, request: Value) -> Result<Value, Error> {
        if let Some(method) = request.get("method").and_then(Value::as_str) {
            let params = request.get("params").cloned().unwrap_or(Value::Null);
            let reshaped = reshape(method, params);
            let envelope = envelope_for_inner(reshaped);
            let response = self.inner.query(envelope).await?;
            if (method.starts_with("get")) && !FORCE_DO.contains(&method) {
                let section = to_snake_case(&method[3..]);
                let value = response.get(&section).cloned();
                return value.ok_or_else(|| {
                    Error::Internal(format!("SmartCam get response missing section {section:?}"))
                });
            }
            return Ok(response);
        }

        // Multi-method batch: the get/set/do reshaping only applies to
        // single-method requests (spec §4.8); batches still go through
        // Smart's `multipleRequest` mechanism with method names untouched.
        self.inner.query(request).await
    }

    async fn reset(&self) {
        self.inner.reset().await;
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_method_reshapes_to_get_wrapper() {
        let reshaped = reshape("getDeviceInfo", Value::Null);
        assert_eq!(reshaped["method"], "get");
        assert_eq!(reshaped["device_info"], Value::Null);
    }

    #[test]
    fn set_method_reshapes_to_set_wrapper() {
        let reshaped = reshape("setLedStatus", json!({"enabled": true}));
        assert_eq!(reshaped["method"], "set");
        assert_eq!(reshaped["led_status"]["enabled"], true);
    }

    #[test]
    fn do_prefixed_method_reshapes_to_do_wrapper() {
        let reshaped = reshape("doReboot", Value::Null);
        assert_eq!(reshaped["method"], "do");
        assert_eq!(reshaped["reboot"], Value::Null);
    }

    #[test]
    fn forced_do_name_is_not_treated_as_get() {
        let reshaped = reshape("getSdCardFormatStatus", Value::Null);
        assert_eq!(reshaped["method"], "do");
        assert_eq!(reshaped["sd_card_format_status"], Value::Null);
    }

    #[test]
    fn multiple_request_passes_through() {
        let reshaped = reshape("multipleRequest", json!({"requests": []}));
        assert_eq!(reshaped["method"], "multipleRequest");
    }

    #[test]
    fn envelope_for_inner_nests_reshaped_section_under_params() {
        let reshaped = reshape("setLedStatus", json!({"enabled": true}));
        let envelope = envelope_for_inner(reshaped);
        assert_eq!(envelope["method"], "set");
        assert_eq!(envelope["params"]["led_status"]["enabled"], true);
    }

    #[test]
    fn envelope_for_inner_passes_multiple_request_params_through_unnested() {
        let reshaped = reshape("multipleRequest", json!({"requests": [1, 2]}));
        let envelope = envelope_for_inner(reshaped);
        assert_eq!(envelope["method"], "multipleRequest");
        assert_eq!(envelope["params"]["requests"], json!([1, 2]));
    }

    /// Echoes back whatever `params` it was sent, under `result`, so tests
    /// can assert on the envelope `SmartProtocol` actually received.
    struct EchoTransport;

    #[async_trait]
    impl Transport for EchoTransport {
        async fn send(&mut self, request: &Value) -> Result<Value, Error> {
            let params = request.get("params").cloned().unwrap_or(Value::Null);
            Ok(json!({"error_code": 0, "result": params}))
        }
        async fn reset(&mut self) {}
        async fn close(&mut self) {}
    }

    #[tokio::test]
    async fn set_query_carries_params_through_to_the_device() {
        let protocol = SmartCamProtocol::new(Box::new(EchoTransport));
        let request = json!({"method": "setLedStatus", "params": {"enabled": true}});
        let response = protocol.query(request).await.unwrap();
        assert_eq!(response["led_status"]["enabled"], true);
    }

    #[tokio::test]
    async fn get_query_extracts_its_section_from_the_response() {
        let protocol = SmartCamProtocol::new(Box::new(EchoTransport));
        let request = json!({"method": "getDeviceInfo"});
        let response = protocol.query(request).await.unwrap();
        assert_eq!(response, Value::Null);
    }
}
