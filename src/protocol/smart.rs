//! The Smart protocol (spec §4.7): JSON-RPC envelopes with `multipleRequest`
//! batching, pagination, and per-item error attribution.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::codec::error_code::{self, ErrorCode};
use crate::codec::hashes;
use crate::defaults::{PROTOCOL_RETRIES, RETRY_BACKOFF, SMART_BATCH_SIZE};
use crate::error::Error;
use crate::protocol::Protocol;
use crate::transport::Transport;

/// Methods that must always be sent as a single request, never folded into
/// a `multipleRequest` batch (spec §4.7).
const BATCH_DENY_LIST: &[&str] = &["getConnectStatus", "scanApList"];

fn now_millis() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

fn generate_terminal_uuid() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE64.encode(hashes::md5(&bytes))
}

pub struct SmartProtocol {
    transport: Mutex<Box<dyn Transport>>,
    retries: u32,
    terminal_uuid: String,
    /// Sticky batch-size demotion (spec §4.7, §7, §8 scenario 5): once a
    /// batch provokes `JSON_DECODE_FAIL_ERROR`/`INTERNAL_UNKNOWN_ERROR`,
    /// every later call on this protocol instance sends singly.
    batch_size: AtomicUsize,
}

impl SmartProtocol {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport: Mutex::new(transport),
            retries: PROTOCOL_RETRIES,
            terminal_uuid: generate_terminal_uuid(),
            batch_size: AtomicUsize::new(SMART_BATCH_SIZE),
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_batch_size(self, size: usize) -> Self {
        self.batch_size.store(size, Ordering::SeqCst);
        self
    }

    fn envelope(&self, method: &str, params: Option<Value>) -> Value {
        let mut obj = Map::new();
        obj.insert("method".to_string(), json!(method));
        if let Some(p) = params {
            obj.insert("params".to_string(), p);
        }
        obj.insert("request_time_milis".to_string(), json!(now_millis()));
        obj.insert("terminal_uuid".to_string(), json!(self.terminal_uuid));
        Value::Object(obj)
    }

    /// Splits a `{method: params, ...}` query map into ordered `(method,
    /// params)` pairs, honoring the batch deny-list and the current
    /// (possibly demoted) batch size (spec §4.7 "Batching").
    fn plan_batches<'a>(&self, methods: &'a Map<String, Value>) -> Vec<Vec<(&'a str, Value)>> {
        let batch_size = self.batch_size.load(Ordering::SeqCst).max(1);
        let mut batches = Vec::new();
        let mut current: Vec<(&str, Value)> = Vec::new();

        for (method, params) in methods {
            if BATCH_DENY_LIST.contains(&method.as_str()) {
                if !current.is_empty() {
                    batches.push(std::mem::take(&mut current));
                }
                batches.push(vec![(method.as_str(), params.clone())]);
                continue;
            }
            current.push((method.as_str(), params.clone()));
            if current.len() >= batch_size {
                batches.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }

    async fn send_single(&self, transport: &mut Box<dyn Transport>, method: &str, params: Value) -> Result<Value, Error> {
        let request = self.envelope(method, Some(params));
        let response = transport.send(&request).await?;
        extract_result(&response, method)
    }

    /// Sends one batch as `multipleRequest`, matching sub-responses back to
    /// their method names and requerying singly if a sub-response omits
    /// `method` (spec §4.7 "known firmware quirk").
    async fn send_batch(
        &self,
        transport: &mut Box<dyn Transport>,
        batch: &[(&str, Value)],
    ) -> Result<Map<String, Value>, Error> {
        if batch.len() == 1 {
            let (method, params) = &batch[0];
            let value = self.send_single(transport, method, params.clone()).await?;
            let mut out = Map::new();
            out.insert(method.to_string(), value);
            return Ok(out);
        }

        let requests: Vec<Value> = batch
            .iter()
            .map(|(method, params)| json!({"method": method, "params": params}))
            .collect();
        let request = self.envelope("multipleRequest", Some(json!({"requests": requests})));
        let response = transport.send(&request).await?;

        let code = response["error_code"].as_i64().unwrap_or(0);
        if code != 0 {
            if ErrorCode::classify(code) == ErrorCode::Retryable {
                self.batch_size.store(1, Ordering::SeqCst);
                warn!(code, "Smart batch decode failure, demoting to batch_size=1");
            }
            return Err(Error::from_device_code(code, "multipleRequest"));
        }

        let responses = response["result"]["responses"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        let mut out = Map::new();
        for (i, sub) in responses.iter().enumerate() {
            let method = sub.get("method").and_then(Value::as_str);
            let method = match method {
                Some(m) => m.to_string(),
                None => {
                    // Firmware quirk: sub-response missing `method`; fall
                    // back to positional pairing and requery singly.
                    let (fallback_method, params) = &batch[i.min(batch.len() - 1)];
                    let value = self.send_single(transport, fallback_method, params.clone()).await?;
                    out.insert(fallback_method.to_string(), value);
                    continue;
                }
            };
            let sub_code = sub["error_code"].as_i64().unwrap_or(0);
            let value = if sub_code == 0 {
                sub.get("result").cloned().unwrap_or(Value::Null)
            } else {
                // Error attribution (spec §4.7): with many outstanding
                // methods, per-sub-response errors are recorded rather
                // than raised.
                json!({"error_code": sub_code})
            };
            out.insert(method, value);
        }
        Ok(out)
    }

    /// Pagination (spec §4.7, §8): if a result carries both `start_index`
    /// and `sum` alongside exactly one array field, keep requesting with
    /// `{start_index: len(list)}` until the list reaches `sum` or an empty
    /// page breaks the loop.
    async fn paginate(
        &self,
        transport: &mut Box<dyn Transport>,
        method: &str,
        params: Value,
        mut value: Value,
    ) -> Result<Value, Error> {
        loop {
            let Some(obj) = value.as_object() else { return Ok(value) };
            if !obj.contains_key("start_index") || !obj.contains_key("sum") {
                return Ok(value);
            }
            let sum = obj.get("sum").and_then(Value::as_u64).unwrap_or(0) as usize;
            let array_field = obj
                .iter()
                .find(|(_, v)| v.is_array())
                .map(|(k, _)| k.clone());
            let Some(array_field) = array_field else { return Ok(value) };
            let list = obj[&array_field].as_array().cloned().unwrap_or_default();
            if list.len() >= sum || list.is_empty() {
                return Ok(value);
            }

            let mut next_params = params.clone();
            if let Some(next_obj) = next_params.as_object_mut() {
                next_obj.insert("start_index".to_string(), json!(list.len()));
            }
            let next_value = self.send_single(transport, method, next_params).await?;
            let Some(next_obj) = next_value.as_object() else { return Ok(value) };
            let next_list = next_obj
                .get(&array_field)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            if next_list.is_empty() {
                return Ok(value);
            }

            let obj_mut = value.as_object_mut().unwrap();
            let combined = obj_mut[&array_field]
                .as_array()
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .chain(next_list)
                .collect::<Vec<_>>();
            obj_mut.insert(array_field.clone(), json!(combined));
            obj_mut.insert("start_index".to_string(), json!(0));
        }
    }
}

/// Pulls `result` out of a single-method response, or raises the device
/// error if `error_code != 0` (spec §4.7 "with one outstanding method,
/// errors raise").
fn extract_result(response: &Value, method: &str) -> Result<Value, Error> {
    let code = response["error_code"].as_i64().unwrap_or(0);
    if code != error_code::SUCCESS {
        return Err(Error::from_device_code(code, method));
    }
    Ok(response.get("result").cloned().unwrap_or(Value::Null))
}

#[async_trait]
impl Protocol for SmartProtocol {
    /// `request` is either `{"method": name, "params": value}` (single
    /// call; `params` optional) or a bare `{m1: p1, m2: p2, ...}` map,
    /// which is treated as a multi-method batch request.
    async fn query(&self, request: Value) -> Result<Value, Error> {
        let is_single_call = request.get("method").and_then(Value::as_str).is_some();
        let mut attempt = 0;
        loop {
            let outcome: Result<Value, Error> = async {
                let mut transport = self.transport.lock().await;
                if is_single_call {
                    let method = request["method"].as_str().unwrap().to_string();
                    let params = request.get("params").cloned().unwrap_or(Value::Null);
                    let value = self.send_single(&mut transport, &method, params.clone()).await?;
                    self.paginate(&mut transport, &method, params, value).await
                } else {
                    let methods = request.as_object().cloned().unwrap_or_default();
                    let batches = self.plan_batches(&methods);
                    let mut combined = Map::new();
                    for batch in &batches {
                        let partial = self.send_batch(&mut transport, batch).await?;
                        combined.extend(partial);
                    }
                    Ok(Value::Object(combined))
                }
            }
            .await;

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt > self.retries {
                        return Err(err);
                    }
                    let mut transport = self.transport.lock().await;
                    match &err {
                        Error::Timeout => {
                            debug!(attempt, "Smart query timed out, retrying after backoff");
                            transport.reset().await;
                            drop(transport);
                            tokio::time::sleep(RETRY_BACKOFF).await;
                        }
                        Error::Connection { .. } => {
                            debug!(attempt, "Smart query connection error, retrying immediately");
                        }
                        Error::Retryable(_) => {
                            debug!(attempt, "Smart query retryable error, retrying after backoff");
                            transport.reset().await;
                            drop(transport);
                            tokio::time::sleep(RETRY_BACKOFF).await;
                        }
                        Error::Auth(_) => {
                            // spec §4.7: reset transport, do not retry.
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

    #[test]
    fn plan_batches_respects_deny_list_and_size() {
        let transport_stub = SmartProtocol {
            transport: Mutex::new(Box::new(NoopTransport)),
            retries: PROTOCOL_RETRIES,
            terminal_uuid: "x".into(),
            batch_size: AtomicUsize::new(2),
        };
        let mut methods = Map::new();
        methods.insert("get_device_info".into(), Value::Null);
        methods.insert("get_emeter_data".into(), Value::Null);
        methods.insert("scanApList".into(), Value::Null);
        methods.insert("get_schedule".into(), Value::Null);

        let batches = transport_stub.plan_batches(&methods);
        let deny_batch = batches.iter().find(|b| b.len() == 1 && b[0].0 == "scanApList");
        assert!(deny_batch.is_some());
        assert!(batches.iter().all(|b| b.len() <= 2));
    }

    #[test]
    fn batch_demotion_is_sticky() {
        let protocol = SmartProtocol::new(Box::new(NoopTransport));
        protocol.batch_size.store(1, Ordering::SeqCst);
        assert_eq!(protocol.batch_size.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn terminal_uuid_is_generated_once_and_stable() {
        let protocol = SmartProtocol::new(Box::new(NoopTransport));
        let first = protocol.terminal_uuid.clone();
        let second = protocol.terminal_uuid.clone();
        assert_eq!(first, second);
    }

    struct NoopTransport;

    #[async_trait]
    impl Transport for NoopTransport {
        async fn send(&mut self, _request: &Value) -> Result<Value, Error> {
            Ok(json!({"error_code": 0, "result": {}}))
        }
        async fn reset(&mut self) {}
        async fn close(&mut self) {}
    }
}
