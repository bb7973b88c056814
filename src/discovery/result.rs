//! Parsed discovery facts and the `DeviceConfig` assembly step (spec §3
//! "DiscoveryResult", §4.10 "Assemble").

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::device_config::{ConnectionType, DeviceConfig, DeviceConfigBuilder, DeviceFamily, Encryption};
use crate::error::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MgtEncryptSchema {
    pub is_support_https: bool,
    pub encrypt_type: Option<String>,
    pub http_port: Option<u16>,
    pub lv: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptInfo {
    pub sym_schm: String,
    pub key: String,
    pub data: String,
}

/// Facts parsed straight out of a device's broadcast/unicast reply (spec
/// §3). `decrypted_data` holds whatever the caller decrypted out of
/// `encrypt_info`, when present. Derives `Serialize`/`Deserialize` so
/// callers can cache a discovery sweep to disk, the way the teacher's RPC
/// response types round-trip through `serde_json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub ip: String,
    pub device_type: String,
    pub device_model: Option<String>,
    pub device_id: Option<String>,
    pub mac: Option<String>,
    pub mgt_encrypt_schm: MgtEncryptSchema,
    pub encrypt_info: Option<EncryptInfo>,
    pub decrypted_data: Option<Value>,
}

impl DiscoveryResult {
    /// Parses the JSON body common to both legacy and new-format replies
    /// (spec §4.10: "New reply ... if body contains `result`, that is
    /// used").
    pub fn from_reply_body(ip: &str, body: &Value) -> Result<Self, Error> {
        let body = body.get("result").unwrap_or(body);

        let device_type = body["device_type"]
            .as_str()
            .or_else(|| body["system"]["get_sysinfo"]["mic_type"].as_str())
            .or_else(|| body["system"]["get_sysinfo"]["type"].as_str())
            .ok_or_else(|| Error::Internal("discovery reply missing device_type".into()))?
            .to_string();

        let sysinfo = if body.get("system").is_some() {
            &body["system"]["get_sysinfo"]
        } else {
            body
        };

        let mgt = &sysinfo["mgt_encrypt_schm"];
        let schema = MgtEncryptSchema {
            is_support_https: mgt["is_support_https"].as_bool().unwrap_or(false),
            encrypt_type: mgt["encrypt_type"].as_str().map(str::to_string),
            http_port: mgt["http_port"].as_u64().map(|p| p as u16),
            lv: mgt["lv"].as_u64().map(|v| v as u8),
        };

        let encrypt_info = body.get("encrypt_info").and_then(|e| {
            Some(EncryptInfo {
                sym_schm: e["sym_schm"].as_str()?.to_string(),
                key: e["key"].as_str()?.to_string(),
                data: e["data"].as_str()?.to_string(),
            })
        });

        Ok(Self {
            ip: ip.to_string(),
            device_type,
            device_model: sysinfo["model"].as_str().map(str::to_string),
            device_id: sysinfo["deviceId"].as_str().map(str::to_string),
            mac: sysinfo["mac"].as_str().or_else(|| sysinfo["mic_mac"].as_str()).map(str::to_string),
            mgt_encrypt_schm: schema,
            encrypt_info,
            decrypted_data: None,
        })
    }

    /// Derives `(family, encryption, https, http_port)` from the parsed
    /// reply (spec §4.10 "Assemble"): family by substring match on
    /// `device_type`, encryption from `mgt_encrypt_schm.encrypt_type`,
    /// `https`/`http_port` from the same schema.
    pub fn connection_params(&self) -> Result<DeviceConnectionParameters, Error> {
        let family = DeviceFamily::from_device_type(&self.device_type)
            .ok_or_else(|| Error::Unsupported(format!("unrecognized device_type {:?}", self.device_type)))?;

        let encryption = match self.mgt_encrypt_schm.encrypt_type.as_deref() {
            Some("KLAP") => Encryption::Klap,
            Some("AES") => Encryption::Aes,
            _ if family.is_iot() => Encryption::Xor,
            other => {
                return Err(Error::Unsupported(format!(
                    "unrecognized encrypt_type {other:?} for family {family:?}"
                )))
            }
        };

        Ok(DeviceConnectionParameters {
            family,
            encryption,
            https: self.mgt_encrypt_schm.is_support_https,
            http_port: self.mgt_encrypt_schm.http_port,
            login_version: self.mgt_encrypt_schm.lv,
        })
    }

    /// Builds a `DeviceConfig` from this reply plus caller-supplied
    /// credentials (spec §4.10 "Build a DeviceConfig").
    pub fn into_device_config(&self, credentials: crate::credentials::Credentials) -> Result<DeviceConfig, Error> {
        let params = self.connection_params()?;
        let mut connection_type = ConnectionType::new(params.family, params.encryption).with_https(params.https);
        if let Some(port) = params.http_port {
            connection_type = connection_type.with_http_port(port);
        }
        if let Some(lv) = params.login_version {
            connection_type = connection_type.with_login_version(lv);
        }
        Ok(DeviceConfigBuilder::new(self.ip.clone(), connection_type)
            .credentials(credentials)
            .build())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DeviceConnectionParameters {
    pub family: DeviceFamily,
    pub encryption: Encryption,
    pub https: bool,
    pub http_port: Option<u16>,
    pub login_version: Option<u8>,
}

/// How a probed IP sorted out (spec §4.10 "Error bucketing").
#[derive(Debug, Clone)]
pub enum ProbeOutcome {
    Discovered(DiscoveryResult),
    /// Recognized but no protocol/transport mapping.
    Unsupported { ip: String, reason: String },
    /// The device answered but an early auth probe failed; still usable,
    /// minimally.
    RequiresAuth { ip: String, device_type: Option<String> },
    /// Connect timed out; best-effort alias/model if any was gleaned.
    TimedOut { ip: String, alias: Option<String> },
    /// Any other protocol-level failure.
    Invalid { ip: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_legacy_style_reply() {
        let body = json!({
            "system": {
                "get_sysinfo": {
                    "type": "IOT.SMARTPLUGSWITCH",
                    "model": "HS100(US)",
                    "deviceId": "abc123",
                    "mac": "AA:BB:CC:DD:EE:FF",
                    "mgt_encrypt_schm": {"is_support_https": false, "encrypt_type": "NONE"}
                }
            }
        });
        let result = DiscoveryResult::from_reply_body("10.0.0.5", &body).unwrap();
        assert_eq!(result.device_type, "IOT.SMARTPLUGSWITCH");
        assert_eq!(result.device_model.as_deref(), Some("HS100(US)"));
        let params = result.connection_params().unwrap();
        assert_eq!(params.family, DeviceFamily::IotSmartPlugSwitch);
        assert_eq!(params.encryption, Encryption::Xor);
    }

    #[test]
    fn parses_new_style_reply_wrapped_in_result() {
        let body = json!({
            "result": {
                "device_type": "SMART.TAPOPLUG",
                "mgt_encrypt_schm": {"is_support_https": true, "encrypt_type": "KLAP", "http_port": 4433, "lv": 2}
            }
        });
        let result = DiscoveryResult::from_reply_body("10.0.0.6", &body).unwrap();
        let params = result.connection_params().unwrap();
        assert_eq!(params.family, DeviceFamily::SmartTapoPlug);
        assert_eq!(params.encryption, Encryption::Klap);
        assert!(params.https);
        assert_eq!(params.http_port, Some(4433));
        assert_eq!(params.login_version, Some(2));
    }

    #[test]
    fn unrecognized_device_type_is_unsupported() {
        let body = json!({"device_type": "BOGUS.THING", "mgt_encrypt_schm": {}});
        let result = DiscoveryResult::from_reply_body("10.0.0.7", &body).unwrap();
        assert!(matches!(result.connection_params(), Err(Error::Unsupported(_))));
    }
}
