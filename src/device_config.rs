//! Device identity and connection parameters (spec §3). A `DeviceConfig`
//! is the caller-facing handle; everything a `Protocol`/`Transport` needs
//! to reach and authenticate with one device lives here.

use std::fmt;
use std::time::Duration;

use crate::credentials::{Credentials, CredentialsHash};
use crate::error::Error;

/// `IOT.*` and `SMART.*` device families (spec §3, §4.9). The variant name
/// is also the wire `device_type` substring discovery matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceFamily {
    IotSmartPlugSwitch,
    IotSmartBulb,
    IotIpCamera,
    SmartKasaPlug,
    SmartKasaBulb,
    SmartKasaSwitch,
    SmartKasaHub,
    SmartTapoPlug,
    SmartTapoBulb,
    SmartTapoSwitch,
    SmartTapoHub,
    SmartTapoIpCamera,
    SmartTapoDoorbell,
    SmartTapoRobovac,
    SmartTapoChime,
}

impl DeviceFamily {
    /// Whether this is one of the `IOT.*` legacy families rather than a
    /// `SMART.*` family (spec §4.9's `family_prefix`).
    pub fn is_iot(self) -> bool {
        matches!(
            self,
            DeviceFamily::IotSmartPlugSwitch | DeviceFamily::IotSmartBulb | DeviceFamily::IotIpCamera
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceFamily::IotSmartPlugSwitch => "IOT.SMARTPLUGSWITCH",
            DeviceFamily::IotSmartBulb => "IOT.SMARTBULB",
            DeviceFamily::IotIpCamera => "IOT.IPCAMERA",
            DeviceFamily::SmartKasaPlug => "SMART.KASAPLUG",
            DeviceFamily::SmartKasaBulb => "SMART.KASABULB",
            DeviceFamily::SmartKasaSwitch => "SMART.KASASWITCH",
            DeviceFamily::SmartKasaHub => "SMART.KASAHUB",
            DeviceFamily::SmartTapoPlug => "SMART.TAPOPLUG",
            DeviceFamily::SmartTapoBulb => "SMART.TAPOBULB",
            DeviceFamily::SmartTapoSwitch => "SMART.TAPOSWITCH",
            DeviceFamily::SmartTapoHub => "SMART.TAPOHUB",
            DeviceFamily::SmartTapoIpCamera => "SMART.IPCAMERA",
            DeviceFamily::SmartTapoDoorbell => "SMART.TAPODOORBELL",
            DeviceFamily::SmartTapoRobovac => "SMART.TAPOROBOVAC",
            DeviceFamily::SmartTapoChime => "SMART.TAPOCHIME",
        }
    }

    /// Parses the `device_type` substring a discovery reply carries, e.g.
    /// `SMART.TAPOPLUG` or `IOT.SMARTBULB`, tolerating the vendor/model
    /// suffix some firmware appends (spec §4.10 "family by substring
    /// match").
    pub fn from_device_type(device_type: &str) -> Option<Self> {
        let upper = device_type.to_ascii_uppercase();
        [
            DeviceFamily::IotSmartPlugSwitch,
            DeviceFamily::IotSmartBulb,
            DeviceFamily::IotIpCamera,
            DeviceFamily::SmartKasaPlug,
            DeviceFamily::SmartKasaBulb,
            DeviceFamily::SmartKasaSwitch,
            DeviceFamily::SmartKasaHub,
            DeviceFamily::SmartTapoPlug,
            DeviceFamily::SmartTapoBulb,
            DeviceFamily::SmartTapoSwitch,
            DeviceFamily::SmartTapoHub,
            DeviceFamily::SmartTapoIpCamera,
            DeviceFamily::SmartTapoDoorbell,
            DeviceFamily::SmartTapoRobovac,
            DeviceFamily::SmartTapoChime,
        ]
        .into_iter()
        .find(|f| upper.contains(f.as_str()))
    }
}

/// Wire encryption scheme a device negotiates (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    Xor,
    Aes,
    Klap,
}

/// KLAP/AES login hashing generation (spec §4.4, §4.5). `null` in the spec
/// prose is modeled as `None` here — the XOR transport has no login at all.
pub type LoginVersion = Option<u8>;

/// The negotiated shape of a device's connection (spec §3). Immutable once
/// built; discovery constructs one from a broadcast reply, or a caller
/// supplies one directly when the device is already known.
#[derive(Debug, Clone)]
pub struct ConnectionType {
    pub device_family: DeviceFamily,
    pub encryption: Encryption,
    pub login_version: LoginVersion,
    pub https: bool,
    pub http_port: Option<u16>,
}

impl ConnectionType {
    pub fn new(device_family: DeviceFamily, encryption: Encryption) -> Self {
        Self {
            device_family,
            encryption,
            login_version: None,
            https: false,
            http_port: None,
        }
    }

    pub fn with_login_version(mut self, v: u8) -> Self {
        self.login_version = Some(v);
        self
    }

    pub fn with_https(mut self, https: bool) -> Self {
        self.https = https;
        self
    }

    pub fn with_http_port(mut self, port: u16) -> Self {
        self.http_port = Some(port);
        self
    }
}

/// Everything needed to reach and authenticate with one device (spec §3).
/// Built once, then handed to a `Protocol` factory; `aes_keys` may be
/// written back after a successful handshake so later connections skip
/// RSA keygen.
#[derive(Clone)]
pub struct DeviceConfig {
    pub host: String,
    pub port_override: Option<u16>,
    pub timeout: Duration,
    pub credentials: Option<Credentials>,
    pub credentials_hash: Option<CredentialsHash>,
    pub batch_size: Option<usize>,
    pub connection_type: ConnectionType,
    pub aes_keys: Option<String>,
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("host", &self.host)
            .field("port_override", &self.port_override)
            .field("timeout", &self.timeout)
            .field("credentials", &self.credentials)
            .field("credentials_hash", &self.credentials_hash)
            .field("batch_size", &self.batch_size)
            .field("connection_type", &self.connection_type)
            .field("aes_keys", &self.aes_keys.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl DeviceConfig {
    /// Port actually used on the wire: `port_override` if set, else the
    /// connection type's default (80 for legacy XOR-over-HTTP, 9999 for
    /// raw XOR-TCP, 443/80 for HTTP(S) transports per `https`).
    pub fn effective_port(&self) -> u16 {
        if let Some(p) = self.port_override {
            return p;
        }
        if let Some(p) = self.connection_type.http_port {
            return p;
        }
        match self.connection_type.encryption {
            Encryption::Xor if self.connection_type.device_family.is_iot() => 9999,
            _ if self.connection_type.https => 443,
            _ => 80,
        }
    }

    /// Invariant from spec §3: exactly one of `credentials`/`credentials_hash`
    /// must suffice to authenticate (both may be present; at least one must
    /// be). Transports that need no authentication (plain XOR) never call this.
    pub fn check_authable(&self) -> Result<(), Error> {
        if self.credentials.is_none() && self.credentials_hash.is_none() {
            return Err(Error::Unsupported(
                "DeviceConfig has neither credentials nor credentials_hash".into(),
            ));
        }
        Ok(())
    }
}

/// Builder mirroring the spec's implied construction (most fields optional
/// with sensible defaults; `host` and `connection_type` are the only two
/// that must be supplied).
pub struct DeviceConfigBuilder {
    host: String,
    port_override: Option<u16>,
    timeout: Duration,
    credentials: Option<Credentials>,
    credentials_hash: Option<CredentialsHash>,
    batch_size: Option<usize>,
    connection_type: ConnectionType,
    aes_keys: Option<String>,
}

impl DeviceConfigBuilder {
    pub fn new(host: impl Into<String>, connection_type: ConnectionType) -> Self {
        Self {
            host: host.into(),
            port_override: None,
            timeout: crate::defaults::DEVICE_TIMEOUT,
            credentials: None,
            credentials_hash: None,
            batch_size: None,
            connection_type,
            aes_keys: None,
        }
    }

    pub fn port_override(mut self, port: u16) -> Self {
        self.port_override = Some(port);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn credentials_hash(mut self, hash: CredentialsHash) -> Self {
        self.credentials_hash = Some(hash);
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn aes_keys(mut self, der_b64: impl Into<String>) -> Self {
        self.aes_keys = Some(der_b64.into());
        self
    }

    pub fn build(self) -> DeviceConfig {
        DeviceConfig {
            host: self.host,
            port_override: self.port_override,
            timeout: self.timeout,
            credentials: self.credentials,
            credentials_hash: self.credentials_hash,
            batch_size: self.batch_size,
            connection_type: self.connection_type,
            aes_keys: self.aes_keys,
        }
    }
}
