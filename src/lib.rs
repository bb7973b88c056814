//! Client library for the TP-Link/Kasa/Tapo device wire protocols: UDP
//! discovery, the legacy XOR-stream transport, and the two HTTP-tunnelled
//! encrypted transports (AES-passthrough and KLAP), plus the IoT/Smart/
//! SmartCam request protocols layered on top.

pub mod codec;
pub mod credentials;
pub mod defaults;
pub mod device_config;
pub mod discovery;
pub mod emeter;
pub mod error;
pub mod http_client;
pub mod protocol;
pub mod transport;

pub use credentials::Credentials;
pub use device_config::{ConnectionType, DeviceConfig, DeviceConfigBuilder, DeviceFamily, Encryption};
pub use error::Error;
pub use protocol::Protocol;
