//! End-to-end sanity check on the table in spec §4.9: every
//! `(family, encryption, https)` combination this crate claims to support
//! resolves to some concrete `Protocol`/`Transport` pairing, including the
//! two "any https" special cases that must win over the general branches.

use kasa_proto::device_config::{ConnectionType, DeviceConfigBuilder, DeviceFamily, Encryption};
use kasa_proto::protocol::select_protocol;
use kasa_proto::Credentials;

fn config(family: DeviceFamily, encryption: Encryption, https: bool) -> kasa_proto::DeviceConfig {
    DeviceConfigBuilder::new("10.0.0.5", ConnectionType::new(family, encryption).with_https(https))
        .credentials(Credentials::new("user", "pass"))
        .build()
}

#[test]
fn every_documented_combination_resolves_to_a_protocol() {
    tracing_subscriber::fmt::try_init().ok();

    let combinations = [
        (DeviceFamily::IotSmartPlugSwitch, Encryption::Xor, false),
        (DeviceFamily::SmartKasaPlug, Encryption::Klap, false),
        (DeviceFamily::SmartTapoPlug, Encryption::Aes, false),
        (DeviceFamily::SmartTapoPlug, Encryption::Aes, true),
        (DeviceFamily::SmartTapoRobovac, Encryption::Aes, false),
        (DeviceFamily::SmartTapoRobovac, Encryption::Aes, true),
    ];

    for (family, encryption, https) in combinations {
        let cfg = config(family, encryption, https);
        let result = select_protocol(cfg);
        assert!(
            result.is_ok(),
            "expected a protocol for {family:?}/{encryption:?}/https={https}"
        );
    }
}

#[test]
fn camera_families_route_to_smartcam_regardless_of_https() {
    tracing_subscriber::fmt::try_init().ok();

    for https in [false, true] {
        let cfg = config(DeviceFamily::SmartTapoIpCamera, Encryption::Aes, https);
        assert!(select_protocol(cfg).is_ok(), "https={https}");

        let cfg = config(DeviceFamily::SmartTapoDoorbell, Encryption::Aes, https);
        assert!(select_protocol(cfg).is_ok(), "https={https}");
    }
}
