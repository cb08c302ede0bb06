use crate::advertising::{self, AdField};
use crate::mac_address::MacAddress;
use crate::merge::{MergeEvent, RawReport};

/// A stable MAC address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// E2C56DB5-DFFB-48D2-B060-D0F5A71096E0
pub const TEST_UUID: [u8; 16] = [
    0xE2, 0xC5, 0x6D, 0xB5, 0xDF, 0xFB, 0x48, 0xD2, 0xB0, 0x60, 0xD0, 0xF5, 0xA7, 0x10, 0x96, 0xE0,
];

pub const TEST_NAMESPACE: [u8; 10] = [0xED, 0xD1, 0xEB, 0xEA, 0xC0, 0x4E, 0x5D, 0xEF, 0xA0, 0x17];

pub const TEST_INSTANCE: [u8; 6] = [0x0B, 0xDB, 0x87, 0x53, 0x9B, 0x67];

/// A single report from [`TEST_MAC`].
pub fn report(rssi: Option<i16>, data: Vec<u8>) -> RawReport {
    RawReport {
        address: TEST_MAC,
        rssi,
        data,
    }
}

pub fn merge_event(reports: Vec<RawReport>) -> MergeEvent {
    MergeEvent {
        address: TEST_MAC,
        reports,
    }
}

/// Raw advertisement bytes carrying `fields`.
pub fn advertisement(fields: &[AdField]) -> Vec<u8> {
    advertising::encode(fields)
}

/// iBeacon manufacturer data, Apple company ID included.
pub fn ibeacon_data(uuid: [u8; 16], major: u16, minor: u16, power: i8) -> Vec<u8> {
    let mut data = vec![0x4C, 0x00, 0x02, 0x15];
    data.extend_from_slice(&uuid);
    data.extend_from_slice(&major.to_be_bytes());
    data.extend_from_slice(&minor.to_be_bytes());
    data.push(power as u8);
    data
}

/// Eddystone-UID service data (UUID stripped), RFU bytes omitted.
pub fn eddystone_uid_data(tx_power: i8, namespace: [u8; 10], instance: [u8; 6]) -> Vec<u8> {
    let mut data = vec![0x00, tx_power as u8];
    data.extend_from_slice(&namespace);
    data.extend_from_slice(&instance);
    data
}

/// Estimote telemetry header: frame type 2, identifier 01..08, sub-frame byte.
fn estimote_header(protocol: u8, sub_frame: u8) -> Vec<u8> {
    let mut data = vec![(protocol << 4) | 0x02];
    data.extend(1..=8u8);
    data.push(sub_frame);
    data
}

/// Motion sub-frame: +2 g / 0 / -2 g, moving, 10 s previous, 2 min current,
/// GPIO 0 and 2 high, firmware error, 101325 Pa.
pub fn estimote_telemetry_a(protocol: u8) -> Vec<u8> {
    let mut data = estimote_header(protocol, 0x00);
    data.extend_from_slice(&[127, 0, 0x81, 10, 0x42, 0x55]);
    data.extend_from_slice(&[0x00, 0xCD, 0x8B, 0x01]);
    data
}

/// Environment sub-frame: magnetic 0.5 / -0.5 / 0, uptime 0x123 hours,
/// -1.0 C, 3000 mV, 87 %.
pub fn estimote_telemetry_b(protocol: u8) -> Vec<u8> {
    let mut data = estimote_header(protocol, 0x01);
    data.extend_from_slice(&[64, 0xC0, 0, 0x35, 0x23, 0x21, 0xFC, 0xE3, 0x2E, 87]);
    data
}

/// Nearable manufacturer data: 24.5 C, battery 3.0 V, moving, 36 s current
/// and 1 hour previous motion state.
pub fn estimote_nearable_data() -> Vec<u8> {
    vec![
        0x5D, 0x01, 0x01, // company ID, frame type
        0xA6, 0x7A, 0xDE, 0x5B, 0xF3, 0xB6, 0xF6, 0xC2, // identifier
        0x01, 0x81, // hardware, firmware
        0x88, 0xC1, // temperature, battery code
        0x40, // state
        0x01, 0x00, 0xC0, // acceleration
        0x24, 0x81,
    ]
}
