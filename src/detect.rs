//! Beacon type detection.
//!
//! Detection looks only at the first manufacturer data structure and the first
//! service data structure of a merged observation. Checks run in a fixed
//! priority order and the first match wins:
//!
//! 1. Eddystone (service data, frame type in the high nibble of byte 0)
//! 2. iBeacon (manufacturer data prefix `4C 00 02 15`)
//! 3. Estimote Telemetry (service data)
//! 4. Estimote Nearable (manufacturer data company ID)
//!
//! Anything else is [`BeaconType::Unknown`]. Detection never fails.

use crate::merge::ServiceData;
use serde::Serialize;
use std::fmt;

/// Classification of a merged observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BeaconType {
    IBeacon,
    EddystoneUid,
    EddystoneUrl,
    EddystoneTlm,
    EddystoneEid,
    EstimoteTelemetry,
    EstimoteNearable,
    Unknown,
}

impl BeaconType {
    pub const fn as_str(self) -> &'static str {
        match self {
            BeaconType::IBeacon => "iBeacon",
            BeaconType::EddystoneUid => "eddystoneUid",
            BeaconType::EddystoneUrl => "eddystoneUrl",
            BeaconType::EddystoneTlm => "eddystoneTlm",
            BeaconType::EddystoneEid => "eddystoneEid",
            BeaconType::EstimoteTelemetry => "estimoteTelemetry",
            BeaconType::EstimoteNearable => "estimoteNearable",
            BeaconType::Unknown => "unknown",
        }
    }

    /// Map an Eddystone frame type nibble to its beacon type.
    fn from_eddystone_frame(frame_type: u8) -> Option<Self> {
        match frame_type {
            0x0 => Some(BeaconType::EddystoneUid),
            0x1 => Some(BeaconType::EddystoneUrl),
            0x2 => Some(BeaconType::EddystoneTlm),
            0x3 => Some(BeaconType::EddystoneEid),
            _ => None,
        }
    }
}

impl fmt::Display for BeaconType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registered identifiers the detector keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolIds {
    /// Eddystone 16-bit service UUID.
    pub eddystone_service_uuid: u16,
    /// Estimote telemetry 16-bit service UUID.
    pub estimote_telemetry_service_uuid: u16,
    /// Estimote Bluetooth SIG company identifier.
    pub estimote_company_id: u16,
    /// Apple company ID (little-endian on air) followed by the iBeacon type and length bytes.
    pub ibeacon_prefix: u32,
}

impl ProtocolIds {
    pub const REGISTERED: ProtocolIds = ProtocolIds {
        eddystone_service_uuid: 0xFEAA,
        estimote_telemetry_service_uuid: 0xFE9A,
        estimote_company_id: 0x015D,
        ibeacon_prefix: 0x4C00_0215,
    };
}

impl Default for ProtocolIds {
    fn default() -> Self {
        Self::REGISTERED
    }
}

/// Classify an observation from its first manufacturer and service data payloads.
pub fn detect(
    ids: &ProtocolIds,
    manufacturer: Option<&[u8]>,
    service: Option<ServiceData<'_>>,
) -> BeaconType {
    if let Some(service) = service
        && service.uuid == ids.eddystone_service_uuid
        && let Some(&frame) = service.data.first()
        && let Some(beacon_type) = BeaconType::from_eddystone_frame(frame >> 4)
    {
        return beacon_type;
    }

    if let Some(&[a, b, c, d, ..]) = manufacturer
        && u32::from_be_bytes([a, b, c, d]) == ids.ibeacon_prefix
    {
        return BeaconType::IBeacon;
    }

    if let Some(service) = service
        && service.uuid == ids.estimote_telemetry_service_uuid
        && !service.data.is_empty()
    {
        return BeaconType::EstimoteTelemetry;
    }

    if let Some(&[lo, hi, ..]) = manufacturer
        && u16::from_le_bytes([lo, hi]) == ids.estimote_company_id
    {
        return BeaconType::EstimoteNearable;
    }

    BeaconType::Unknown
}
