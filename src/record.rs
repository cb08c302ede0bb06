//! Decoded beacon records handed to output formatters.

use crate::beacon::eddystone::{EddystoneEid, EddystoneTlm, EddystoneUid, EddystoneUrl};
use crate::beacon::estimote::{EstimoteNearable, EstimoteTelemetry};
use crate::beacon::ibeacon::IBeacon;
use crate::detect::BeaconType;
use crate::mac_address::MacAddress;
use crate::merge::MergedObservation;
use serde::Serialize;

/// Protocol-specific part of a record. Serialises as a single key named after
/// the beacon type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BeaconPayload {
    IBeacon(IBeacon),
    EddystoneUid(EddystoneUid),
    EddystoneUrl(EddystoneUrl),
    EddystoneTlm(EddystoneTlm),
    EddystoneEid(EddystoneEid),
    EstimoteTelemetry(EstimoteTelemetry),
    EstimoteNearable(EstimoteNearable),
}

impl BeaconPayload {
    pub fn beacon_type(&self) -> BeaconType {
        match self {
            BeaconPayload::IBeacon(_) => BeaconType::IBeacon,
            BeaconPayload::EddystoneUid(_) => BeaconType::EddystoneUid,
            BeaconPayload::EddystoneUrl(_) => BeaconType::EddystoneUrl,
            BeaconPayload::EddystoneTlm(_) => BeaconType::EddystoneTlm,
            BeaconPayload::EddystoneEid(_) => BeaconType::EddystoneEid,
            BeaconPayload::EstimoteTelemetry(_) => BeaconType::EstimoteTelemetry,
            BeaconPayload::EstimoteNearable(_) => BeaconType::EstimoteNearable,
        }
    }
}

/// One recognised beacon advertisement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeaconRecord {
    pub address: MacAddress,
    pub local_name: Option<String>,
    pub tx_power_level: Option<i8>,
    /// Averaged over the merged reports, dBm
    pub rssi: Option<i16>,
    pub beacon_type: BeaconType,
    #[serde(flatten)]
    pub payload: BeaconPayload,
}

impl BeaconRecord {
    pub fn new(observation: &MergedObservation, payload: BeaconPayload) -> Self {
        Self {
            address: observation.address,
            local_name: observation.local_name(),
            tx_power_level: observation.tx_power(),
            rssi: observation.rssi,
            beacon_type: payload.beacon_type(),
            payload,
        }
    }
}
