//! Merge event dispatch: merge, detect, decode.
//!
//! The dispatcher holds no per-event state, so one instance can serve every
//! address. A failure for one event never affects the next.

use crate::beacon::{DecodeError, eddystone, estimote, ibeacon};
use crate::detect::{self, BeaconType, ProtocolIds};
use crate::merge::{self, MergeEvent, MergedObservation};
use crate::record::{BeaconPayload, BeaconRecord};
use log::{debug, trace};
use thiserror::Error;

/// Why a merge event produced no record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DropReason {
    /// No manufacturer data and service-data-only beacons are not accepted
    #[error("No manufacturer data")]
    MissingManufacturerData,
    /// Nothing matched a known beacon layout
    #[error("Unrecognized advertisement")]
    Unrecognized,
    /// Detected, but the payload did not decode
    #[error("{beacon_type}: {source}")]
    Decode {
        beacon_type: BeaconType,
        source: DecodeError,
    },
}

/// Runs the merge, detect and decode pipeline for merge events.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    ids: ProtocolIds,
    require_manufacturer_data: bool,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(ProtocolIds::REGISTERED)
    }
}

impl Dispatcher {
    /// A dispatcher that only considers observations carrying manufacturer data.
    pub fn new(ids: ProtocolIds) -> Self {
        Self {
            ids,
            require_manufacturer_data: true,
        }
    }

    /// Also decode observations that only carry service data (Eddystone,
    /// Estimote Telemetry without any manufacturer data).
    pub fn allow_service_data_only(mut self, allow: bool) -> Self {
        self.require_manufacturer_data = !allow;
        self
    }

    /// Turn one merge event into a record, or the reason there is none.
    pub fn dispatch(&self, event: &MergeEvent) -> Result<BeaconRecord, DropReason> {
        let observation = merge::merge(event);
        let result = self.classify(&observation);

        match &result {
            Ok(record) => trace!("{}: {}", record.address, record.beacon_type),
            Err(reason) => debug!("{}: dropped: {reason}", observation.address),
        }
        result
    }

    /// Like [`Dispatcher::dispatch`], discarding the drop reason.
    pub fn process(&self, event: &MergeEvent) -> Option<BeaconRecord> {
        self.dispatch(event).ok()
    }

    fn classify(&self, observation: &MergedObservation) -> Result<BeaconRecord, DropReason> {
        let manufacturer = observation.manufacturer_data();
        if manufacturer.is_none() && self.require_manufacturer_data {
            return Err(DropReason::MissingManufacturerData);
        }

        let beacon_type = detect::detect(&self.ids, manufacturer, observation.service_data());
        let payload = decode(beacon_type, observation).map_err(|source| match source {
            DecodeFailure::Unrecognized => DropReason::Unrecognized,
            DecodeFailure::Decode(source) => DropReason::Decode {
                beacon_type,
                source,
            },
        })?;

        Ok(BeaconRecord::new(observation, payload))
    }
}

enum DecodeFailure {
    Unrecognized,
    Decode(DecodeError),
}

impl From<DecodeError> for DecodeFailure {
    fn from(err: DecodeError) -> Self {
        DecodeFailure::Decode(err)
    }
}

/// Run the decoder matching `beacon_type` on the payload it was detected on.
fn decode(
    beacon_type: BeaconType,
    observation: &MergedObservation,
) -> Result<BeaconPayload, DecodeFailure> {
    let manufacturer = || {
        observation
            .manufacturer_data()
            .ok_or_else(|| DecodeError::InvalidData("missing manufacturer data".into()))
    };
    let service = || {
        observation
            .service_data()
            .map(|s| s.data)
            .ok_or_else(|| DecodeError::InvalidData("missing service data".into()))
    };

    let payload = match beacon_type {
        BeaconType::IBeacon => BeaconPayload::IBeacon(ibeacon::decode(manufacturer()?)?),
        BeaconType::EddystoneUid => BeaconPayload::EddystoneUid(eddystone::decode_uid(service()?)?),
        BeaconType::EddystoneUrl => BeaconPayload::EddystoneUrl(eddystone::decode_url(service()?)?),
        BeaconType::EddystoneTlm => BeaconPayload::EddystoneTlm(eddystone::decode_tlm(service()?)?),
        BeaconType::EddystoneEid => BeaconPayload::EddystoneEid(eddystone::decode_eid(service()?)?),
        BeaconType::EstimoteTelemetry => {
            BeaconPayload::EstimoteTelemetry(estimote::decode_telemetry(service()?)?)
        }
        BeaconType::EstimoteNearable => {
            BeaconPayload::EstimoteNearable(estimote::decode_nearable(manufacturer()?)?)
        }
        BeaconType::Unknown => return Err(DecodeFailure::Unrecognized),
    };
    Ok(payload)
}
