//! iBeacon decoder.
//!
//! Manufacturer data layout:
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0 | 2 | Apple company ID `4C 00` |
//! | 2 | 1 | type `0x02` |
//! | 3 | 1 | length `0x15` |
//! | 4 | 16 | proximity UUID |
//! | 20 | 2 | major, big-endian |
//! | 22 | 2 | minor, big-endian |
//! | 24 | 1 | measured power at 1 m, signed dBm |

use super::{DecodeError, array, byte, require};
use serde::{Serialize, Serializer};
use uuid::Uuid;

/// Manufacturer data bytes an iBeacon frame needs.
pub const IBEACON_LEN: usize = 25;

/// A decoded iBeacon advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IBeacon {
    #[serde(serialize_with = "serialize_uuid")]
    pub uuid: Uuid,
    pub major: u16,
    pub minor: u16,
    /// Calibrated RSSI at one metre
    pub tx_power: i8,
}

fn serialize_uuid<S: Serializer>(uuid: &Uuid, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(uuid.hyphenated().encode_upper(&mut Uuid::encode_buffer()))
}

/// Decode iBeacon fields from manufacturer data, company ID included.
pub fn decode(data: &[u8]) -> Result<IBeacon, DecodeError> {
    require(data, IBEACON_LEN)?;

    Ok(IBeacon {
        uuid: Uuid::from_bytes(array(data, 4)?),
        major: u16::from_be_bytes(array(data, 20)?),
        minor: u16::from_be_bytes(array(data, 22)?),
        tx_power: byte(data, 24)? as i8,
    })
}
