//! Eddystone frame decoders.
//!
//! Each decoder takes the Eddystone service data with the service UUID
//! already stripped, so byte 0 is the frame type. See
//! <https://github.com/google/eddystone/blob/master/protocol-specification.md>.

use super::{DecodeError, array, byte, require, serialize_hex};
use serde::Serialize;
use std::time::Duration;

pub const FRAME_UID: u8 = 0x0;
pub const FRAME_URL: u8 = 0x1;
pub const FRAME_TLM: u8 = 0x2;
pub const FRAME_EID: u8 = 0x3;

/// UID frame bytes without the two trailing reserved bytes.
pub const UID_LEN: usize = 18;
/// URL frame bytes up to and including the scheme prefix.
pub const URL_MIN_LEN: usize = 3;
pub const TLM_LEN: usize = 14;
pub const ETLM_LEN: usize = 18;
pub const EID_LEN: usize = 10;

/// TLM temperature value meaning the beacon has no sensor.
const TLM_TEMPERATURE_UNSUPPORTED: u16 = 0x8000;

const URL_SCHEMES: [&str; 4] = ["http://www.", "https://www.", "http://", "https://"];

const URL_EXPANSIONS: [&str; 14] = [
    ".com/", ".org/", ".edu/", ".net/", ".info/", ".biz/", ".gov/", ".com", ".org", ".edu",
    ".net", ".info", ".biz", ".gov",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EddystoneUid {
    /// Calibrated TX power at 0 m, dBm
    pub tx_power: i8,
    #[serde(serialize_with = "serialize_hex")]
    pub namespace: [u8; 10],
    #[serde(serialize_with = "serialize_hex")]
    pub instance: [u8; 6],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EddystoneUrl {
    pub tx_power: i8,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EddystoneTlm {
    pub version: u8,
    #[serde(flatten)]
    pub telemetry: TlmData,
}

/// TLM body, by version.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TlmData {
    /// Version 0x00.
    #[serde(rename_all = "camelCase")]
    Plain {
        /// Millivolts, 0 when the beacon does not measure it
        battery_voltage: u16,
        /// Degrees Celsius
        temperature: Option<f64>,
        /// Advertising PDUs sent since boot
        adv_count: u32,
        /// Time since boot in 0.1 s units
        sec_count: u32,
    },
    /// Version 0x01, opaque without the beacon's identity key.
    #[serde(rename_all = "camelCase")]
    Encrypted {
        #[serde(serialize_with = "serialize_hex")]
        etlm: [u8; 12],
        salt: u16,
        mic: u16,
    },
}

impl EddystoneTlm {
    /// Time since boot for a plain TLM frame.
    pub fn uptime(&self) -> Option<Duration> {
        match self.telemetry {
            TlmData::Plain { sec_count, .. } => {
                Some(Duration::from_millis(u64::from(sec_count) * 100))
            }
            TlmData::Encrypted { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EddystoneEid {
    pub tx_power: i8,
    #[serde(serialize_with = "serialize_hex")]
    pub eid: [u8; 8],
}

fn expect_frame(data: &[u8], frame_type: u8) -> Result<(), DecodeError> {
    let found = byte(data, 0)? >> 4;
    if found != frame_type {
        return Err(DecodeError::UnsupportedFormat(format!(
            "Eddystone frame type {found:#x}, expected {frame_type:#x}"
        )));
    }
    Ok(())
}

pub fn decode_uid(data: &[u8]) -> Result<EddystoneUid, DecodeError> {
    require(data, UID_LEN)?;
    expect_frame(data, FRAME_UID)?;

    Ok(EddystoneUid {
        tx_power: byte(data, 1)? as i8,
        namespace: array(data, 2)?,
        instance: array(data, 12)?,
    })
}

pub fn decode_url(data: &[u8]) -> Result<EddystoneUrl, DecodeError> {
    require(data, URL_MIN_LEN)?;
    expect_frame(data, FRAME_URL)?;

    let scheme = byte(data, 2)?;
    let mut url = URL_SCHEMES
        .get(usize::from(scheme))
        .ok_or_else(|| DecodeError::InvalidData(format!("URL scheme prefix {scheme:#04x}")))?
        .to_string();

    for &b in &data[URL_MIN_LEN..] {
        match URL_EXPANSIONS.get(usize::from(b)) {
            Some(expansion) => url.push_str(expansion),
            None if (0x21..=0x7E).contains(&b) => url.push(char::from(b)),
            None => {
                return Err(DecodeError::InvalidData(format!(
                    "reserved URL byte {b:#04x}"
                )));
            }
        }
    }

    Ok(EddystoneUrl {
        tx_power: byte(data, 1)? as i8,
        url,
    })
}

pub fn decode_tlm(data: &[u8]) -> Result<EddystoneTlm, DecodeError> {
    require(data, 2)?;
    expect_frame(data, FRAME_TLM)?;

    let version = byte(data, 1)?;
    let telemetry = match version {
        0x00 => {
            require(data, TLM_LEN)?;
            let temperature = u16::from_be_bytes(array(data, 4)?);
            TlmData::Plain {
                battery_voltage: u16::from_be_bytes(array(data, 2)?),
                temperature: (temperature != TLM_TEMPERATURE_UNSUPPORTED)
                    .then(|| f64::from(temperature as i16) / 256.0),
                adv_count: u32::from_be_bytes(array(data, 6)?),
                sec_count: u32::from_be_bytes(array(data, 10)?),
            }
        }
        0x01 => {
            require(data, ETLM_LEN)?;
            TlmData::Encrypted {
                etlm: array(data, 2)?,
                salt: u16::from_be_bytes(array(data, 14)?),
                mic: u16::from_be_bytes(array(data, 16)?),
            }
        }
        other => {
            return Err(DecodeError::UnsupportedFormat(format!(
                "TLM version {other:#04x}"
            )));
        }
    };

    Ok(EddystoneTlm { version, telemetry })
}

pub fn decode_eid(data: &[u8]) -> Result<EddystoneEid, DecodeError> {
    require(data, EID_LEN)?;
    expect_frame(data, FRAME_EID)?;

    Ok(EddystoneEid {
        tx_power: byte(data, 1)? as i8,
        eid: array(data, 2)?,
    })
}
