//! Estimote Telemetry and Nearable decoders.
//!
//! Telemetry packets arrive as service data under the Estimote telemetry
//! service UUID and alternate between two sub-frames: "A" carries motion,
//! GPIO and (from protocol 2) pressure, "B" carries the magnetometer, light,
//! uptime, temperature and battery. Nearables (stickers) put everything in
//! one manufacturer data frame.

use super::{DecodeError, array, byte, require, serialize_hex};
use serde::Serialize;
use std::time::Duration;

/// Low nibble of byte 0 for telemetry packets.
pub const FRAME_TYPE_TELEMETRY: u8 = 0x2;
/// Highest telemetry protocol version understood.
pub const MAX_TELEMETRY_PROTOCOL: u8 = 2;
/// Byte 2 of nearable manufacturer data.
pub const FRAME_TYPE_NEARABLE: u8 = 0x01;

pub const NEARABLE_LEN: usize = 21;
const SUBFRAME_B_LEN: usize = 20;

/// Nearable accelerometer resolution in milli-g per raw unit.
const NEARABLE_ACCELERATION_MG: f64 = 15.625;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl TimeUnit {
    fn seconds(self) -> u64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Minutes => 60,
            TimeUnit::Hours => 3_600,
            TimeUnit::Days => 86_400,
            TimeUnit::Weeks => 604_800,
        }
    }
}

/// A coarse duration as the beacon reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoarseDuration {
    pub number: u16,
    pub unit: TimeUnit,
}

impl CoarseDuration {
    /// Motion state duration byte: 6-bit value, 2-bit unit. Unit 3 means days
    /// below 32 and `value - 32` weeks from 32 up.
    fn from_motion_byte(b: u8) -> Self {
        let number = u16::from(b & 0b0011_1111);
        let unit = match b >> 6 {
            0 => TimeUnit::Seconds,
            1 => TimeUnit::Minutes,
            2 => TimeUnit::Hours,
            _ if number < 32 => TimeUnit::Days,
            _ => {
                return Self {
                    number: number - 32,
                    unit: TimeUnit::Weeks,
                };
            }
        };
        Self { number, unit }
    }

    pub fn to_duration(self) -> Duration {
        Duration::from_secs(u64::from(self.number) * self.unit.seconds())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MotionStateDuration {
    pub previous: CoarseDuration,
    pub current: CoarseDuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorFlags {
    pub has_firmware_error: bool,
    pub has_clock_error: bool,
}

impl ErrorFlags {
    fn from_bits(firmware: bool, clock: bool) -> Self {
        Self {
            has_firmware_error: firmware,
            has_clock_error: clock,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimoteTelemetry {
    #[serde(serialize_with = "serialize_hex")]
    pub short_identifier: [u8; 8],
    pub protocol_version: u8,
    #[serde(flatten)]
    pub sub_frame: TelemetrySubFrame,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "subFrameType")]
pub enum TelemetrySubFrame {
    A(MotionTelemetry),
    B(EnvironmentTelemetry),
}

/// Sub-frame A.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionTelemetry {
    /// g, +/-2 g full scale
    pub acceleration: Vector3,
    pub is_moving: bool,
    pub motion_state_duration: MotionStateDuration,
    /// Pin states 0..=3, `true` for high
    pub gpio: [bool; 4],
    /// Protocol 1 and 2 only
    pub errors: Option<ErrorFlags>,
    /// Pascal, protocol 2 only
    pub pressure: Option<f64>,
}

/// Sub-frame B.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentTelemetry {
    /// Normalised to -1..1, all zero before calibration
    pub magnetic_field: Vector3,
    /// Lux
    pub ambient_light_level: f64,
    pub uptime: CoarseDuration,
    /// Degrees Celsius
    pub temperature: f64,
    /// Millivolts, absent until first measured
    pub battery_voltage: Option<u16>,
    /// Percent, protocol 1 and up, absent until first measured
    pub battery_level: Option<u8>,
    /// Protocol 0 only
    pub errors: Option<ErrorFlags>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimoteNearable {
    #[serde(serialize_with = "serialize_hex")]
    pub nearable_id: [u8; 8],
    pub hardware_version: u8,
    pub firmware_version: u8,
    /// Degrees Celsius
    pub temperature: f64,
    /// Volts, absent when the sticker reports it as not measured
    pub battery_voltage: Option<f64>,
    pub is_moving: bool,
    /// Milli-g
    pub acceleration: Vector3,
    pub motion_state_duration: MotionStateDuration,
}

fn bit(b: u8, n: u8) -> bool {
    b & (1 << n) != 0
}

/// Sign-extend the low 12 bits of `raw`.
fn signed_12(raw: u16) -> i16 {
    ((raw << 4) as i16) >> 4
}

/// Decode telemetry service data (service UUID stripped).
pub fn decode_telemetry(data: &[u8]) -> Result<EstimoteTelemetry, DecodeError> {
    require(data, 10)?;

    let header = byte(data, 0)?;
    if header & 0x0F != FRAME_TYPE_TELEMETRY {
        return Err(DecodeError::UnsupportedFormat(format!(
            "Estimote frame type {:#x}",
            header & 0x0F
        )));
    }
    let protocol_version = header >> 4;
    if protocol_version > MAX_TELEMETRY_PROTOCOL {
        return Err(DecodeError::UnsupportedFormat(format!(
            "Estimote telemetry protocol {protocol_version}"
        )));
    }

    let sub_frame = match byte(data, 9)? & 0b11 {
        0 => TelemetrySubFrame::A(decode_subframe_a(data, protocol_version)?),
        1 => TelemetrySubFrame::B(decode_subframe_b(data, protocol_version)?),
        other => {
            return Err(DecodeError::UnsupportedFormat(format!(
                "Estimote telemetry sub-frame {other}"
            )));
        }
    };

    Ok(EstimoteTelemetry {
        short_identifier: array(data, 1)?,
        protocol_version,
        sub_frame,
    })
}

fn decode_subframe_a(data: &[u8], protocol: u8) -> Result<MotionTelemetry, DecodeError> {
    require(
        data,
        match protocol {
            0 => 16,
            1 => 17,
            _ => 20,
        },
    )?;

    // Raw 127 is 2 g.
    let accel = |at| -> Result<f64, DecodeError> {
        Ok(f64::from(byte(data, at)? as i8) * 2.0 / 127.0)
    };
    let state = byte(data, 15)?;

    let errors = match protocol {
        0 => None,
        1 => {
            let flags = byte(data, 16)?;
            Some(ErrorFlags::from_bits(bit(flags, 0), bit(flags, 1)))
        }
        _ => Some(ErrorFlags::from_bits(bit(state, 2), bit(state, 3))),
    };

    let pressure = if protocol >= 2 {
        Some(f64::from(u32::from_le_bytes(array(data, 16)?)) / 256.0)
    } else {
        None
    };

    Ok(MotionTelemetry {
        acceleration: Vector3 {
            x: accel(10)?,
            y: accel(11)?,
            z: accel(12)?,
        },
        is_moving: state & 0b11 == 1,
        motion_state_duration: MotionStateDuration {
            previous: CoarseDuration::from_motion_byte(byte(data, 13)?),
            current: CoarseDuration::from_motion_byte(byte(data, 14)?),
        },
        gpio: [bit(state, 4), bit(state, 5), bit(state, 6), bit(state, 7)],
        errors,
        pressure,
    })
}

fn decode_subframe_b(data: &[u8], protocol: u8) -> Result<EnvironmentTelemetry, DecodeError> {
    require(data, SUBFRAME_B_LEN)?;

    let magnetic =
        |at| -> Result<f64, DecodeError> { Ok(f64::from(byte(data, at)? as i8) / 128.0) };

    let light = byte(data, 13)?;
    let ambient_light_level = 2f64.powi(i32::from(light >> 4)) * f64::from(light & 0x0F) * 0.72;

    let b14 = byte(data, 14)?;
    let b15 = byte(data, 15)?;
    let b16 = byte(data, 16)?;
    let b17 = byte(data, 17)?;
    let b18 = byte(data, 18)?;
    let b19 = byte(data, 19)?;

    let uptime = CoarseDuration {
        number: (u16::from(b15 & 0x0F) << 8) | u16::from(b14),
        unit: match (b15 >> 4) & 0b11 {
            0 => TimeUnit::Seconds,
            1 => TimeUnit::Minutes,
            2 => TimeUnit::Hours,
            _ => TimeUnit::Days,
        },
    };

    let temperature_raw =
        (u16::from(b17 & 0b11) << 10) | (u16::from(b16) << 2) | u16::from(b15 >> 6);
    let temperature = f64::from(signed_12(temperature_raw)) / 16.0;

    let battery_raw = (u16::from(b18) << 6) | u16::from(b17 >> 2);
    let battery_voltage = (battery_raw != 0x3FFF).then_some(battery_raw);

    let (battery_level, errors) = if protocol == 0 {
        (None, Some(ErrorFlags::from_bits(bit(b19, 0), bit(b19, 1))))
    } else {
        ((b19 != 0xFF).then_some(b19), None)
    };

    Ok(EnvironmentTelemetry {
        magnetic_field: Vector3 {
            x: magnetic(10)?,
            y: magnetic(11)?,
            z: magnetic(12)?,
        },
        ambient_light_level,
        uptime,
        temperature,
        battery_voltage,
        battery_level,
        errors,
    })
}

/// Decode nearable manufacturer data, company ID included.
///
/// | Offset | Size | Field |
/// |---|---|---|
/// | 0 | 2 | company ID `5D 01` |
/// | 2 | 1 | frame type `0x01` |
/// | 3 | 8 | nearable identifier |
/// | 11 | 1 | hardware version |
/// | 12 | 1 | firmware version |
/// | 13 | 2 | little-endian: temperature in bits 0..12 (signed, 1/16 C), battery code in bits 12..16 |
/// | 15 | 1 | state, bit 6 set while moving |
/// | 16 | 3 | acceleration x, y, z (signed, 15.625 mg) |
/// | 19 | 1 | current motion state duration |
/// | 20 | 1 | previous motion state duration |
pub fn decode_nearable(data: &[u8]) -> Result<EstimoteNearable, DecodeError> {
    require(data, NEARABLE_LEN)?;

    let frame_type = byte(data, 2)?;
    if frame_type != FRAME_TYPE_NEARABLE {
        return Err(DecodeError::UnsupportedFormat(format!(
            "Estimote nearable frame type {frame_type:#04x}"
        )));
    }

    let word = u16::from_le_bytes(array(data, 13)?);
    let battery_code = word >> 12;
    let accel = |at| -> Result<f64, DecodeError> {
        Ok(f64::from(byte(data, at)? as i8) * NEARABLE_ACCELERATION_MG)
    };

    Ok(EstimoteNearable {
        nearable_id: array(data, 3)?,
        hardware_version: byte(data, 11)?,
        firmware_version: byte(data, 12)?,
        temperature: f64::from(signed_12(word)) / 16.0,
        // 0xF marks "not measured"; other codes step 0.1 V up from 1.8 V
        battery_voltage: (battery_code != 0xF).then(|| 1.8 + f64::from(battery_code) * 0.1),
        is_moving: bit(byte(data, 15)?, 6),
        acceleration: Vector3 {
            x: accel(16)?,
            y: accel(17)?,
            z: accel(18)?,
        },
        motion_state_duration: MotionStateDuration {
            current: CoarseDuration::from_motion_byte(byte(data, 19)?),
            previous: CoarseDuration::from_motion_byte(byte(data, 20)?),
        },
    })
}
