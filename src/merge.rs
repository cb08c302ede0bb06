//! Report merging.
//!
//! A device usually answers one scan with several reports (the advertisement
//! itself plus a scan response). The scanner groups the reports seen for one
//! address into a [`MergeEvent`], and [`merge`] folds that group into a single
//! [`MergedObservation`] for the detector and decoders.

use crate::advertising::{
    self, AD_TYPE_COMPLETE_LOCAL_NAME, AD_TYPE_MANUFACTURER_DATA, AD_TYPE_SERVICE_DATA,
    AD_TYPE_SHORT_LOCAL_NAME, AD_TYPE_TX_POWER_LEVEL, AdField,
};
use crate::mac_address::MacAddress;

/// One advertisement report as delivered by a scanner backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReport {
    pub address: MacAddress,
    /// Signal strength in dBm, `None` when the controller did not report one.
    pub rssi: Option<i16>,
    /// Raw advertising data bytes.
    pub data: Vec<u8>,
}

/// All reports observed for one address within one merge window, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeEvent {
    pub address: MacAddress,
    pub reports: Vec<RawReport>,
}

/// Service data split into its 16-bit service UUID and the data that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceData<'a> {
    pub uuid: u16,
    pub data: &'a [u8],
}

/// The merged view of one device for one merge window.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedObservation {
    pub address: MacAddress,
    /// Rounded mean of the defined signal strengths, if any report had one.
    pub rssi: Option<i16>,
    /// Every AD structure from every report, concatenated in arrival order.
    pub fields: Vec<AdField>,
}

impl MergedObservation {
    fn first_field(&self, ad_type: u8) -> Option<&AdField> {
        self.fields.iter().find(|f| f.ad_type == ad_type)
    }

    /// Payload of the first manufacturer-specific data structure, company ID included.
    pub fn manufacturer_data(&self) -> Option<&[u8]> {
        self.first_field(AD_TYPE_MANUFACTURER_DATA)
            .map(|f| f.data.as_slice())
    }

    /// The first service data structure.
    ///
    /// The UUID travels little-endian; it is byte-swapped here so callers
    /// compare it against the registered big-endian value. A first structure
    /// too short to hold a UUID means there is no usable service data.
    pub fn service_data(&self) -> Option<ServiceData<'_>> {
        let field = self.first_field(AD_TYPE_SERVICE_DATA)?;
        match field.data.as_slice() {
            [lo, hi, data @ ..] => Some(ServiceData {
                uuid: u16::from_le_bytes([*lo, *hi]),
                data,
            }),
            _ => None,
        }
    }

    /// Complete local name, falling back to the shortened one.
    pub fn local_name(&self) -> Option<String> {
        self.first_field(AD_TYPE_COMPLETE_LOCAL_NAME)
            .or_else(|| self.first_field(AD_TYPE_SHORT_LOCAL_NAME))
            .map(|f| String::from_utf8_lossy(&f.data).into_owned())
    }

    /// Advertised TX power level in dBm.
    pub fn tx_power(&self) -> Option<i8> {
        self.first_field(AD_TYPE_TX_POWER_LEVEL)
            .and_then(|f| f.data.first())
            .map(|&b| b as i8)
    }
}

/// Mean of the defined, non-zero signal strengths.
///
/// Ties round toward positive infinity, so -60.5 becomes -60.
pub fn average_rssi(reports: &[RawReport]) -> Option<i16> {
    let (sum, count) = reports
        .iter()
        .filter_map(|r| r.rssi)
        .filter(|&rssi| rssi != 0)
        .fold((0i64, 0u32), |(sum, count), rssi| {
            (sum + i64::from(rssi), count + 1)
        });

    if count == 0 {
        return None;
    }

    let mean = sum as f64 / f64::from(count);
    Some((mean + 0.5).floor() as i16)
}

/// Fold a merge event into one observation.
pub fn merge(event: &MergeEvent) -> MergedObservation {
    MergedObservation {
        address: event.address,
        rssi: average_rssi(&event.reports),
        fields: event
            .reports
            .iter()
            .flat_map(|r| advertising::extract(&r.data))
            .collect(),
    }
}
