//! BLE advertising data (AD structure) extraction.
//!
//! Advertising data is a run of `[length][type][payload; length - 1]`
//! structures. Extraction is total: a structure whose declared length runs
//! past the end of the buffer ends the walk and only the structures parsed so
//! far are returned.

/// AD type: Shortened Local Name.
pub const AD_TYPE_SHORT_LOCAL_NAME: u8 = 0x08;
/// AD type: Complete Local Name.
pub const AD_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;
/// AD type: TX Power Level.
pub const AD_TYPE_TX_POWER_LEVEL: u8 = 0x0A;
/// AD type: Service Data with a 16-bit UUID.
pub const AD_TYPE_SERVICE_DATA: u8 = 0x16;
/// AD type: Manufacturer Specific Data.
pub const AD_TYPE_MANUFACTURER_DATA: u8 = 0xFF;

/// One decoded AD structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdField {
    /// AD type byte from the Bluetooth assigned numbers registry.
    pub ad_type: u8,
    /// Payload following the type byte.
    pub data: Vec<u8>,
}

impl AdField {
    pub fn new(ad_type: u8, data: impl Into<Vec<u8>>) -> Self {
        Self {
            ad_type,
            data: data.into(),
        }
    }

    /// Manufacturer-specific data, company ID written little-endian ahead of `data`.
    pub fn manufacturer(company_id: u16, data: &[u8]) -> Self {
        let mut payload = company_id.to_le_bytes().to_vec();
        payload.extend_from_slice(data);
        Self::new(AD_TYPE_MANUFACTURER_DATA, payload)
    }

    /// Service data for a 16-bit service UUID, UUID written little-endian ahead of `data`.
    pub fn service_data(uuid: u16, data: &[u8]) -> Self {
        let mut payload = uuid.to_le_bytes().to_vec();
        payload.extend_from_slice(data);
        Self::new(AD_TYPE_SERVICE_DATA, payload)
    }
}

/// Borrowing iterator over the AD structures in a buffer.
#[derive(Debug, Clone)]
pub struct AdStructures<'a> {
    remaining: &'a [u8],
}

impl<'a> AdStructures<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { remaining: data }
    }
}

impl<'a> Iterator for AdStructures<'a> {
    /// `(ad_type, payload)`
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let (&len, rest) = self.remaining.split_first()?;
        let len = usize::from(len);

        // A zero length marks the start of padding; a length longer than the
        // remaining bytes is truncated data. Either way nothing more is usable.
        if len == 0 || len > rest.len() {
            self.remaining = &[];
            return None;
        }

        let (structure, rest) = rest.split_at(len);
        self.remaining = rest;
        Some((structure[0], &structure[1..]))
    }
}

/// Extract every fully-present AD structure from `data`, in order.
pub fn extract(data: &[u8]) -> Vec<AdField> {
    AdStructures::new(data)
        .map(|(ad_type, payload)| AdField::new(ad_type, payload))
        .collect()
}

/// Serialise fields back into advertising data bytes.
///
/// Fields whose payload does not fit a one-byte length are skipped.
pub fn encode(fields: &[AdField]) -> Vec<u8> {
    let mut out = Vec::with_capacity(fields.iter().map(|f| f.data.len() + 2).sum());
    for field in fields {
        let Ok(len) = u8::try_from(field.data.len() + 1) else {
            continue;
        };
        out.push(len);
        out.push(field.ad_type);
        out.extend_from_slice(&field.data);
    }
    out
}

/// The 16-bit alias of a UUID built on the Bluetooth base UUID
/// `0000xxxx-0000-1000-8000-00805F9B34FB`.
pub fn short_uuid(uuid: uuid::Uuid) -> Option<u16> {
    const BASE_SUFFIX: [u8; 12] = [
        0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0x80, 0x5F, 0x9B, 0x34, 0xFB,
    ];
    let bytes = uuid.as_bytes();
    (bytes[..2] == [0, 0] && bytes[4..] == BASE_SUFFIX)
        .then(|| u16::from_be_bytes([bytes[2], bytes[3]]))
}
