//! BlueZ D-Bus backend.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.
//!
//! BlueZ does not expose raw advertising bytes, so every device update is
//! turned back into AD structures from the device properties (name, TX power,
//! manufacturer data and 16-bit service data).

use super::ScanError;
use crate::advertising::{
    self, AD_TYPE_COMPLETE_LOCAL_NAME, AD_TYPE_TX_POWER_LEVEL, AdField, short_uuid,
};
use crate::mac_address::MacAddress;
use crate::merge::RawReport;
use bluer::{Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session};
use futures::{StreamExt, pin_mut};
use log::{debug, warn};
use tokio::sync::mpsc;

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Start LE discovery on the default adapter and forward a report for every
/// device update to `reports`.
pub async fn start_scan(reports: mpsc::Sender<RawReport>) -> Result<(), ScanError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;

    // Duplicates are needed to see every advertisement, not just the first.
    adapter
        .set_discovery_filter(DiscoveryFilter {
            transport: DiscoveryTransport::Le,
            duplicate_data: true,
            ..Default::default()
        })
        .await?;

    let events = adapter.discover_devices_with_changes().await?;
    debug!("Discovering on {}", adapter.name());

    tokio::spawn(async move {
        let _session = session;
        pin_mut!(events);

        while let Some(event) = events.next().await {
            let AdapterEvent::DeviceAdded(address) = event else {
                continue;
            };
            match device_report(&adapter, address).await {
                Ok(report) => {
                    if reports.send(report).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("{address}: {e}"),
            }
        }
    });

    Ok(())
}

/// Snapshot a device's advertised properties as a raw report.
async fn device_report(adapter: &Adapter, address: Address) -> Result<RawReport, ScanError> {
    let device = adapter.device(address)?;

    let mut fields = Vec::new();
    if let Some(name) = device.name().await? {
        fields.push(AdField::new(AD_TYPE_COMPLETE_LOCAL_NAME, name.into_bytes()));
    }
    if let Some(tx_power) = device.tx_power().await? {
        fields.push(AdField::new(AD_TYPE_TX_POWER_LEVEL, [tx_power as i8 as u8]));
    }
    if let Some(manufacturer_data) = device.manufacturer_data().await? {
        let mut entries: Vec<_> = manufacturer_data.into_iter().collect();
        entries.sort_by_key(|(id, _)| *id);
        fields.extend(
            entries
                .iter()
                .map(|(id, data)| AdField::manufacturer(*id, data)),
        );
    }
    if let Some(service_data) = device.service_data().await? {
        let mut entries: Vec<_> = service_data
            .into_iter()
            .filter_map(|(uuid, data)| short_uuid(uuid).map(|short| (short, data)))
            .collect();
        entries.sort_by_key(|(uuid, _)| *uuid);
        fields.extend(
            entries
                .iter()
                .map(|(uuid, data)| AdField::service_data(*uuid, data)),
        );
    }

    Ok(RawReport {
        address: MacAddress::from(address),
        rssi: device.rssi().await?,
        data: advertising::encode(&fields),
    })
}
