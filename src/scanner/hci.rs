//! Raw HCI socket backend.
//!
//! This backend uses raw Linux HCI sockets to scan for BLE advertisements
//! without requiring the BlueZ daemon. It requires CAP_NET_RAW and
//! CAP_NET_ADMIN capabilities or root privileges.
//!
//! The controller is put into active scanning so scan responses (which often
//! carry the local name and TX power) arrive alongside advertisements.

use super::ScanError;
use crate::mac_address::MacAddress;
use crate::merge::RawReport;
use libc::{AF_BLUETOOTH, SOCK_CLOEXEC, SOCK_RAW, c_int, c_void, sockaddr, socklen_t};
use log::{debug, warn};
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;

// HCI protocol constants
const BTPROTO_HCI: c_int = 1;
const HCI_FILTER: c_int = 2;

// HCI packet types
const HCI_COMMAND_PKT: u8 = 0x01;
const HCI_EVENT_PKT: u8 = 0x04;

// HCI events
const EVT_LE_META_EVENT: u8 = 0x3E;

// LE Meta event sub-events
const EVT_LE_ADVERTISING_REPORT: u8 = 0x02;

// HCI commands
const OGF_LE_CTL: u16 = 0x08;
const OCF_LE_SET_SCAN_PARAMETERS: u16 = 0x000B;
const OCF_LE_SET_SCAN_ENABLE: u16 = 0x000C;

const LE_SCAN_ACTIVE: u8 = 0x01;
const LE_PUBLIC_ADDRESS: u8 = 0x00;
const FILTER_POLICY_ACCEPT_ALL: u8 = 0x00;

/// 10 ms in 0.625 ms units
const SCAN_INTERVAL: u16 = 0x0010;
const SCAN_WINDOW: u16 = 0x0010;

/// Reported when the controller has no RSSI for a report.
const RSSI_UNAVAILABLE: i8 = 127;

/// HCI socket address structure
#[repr(C)]
struct SockaddrHci {
    hci_family: u16,
    hci_dev: u16,
    hci_channel: u16,
}

/// HCI filter structure for raw sockets
#[repr(C)]
struct HciFilter {
    type_mask: u32,
    event_mask: [u32; 2],
    opcode: u16,
}

impl HciFilter {
    fn new() -> Self {
        Self {
            type_mask: 0,
            event_mask: [0, 0],
            opcode: 0,
        }
    }

    fn set_ptype(&mut self, ptype: u8) {
        self.type_mask |= 1 << (ptype as u32);
    }

    fn set_event(&mut self, event: u8) {
        let bit = event as usize;
        self.event_mask[bit / 32] |= 1 << (bit % 32);
    }
}

/// Create an HCI command packet
fn hci_command_packet(ogf: u16, ocf: u16, params: &[u8]) -> Vec<u8> {
    let opcode = (ogf << 10) | ocf;
    let mut packet = Vec::with_capacity(4 + params.len());
    packet.push(HCI_COMMAND_PKT);
    packet.extend_from_slice(&opcode.to_le_bytes());
    packet.push(params.len() as u8);
    packet.extend_from_slice(params);
    packet
}

/// LE Set Scan Parameters: active scan, public address, accept all.
fn scan_parameters_packet() -> Vec<u8> {
    let mut params = Vec::with_capacity(7);
    params.push(LE_SCAN_ACTIVE);
    params.extend_from_slice(&SCAN_INTERVAL.to_le_bytes());
    params.extend_from_slice(&SCAN_WINDOW.to_le_bytes());
    params.push(LE_PUBLIC_ADDRESS);
    params.push(FILTER_POLICY_ACCEPT_ALL);
    hci_command_packet(OGF_LE_CTL, OCF_LE_SET_SCAN_PARAMETERS, &params)
}

/// LE Set Scan Enable. Duplicates are never filtered so every report is seen.
fn scan_enable_packet(enable: bool) -> Vec<u8> {
    hci_command_packet(OGF_LE_CTL, OCF_LE_SET_SCAN_ENABLE, &[u8::from(enable), 0x00])
}

/// Open a raw HCI socket
fn open_hci_socket() -> Result<OwnedFd, ScanError> {
    // SOCK_NONBLOCK is required for AsyncFd
    let fd = unsafe {
        libc::socket(
            AF_BLUETOOTH,
            SOCK_RAW | SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
            BTPROTO_HCI,
        )
    };

    if fd < 0 {
        return Err(ScanError::Bluetooth(format!(
            "Failed to create HCI socket: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Bind HCI socket to a device
fn bind_hci_socket(fd: &OwnedFd, dev_id: u16) -> Result<(), ScanError> {
    let addr = SockaddrHci {
        hci_family: AF_BLUETOOTH as u16,
        hci_dev: dev_id,
        hci_channel: 0, // HCI_CHANNEL_RAW
    };

    let ret = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            &addr as *const SockaddrHci as *const sockaddr,
            mem::size_of::<SockaddrHci>() as socklen_t,
        )
    };

    if ret < 0 {
        return Err(ScanError::Bluetooth(format!(
            "Failed to bind HCI socket to hci{dev_id}: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

/// Only pass LE meta events to this socket
fn set_hci_filter(fd: &OwnedFd) -> Result<(), ScanError> {
    let mut filter = HciFilter::new();
    filter.set_ptype(HCI_EVENT_PKT);
    filter.set_event(EVT_LE_META_EVENT);

    let ret = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            0, // SOL_HCI
            HCI_FILTER,
            &filter as *const HciFilter as *const c_void,
            mem::size_of::<HciFilter>() as socklen_t,
        )
    };

    if ret < 0 {
        return Err(ScanError::Bluetooth(format!(
            "Failed to set HCI filter: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

fn send_hci_command(fd: &OwnedFd, packet: &[u8]) -> Result<(), ScanError> {
    let ret = unsafe {
        libc::write(
            fd.as_raw_fd(),
            packet.as_ptr() as *const c_void,
            packet.len(),
        )
    };

    if ret < 0 {
        return Err(ScanError::Bluetooth(format!(
            "Failed to send HCI command: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

fn configure_le_scan(fd: &OwnedFd) -> Result<(), ScanError> {
    // The controller rejects new parameters while a scan is running.
    if let Err(e) = send_hci_command(fd, &scan_enable_packet(false)) {
        debug!("Disabling previous scan failed: {e}");
    }
    send_hci_command(fd, &scan_parameters_packet())?;
    send_hci_command(fd, &scan_enable_packet(true))?;
    Ok(())
}

/// Parse every report in an LE Advertising Report event.
///
/// `packet` is the full HCI event packet, packet type byte included. Reports
/// are laid out one after another:
/// `[event_type][addr_type][addr; 6][len][data; len][rssi]`.
/// Parsing stops at the first report that does not fit.
fn parse_advertising_reports(packet: &[u8]) -> Vec<RawReport> {
    let Some(params) = packet.get(4..) else {
        return Vec::new();
    };
    if packet[0] != HCI_EVENT_PKT
        || packet[1] != EVT_LE_META_EVENT
        || packet[3] != EVT_LE_ADVERTISING_REPORT
    {
        return Vec::new();
    }
    let Some((&count, mut rest)) = params.split_first() else {
        return Vec::new();
    };

    let mut reports = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        // event type, address type, address, data length
        let Some(header) = rest.get(..9) else {
            break;
        };
        let data_len = usize::from(header[8]);
        let Some(data) = rest.get(9..9 + data_len) else {
            break;
        };
        let Some(&rssi) = rest.get(9 + data_len) else {
            break;
        };

        let mut address = [0u8; 6];
        address.copy_from_slice(&header[2..8]);
        let rssi = rssi as i8;

        reports.push(RawReport {
            address: MacAddress::from_hci_bytes(&address),
            rssi: (rssi != RSSI_UNAVAILABLE).then_some(i16::from(rssi)),
            data: data.to_vec(),
        });
        rest = &rest[10 + data_len..];
    }
    reports
}

/// Start an active LE scan on `hci{device}` and forward every advertising
/// report to `reports`.
///
/// The scan runs until the reader fails or the receiving side of `reports`
/// is dropped, after which scanning is disabled again.
///
/// # Requirements
/// - CAP_NET_RAW and CAP_NET_ADMIN capabilities or root privileges
pub async fn start_scan(device: u16, reports: mpsc::Sender<RawReport>) -> Result<(), ScanError> {
    let fd = open_hci_socket()?;
    bind_hci_socket(&fd, device)?;
    set_hci_filter(&fd)?;

    // Commands go through a separate unfiltered socket
    let cmd_fd = open_hci_socket()?;
    bind_hci_socket(&cmd_fd, device)?;
    configure_le_scan(&cmd_fd)?;

    let async_fd = AsyncFd::new(fd)
        .map_err(|e| ScanError::Bluetooth(format!("Failed to create async fd: {}", e)))?;

    tokio::spawn(async move {
        let mut buf = [0u8; 258]; // Max HCI event size

        'read: loop {
            let mut guard = match async_fd.readable().await {
                Ok(guard) => guard,
                Err(e) => {
                    warn!("HCI socket error: {e}");
                    break;
                }
            };

            // Drain all available packets before waiting again
            loop {
                let n = match guard.try_io(|inner| {
                    let ret = unsafe {
                        libc::read(
                            inner.as_raw_fd(),
                            buf.as_mut_ptr() as *mut c_void,
                            buf.len(),
                        )
                    };
                    if ret < 0 {
                        Err(io::Error::last_os_error())
                    } else {
                        Ok(ret as usize)
                    }
                }) {
                    Ok(Ok(n)) if n > 0 => n,
                    Ok(Ok(_)) => break,
                    Ok(Err(e)) => {
                        warn!("HCI read failed: {e}");
                        break 'read;
                    }
                    Err(_) => break, // WouldBlock
                };

                for report in parse_advertising_reports(&buf[..n]) {
                    if reports.send(report).await.is_err() {
                        break 'read;
                    }
                }
            }
        }

        if let Err(e) = send_hci_command(&cmd_fd, &scan_enable_packet(false)) {
            warn!("Failed to disable scan on hci{device}: {e}");
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(reports: &[&[u8]]) -> Vec<u8> {
        let mut params = vec![EVT_LE_ADVERTISING_REPORT, reports.len() as u8];
        for report in reports {
            params.extend_from_slice(report);
        }
        let mut packet = vec![HCI_EVENT_PKT, EVT_LE_META_EVENT, params.len() as u8];
        packet.extend(params);
        packet
    }

    fn report_bytes(address_le: [u8; 6], data: &[u8], rssi: i8) -> Vec<u8> {
        let mut bytes = vec![0x00, 0x00];
        bytes.extend_from_slice(&address_le);
        bytes.push(data.len() as u8);
        bytes.extend_from_slice(data);
        bytes.push(rssi as u8);
        bytes
    }

    #[test]
    fn test_hci_filter_setup() {
        let mut filter = HciFilter::new();
        filter.set_ptype(HCI_EVENT_PKT);
        filter.set_event(EVT_LE_META_EVENT);

        assert_eq!(filter.type_mask, 1 << HCI_EVENT_PKT);
        // 0x3E = 62 lands in the second word
        assert_eq!(filter.event_mask[1], 1 << (EVT_LE_META_EVENT % 32));
    }

    #[test]
    fn test_scan_parameter_packet_layout() {
        assert_eq!(
            scan_parameters_packet(),
            vec![0x01, 0x0B, 0x20, 0x07, 0x01, 0x10, 0x00, 0x10, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            scan_enable_packet(true),
            vec![0x01, 0x0C, 0x20, 0x02, 0x01, 0x00]
        );
        assert_eq!(scan_enable_packet(false)[4], 0x00);
    }

    #[test]
    fn test_parse_single_report() {
        let packet = event(&[&report_bytes(
            [0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA],
            &[0x02, 0x0A, 0xF4],
            -67,
        )]);

        let reports = parse_advertising_reports(&packet);
        assert_eq!(
            reports,
            vec![RawReport {
                address: MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]),
                rssi: Some(-67),
                data: vec![0x02, 0x0A, 0xF4],
            }]
        );
    }

    #[test]
    fn test_parse_multiple_reports_and_missing_rssi() {
        let first = report_bytes([1, 2, 3, 4, 5, 6], &[0x02, 0x01, 0x06], -40);
        let second = report_bytes([6, 5, 4, 3, 2, 1], &[], RSSI_UNAVAILABLE);
        let reports = parse_advertising_reports(&event(&[&first, &second]));

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].address, MacAddress([6, 5, 4, 3, 2, 1]));
        assert_eq!(reports[1].address, MacAddress([1, 2, 3, 4, 5, 6]));
        assert_eq!(reports[1].rssi, None);
        assert!(reports[1].data.is_empty());
    }

    #[test]
    fn test_parse_stops_at_truncated_report() {
        let first = report_bytes([1, 2, 3, 4, 5, 6], &[0x02, 0x01, 0x06], -40);
        let mut packet = event(&[&first, &first]);
        packet.truncate(packet.len() - 2);

        let reports = parse_advertising_reports(&packet);
        assert_eq!(reports.len(), 1);
    }

    #[test]
    fn test_parse_ignores_other_events() {
        let mut packet = event(&[&report_bytes([0; 6], &[], -40)]);
        packet[3] = 0x01; // LE Connection Complete
        assert!(parse_advertising_reports(&packet).is_empty());
        assert!(parse_advertising_reports(&[HCI_EVENT_PKT, EVT_LE_META_EVENT]).is_empty());
    }
}
