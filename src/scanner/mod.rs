//! BLE scanner abstraction.
//!
//! Backends deliver [`RawReport`]s, one per received advertisement or scan
//! response. A merger task groups them per address through a
//! [`MergeWindow`] and hands complete [`MergeEvent`]s to the caller.

#[cfg(feature = "bluer")]
pub mod bluer;

#[cfg(feature = "hci")]
pub mod hci;

use crate::merge::{MergeEvent, RawReport};
use crate::window::MergeWindow;
use log::trace;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// Backend not available (not compiled in)
    #[allow(dead_code)]
    #[error("Backend '{0}' not available (not compiled in)")]
    BackendNotAvailable(String),
}

/// Channel buffer size for reports and merge events.
pub const REPORT_CHANNEL_BUFFER_SIZE: usize = 100;

/// How often the merger checks for elapsed windows.
const MERGE_TICK: Duration = Duration::from_millis(50);

/// Available scanner backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// BlueZ D-Bus backend (requires bluetoothd daemon)
    #[cfg(feature = "bluer")]
    Bluer,
    /// Raw HCI socket backend (direct kernel access, no daemon required)
    #[cfg(feature = "hci")]
    Hci,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Bluer;
        #[cfg(all(feature = "hci", not(feature = "bluer")))]
        return Backend::Hci;
        #[cfg(not(any(feature = "bluer", feature = "hci")))]
        compile_error!("At least one backend feature must be enabled");
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Bluer => write!(f, "bluer"),
            #[cfg(feature = "hci")]
            Backend::Hci => write!(f, "hci"),
            #[cfg(not(any(feature = "bluer", feature = "hci")))]
            _ => unreachable!("Backend enum has no variants when no backend features are enabled"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            #[cfg(feature = "bluer")]
            "bluer" | "bluez" => Ok(Backend::Bluer),
            #[cfg(feature = "hci")]
            "hci" | "raw" => Ok(Backend::Hci),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// Everything a backend needs to start scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub backend: Backend,
    /// HCI device index (`hci0` is 0). The bluer backend uses the default adapter.
    pub device: u16,
    /// How long reports from one address are collected before merging
    pub merge_window: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            backend: Backend::default(),
            device: 0,
            merge_window: Duration::from_secs(1),
        }
    }
}

/// Spawn the task that groups reports per address.
///
/// Reports sent into the returned sender come out of the returned receiver
/// as merge events once their window elapses. When every sender is dropped,
/// whatever is still pending is flushed and the receiver closes.
pub fn spawn_merger(merge_window: Duration) -> (mpsc::Sender<RawReport>, mpsc::Receiver<MergeEvent>) {
    let (report_tx, mut report_rx) = mpsc::channel::<RawReport>(REPORT_CHANNEL_BUFFER_SIZE);
    let (event_tx, event_rx) = mpsc::channel(REPORT_CHANNEL_BUFFER_SIZE);

    tokio::spawn(async move {
        let mut window = MergeWindow::new(merge_window);
        let mut tick = tokio::time::interval(MERGE_TICK);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                report = report_rx.recv() => match report {
                    Some(report) => {
                        trace!("{}: report, {} bytes", report.address, report.data.len());
                        window.push_at(report, Instant::now().into_std());
                    }
                    None => break,
                },
                _ = tick.tick() => {
                    for event in window.drain_due_at(Instant::now().into_std()) {
                        if event_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }

        for event in window.flush_all() {
            if event_tx.send(event).await.is_err() {
                return;
            }
        }
    });

    (report_tx, event_rx)
}

/// Start scanning with the configured backend.
///
/// Returns merge events, each holding every report one address sent within
/// the merge window.
pub async fn start_scan(config: &ScanConfig) -> Result<mpsc::Receiver<MergeEvent>, ScanError> {
    let (report_tx, events) = spawn_merger(config.merge_window);

    match config.backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => bluer::start_scan(report_tx).await?,
        #[cfg(feature = "hci")]
        Backend::Hci => hci::start_scan(config.device, report_tx).await?,
    }

    Ok(events)
}
