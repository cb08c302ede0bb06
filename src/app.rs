//! Core application runner for `beacon-listener`.
//!
//! This module is intentionally decoupled from CLI parsing and process exit codes
//! so it can be tested deterministically.

use crate::dispatch::Dispatcher;
use crate::merge::MergeEvent;
use crate::output::OutputFormatter;
use crate::output::json::JsonFormatter;
use crate::scanner::{Backend, ScanConfig, ScanError};
use clap::Parser;
use log::info;
use std::future::Future;
use std::io;
use std::io::Write;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Command line configuration for the listener.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Bluetooth scanner backend to use
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,

    /// HCI device index for the raw backend (0 for hci0)
    #[arg(long, default_value_t = 0)]
    pub device: u16,

    /// Time span over which advertisements and scan responses from one
    /// device are merged. Accepts 500ms, 3s, 1m, 2h or bare seconds.
    #[arg(long, default_value = "1s", value_parser = crate::window::parse_duration)]
    pub merge_window: Duration,

    /// Stop scanning after this long. Runs until interrupted when omitted.
    #[arg(long, value_parser = crate::window::parse_duration)]
    pub duration: Option<Duration>,

    /// Also decode beacons that only advertise service data (Eddystone,
    /// Estimote Telemetry) without any manufacturer data
    #[arg(long)]
    pub allow_service_data_only: bool,

    /// Verbose output, print why advertisements were dropped
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Options {
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            backend: self.backend,
            device: self.device,
            merge_window: self.merge_window,
        }
    }
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Scanner abstraction to enable deterministic unit tests without Bluetooth hardware.
pub trait Scanner: Send + Sync {
    fn start_scan(
        &self,
        config: ScanConfig,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<MergeEvent>, ScanError>> + Send + '_>>;
}

/// Real scanner implementation that delegates to the compiled-in backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealScanner;

impl Scanner for RealScanner {
    fn start_scan(
        &self,
        config: ScanConfig,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<MergeEvent>, ScanError>> + Send + '_>>
    {
        Box::pin(async move { crate::scanner::start_scan(&config).await })
    }
}

/// Next merge event, or `None` once the scanner closes or `deadline` passes.
async fn next_event(
    events: &mut mpsc::Receiver<MergeEvent>,
    deadline: Option<Instant>,
) -> Option<MergeEvent> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, events.recv())
            .await
            .ok()
            .flatten(),
        None => events.recv().await,
    }
}

/// Run the core processing loop, writing records to `out` and verbose drop reasons to `err`.
///
/// - Every merge event is dispatched; recognised beacons are written as one JSON line to `out`.
/// - Dropped events are written to `err` as `ADDRESS: reason` only when `options.verbose` is true.
/// - The loop ends when the scanner closes its channel or `options.duration` elapses.
pub async fn run_with_io(
    options: Options,
    scanner: &dyn Scanner,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<(), RunError> {
    let dispatcher = Dispatcher::default().allow_service_data_only(options.allow_service_data_only);
    let formatter = JsonFormatter::new();

    let mut events = scanner.start_scan(options.scan_config()).await?;
    let deadline = options.duration.map(|d| Instant::now() + d);
    info!("Scanning with {} backend", options.backend);

    while let Some(event) = next_event(&mut events, deadline).await {
        match dispatcher.dispatch(&event) {
            Ok(record) => formatter.write_record(&record, out)?,
            Err(reason) => {
                if options.verbose {
                    writeln!(err, "{}: {reason}", event.address)?;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advertising::AdField;
    use crate::test_utils::{
        TEST_INSTANCE, TEST_NAMESPACE, TEST_UUID, advertisement, eddystone_uid_data,
        ibeacon_data, merge_event, report,
    };
    use serde_json::Value;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Debug)]
    struct FakeScanner {
        events: Mutex<Vec<MergeEvent>>,
        /// Keep the channel open after sending, like a real scan
        hold_open: bool,
    }

    impl FakeScanner {
        fn new(events: Vec<MergeEvent>) -> Self {
            Self {
                events: Mutex::new(events),
                hold_open: false,
            }
        }

        fn endless(events: Vec<MergeEvent>) -> Self {
            Self {
                events: Mutex::new(events),
                hold_open: true,
            }
        }
    }

    impl Scanner for FakeScanner {
        fn start_scan(
            &self,
            _config: ScanConfig,
        ) -> Pin<
            Box<dyn Future<Output = Result<mpsc::Receiver<MergeEvent>, ScanError>> + Send + '_>,
        > {
            let events = self.events.lock().unwrap().clone();
            let hold_open = self.hold_open;
            Box::pin(async move {
                let (tx, rx) = mpsc::channel::<MergeEvent>(events.len().max(1));
                tokio::spawn(async move {
                    for event in events {
                        let _ = tx.send(event).await;
                    }
                    if hold_open {
                        tx.closed().await;
                    }
                    // drop tx to close channel
                });
                Ok(rx)
            })
        }
    }

    struct FailingScanner;

    impl Scanner for FailingScanner {
        fn start_scan(
            &self,
            _config: ScanConfig,
        ) -> Pin<
            Box<dyn Future<Output = Result<mpsc::Receiver<MergeEvent>, ScanError>> + Send + '_>,
        > {
            Box::pin(async { Err(ScanError::Bluetooth("no adapter".to_string())) })
        }
    }

    fn options() -> Options {
        Options {
            backend: Backend::default(),
            device: 0,
            merge_window: Duration::from_secs(1),
            duration: None,
            allow_service_data_only: false,
            verbose: false,
        }
    }

    fn ibeacon_event() -> MergeEvent {
        merge_event(vec![
            report(
                Some(-60),
                advertisement(&[AdField::new(0xFF, ibeacon_data(TEST_UUID, 100, 7, -59))]),
            ),
            report(Some(-64), advertisement(&[AdField::new(0x09, *b"lobby")])),
        ])
    }

    fn eddystone_only_event() -> MergeEvent {
        merge_event(vec![report(
            Some(-70),
            advertisement(&[AdField::service_data(
                0xFEAA,
                &eddystone_uid_data(-20, TEST_NAMESPACE, TEST_INSTANCE),
            )]),
        )])
    }

    fn unknown_event() -> MergeEvent {
        merge_event(vec![report(
            Some(-70),
            advertisement(&[AdField::manufacturer(0x0499, &[0x05, 0x12])]),
        )])
    }

    #[tokio::test]
    async fn run_writes_records_as_json_lines() {
        let scanner = FakeScanner::new(vec![ibeacon_event()]);

        let mut out = Vec::<u8>::new();
        let mut err = Vec::<u8>::new();
        assert_ok!(run_with_io(options(), &scanner, &mut out, &mut err).await);

        assert!(err.is_empty());
        let out = String::from_utf8(out).unwrap();
        assert!(out.ends_with('\n'));

        let value: Value = serde_json::from_str(out.trim_end()).unwrap();
        assert_eq!(value["address"], "AA:BB:CC:DD:EE:FF");
        assert_eq!(value["localName"], "lobby");
        assert_eq!(value["rssi"], -62);
        assert_eq!(value["beaconType"], "iBeacon");
        assert_eq!(value["iBeacon"]["major"], 100);
        assert_eq!(value["iBeacon"]["minor"], 7);
    }

    #[tokio::test]
    async fn run_prints_drop_reasons_only_when_verbose() {
        let scanner = FakeScanner::new(vec![unknown_event(), ibeacon_event()]);

        // non-verbose: the unknown event disappears silently
        let mut out = Vec::<u8>::new();
        let mut err = Vec::<u8>::new();
        assert_ok!(run_with_io(options(), &scanner, &mut out, &mut err).await);
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
        assert!(err.is_empty());

        // verbose: the reason is written to err
        let mut out = Vec::<u8>::new();
        let mut err = Vec::<u8>::new();
        let verbose = Options {
            verbose: true,
            ..options()
        };
        assert_ok!(run_with_io(verbose, &scanner, &mut out, &mut err).await);

        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
        let err = String::from_utf8(err).unwrap();
        assert_eq!(err, "AA:BB:CC:DD:EE:FF: Unrecognized advertisement\n");
    }

    #[tokio::test]
    async fn run_gates_service_data_only_beacons() {
        let scanner = FakeScanner::new(vec![eddystone_only_event()]);

        let mut out = Vec::<u8>::new();
        let mut err = Vec::<u8>::new();
        let verbose = Options {
            verbose: true,
            ..options()
        };
        assert_ok!(run_with_io(verbose, &scanner, &mut out, &mut err).await);
        assert!(out.is_empty());
        assert!(
            String::from_utf8(err)
                .unwrap()
                .contains("No manufacturer data")
        );

        let mut out = Vec::<u8>::new();
        let mut err = Vec::<u8>::new();
        let allowed = Options {
            allow_service_data_only: true,
            ..options()
        };
        assert_ok!(run_with_io(allowed, &scanner, &mut out, &mut err).await);
        let value: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["beaconType"], "eddystoneUid");
        assert_eq!(value["eddystoneUid"]["namespace"], "EDD1EBEAC04E5DEFA017");
        assert_eq!(value["eddystoneUid"]["instance"], "0BDB87539B67");
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_after_duration() {
        let scanner = FakeScanner::endless(vec![ibeacon_event()]);
        let timed = Options {
            duration: Some(Duration::from_secs(5)),
            ..options()
        };

        let mut out = Vec::<u8>::new();
        let mut err = Vec::<u8>::new();
        assert_ok!(run_with_io(timed, &scanner, &mut out, &mut err).await);
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
    }

    #[tokio::test]
    async fn run_propagates_scan_errors() {
        let mut out = Vec::<u8>::new();
        let mut err = Vec::<u8>::new();
        let result = run_with_io(options(), &FailingScanner, &mut out, &mut err).await;
        let error = assert_err!(result);
        assert!(matches!(error, RunError::Scan(ScanError::Bluetooth(_))));
        assert_eq!(error.to_string(), "Bluetooth error: no adapter");
    }

    #[test]
    fn options_parse_from_command_line() {
        let options = Options::try_parse_from([
            "beacon-listener",
            "--merge-window",
            "250ms",
            "--duration",
            "1m",
            "--device",
            "1",
            "--allow-service-data-only",
            "-v",
        ])
        .unwrap();

        assert_eq!(options.merge_window, Duration::from_millis(250));
        assert_eq!(options.duration, Some(Duration::from_secs(60)));
        assert!(options.allow_service_data_only);
        assert!(options.verbose);

        let config = options.scan_config();
        assert_eq!(config.device, 1);
        assert_eq!(config.merge_window, Duration::from_millis(250));
    }

    #[test]
    fn options_defaults() {
        let options = Options::try_parse_from(["beacon-listener"]).unwrap();
        assert_eq!(options.merge_window, Duration::from_secs(1));
        assert_eq!(options.duration, None);
        assert_eq!(options.device, 0);
        assert_eq!(options.backend, Backend::default());
        assert!(!options.allow_service_data_only);
    }
}
