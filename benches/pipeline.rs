//! Integration benchmark for the beacon processing pipeline.
//!
//! Benchmarks the full application loop using the same patterns as the
//! tests in app.rs, with a FakeScanner feeding merge events through
//! run_with_io.

use beacon_listener::advertising::{self, AdField};
use beacon_listener::app::{Options, Scanner, run_with_io};
use beacon_listener::{Backend, MacAddress, MergeEvent, RawReport, ScanConfig, ScanError};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

fn ibeacon_event() -> MergeEvent {
    let mut data = vec![0x4C, 0x00, 0x02, 0x15];
    data.extend_from_slice(&[0xE2; 16]);
    data.extend_from_slice(&[0x00, 0x01, 0x00, 0x02, 0xC5]);

    let advertisement = advertising::encode(&[AdField::new(0xFF, data)]);
    let scan_response = advertising::encode(&[AdField::new(0x09, *b"beacon")]);
    MergeEvent {
        address: TEST_MAC,
        reports: vec![
            RawReport {
                address: TEST_MAC,
                rssi: Some(-60),
                data: advertisement,
            },
            RawReport {
                address: TEST_MAC,
                rssi: Some(-62),
                data: scan_response,
            },
        ],
    }
}

fn unknown_event() -> MergeEvent {
    MergeEvent {
        address: TEST_MAC,
        reports: vec![RawReport {
            address: TEST_MAC,
            rssi: Some(-70),
            data: advertising::encode(&[AdField::manufacturer(0x0499, &[0x05; 24])]),
        }],
    }
}

/// A fake scanner that yields prepared merge events, similar to the one in app.rs tests.
struct FakeScanner {
    events: Vec<MergeEvent>,
}

impl Scanner for FakeScanner {
    fn start_scan(
        &self,
        _config: ScanConfig,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<MergeEvent>, ScanError>> + Send + '_>>
    {
        let events = self.events.clone();
        Box::pin(async move {
            let (tx, rx) = mpsc::channel::<MergeEvent>(events.len().max(1));
            tokio::spawn(async move {
                for event in events {
                    let _ = tx.send(event).await;
                }
            });
            Ok(rx)
        })
    }
}

fn default_options() -> Options {
    Options {
        backend: Backend::default(),
        device: 0,
        merge_window: Duration::from_secs(1),
        duration: None,
        allow_service_data_only: false,
        verbose: false,
    }
}

fn run(rt: &Runtime, events: Vec<MergeEvent>, options: Options) -> Vec<u8> {
    let scanner = FakeScanner { events };
    let mut out = Vec::<u8>::with_capacity(512);
    let mut err = Vec::<u8>::new();

    rt.block_on(async {
        run_with_io(options, &scanner, &mut out, &mut err)
            .await
            .unwrap();
    });
    out
}

/// Benchmark the full application pipeline: scanner -> merge -> detect -> decode -> write
fn bench_app_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("app_pipeline");
    let rt = Runtime::new().unwrap();

    group.throughput(Throughput::Elements(1));
    group.bench_function("single_ibeacon", |b| {
        b.iter(|| black_box(run(&rt, vec![ibeacon_event()], default_options())))
    });

    group.bench_function("single_unknown_verbose", |b| {
        b.iter(|| {
            let options = Options {
                verbose: true,
                ..default_options()
            };
            black_box(run(&rt, vec![unknown_event()], options))
        })
    });

    group.finish();
}

/// Benchmark batch processing through the full pipeline
fn bench_batch_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_pipeline");
    let rt = Runtime::new().unwrap();

    for batch_size in [1, 10, 100] {
        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &size| {
                let events: Vec<MergeEvent> = (0..size).map(|_| ibeacon_event()).collect();
                b.iter(|| black_box(run(&rt, events.clone(), default_options())))
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_app_pipeline, bench_batch_pipeline);
criterion_main!(benches);
