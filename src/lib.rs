//! `beacon-listener` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, logger setup and
//! process exit codes. The pipeline turning raw BLE advertisements into beacon
//! records lives here:
//!
//! 1. [`advertising`] splits advertising data into AD structures.
//! 2. [`merge`] combines every report one address sent within a merge window.
//! 3. [`detect`] classifies the merged observation.
//! 4. [`beacon`] decodes the protocol payload.
//! 5. [`dispatch`] ties the steps together and reports why events were dropped.
//!
//! [`app`] drives it from a [`app::Scanner`] so the loop can be tested with
//! injected scanners and output streams.

pub mod advertising;
pub mod app;
pub mod beacon;
pub mod detect;
pub mod dispatch;
pub mod mac_address;
pub mod merge;
pub mod output;
pub mod record;
pub mod scanner;
pub mod window;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use beacon::DecodeError;
pub use detect::{BeaconType, ProtocolIds};
pub use dispatch::{Dispatcher, DropReason};
pub use mac_address::MacAddress;
pub use merge::{MergeEvent, MergedObservation, RawReport};
pub use output::OutputFormatter;
pub use output::json::JsonFormatter;
pub use record::{BeaconPayload, BeaconRecord};
pub use scanner::{Backend, ScanConfig, ScanError};
pub use window::{MergeWindow, parse_duration};
