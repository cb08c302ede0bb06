//! Output formatters for beacon records.

pub mod json;

use crate::record::BeaconRecord;
use std::io::{self, Write};

/// Writes one record per call to an output stream.
pub trait OutputFormatter: Send + Sync {
    /// Write `record` to `out`, terminated by a newline.
    fn write_record(&self, record: &BeaconRecord, out: &mut dyn Write) -> io::Result<()>;
}
