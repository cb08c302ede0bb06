//! JSON lines output formatter.

use crate::output::OutputFormatter;
use crate::record::BeaconRecord;
use std::io::{self, Write};

/// One compact JSON object per record, newline terminated.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormatter;

impl JsonFormatter {
    pub fn new() -> Self {
        JsonFormatter
    }
}

impl OutputFormatter for JsonFormatter {
    fn write_record(&self, record: &BeaconRecord, out: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer(&mut *out, record)?;
        writeln!(out)
    }
}
