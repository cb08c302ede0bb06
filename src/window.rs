//! Per-address report collection.
//!
//! Reports from one device (advertisement plus scan response) are held until
//! the window opened by the first of them elapses, then emitted together as a
//! single [`MergeEvent`]. Every address is tracked independently.

use crate::mac_address::MacAddress;
use crate::merge::{MergeEvent, RawReport};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Pending {
    opened: Instant,
    reports: Vec<RawReport>,
}

/// Groups raw reports per address for a fixed window.
#[derive(Debug)]
pub struct MergeWindow {
    /// How long reports for one address are collected
    window: Duration,
    pending: HashMap<MacAddress, Pending>,
}

impl MergeWindow {
    /// Create a window collecting reports for `window` after the first one.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use beacon_listener::window::MergeWindow;
    ///
    /// let window = MergeWindow::new(Duration::from_secs(1));
    /// assert!(window.is_empty());
    /// ```
    pub fn new(window: Duration) -> Self {
        MergeWindow {
            window,
            pending: HashMap::new(),
        }
    }

    /// Add a report received at `now`. The first report for an address opens
    /// its window.
    pub fn push_at(&mut self, report: RawReport, now: Instant) {
        self.pending
            .entry(report.address)
            .or_insert_with(|| Pending {
                opened: now,
                reports: Vec::new(),
            })
            .reports
            .push(report);
    }

    /// Remove and return every address whose window has elapsed at `now`,
    /// oldest window first.
    pub fn drain_due_at(&mut self, now: Instant) -> Vec<MergeEvent> {
        let due: Vec<MacAddress> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.opened) >= self.window)
            .map(|(address, _)| *address)
            .collect();

        let mut drained: Vec<(Instant, MergeEvent)> = due
            .into_iter()
            .filter_map(|address| {
                self.pending
                    .remove(&address)
                    .map(|p| (p.opened, MergeEvent { address, reports: p.reports }))
            })
            .collect();
        drained.sort_by_key(|(opened, _)| *opened);
        drained.into_iter().map(|(_, event)| event).collect()
    }

    /// Emit everything still pending, regardless of age.
    pub fn flush_all(&mut self) -> Vec<MergeEvent> {
        let mut drained: Vec<(Instant, MergeEvent)> = self
            .pending
            .drain()
            .map(|(address, p)| (p.opened, MergeEvent { address, reports: p.reports }))
            .collect();
        drained.sort_by_key(|(opened, _)| *opened);
        drained.into_iter().map(|(_, event)| event).collect()
    }

    /// When the oldest pending window closes.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.opened + self.window).min()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

const DURATION_UNITS: &[(&str, u64)] = &[("ms", 1), ("h", 3_600_000), ("m", 60_000), ("s", 1_000)];

/// Parse a duration such as `"500ms"`, `"3s"`, `"1m"` or `"2h"`. A bare
/// number is seconds.
///
/// # Examples
/// ```
/// use beacon_listener::window::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();
    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    let (number, millis_per_unit) = DURATION_UNITS
        .iter()
        .find_map(|(suffix, factor)| src.strip_suffix(suffix).map(|n| (n.trim(), *factor)))
        .unwrap_or((src, 1_000));

    let value: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration: {src}"))?;
    value
        .checked_mul(millis_per_unit)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration out of range: {src}"))
}
