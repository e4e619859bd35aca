use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use log::{debug, info, warn};

use crate::error::BillingError;
use crate::loader::UsageRecord;

/// One canonical hourly timestamp on the reconstructed timeseries. A slot
/// exists whether or not a reading matched it; `usage_kwh = None` means the
/// source data has a hole there.
#[derive(Debug, Clone, Copy)]
pub struct GridSlot {
    pub timestamp: DateTime<Tz>,
    pub usage_kwh: Option<f64>,
}

/// A grid timestamp matched by more than one record. The first value is the
/// one kept for aggregation; both ends are retained for the report.
#[derive(Debug, Clone, Copy)]
pub struct Duplicate {
    pub timestamp: DateTime<Tz>,
    pub first_kwh: f64,
    pub last_kwh: f64,
}

/// The contiguous hourly grid plus its diagnostics. The slot sequence is
/// strictly monotonic and gap-free from the earliest to the latest observed
/// hour, so a calendar day holds 23, 24 or 25 slots depending on DST.
#[derive(Debug, Clone)]
pub struct HourlyGrid {
    pub slots: Vec<GridSlot>,
    pub missing: Vec<DateTime<Tz>>,
    pub duplicates: Vec<Duplicate>,
}

// Resolve a naive wall-clock time in the target zone. During DST fall-back
// the hour repeats; the earlier instant wins. Spring-forward times do not
// exist at all and yield None.
fn localize(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(ts) => Some(ts),
        LocalResult::Ambiguous(a, b) => Some(a.min(b)),
        LocalResult::None => None,
    }
}

/// Build the hourly grid over `[min(timestamp), max(timestamp)]` and left-join
/// the records onto it by exact timestamp match.
pub fn build(records: &[UsageRecord], tz: Tz) -> Result<HourlyGrid> {
    if records.is_empty() {
        return Err(BillingError::EmptyInput.into());
    }

    let mut by_ts: BTreeMap<DateTime<Tz>, Vec<f64>> = BTreeMap::new();
    for record in records {
        match localize(tz, record.timestamp) {
            Some(ts) => by_ts.entry(ts).or_default().push(record.usage_kwh),
            None => warn!(
                "build: skipping {}: wall-clock time does not exist in {}",
                record.timestamp, tz
            ),
        }
    }
    let (first, last) = match (by_ts.keys().next(), by_ts.keys().next_back()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(BillingError::EmptyInput.into()),
    };
    info!("build: grid spans {} to {}", first, last);

    let mut slots = Vec::new();
    let mut missing = Vec::new();
    let mut duplicates = Vec::new();
    let mut ts = first;
    while ts <= last {
        let usage_kwh = match by_ts.get(&ts).map(Vec::as_slice) {
            Some([single]) => Some(*single),
            Some([dup_first, .., dup_last]) => {
                debug!("build: duplicate readings at {}", ts);
                duplicates.push(Duplicate {
                    timestamp: ts,
                    first_kwh: *dup_first,
                    last_kwh: *dup_last,
                });
                Some(*dup_first)
            }
            Some([]) | None => {
                missing.push(ts);
                None
            }
        };
        slots.push(GridSlot { timestamp: ts, usage_kwh });
        ts = ts + Duration::hours(1);
    }
    info!(
        "build: {} slots, {} missing, {} duplicated",
        slots.len(),
        missing.len(),
        duplicates.len()
    );
    Ok(HourlyGrid { slots, missing, duplicates })
}

impl HourlyGrid {
    /// True hour count of each local calendar day on the grid (23/24/25),
    /// built in one pass and reused as the fixed-charge divisor.
    pub fn day_hour_counts(&self) -> HashMap<NaiveDate, u32> {
        let mut counts = HashMap::new();
        for slot in &self.slots {
            *counts.entry(slot.timestamp.date_naive()).or_insert(0) += 1;
        }
        counts
    }
}
