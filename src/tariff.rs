use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, Timelike};
use chrono_tz::Tz;
use csv::ReaderBuilder;
use log::{debug, info};
use serde::Deserialize;

use crate::error::BillingError;
use crate::grid::HourlyGrid;

/// One dated, immutable rate table. Rates are NZD excluding GST; schedules
/// holding GST-inclusive rates set `gst_multiplier` to 1.0.
#[derive(Debug, Clone, Deserialize)]
pub struct TariffVersion {
    pub effective_from: NaiveDate,
    pub daily_charge: f64,
    pub off_peak_rate: f64,
    pub peak_rate: f64,
    pub gst_multiplier: f64,
    #[serde(default)]
    pub loyalty_discount: f64,
}

/// Versioned rate tables ordered by effective date. The version in force on a
/// date is the latest one effective on or before it.
#[derive(Debug, Clone)]
pub struct TariffSchedule {
    versions: Vec<TariffVersion>,
}

impl TariffSchedule {
    pub fn new(mut versions: Vec<TariffVersion>) -> Result<Self> {
        if versions.is_empty() {
            return Err(anyhow!("TariffSchedule: no versions supplied"));
        }
        versions.sort_by_key(|v| v.effective_from);
        Ok(Self { versions })
    }

    pub fn from_csv(path: &Path) -> Result<Self> {
        info!("from_csv: loading tariff schedule {}", path.display());
        let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
        let versions = reader
            .deserialize()
            .map(|record| {
                let v: TariffVersion = record?;
                debug!("from_csv: version: {:?}", v);
                Ok(v)
            })
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("from_csv: bad tariff row in {}", path.display()))?;
        Self::new(versions)
    }

    /// The version effective on `date`. Billing with no effective version
    /// would silently use a wrong rate, so this is fatal.
    pub fn active_on(&self, date: NaiveDate) -> Result<&TariffVersion, BillingError> {
        self.versions
            .iter()
            .rev()
            .find(|v| v.effective_from <= date)
            .ok_or(BillingError::NoActiveTariff(date))
    }
}

// Pure functions of the local timestamp. Night is 21:00-07:00.
pub fn is_night(ts: &DateTime<Tz>) -> bool {
    let hour = ts.hour();
    hour < 7 || hour >= 21
}

pub fn is_weekend(ts: &DateTime<Tz>) -> bool {
    ts.weekday().num_days_from_monday() >= 5
}

/// A grid slot with its tariff outputs. The kWh partition columns are
/// mutually exclusive with priority night > weekend > weekday: a weekend
/// night hour counts under night only.
#[derive(Debug, Clone, Copy)]
pub struct RatedHour {
    pub timestamp: DateTime<Tz>,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub day_of_year: u32,
    pub is_night: bool,
    pub is_weekend: bool,
    pub is_off_peak: bool,
    pub usage_kwh: Option<f64>,
    pub night_kwh: f64,
    pub weekend_kwh: f64,
    pub weekday_kwh: f64,
    pub rate: f64,
    pub usage_charge: f64,
    pub daily_charge_share: f64,
    pub total_charge: f64,
}

/// Classify and rate every grid slot. The fixed daily charge is split across
/// the true hour count of each calendar day (23/24/25), so a missing reading
/// still accrues its share of the fixed fee.
pub fn rate_hours(grid: &HourlyGrid, schedule: &TariffSchedule) -> Result<Vec<RatedHour>> {
    let hour_counts = grid.day_hour_counts();
    let mut rated = Vec::with_capacity(grid.slots.len());
    for slot in &grid.slots {
        let date = slot.timestamp.date_naive();
        let version = schedule.active_on(date)?;
        let night = is_night(&slot.timestamp);
        let weekend = is_weekend(&slot.timestamp);
        let off_peak = night || weekend;
        let rate = if off_peak { version.off_peak_rate } else { version.peak_rate };

        let usage = slot.usage_kwh.unwrap_or(0.0);
        let (night_kwh, weekend_kwh, weekday_kwh) = if night {
            (usage, 0.0, 0.0)
        } else if weekend {
            (0.0, usage, 0.0)
        } else {
            (0.0, 0.0, usage)
        };

        let hours_in_day = *hour_counts
            .get(&date)
            .context("rate_hours: slot day absent from hour-count map")?;
        let usage_charge = rate * usage * version.gst_multiplier;
        let daily_charge_share =
            version.daily_charge / f64::from(hours_in_day) * version.gst_multiplier;

        rated.push(RatedHour {
            timestamp: slot.timestamp,
            year: date.year(),
            month: date.month(),
            day: date.day(),
            day_of_year: date.ordinal(),
            is_night: night,
            is_weekend: weekend,
            is_off_peak: off_peak,
            usage_kwh: slot.usage_kwh,
            night_kwh,
            weekend_kwh,
            weekday_kwh,
            rate,
            usage_charge,
            daily_charge_share,
            total_charge: usage_charge + daily_charge_share,
        });
    }
    Ok(rated)
}
