use anyhow::{anyhow, Result};
use chrono::{NaiveDate, Timelike};

use crate::tariff::RatedHour;

/// Caller-specified inclusive billing period. The end boundary means the last
/// hour of that day (23:00 local).
#[derive(Debug, Clone, Copy)]
pub struct BillingPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Forward-looking bill estimate for an in-progress period, derived from the
/// rated hours observed so far. Never persisted.
#[derive(Debug, Clone)]
pub struct BillingEstimate {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days_elapsed: i64,
    pub days_total: i64,
    pub days_remaining: i64,
    pub usage_to_date_kwh: f64,
    pub charge_to_date: f64,
    pub night_kwh: f64,
    pub weekend_kwh: f64,
    pub weekday_kwh: f64,
    pub night_perc: f64,
    pub weekend_perc: f64,
    pub weekday_perc: f64,
    pub off_peak_perc: f64,
    pub avg_daily_charge: f64,
    pub avg_daily_usage_kwh: f64,
    pub projected_total_charge: f64,
    pub projected_total_usage_kwh: f64,
}

fn percentage(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        100.0 * part / whole
    } else {
        0.0
    }
}

/// Estimate the bill for `period` from whatever rated hours exist so far.
///
/// The elapsed sub-range is truncated to the last *complete* day (one whose
/// final present slot is hour 23), so a trailing partial day is projected as
/// a remaining day rather than counted twice. The per-day averages are means
/// of per-day sums, which over complete days collapse to total / days.
pub fn estimate(
    rated: &[RatedHour],
    period: &BillingPeriod,
    loyalty_discount: f64,
) -> Result<BillingEstimate> {
    if period.end < period.start {
        return Err(anyhow!(
            "estimate: billing period ends {} before it starts {}",
            period.end,
            period.start
        ));
    }
    let days_total = (period.end - period.start).num_days() + 1;

    let in_period: Vec<&RatedHour> = rated
        .iter()
        .filter(|r| {
            let date = r.timestamp.date_naive();
            period.start <= date && date <= period.end
        })
        .collect();

    // Drop the trailing partial day, if any. Grid slots are contiguous, so
    // only the last day can be incomplete.
    let elapsed: &[&RatedHour] = match in_period.last() {
        Some(last) if last.timestamp.hour() != 23 => {
            let last_date = last.timestamp.date_naive();
            let cut = in_period.partition_point(|r| r.timestamp.date_naive() < last_date);
            &in_period[..cut]
        }
        _ => &in_period[..],
    };

    let days_elapsed = {
        let mut dates: Vec<NaiveDate> = elapsed.iter().map(|r| r.timestamp.date_naive()).collect();
        dates.dedup();
        dates.len() as i64
    };
    let days_remaining = (days_total - days_elapsed).max(0);

    let usage_to_date_kwh: f64 = elapsed.iter().map(|r| r.usage_kwh.unwrap_or(0.0)).sum();
    let charge_to_date: f64 = elapsed.iter().map(|r| r.total_charge).sum();
    let night_kwh: f64 = elapsed.iter().map(|r| r.night_kwh).sum();
    let weekend_kwh: f64 = elapsed.iter().map(|r| r.weekend_kwh).sum();
    let weekday_kwh: f64 = elapsed.iter().map(|r| r.weekday_kwh).sum();

    let (avg_daily_charge, avg_daily_usage_kwh) = if days_elapsed > 0 {
        (charge_to_date / days_elapsed as f64, usage_to_date_kwh / days_elapsed as f64)
    } else {
        (0.0, 0.0)
    };

    let projected_total_charge =
        (charge_to_date + avg_daily_charge * days_remaining as f64) * (1.0 - loyalty_discount);
    let projected_total_usage_kwh = usage_to_date_kwh + avg_daily_usage_kwh * days_remaining as f64;

    Ok(BillingEstimate {
        start: period.start,
        end: period.end,
        days_elapsed,
        days_total,
        days_remaining,
        usage_to_date_kwh,
        charge_to_date,
        night_kwh,
        weekend_kwh,
        weekday_kwh,
        night_perc: percentage(night_kwh, usage_to_date_kwh),
        weekend_perc: percentage(weekend_kwh, usage_to_date_kwh),
        weekday_perc: percentage(weekday_kwh, usage_to_date_kwh),
        off_peak_perc: percentage(night_kwh + weekend_kwh, usage_to_date_kwh),
        avg_daily_charge,
        avg_daily_usage_kwh,
        projected_total_charge,
        projected_total_usage_kwh,
    })
}
