use std::collections::BTreeMap;

use crate::tariff::RatedHour;

/// Sums of the rated columns over one local calendar day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyTotal {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub usage_kwh: f64,
    pub usage_charge: f64,
    pub daily_charge: f64,
    pub total_charge: f64,
    pub night_kwh: f64,
    pub weekend_kwh: f64,
    pub weekday_kwh: f64,
}

/// Sums of the daily columns over one month, plus the contributing day count
/// and the percentage split of usage across the tariff categories.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlyTotal {
    pub year: i32,
    pub month: u32,
    pub days: u32,
    pub usage_kwh: f64,
    pub usage_charge: f64,
    pub daily_charge: f64,
    pub total_charge: f64,
    pub night_kwh: f64,
    pub weekend_kwh: f64,
    pub weekday_kwh: f64,
    pub night_perc: f64,
    pub weekend_perc: f64,
    pub weekday_perc: f64,
    pub off_peak_perc: f64,
}

fn percentage(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        100.0 * part / whole
    } else {
        0.0
    }
}

/// Roll rated hours up by (year, month, day), in key order.
pub fn daily_totals(rated: &[RatedHour]) -> Vec<DailyTotal> {
    let mut by_day: BTreeMap<(i32, u32, u32), DailyTotal> = BTreeMap::new();
    for hour in rated {
        let entry = by_day.entry((hour.year, hour.month, hour.day)).or_insert(DailyTotal {
            year: hour.year,
            month: hour.month,
            day: hour.day,
            ..DailyTotal::default()
        });
        entry.usage_kwh += hour.usage_kwh.unwrap_or(0.0);
        entry.usage_charge += hour.usage_charge;
        entry.daily_charge += hour.daily_charge_share;
        entry.total_charge += hour.total_charge;
        entry.night_kwh += hour.night_kwh;
        entry.weekend_kwh += hour.weekend_kwh;
        entry.weekday_kwh += hour.weekday_kwh;
    }
    by_day.into_values().collect()
}

/// Roll daily totals up by (year, month). Percentages are computed from the
/// summed kWh columns, never averaged across rows, so partial days carry
/// exactly their usage weight.
pub fn monthly_totals(daily: &[DailyTotal]) -> Vec<MonthlyTotal> {
    let mut by_month: BTreeMap<(i32, u32), MonthlyTotal> = BTreeMap::new();
    for day in daily {
        let entry = by_month.entry((day.year, day.month)).or_insert(MonthlyTotal {
            year: day.year,
            month: day.month,
            ..MonthlyTotal::default()
        });
        entry.days += 1;
        entry.usage_kwh += day.usage_kwh;
        entry.usage_charge += day.usage_charge;
        entry.daily_charge += day.daily_charge;
        entry.total_charge += day.total_charge;
        entry.night_kwh += day.night_kwh;
        entry.weekend_kwh += day.weekend_kwh;
        entry.weekday_kwh += day.weekday_kwh;
    }
    let mut months: Vec<MonthlyTotal> = by_month.into_values().collect();
    for m in &mut months {
        m.night_perc = percentage(m.night_kwh, m.usage_kwh);
        m.weekend_perc = percentage(m.weekend_kwh, m.usage_kwh);
        m.weekday_perc = percentage(m.weekday_kwh, m.usage_kwh);
        m.off_peak_perc = percentage(m.night_kwh + m.weekend_kwh, m.usage_kwh);
    }
    months
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid;
    use crate::loader::UsageRecord;
    use crate::tariff::{rate_hours, TariffSchedule, TariffVersion};
    use assert_float_eq::*;
    use chrono::NaiveDate;
    use chrono_tz::Tz;

    fn rated_span(from: NaiveDate, days: u64, kwh: f64) -> Vec<RatedHour> {
        let tz: Tz = "Pacific/Auckland".parse().unwrap();
        let schedule = TariffSchedule::new(vec![TariffVersion {
            effective_from: NaiveDate::from_ymd_opt(2021, 10, 1).unwrap(),
            daily_charge: 0.3450,
            off_peak_rate: 0.1347,
            peak_rate: 0.2332,
            gst_multiplier: 1.0,
            loyalty_discount: 0.0,
        }])
        .unwrap();
        let mut records = Vec::new();
        for d in 0..days {
            let date = from + chrono::Duration::days(d as i64);
            for h in 0..24 {
                if let Some(timestamp) = date.and_hms_opt(h, 0, 0) {
                    records.push(UsageRecord { timestamp, usage_kwh: kwh });
                }
            }
        }
        rate_hours(&grid::build(&records, tz).unwrap(), &schedule).unwrap()
    }

    #[test]
    fn daily_totals_sum_hours_per_day() {
        // Mon 2023-05-08 onwards, 1 kWh every hour
        let rated = rated_span(NaiveDate::from_ymd_opt(2023, 5, 8).unwrap(), 3, 1.0);
        let daily = daily_totals(&rated);
        assert_eq!(daily.len(), 3);
        for day in &daily {
            assert_f64_near!(day.usage_kwh, 24.0);
            assert_float_absolute_eq!(day.daily_charge, 0.3450, 1e-9);
            // 10 night hours, 14 weekday hours on a weekday
            assert_f64_near!(day.night_kwh, 10.0);
            assert_f64_near!(day.weekday_kwh, 14.0);
            assert_f64_near!(day.weekend_kwh, 0.0);
            assert_float_absolute_eq!(
                day.usage_charge,
                10.0 * 0.1347 + 14.0 * 0.2332,
                1e-9
            );
        }
    }

    #[test]
    fn monthly_percentages_come_from_summed_kwh() {
        // Sat 2023-05-06 + Sun 2023-05-07: everything is off-peak
        let rated = rated_span(NaiveDate::from_ymd_opt(2023, 5, 6).unwrap(), 2, 1.0);
        let monthly = monthly_totals(&daily_totals(&rated));
        assert_eq!(monthly.len(), 1);
        let m = &monthly[0];
        assert_eq!((m.year, m.month, m.days), (2023, 5, 2));
        assert_f64_near!(m.usage_kwh, 48.0);
        assert_float_absolute_eq!(m.off_peak_perc, 100.0, 1e-9);
        // 10 of 24 hours are night
        assert_float_absolute_eq!(m.night_perc, 100.0 * 20.0 / 48.0, 1e-9);
        assert_float_absolute_eq!(m.weekend_perc, 100.0 * 28.0 / 48.0, 1e-9);
        assert_f64_near!(m.weekday_perc, 0.0);
    }

    #[test]
    fn aggregation_is_associative() {
        // spans a month boundary: 2 days in May, 2 in June
        let rated = rated_span(NaiveDate::from_ymd_opt(2023, 5, 30).unwrap(), 4, 0.8);
        let monthly = monthly_totals(&daily_totals(&rated));
        assert_eq!(monthly.len(), 2);

        // recompute straight from the rated hours
        for m in &monthly {
            let usage: f64 = rated
                .iter()
                .filter(|r| (r.year, r.month) == (m.year, m.month))
                .map(|r| r.usage_kwh.unwrap_or(0.0))
                .sum();
            let charge: f64 = rated
                .iter()
                .filter(|r| (r.year, r.month) == (m.year, m.month))
                .map(|r| r.total_charge)
                .sum();
            assert_float_absolute_eq!(m.usage_kwh, usage, 1e-9);
            assert_float_absolute_eq!(m.total_charge, charge, 1e-9);
        }
    }

    #[test]
    fn zero_usage_month_has_zero_percentages() {
        let rated = rated_span(NaiveDate::from_ymd_opt(2023, 5, 8).unwrap(), 1, 0.0);
        let monthly = monthly_totals(&daily_totals(&rated));
        assert_f64_near!(monthly[0].night_perc, 0.0);
        assert_f64_near!(monthly[0].off_peak_perc, 0.0);
    }
}
