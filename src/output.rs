use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use csv::Writer;
use log::info;

use crate::aggregate::{DailyTotal, MonthlyTotal};
use crate::tariff::RatedHour;

/// Write the three output tables. Every table is emitted from an already
/// sorted sequence, so identical inputs produce byte-identical files.
pub fn write_tables(
    out_dir: &Path,
    rated: &[RatedHour],
    daily: &[DailyTotal],
    monthly: &[MonthlyTotal],
) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("write_tables: cannot create {}", out_dir.display()))?;
    write_hourly(&out_dir.join("hourly.csv"), rated)?;
    write_daily(&out_dir.join("daily_totals.csv"), daily)?;
    write_monthly(&out_dir.join("mthly_totals.csv"), monthly)?;
    Ok(())
}

fn write_hourly(path: &Path, rated: &[RatedHour]) -> Result<()> {
    info!("write_hourly: writing {} rows to {}", rated.len(), path.display());
    let mut writer = Writer::from_path(path)?;
    writer.write_record([
        "timestamp",
        "usage_kWh",
        "year",
        "month",
        "day",
        "day_of_year",
        "night",
        "weekend",
        "off_peak",
        "rate",
        "night_kWh",
        "weekend_kWh",
        "weekday_kWh",
        "usage_charge",
        "daily_charge",
        "total_charge",
    ])?;
    for r in rated {
        writer.write_record([
            r.timestamp.format("%Y-%m-%d %H:%M:%S%z").to_string(),
            r.usage_kwh.map(|v| v.to_string()).unwrap_or_default(),
            r.year.to_string(),
            r.month.to_string(),
            r.day.to_string(),
            r.day_of_year.to_string(),
            r.is_night.to_string(),
            r.is_weekend.to_string(),
            r.is_off_peak.to_string(),
            r.rate.to_string(),
            r.night_kwh.to_string(),
            r.weekend_kwh.to_string(),
            r.weekday_kwh.to_string(),
            r.usage_charge.to_string(),
            r.daily_charge_share.to_string(),
            r.total_charge.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_daily(path: &Path, daily: &[DailyTotal]) -> Result<()> {
    info!("write_daily: writing {} rows to {}", daily.len(), path.display());
    let mut writer = Writer::from_path(path)?;
    writer.write_record([
        "year",
        "month",
        "day",
        "usage_kWh",
        "usage_charge",
        "daily_charge",
        "total_charge",
        "night_kWh",
        "weekend_kWh",
        "weekday_kWh",
    ])?;
    for d in daily {
        writer.write_record([
            d.year.to_string(),
            d.month.to_string(),
            d.day.to_string(),
            d.usage_kwh.to_string(),
            d.usage_charge.to_string(),
            d.daily_charge.to_string(),
            d.total_charge.to_string(),
            d.night_kwh.to_string(),
            d.weekend_kwh.to_string(),
            d.weekday_kwh.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

// The monthly table is transposed: one row per metric, one column per month,
// plus a trailing column of the mean across months.
fn write_monthly(path: &Path, monthly: &[MonthlyTotal]) -> Result<()> {
    info!("write_monthly: writing {} months to {}", monthly.len(), path.display());
    let metrics: [(&str, fn(&MonthlyTotal) -> f64); 12] = [
        ("usage_kWh", |m| m.usage_kwh),
        ("usage_charge", |m| m.usage_charge),
        ("daily_charge", |m| m.daily_charge),
        ("total_charge", |m| m.total_charge),
        ("night_kWh", |m| m.night_kwh),
        ("weekend_kWh", |m| m.weekend_kwh),
        ("weekday_kWh", |m| m.weekday_kwh),
        ("days", |m| f64::from(m.days)),
        ("night_perc", |m| m.night_perc),
        ("weekend_perc", |m| m.weekend_perc),
        ("weekday_perc", |m| m.weekday_perc),
        ("off_peak_perc", |m| m.off_peak_perc),
    ];

    let mut writer = Writer::from_path(path)?;
    let mut header = vec!["metric".to_string()];
    header.extend(monthly.iter().map(|m| format!("{}-{:02}", m.year, m.month)));
    header.push("avg".to_string());
    writer.write_record(&header)?;

    for (name, column) in metrics {
        let values: Vec<f64> = monthly.iter().map(column).collect();
        let avg = if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        };
        let mut row = vec![name.to_string()];
        row.extend(values.iter().map(f64::to_string));
        row.push(avg.to_string());
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{daily_totals, monthly_totals};
    use crate::grid;
    use crate::loader::UsageRecord;
    use crate::tariff::{rate_hours, TariffSchedule, TariffVersion};
    use chrono::NaiveDate;
    use chrono_tz::Tz;

    fn sample_rated() -> Vec<RatedHour> {
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
        for d in 0..3 {
            let date = NaiveDate::from_ymd_opt(2023, 5, 6).unwrap() + chrono::Duration::days(d);
            for h in 0..24 {
                records.push(UsageRecord {
                    timestamp: date.and_hms_opt(h, 0, 0).unwrap(),
                    usage_kwh: 0.5,
                });
            }
        }
        rate_hours(&grid::build(&records, tz).unwrap(), &schedule).unwrap()
    }

    #[test]
    fn tables_are_byte_identical_across_runs() -> Result<()> {
        let rated = sample_rated();
        let daily = daily_totals(&rated);
        let monthly = monthly_totals(&daily);

        let base = std::env::temp_dir().join(format!("elecbill-test-{}", std::process::id()));
        let (dir_a, dir_b) = (base.join("a"), base.join("b"));
        write_tables(&dir_a, &rated, &daily, &monthly)?;
        write_tables(&dir_b, &rated, &daily, &monthly)?;
        for name in ["hourly.csv", "daily_totals.csv", "mthly_totals.csv"] {
            let a = fs::read(dir_a.join(name))?;
            let b = fs::read(dir_b.join(name))?;
            assert!(!a.is_empty());
            assert_eq!(a, b, "{} differs between runs", name);
        }
        fs::remove_dir_all(&base)?;
        Ok(())
    }

    #[test]
    fn monthly_table_is_transposed_with_avg_column() -> Result<()> {
        let rated = sample_rated();
        let monthly = monthly_totals(&daily_totals(&rated));

        let base = std::env::temp_dir().join(format!("elecbill-test-t-{}", std::process::id()));
        write_tables(&base, &rated, &daily_totals(&rated), &monthly)?;
        let text = fs::read_to_string(base.join("mthly_totals.csv"))?;
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), "metric,2023-05,avg");
        // 12 metric rows follow the header
        assert_eq!(lines.count(), 12);
        let days_row = text.lines().find(|l| l.starts_with("days,")).unwrap();
        assert_eq!(days_row, "days,3,3");
        fs::remove_dir_all(&base)?;
        Ok(())
    }
}
