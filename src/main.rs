mod aggregate;
mod billing;
mod error;
mod grid;
mod loader;
mod output;
mod tariff;

use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use chrono_tz::Tz;
use clap::Parser;
use log::{debug, warn};

use crate::billing::{BillingEstimate, BillingPeriod};
use crate::error::BillingError;
use crate::tariff::TariffSchedule;

/// Compile scraped hourly electricity usage into rated hourly/daily/monthly
/// tables and estimate the bill for an in-progress billing period
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory of scraped usage export files
    #[arg(short, long)]
    input: PathBuf,

    /// Tariff schedule CSV file (one row per dated version)
    #[arg(short, long)]
    tariffs: PathBuf,

    /// IANA timezone the meter reports in
    #[arg(short = 'z', long, default_value = "Pacific/Auckland")]
    timezone: String,

    /// Directory to write the output tables to
    #[arg(short, long, default_value = "outputs")]
    out_dir: PathBuf,

    /// Billing period start date, e.g. 2023-05-01
    #[arg(long, requires = "bill_end")]
    bill_start: Option<NaiveDate>,

    /// Billing period end date (inclusive, charged through 23:00)
    #[arg(long, requires = "bill_start")]
    bill_end: Option<NaiveDate>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let tz: Tz = args
        .timezone
        .parse()
        .map_err(|_| BillingError::UnknownTimezone(args.timezone.clone()))?;

    let records = loader::load_records(&args.input)?;
    let grid = grid::build(&records, tz)?;
    if !grid.missing.is_empty() {
        warn!("{} grid hours have no reading", grid.missing.len());
        for ts in &grid.missing {
            debug!("missing reading at {}", ts);
        }
    }
    for dup in &grid.duplicates {
        warn!(
            "duplicate readings at {}: kept {} kWh, last seen {} kWh",
            dup.timestamp, dup.first_kwh, dup.last_kwh
        );
    }

    let schedule = TariffSchedule::from_csv(&args.tariffs)?;
    let rated = tariff::rate_hours(&grid, &schedule)?;
    let daily = aggregate::daily_totals(&rated);
    let monthly = aggregate::monthly_totals(&daily);
    output::write_tables(&args.out_dir, &rated, &daily, &monthly)?;
    println!(
        "Compiled {} hours ({} missing, {} duplicated) into {}",
        rated.len(),
        grid.missing.len(),
        grid.duplicates.len(),
        args.out_dir.display()
    );

    if let (Some(start), Some(end)) = (args.bill_start, args.bill_end) {
        let discount = schedule.active_on(end)?.loyalty_discount;
        let estimate = billing::estimate(&rated, &BillingPeriod { start, end }, discount)?;
        print_summary(&estimate);
    }
    Ok(())
}

fn print_summary(est: &BillingEstimate) {
    println!();
    println!("Billing period {} to {}", est.start, est.end);
    println!(
        "  {} of {} days elapsed, {} remaining",
        est.days_elapsed, est.days_total, est.days_remaining
    );
    println!("  Night   {:8.2} kWh ({:5.1}%)", est.night_kwh, est.night_perc);
    println!("  Weekend {:8.2} kWh ({:5.1}%)", est.weekend_kwh, est.weekend_perc);
    println!("  Weekday {:8.2} kWh ({:5.1}%)", est.weekday_kwh, est.weekday_perc);
    println!("  Off-peak share {:.1}%", est.off_peak_perc);
    println!(
        "  To date: {:.2} kWh, ${:.2} (${:.2}/day avg)",
        est.usage_to_date_kwh, est.charge_to_date, est.avg_daily_charge
    );
    println!(
        "  Projected total: {:.2} kWh, ${:.2}",
        est.projected_total_usage_kwh, est.projected_total_charge
    );
}
