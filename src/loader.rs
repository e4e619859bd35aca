use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDateTime, ParseError};
use csv::ReaderBuilder;
use log::{debug, info, warn};
use sscanf::sscanf;

use crate::error::BillingError;

/// One raw hourly reading as scraped from the provider portal.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    pub timestamp: NaiveDateTime,
    pub usage_kwh: f64,
}

// Parse a usage value with its unit suffix, e.g. "1.234 kWh".
pub fn parse_usage_kwh(s: &str) -> Result<f64> {
    let kwh = sscanf!(s.trim(), "{f64} kWh")
        .map_err(|e| anyhow!("parse_usage_kwh: {:?} is not a kWh value ({})", s, e))?;
    if kwh < 0.0 {
        return Err(anyhow!("parse_usage_kwh: negative usage {:?}", s));
    }
    Ok(kwh)
}

// Drop ordinal suffixes from day tokens: "6th May 2023" -> "6 May 2023".
fn strip_ordinals(s: &str) -> String {
    s.split_whitespace()
        .map(|tok| {
            let stripped = tok
                .strip_suffix("st")
                .or_else(|| tok.strip_suffix("nd"))
                .or_else(|| tok.strip_suffix("rd"))
                .or_else(|| tok.strip_suffix("th"));
            match stripped {
                Some(digits) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
                    digits.to_string()
                }
                _ => tok.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a provider timestamp. Two formats have been observed historically:
/// plain ISO-like ("2023-05-06 12:00:00") and the formatted export style
/// ("12:00AM 6th May 2023") with ordinal day suffixes.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    let attempts: [std::result::Result<NaiveDateTime, ParseError>; 3] = [
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"),
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M"),
        NaiveDateTime::parse_from_str(&strip_ordinals(s), "%I:%M%p %d %B %Y"),
    ];
    attempts
        .into_iter()
        .find_map(|r| r.ok())
        .context(format!("parse_timestamp: unrecognised date {:?}", s))
}

// Parse one export file of (date, usage) rows. Bad rows are skipped with a
// warning; a non-empty file yielding no records at all is an error.
fn load_file(path: &Path) -> Result<Vec<UsageRecord>> {
    info!("load_file: loading CSV file {}", path.display());
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;

    let mut records = Vec::new();
    let mut rows = 0usize;
    let mut last_reason = String::new();
    for record in reader.records() {
        let r = record?;
        rows += 1;
        debug!("load_file: record: {:?}", r);
        if r.len() < 2 {
            last_reason = format!("row {} has {} fields, expected 2", rows, r.len());
            warn!("load_file: {}: {}", path.display(), last_reason);
            continue;
        }
        let parsed = parse_timestamp(&r[0])
            .and_then(|timestamp| Ok((timestamp, parse_usage_kwh(&r[1])?)));
        match parsed {
            Ok((timestamp, usage_kwh)) => records.push(UsageRecord { timestamp, usage_kwh }),
            Err(e) => {
                last_reason = format!("row {}: {}", rows, e);
                warn!("load_file: skipping bad row in {}: {}", path.display(), last_reason);
            }
        }
    }

    if rows > 0 && records.is_empty() {
        return Err(BillingError::Parse {
            file: path.to_path_buf(),
            reason: last_reason,
        }
        .into());
    }
    Ok(records)
}

/// Load every regular file in the input directory and concatenate the parsed
/// records. Files are visited in sorted path order so reruns are
/// deterministic. No deduplication happens here; duplicates are cross-file by
/// definition and are a grid concern.
pub fn load_records(dir: &Path) -> Result<Vec<UsageRecord>> {
    info!("load_records: scanning {}", dir.display());
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("load_records: cannot read directory {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut records = Vec::new();
    for path in &paths {
        records.extend(load_file(path)?);
    }
    info!("load_records: {} records from {} files", records.len(), paths.len());
    Ok(records)
}
