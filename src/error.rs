use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Structural failures of the compile run. Row-level parse trouble is
/// recovered (warn and skip); everything else here aborts the run.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("could not parse {file}: no usable rows ({reason})")]
    Parse { file: PathBuf, reason: String },

    #[error("no usage records to build a grid from")]
    EmptyInput,

    #[error("no tariff version is effective on {0}")]
    NoActiveTariff(NaiveDate),

    #[error("unknown timezone {0:?}")]
    UnknownTimezone(String),
}
