use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use super::{FetchError, InsufficientPositionError, MalformedRecordError, MissingRateError};

/* Everything a stage recovers from locally. They are collected and printed once at the end of the stage. */
#[derive(Error, Debug)]
pub enum StageWarning {
    #[error("skipped document {path}: {reason}")]
    UnreadableDocument { path: PathBuf, reason: String },

    #[error("skipped malformed record: {0}")]
    MalformedRecord(MalformedRecordError),

    #[error("{instrument_id}: {error}, used the rate of {used} instead")]
    RateSubstituted {
        instrument_id: String,
        error: MissingRateError,
        used: NaiveDate,
    },

    #[error("excluded {instrument_id}: {error} and no earlier rate exists")]
    RateUnavailable {
        instrument_id: String,
        error: MissingRateError,
    },

    #[error("{instrument_id}: {error} to value the position and no earlier rate exists, carried at cost")]
    ValuationRateUnavailable {
        instrument_id: String,
        error: MissingRateError,
    },

    #[error("could not fetch {symbol} after {attempts} attempt(s): {error}")]
    FetchFailed {
        symbol: String,
        attempts: u32,
        error: FetchError,
    },

    #[error("stored history {path} is unreadable: {reason}")]
    UnreadablePriceHistory { path: PathBuf, reason: String },

    #[error("{0}")]
    InsufficientPosition(InsufficientPositionError),

    #[error("{instrument_id}: no price on or before {date}, carried at cost")]
    NoValuationPrice {
        instrument_id: String,
        date: NaiveDate,
    },
}
