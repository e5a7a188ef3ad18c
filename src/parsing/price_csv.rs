use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    errors::{PipelineError, StageWarning},
    structs::{price_history_path, PriceBar, PriceBook, PriceSeries},
    utils::{file_exists, is_empty_file, parse_history_date},
};

/* One line of <SYMBOL>.csv */
#[derive(Debug, Serialize, Deserialize)]
struct PriceRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Close")]
    close: Decimal,
    #[serde(rename = "Stock Splits", default)]
    stock_splits: Option<Decimal>,
    #[serde(rename = "Currency", default)]
    currency: Option<String>,
}

pub fn read_price_series(path: &Path, instrument_id: &str) -> Result<PriceSeries, PipelineError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| PipelineError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    let mut series = PriceSeries::new(instrument_id, None);
    for row in reader.deserialize::<PriceRow>() {
        let row = row.map_err(|source| PipelineError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let date = parse_history_date(&row.date).ok_or_else(|| PipelineError::InvalidRow {
            path: path.to_path_buf(),
            message: format!("invalid date `{}`", row.date),
        })?;
        if series.currency.is_none() {
            series.currency = row.currency.filter(|c| !c.trim().is_empty() && c != "N/A");
        }
        series.insert(
            date,
            PriceBar {
                close: row.close,
                stock_splits: row.stock_splits.unwrap_or(Decimal::ZERO),
            },
        );
    }
    Ok(series)
}

/* Appends the bars to the file, the header is only written when the file is new or empty.
Returns the number of rows written. */
pub fn append_price_series(path: &Path, series: &PriceSeries) -> Result<usize, PipelineError> {
    let write_header = is_empty_file(path);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| PipelineError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(write_header)
        .from_writer(file);
    for (date, bar) in series.iter() {
        writer
            .serialize(PriceRow {
                date: date.format("%Y-%m-%d").to_string(),
                close: bar.close,
                stock_splits: Some(bar.stock_splits),
                currency: series.currency.clone(),
            })
            .map_err(|source| PipelineError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
    }
    writer.flush().map_err(|source| PipelineError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(series.len())
}

/* Loads the stored histories of the given symbols. A symbol without a file is simply absent from the book,
an unreadable file is reported. */
pub fn load_price_book(dir: &Path, symbols: &[String]) -> (PriceBook, Vec<StageWarning>) {
    let mut book = PriceBook::new();
    let mut warnings = Vec::new();
    for symbol in symbols {
        let path: PathBuf = price_history_path(dir, symbol);
        if !file_exists(&path) {
            debug!(%symbol, "no stored price history");
            continue;
        }
        match read_price_series(&path, symbol) {
            Ok(series) => {
                book.insert(symbol.clone(), series);
            }
            Err(e) => warnings.push(StageWarning::UnreadablePriceHistory {
                path,
                reason: e.to_string(),
            }),
        }
    }
    (book, warnings)
}
