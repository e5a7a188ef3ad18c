use std::{fs, path::Path};

use chrono::{Days, NaiveDate};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    api::PriceProvider,
    errors::{PipelineError, StageWarning},
    parsing::{append_price_series, read_price_series},
    structs::{price_history_path, FetchConfig, PriceSeries, StageReport},
    utils::{file_exists, is_empty_file},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    UpToDate,
    NoNewData,
    Updated { rows: usize },
    Failed,
}

/* One instrument to refresh and the first day it is needed from */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub symbol: String,
    pub first_date: NaiveDate,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FetchSummary {
    pub updated: usize,
    pub up_to_date: usize,
    pub no_new_data: usize,
    pub failed: usize,
    pub rows: usize,
}

/* Keeps the stored `<SYMBOL>.csv` histories current: only the days after the last stored one are requested
and appended. */
pub struct PriceHistoryService<'a> {
    provider: &'a dyn PriceProvider,
    output_dir: &'a Path,
    fetch: &'a FetchConfig,
    today: NaiveDate,
}

/* Calls the provider, retrying rate limits with an exponential backoff (base, 2 x base, 4 x base...).
Any other error is final. */
pub async fn fetch_with_retry(
    provider: &dyn PriceProvider,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
    config: &FetchConfig,
) -> Result<PriceSeries, StageWarning> {
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match provider.fetch(symbol, start, end).await {
            Ok(series) => return Ok(series),
            Err(error) if error.is_transient() && attempt < max_attempts => {
                let delay = config.base_delay * 2u32.pow(attempt - 1);
                warn!(
                    provider = provider.id(),
                    symbol,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "{error}, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                return Err(StageWarning::FetchFailed {
                    symbol: symbol.to_string(),
                    attempts: attempt,
                    error,
                })
            }
        }
    }
}

impl<'a> PriceHistoryService<'a> {
    pub fn new(
        provider: &'a dyn PriceProvider,
        output_dir: &'a Path,
        fetch: &'a FetchConfig,
        today: NaiveDate,
    ) -> Self {
        Self {
            provider,
            output_dir,
            fetch,
            today,
        }
    }

    /* Day after the last stored day, or the first needed day when nothing usable is stored.
    An unreadable file is moved aside to `<SYMBOL>.csv.bak` so the fresh download does not append to it. */
    pub fn start_date(
        &self,
        request: &HistoryRequest,
        warnings: &mut Vec<StageWarning>,
    ) -> Result<NaiveDate, PipelineError> {
        let path = price_history_path(self.output_dir, &request.symbol);
        if !file_exists(&path) || is_empty_file(&path) {
            return Ok(request.first_date);
        }
        match read_price_series(&path, &request.symbol) {
            Ok(stored) => Ok(stored
                .last_date()
                .and_then(|last| last.checked_add_days(Days::new(1)))
                .unwrap_or(request.first_date)),
            Err(error) => {
                let backup = path.with_extension("csv.bak");
                fs::rename(&path, &backup).map_err(|source| PipelineError::Write {
                    path: backup.clone(),
                    source,
                })?;
                warnings.push(StageWarning::UnreadablePriceHistory {
                    path,
                    reason: format!("{error}, moved to {}", backup.display()),
                });
                Ok(request.first_date)
            }
        }
    }

    pub async fn update(
        &self,
        request: &HistoryRequest,
        warnings: &mut Vec<StageWarning>,
    ) -> Result<UpdateOutcome, PipelineError> {
        let start = self.start_date(request, warnings)?;
        if start >= self.today {
            info!(symbol = %request.symbol, "up to date");
            return Ok(UpdateOutcome::UpToDate);
        }

        let series = match fetch_with_retry(
            self.provider,
            &request.symbol,
            start,
            self.today,
            self.fetch,
        )
        .await
        {
            Ok(series) => series,
            Err(warning) => {
                warnings.push(warning);
                return Ok(UpdateOutcome::Failed);
            }
        };

        if series.is_empty() {
            info!(symbol = %request.symbol, %start, "no new data");
            return Ok(UpdateOutcome::NoNewData);
        }

        let path = price_history_path(self.output_dir, &request.symbol);
        let rows = append_price_series(&path, &series)?;
        info!(symbol = %request.symbol, rows, from = %start, "appended price history");
        Ok(UpdateOutcome::Updated { rows })
    }

    /* Instruments are processed one after the other, a failure is reported and the next one goes on */
    pub async fn update_all(
        &self,
        requests: &[HistoryRequest],
        report: &mut StageReport,
    ) -> Result<FetchSummary, PipelineError> {
        let mut summary = FetchSummary::default();
        for request in requests {
            let mut warnings = Vec::new();
            let outcome = self.update(request, &mut warnings).await?;
            report.extend(warnings);
            match outcome {
                UpdateOutcome::UpToDate => summary.up_to_date += 1,
                UpdateOutcome::NoNewData => summary.no_new_data += 1,
                UpdateOutcome::Updated { rows } => {
                    summary.updated += 1;
                    summary.rows += rows;
                }
                UpdateOutcome::Failed => summary.failed += 1,
            }
        }
        Ok(summary)
    }
}
