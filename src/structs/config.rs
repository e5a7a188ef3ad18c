use std::{
    env,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use chrono::NaiveDate;
use clap::ValueEnum;

use crate::{
    errors::{ConfigError, PipelineError},
    utils::list_json_files,
};

use super::Currency;

pub const LEDGER_FILE: &str = "transactions.csv";
pub const DIAGRAM_FILE: &str = "portfolio_sankey.html";

/* When the amounts of foreign currency records are converted */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ConversionTiming {
    #[default]
    TransactionDate,
    ReportDate,
}

/* How the aggregator connects sales and purchases */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FlowRouting {
    #[default]
    ViaCash, // Every sale goes to Cash, every purchase comes from Cash
    DirectTransfer, // Purchases are funded by earlier sale proceeds first (FIFO), then by Cash
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub endpoint: String,
    pub fx_symbol: String,
}

/* Explicit configuration passed to every stage. Built from defaults, then the environment (and .env),
then the command line flags. */
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub input_paths: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub reporting_currency: Currency,
    pub conversion_timing: ConversionTiming,
    pub flow_routing: FlowRouting,
    pub report_date: Option<NaiveDate>,
    pub fetch: FetchConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            endpoint: String::from("https://query1.finance.yahoo.com"),
            fx_symbol: String::from("EURUSD=X"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_paths: Vec::new(),
            output_dir: PathBuf::from("resources"),
            reporting_currency: Currency::Usd,
            conversion_timing: ConversionTiming::default(),
            flow_routing: FlowRouting::default(),
            report_date: None,
            fetch: FetchConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        return Self::from_lookup(|key| env::var(key).ok());
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(paths) = value("PORTFOLIO_INPUT_PATHS") {
            config.input_paths = paths
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect();
        }
        if let Some(dir) = value("PORTFOLIO_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(code) = value("PORTFOLIO_REPORTING_CURRENCY") {
            config.reporting_currency =
                Currency::from_code(&code).ok_or(ConfigError::InvalidValue {
                    key: "PORTFOLIO_REPORTING_CURRENCY",
                    value: code,
                    expected: "USD or EUR",
                })?;
        }
        if let Some(timing) = value("PORTFOLIO_CONVERSION_TIMING") {
            config.conversion_timing = ConversionTiming::from_str(&timing, true).map_err(|_| {
                ConfigError::InvalidValue {
                    key: "PORTFOLIO_CONVERSION_TIMING",
                    value: timing,
                    expected: "transaction-date or report-date",
                }
            })?;
        }
        if let Some(routing) = value("PORTFOLIO_FLOW_ROUTING") {
            config.flow_routing = FlowRouting::from_str(&routing, true).map_err(|_| {
                ConfigError::InvalidValue {
                    key: "PORTFOLIO_FLOW_ROUTING",
                    value: routing,
                    expected: "via-cash or direct-transfer",
                }
            })?;
        }
        if let Some(date) = value("PORTFOLIO_REPORT_DATE") {
            config.report_date = Some(NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(
                |_| ConfigError::InvalidValue {
                    key: "PORTFOLIO_REPORT_DATE",
                    value: date.clone(),
                    expected: "a YYYY-MM-DD date",
                },
            )?);
        }
        if let Some(attempts) = value("PORTFOLIO_FETCH_ATTEMPTS") {
            config.fetch.max_attempts = parse_positive(&attempts).ok_or(
                ConfigError::InvalidValue {
                    key: "PORTFOLIO_FETCH_ATTEMPTS",
                    value: attempts,
                    expected: "a positive integer",
                },
            )? as u32;
        }
        if let Some(delay) = value("PORTFOLIO_FETCH_DELAY_MS") {
            let millis = u64::from_str(delay.trim()).map_err(|_| ConfigError::InvalidValue {
                key: "PORTFOLIO_FETCH_DELAY_MS",
                value: delay.clone(),
                expected: "a number of milliseconds",
            })?;
            config.fetch.base_delay = Duration::from_millis(millis);
        }
        if let Some(endpoint) = value("PORTFOLIO_QUOTES_ENDPOINT") {
            config.fetch.endpoint = endpoint.trim_end_matches('/').to_string();
        }
        Ok(config)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.output_dir.join(LEDGER_FILE)
    }

    pub fn diagram_path(&self) -> PathBuf {
        self.output_dir.join(DIAGRAM_FILE)
    }

    /* Explicit paths win, otherwise every json file of the output directory is an export */
    pub fn resolve_input_paths(&self) -> Result<Vec<PathBuf>, PipelineError> {
        if !self.input_paths.is_empty() {
            return Ok(self.input_paths.clone());
        }
        if !self.output_dir.is_dir() {
            return Err(PipelineError::MissingInputDirectory(self.output_dir.clone()));
        }
        let paths = list_json_files(&self.output_dir).map_err(|source| PipelineError::Read {
            path: self.output_dir.clone(),
            source,
        })?;
        if paths.is_empty() {
            return Err(PipelineError::NoInputFiles(self.output_dir.clone()));
        }
        Ok(paths)
    }
}

pub fn price_history_path(dir: &Path, symbol: &str) -> PathBuf {
    dir.join(format!("{symbol}.csv"))
}

fn parse_positive(value: &str) -> Option<u64> {
    u64::from_str(value.trim()).ok().filter(|v| *v > 0)
}
