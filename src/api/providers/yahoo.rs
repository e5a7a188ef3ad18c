use async_trait::async_trait;
use chrono::NaiveDate;
use hashbrown::HashMap;
use reqwest::{
    header::{HeaderMap, HeaderValue, USER_AGENT},
    StatusCode,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::{
    api::PriceProvider,
    errors::FetchError,
    structs::{PriceBar, PriceSeries},
    utils::timestamp_to_trading_day,
};

const CHART_PATH: &str = "/v8/finance/chart";
const CLIENT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) portfolioflows";

/* Daily history from the Yahoo Finance chart API. The endpoint is configurable so tests and mirrors can
point elsewhere. */
pub struct YahooProvider {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
    events: Option<Events>,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    currency: Option<String>,
    #[serde(rename = "gmtoffset", default)]
    gmt_offset: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    close: Option<Vec<Option<f64>>>, // Null on days without a close
}

#[derive(Debug, Deserialize)]
struct Events {
    #[serde(default)]
    splits: HashMap<String, SplitEvent>,
}

#[derive(Debug, Deserialize)]
struct SplitEvent {
    date: i64,
    numerator: f64,
    denominator: f64,
}

impl YahooProvider {
    pub fn new(endpoint: &str) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn chart_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        format!(
            "{}{CHART_PATH}/{symbol}?period1={}&period2={}&interval=1d&events=history,splits",
            self.endpoint,
            unix_seconds(start),
            unix_seconds(end)
        )
    }
}

#[async_trait]
impl PriceProvider for YahooProvider {
    fn id(&self) -> &'static str {
        "yahoo"
    }

    async fn fetch(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, FetchError> {
        let url = self.chart_url(instrument_id, start, end);
        debug!(%url, "requesting chart");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        match status {
            StatusCode::NOT_FOUND => {
                return Err(FetchError::NotFound {
                    symbol: instrument_id.to_string(),
                })
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(FetchError::RateLimited {
                    symbol: instrument_id.to_string(),
                })
            }
            status if !status.is_success() => {
                return Err(FetchError::Provider {
                    symbol: instrument_id.to_string(),
                    message: format!("HTTP {status}: {}", body.chars().take(200).collect::<String>()),
                })
            }
            _ => (),
        }
        map_chart_response(instrument_id, &body, start, end)
    }
}

/* Turns a chart payload into a series restricted to [start, end). Split events are attached to the bar of
their trading day. */
pub fn map_chart_response(
    symbol: &str,
    body: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<PriceSeries, FetchError> {
    let response: ChartResponse = serde_json::from_str(body).map_err(|e| FetchError::Decode {
        symbol: symbol.to_string(),
        message: e.to_string(),
    })?;

    if let Some(error) = response.chart.error {
        if error.code.eq_ignore_ascii_case("Not Found") {
            return Err(FetchError::NotFound {
                symbol: symbol.to_string(),
            });
        }
        return Err(FetchError::Provider {
            symbol: symbol.to_string(),
            message: format!(
                "{}: {}",
                error.code,
                error.description.unwrap_or_default()
            ),
        });
    }

    let Some(result) = response.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(PriceSeries::new(symbol, None));
    };

    let offset = result.meta.gmt_offset;
    let mut series = PriceSeries::new(symbol, result.meta.currency);
    let closes = result
        .indicators
        .quote
        .into_iter()
        .next()
        .and_then(|quote| quote.close)
        .unwrap_or_default();

    let mut splits: HashMap<NaiveDate, Decimal> = HashMap::new();
    for split in result.events.map(|e| e.splits).unwrap_or_default().into_values() {
        if split.numerator <= 0.0 || split.denominator <= 0.0 {
            continue;
        }
        let (Some(day), Some(ratio)) = (
            timestamp_to_trading_day(split.date, offset),
            Decimal::from_f64_retain(split.numerator / split.denominator),
        ) else {
            continue;
        };
        splits.insert(day, ratio.round_dp(6).normalize());
    }

    let timestamps = result.timestamp.unwrap_or_default();
    for (timestamp, close) in timestamps.into_iter().zip(closes) {
        let Some(close) = close.and_then(Decimal::from_f64_retain) else {
            continue;
        };
        let Some(day) = timestamp_to_trading_day(timestamp, offset) else {
            continue;
        };
        if day < start || day >= end {
            continue;
        }
        series.insert(
            day,
            PriceBar {
                close: close.round_dp(4),
                stock_splits: splits.get(&day).copied().unwrap_or(Decimal::ZERO),
            },
        );
    }
    Ok(series)
}

fn unix_seconds(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0)
}
