use std::{fs, path::Path};

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal_macros::dec;
use serde_json::json;
use tempfile::tempdir;

use crate::{
    api::PriceProvider,
    commands::{run_fetch, run_ledger, run_render},
    errors::{FetchError, PipelineError, StageWarning},
    parsing::read_price_series,
    render::SankeyHtmlRenderer,
    structs::{
        Action, Config, Currency, FlowKind, PriceBar, PriceSeries, CASH_NODE, FEES_NODE,
        REALIZED_GAIN_NODE, UNREALIZED_GAIN_NODE,
    },
};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, d).unwrap()
}

fn first_export() -> serde_json::Value {
    json!({
        "transactionsByPositionIdsMap": {
            "pos_1": {"transactions": [{
                "id": "tx_1", "symbol": "AAPL", "type": "BUY", "date": 20230103,
                "quantity": 10, "pricePerShare": 125, "commission": 1.99, "totalValue": 1251.99,
                "currency": "USD"
            }]},
            "pos_2": {"transactions": [{
                "id": "tx_2", "symbol": "SAP.DE", "type": "BUY", "date": "20230104",
                "quantity": "5", "pricePerShare": "100"
            }]}
        }
    })
}

/* Overlaps the first export: tx_1 comes back under a new id */
fn second_export() -> serde_json::Value {
    json!({
        "transactionsByPositionIdsMap": {
            "pos_1": {"transactions": [
                {
                    "id": "tx_9", "symbol": "AAPL", "type": "BUY", "date": 20230103,
                    "quantity": 10, "pricePerShare": 125, "commission": 1.99, "totalValue": 1251.99,
                    "currency": "USD"
                },
                {
                    "id": "tx_10", "symbol": "AAPL", "type": "SELL", "date": 20230106,
                    "quantity": 4, "pricePerShare": 130, "currency": "USD"
                }
            ]},
            "pos_3": {"transactions": [{"id": "tx_11", "type": "BUY"}]}
        }
    })
}

fn write_inputs(dir: &Path) {
    fs::write(dir.join("export_1.json"), first_export().to_string()).unwrap();
    fs::write(dir.join("export_2.json"), second_export().to_string()).unwrap();
}

fn write_price_histories(dir: &Path) {
    fs::write(
        dir.join("EURUSD=X.csv"),
        "Date,Close,Stock Splits,Currency\n2023-01-03,1.05,0,USD\n2023-01-04,1.06,0,USD\n2023-01-06,1.07,0,USD\n",
    )
    .unwrap();
    fs::write(
        dir.join("AAPL.csv"),
        "Date,Close,Stock Splits,Currency\n2023-01-03,125,0,USD\n2023-01-06,130,0,USD\n",
    )
    .unwrap();
    fs::write(
        dir.join("SAP.DE.csv"),
        "Date,Close,Stock Splits,Currency\n2023-01-04,100,0,EUR\n2023-01-06,110,0,EUR\n",
    )
    .unwrap();
}

fn config(dir: &Path) -> Config {
    Config {
        output_dir: dir.to_path_buf(),
        ..Config::default()
    }
}

#[test]
fn ledger_then_render() {
    let dir = tempdir().unwrap();
    write_inputs(dir.path());
    write_price_histories(dir.path());
    let config = config(dir.path());

    let outcome = run_ledger(&config).unwrap();
    let ledger = &outcome.ledger;

    /* tx_9 and its fee are duplicates of tx_1, tx_11 is malformed */
    assert_eq!(ledger.len(), 4);
    let rows: Vec<(&str, Action)> = ledger
        .entries()
        .iter()
        .map(|e| (e.record.instrument_id.as_str(), e.record.action))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("AAPL", Action::Buy),
            ("AAPL", Action::Fee),
            ("SAP.DE", Action::Buy),
            ("AAPL", Action::Sell),
        ]
    );
    let sap = &ledger.entries()[2];
    assert_eq!(sap.record.currency, Currency::Eur);
    assert_eq!(sap.converted_amount, dec!(530));
    assert_eq!(outcome.report.warnings().len(), 1);
    assert!(matches!(
        outcome.report.warnings()[0],
        StageWarning::MalformedRecord(_)
    ));
    assert!(outcome.path.is_file());

    /* Rebuilding gives the same file */
    let first = fs::read_to_string(&outcome.path).unwrap();
    run_ledger(&config).unwrap();
    assert_eq!(fs::read_to_string(&outcome.path).unwrap(), first);

    let rendered = run_render(&config, &SankeyHtmlRenderer::new()).unwrap();
    let diagram = &rendered.diagram;
    assert!(rendered.report.is_clean());
    assert_eq!(rendered.path, config.diagram_path());
    assert_eq!(diagram.nodes[0], CASH_NODE);

    assert_eq!(diagram.edge(CASH_NODE, "AAPL").unwrap().value, dec!(1250));
    assert_eq!(diagram.edge("AAPL", FEES_NODE).unwrap().value, dec!(1.99));
    assert_eq!(diagram.edge(CASH_NODE, "SAP.DE").unwrap().value, dec!(530));
    assert_eq!(diagram.edge("AAPL", CASH_NODE).unwrap().kind, FlowKind::Sale);
    assert_eq!(diagram.edge(REALIZED_GAIN_NODE, "AAPL").unwrap().value, dec!(20));
    assert_eq!(diagram.edge(UNREALIZED_GAIN_NODE, "AAPL").unwrap().value, dec!(30));
    assert_eq!(diagram.edge(UNREALIZED_GAIN_NODE, "SAP.DE").unwrap().value, dec!(58.5));

    for position in &diagram.positions {
        assert_eq!(diagram.net_flow(&position.instrument_id), position.net_value());
    }
    assert_eq!(diagram.position("AAPL").unwrap().quantity, dec!(6));

    let html = fs::read_to_string(&rendered.path).unwrap();
    assert!(html.contains("sankey"));
}

#[test]
fn render_refuses_a_ledger_in_another_currency() {
    let dir = tempdir().unwrap();
    write_inputs(dir.path());
    write_price_histories(dir.path());
    let eur = Config {
        reporting_currency: Currency::Eur,
        ..config(dir.path())
    };

    let outcome = run_ledger(&eur).unwrap();
    assert_eq!(outcome.ledger.reporting_currency, Currency::Eur);

    assert!(matches!(
        run_render(&config(dir.path()), &SankeyHtmlRenderer::new()),
        Err(PipelineError::CurrencyMismatch {
            found: Currency::Eur,
            expected: Currency::Usd,
            ..
        })
    ));
    assert!(!config(dir.path()).diagram_path().exists());

    let rendered = run_render(&eur, &SankeyHtmlRenderer::new()).unwrap();
    assert_eq!(rendered.diagram.edge(CASH_NODE, "SAP.DE").unwrap().value, dec!(500));
}

#[test]
fn ledger_without_inputs_fails() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    assert!(matches!(
        run_ledger(&config),
        Err(PipelineError::NoInputFiles(_))
    ));

    let config = config_missing(dir.path());
    assert!(matches!(
        run_ledger(&config),
        Err(PipelineError::MissingInputDirectory(_))
    ));
}

fn config_missing(dir: &Path) -> Config {
    Config {
        output_dir: dir.join("missing"),
        ..Config::default()
    }
}

#[test]
fn ledger_without_rates_excludes_foreign_records() {
    let dir = tempdir().unwrap();
    write_inputs(dir.path());
    fs::write(
        dir.path().join("SAP.DE.csv"),
        "Date,Close,Stock Splits,Currency\n2023-01-04,100,0,EUR\n",
    )
    .unwrap();

    let outcome = run_ledger(&config(dir.path())).unwrap();
    assert_eq!(outcome.ledger.len(), 3);
    assert!(outcome
        .report
        .warnings()
        .iter()
        .any(|w| matches!(w, StageWarning::RateUnavailable { instrument_id, .. } if instrument_id == "SAP.DE")));
}

/* One bar per requested day, except for the unknown symbol */
struct DailyProvider;

#[async_trait]
impl PriceProvider for DailyProvider {
    fn id(&self) -> &'static str {
        "daily"
    }

    async fn fetch(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, FetchError> {
        if instrument_id == "SAP.DE" {
            return Err(FetchError::NotFound {
                symbol: instrument_id.to_string(),
            });
        }
        let mut series = PriceSeries::new(instrument_id, Some("USD".to_string()));
        let mut date = start;
        while date < end {
            series.insert(
                date,
                PriceBar {
                    close: dec!(1.5),
                    stock_splits: dec!(0),
                },
            );
            date = date.succ_opt().unwrap();
        }
        Ok(series)
    }
}

#[tokio::test]
async fn fetch_creates_histories() {
    let dir = tempdir().unwrap();
    write_inputs(dir.path());
    let config = config(dir.path());

    let outcome = run_fetch(&config, &DailyProvider, day(8)).await.unwrap();
    assert_eq!(outcome.summary.updated, 2);
    assert_eq!(outcome.summary.failed, 1);
    assert!(outcome.report.warnings().iter().any(|w| matches!(
        w,
        StageWarning::FetchFailed { symbol, error: FetchError::NotFound { .. }, .. } if symbol == "SAP.DE"
    )));

    let aapl = read_price_series(&dir.path().join("AAPL.csv"), "AAPL").unwrap();
    assert_eq!(aapl.first_date(), Some(day(3)));
    assert_eq!(aapl.last_date(), Some(day(7)));
    let fx = read_price_series(&dir.path().join("EURUSD=X.csv"), "EURUSD=X").unwrap();
    assert_eq!(fx.first_date(), Some(day(3)));

    let again = run_fetch(&config, &DailyProvider, day(8)).await.unwrap();
    assert_eq!(again.summary.up_to_date, 2);
    assert_eq!(again.summary.rows, 0);
}
