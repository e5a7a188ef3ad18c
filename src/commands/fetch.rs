use chrono::NaiveDate;
use tracing::info;

use crate::{
    api::{FetchSummary, HistoryRequest, PriceHistoryService, PriceProvider},
    commands::prepare_output_dir,
    errors::PipelineError,
    parsing::{extract_documents, CurrencyHints},
    structs::{Config, StageReport, TransactionRecord},
};

#[derive(Debug)]
pub struct FetchOutcome {
    pub summary: FetchSummary,
    pub report: StageReport,
}

/* One request per instrument from its first transaction, plus the FX series from the first transaction
overall. Instruments keep their first-seen order. */
pub fn history_requests(records: &[TransactionRecord], fx_symbol: &str) -> Vec<HistoryRequest> {
    let mut requests: Vec<HistoryRequest> = Vec::new();
    for record in records {
        match requests
            .iter_mut()
            .find(|request| request.symbol == record.instrument_id)
        {
            Some(request) => request.first_date = request.first_date.min(record.timestamp),
            None => requests.push(HistoryRequest {
                symbol: record.instrument_id.clone(),
                first_date: record.timestamp,
            }),
        }
    }
    if let Some(first_date) = records.iter().map(|record| record.timestamp).min() {
        requests.retain(|request| request.symbol != fx_symbol);
        requests.push(HistoryRequest {
            symbol: fx_symbol.to_string(),
            first_date,
        });
    }
    requests
}

/* The instruments come straight from the exports so this can run before the first ledger build */
pub async fn run_fetch(
    config: &Config,
    provider: &dyn PriceProvider,
    today: NaiveDate,
) -> Result<FetchOutcome, PipelineError> {
    let mut report = StageReport::new("fetch");
    let paths = config.resolve_input_paths()?;
    let extraction = extract_documents(&paths, &CurrencyHints::new())?;
    report.extend(extraction.warnings);

    let requests = history_requests(&extraction.records, &config.fetch.fx_symbol);
    info!(
        instruments = requests.len(),
        provider = provider.id(),
        "updating price histories"
    );

    prepare_output_dir(&config.output_dir)?;
    let service = PriceHistoryService::new(provider, &config.output_dir, &config.fetch, today);
    let summary = service.update_all(&requests, &mut report).await?;

    info!(
        updated = summary.updated,
        up_to_date = summary.up_to_date,
        no_new_data = summary.no_new_data,
        failed = summary.failed,
        rows = summary.rows,
        "price histories updated"
    );
    report.log_summary();

    Ok(FetchOutcome { summary, report })
}
