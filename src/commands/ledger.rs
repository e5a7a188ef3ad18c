use std::path::PathBuf;

use tracing::info;

use crate::{
    commands::{load_rates, prepare_output_dir},
    errors::PipelineError,
    parsing::{export_symbols, extract_documents, load_price_book, write_ledger, CurrencyHints},
    structs::{build_ledger, Config, Ledger, LedgerOptions, StageReport},
};

#[derive(Debug)]
pub struct LedgerOutcome {
    pub ledger: Ledger,
    pub path: PathBuf,
    pub report: StageReport,
}

/* exports -> transactions.csv. The stored price histories give the listing currency of records without
one, and the FX history gives the rates. */
pub fn run_ledger(config: &Config) -> Result<LedgerOutcome, PipelineError> {
    let mut report = StageReport::new("ledger");
    let paths = config.resolve_input_paths()?;
    info!(documents = paths.len(), "building ledger");

    let mut symbols = export_symbols(&paths);
    symbols.push(config.fetch.fx_symbol.clone());
    let (prices, warnings) = load_price_book(&config.output_dir, &symbols);
    report.extend(warnings);

    let hints: CurrencyHints = prices
        .iter()
        .filter_map(|(id, series)| series.listing_currency().map(|c| (id.clone(), c)))
        .collect();
    let rates = load_rates(&prices, &config.fetch.fx_symbol);

    let extraction = extract_documents(&paths, &hints)?;
    report.extend(extraction.warnings);

    let build = build_ledger(&extraction.records, &rates, &LedgerOptions::from(config));
    report.extend(build.warnings);

    prepare_output_dir(&config.output_dir)?;
    let path = config.ledger_path();
    write_ledger(&path, &build.ledger)?;

    info!(
        entries = build.ledger.len(),
        duplicates = build.duplicates,
        excluded = build.excluded,
        currency = %build.ledger.reporting_currency,
        path = %path.display(),
        "ledger written"
    );
    report.log_summary();

    Ok(LedgerOutcome {
        ledger: build.ledger,
        path,
        report,
    })
}
