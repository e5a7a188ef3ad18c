use std::path::PathBuf;

use tracing::info;

use crate::{
    commands::{load_rates, prepare_output_dir},
    errors::PipelineError,
    parsing::{load_price_book, read_ledger},
    render::DiagramRenderer,
    structs::{aggregate_flows, Config, FlowDiagram, FlowOptions, StageReport},
};

#[derive(Debug)]
pub struct RenderOutcome {
    pub path: PathBuf,
    pub diagram: FlowDiagram,
    pub report: StageReport,
}

/* transactions.csv + price histories -> diagram */
pub fn run_render(
    config: &Config,
    renderer: &dyn DiagramRenderer,
) -> Result<RenderOutcome, PipelineError> {
    let mut report = StageReport::new("render");
    let ledger = read_ledger(&config.ledger_path(), config.reporting_currency)?;

    let mut symbols = ledger.instruments();
    symbols.push(config.fetch.fx_symbol.clone());
    let (prices, warnings) = load_price_book(&config.output_dir, &symbols);
    report.extend(warnings);
    let rates = load_rates(&prices, &config.fetch.fx_symbol);

    let aggregation = aggregate_flows(&ledger, &prices, &rates, &FlowOptions::from(config));
    report.extend(aggregation.warnings);
    let diagram = aggregation.diagram;

    prepare_output_dir(&config.output_dir)?;
    let path = renderer.render(&diagram, &config.output_dir)?;

    info!(
        nodes = diagram.nodes.len(),
        edges = diagram.edges.len(),
        path = %path.display(),
        "diagram written"
    );
    for position in diagram.positions.iter().filter(|p| p.is_open()) {
        info!(
            instrument = %position.instrument_id,
            quantity = %position.quantity,
            currency = %position.currency,
            value = %position.net_value().round_dp(2),
            "open position"
        );
    }
    report.log_summary();

    Ok(RenderOutcome {
        path,
        diagram,
        report,
    })
}
