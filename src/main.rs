use std::{path::PathBuf, process::ExitCode};

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::error;
use tracing_subscriber::EnvFilter;

pub mod api;
pub mod commands;
pub mod errors;
pub mod parsing;
pub mod render;
pub mod structs;
pub mod utils;

#[cfg(test)]
mod tests;

use api::YahooProvider;
use commands::{run_fetch, run_ledger, run_render};
use render::SankeyHtmlRenderer;
use structs::{Config, ConversionTiming, Currency, FlowRouting};

#[derive(Parser)]
#[command(name = "portfolioflows")]
#[command(about = "Brokerage exports to a ledger, price histories and a flow diagram", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Export documents to read (default: every *.json of the output directory)
    #[arg(short, long = "input", global = true)]
    inputs: Vec<PathBuf>,

    /// Directory holding the exports, price histories and outputs
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    /// USD or EUR
    #[arg(long, global = true)]
    reporting_currency: Option<String>,

    #[arg(long, value_enum, global = true)]
    conversion_timing: Option<ConversionTiming>,

    #[arg(long, value_enum, global = true)]
    flow_routing: Option<FlowRouting>,

    /// Valuation date of the diagram, YYYY-MM-DD (default: last ledger date)
    #[arg(long, value_parser = parse_date, global = true)]
    report_date: Option<NaiveDate>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build transactions.csv from the exports
    Ledger,
    /// Download the missing days of every price history
    Fetch,
    /// Draw the flow diagram from transactions.csv
    Render,
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| format!("{value}: {e}"))
}

/* Flags win over the environment, which wins over the defaults */
fn apply_flags(mut config: Config, cli: &Cli) -> anyhow::Result<Config> {
    if !cli.inputs.is_empty() {
        config.input_paths = cli.inputs.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(code) = &cli.reporting_currency {
        config.reporting_currency = Currency::from_code(code)
            .with_context(|| format!("unsupported reporting currency {code}, expected USD or EUR"))?;
    }
    if let Some(timing) = cli.conversion_timing {
        config.conversion_timing = timing;
    }
    if let Some(routing) = cli.flow_routing {
        config.flow_routing = routing;
    }
    if let Some(date) = cli.report_date {
        config.report_date = Some(date);
    }
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration in the environment")?;
    let config = apply_flags(config, &cli)?;

    match cli.command {
        Commands::Ledger => {
            run_ledger(&config).context("ledger stage failed")?;
        }
        Commands::Fetch => {
            let provider = YahooProvider::new(&config.fetch.endpoint)
                .context("could not create the quotes client")?;
            let today: NaiveDate = Local::now().date_naive();
            run_fetch(&config, &provider, today)
                .await
                .context("fetch stage failed")?;
        }
        Commands::Render => {
            run_render(&config, &SankeyHtmlRenderer::new()).context("render stage failed")?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
