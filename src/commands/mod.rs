use std::path::Path;

use tracing::debug;

use crate::{
    errors::PipelineError,
    structs::{PriceBook, RateTable},
    utils::create_directories_if_needed,
};

pub mod fetch;
pub use fetch::*;

pub mod ledger;
pub use ledger::*;

pub mod render;
pub use render::*;

pub fn prepare_output_dir(dir: &Path) -> Result<(), PipelineError> {
    create_directories_if_needed(dir).map_err(|source| PipelineError::OutputNotWritable {
        path: dir.to_path_buf(),
        source,
    })
}

/* Exchange rates come from the stored FX history. Without it only same currency conversions succeed. */
pub fn load_rates(prices: &PriceBook, fx_symbol: &str) -> RateTable {
    let rates = match prices.get(fx_symbol) {
        Some(series) => RateTable::from_series(series),
        None => RateTable::new(),
    };
    if rates.is_empty() {
        debug!(fx_symbol, "no stored exchange rates");
    }
    rates
}
