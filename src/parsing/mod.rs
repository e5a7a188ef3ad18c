pub mod export;
pub use export::*;

pub mod ledger_csv;
pub use ledger_csv::*;

pub mod price_csv;
pub use price_csv::*;
