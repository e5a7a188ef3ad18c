pub mod transaction;
pub use transaction::*;

pub mod currency;
pub use currency::*;

pub mod ledger;
pub use ledger::*;

pub mod price_series;
pub use price_series::*;

pub mod rates;
pub use rates::*;

pub mod flow;
pub use flow::*;

pub mod report;
pub use report::*;

pub mod config;
pub use config::*;

pub mod managers;
pub use managers::*;
