pub mod ledger_manager;
pub use ledger_manager::*;

pub mod flow_manager;
pub use flow_manager::*;
