pub mod provider;
pub use provider::*;

pub mod providers;
pub use providers::*;

pub mod services;
pub use services::*;
