pub mod api;
pub use api::*;

pub mod record;
pub use record::*;

pub mod rate;
pub use rate::*;

pub mod position;
pub use position::*;

pub mod config;
pub use config::*;

pub mod pipeline;
pub use pipeline::*;

pub mod warning;
pub use warning::*;
