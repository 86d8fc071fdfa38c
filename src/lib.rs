pub mod cli;
pub mod commands;
pub mod engine;
pub mod traits;

mod logging;

pub use logging::{file_log::FileLog, multilog::MultiLogger};

/// Gadget version
pub const GADGET_VERSION: &str = env!("CARGO_PKG_VERSION");
