//! CLI command handlers, one file per command.

mod cancel;
mod config;
mod confirm;
mod fetch;
mod plan;

pub use cancel::run_cancel;
pub use config::run_config;
pub use confirm::run_confirm;
pub use fetch::run_fetch;
pub use plan::run_plan;
