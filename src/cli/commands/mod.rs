//! CLI command implementations.

mod audit;
mod config;
mod invoke;
mod serve;

pub use audit::run_audit;
pub use config::run_config;
pub use invoke::run_invoke;
pub use serve::{router, run_serve};
