#[macro_use]
pub mod metrics;

pub mod caching;
pub mod config;
pub mod logging;
pub mod types;
