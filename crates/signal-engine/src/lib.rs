//! Binds the eight core crates into one running process: a data cache, a
//! set of demo adapters standing in for vendor integrations, the
//! ensemble/risk/backtest/learning pipeline, and a scheduler that drives
//! it all on the cadence spec section 4.7 lists.

pub mod adapters;
pub mod cache;
pub mod config;
pub mod jobs;
pub mod pipeline;
pub mod scheduler;

pub use config::EngineConfig;
pub use jobs::EngineContext;
