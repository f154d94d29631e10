//! Day-by-day backtest simulator: rank a day's candidate BUY signals,
//! allocate capital across them per an [`AllocationMode`], simulate each
//! position to its exit, and roll everything up into [`RunMetrics`].

pub mod allocation;
pub mod db;
pub mod ranking;
pub mod run_metrics;
pub mod runner;
pub mod simulate;

pub use allocation::{allocate, Allocation, AllocationMode};
pub use db::BacktestDb;
pub use ranking::{rank_signals, RankedSignal};
pub use run_metrics::{compute_metrics, RunMetrics};
pub use runner::{run_backtest, BacktestConfig, BacktestOutcome, HistoricalBarsProvider};
pub use simulate::{fill_missing_bars, simulate_position, SimulationInput};
