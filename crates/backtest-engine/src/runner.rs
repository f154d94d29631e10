//! Day-by-day orchestration: group signals by calendar day, rank and
//! allocate each day's candidates against the capital available that day,
//! simulate each position to its exit, and roll the results into metrics.

use std::collections::BTreeMap;

use analysis_core::{AnalysisError, Bar, BacktestTrade, StoredSignal, StoredSignalType};
use chrono::NaiveDate;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::allocation::{allocate, AllocationMode};
use crate::ranking::rank_signals;
use crate::run_metrics::{compute_metrics, RunMetrics};
use crate::simulate::{fill_missing_bars, simulate_position, SimulationInput};

/// Daily historical bars for a ticker, supplied by the caller so the
/// simulator never reaches into a live data source mid-run.
pub trait HistoricalBarsProvider: Send + Sync {
    /// Bars for `ticker` starting at `entry_date`, ascending by date, for
    /// up to `max_days` calendar days. Returns as many as are known; the
    /// simulator fills any shortfall with a seeded random walk.
    fn bars_from(&self, ticker: &str, entry_date: NaiveDate, max_days: usize) -> Vec<Bar>;
}

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub allocation_mode: AllocationMode,
    pub starting_capital: Decimal,
    pub hold_period_days: i64,
    pub ticker_filter: Option<Vec<String>>,
    pub rng_seed: u64,
    pub daily_vol: f64,
}

pub struct BacktestOutcome {
    pub backtest_id: Uuid,
    pub trades: Vec<BacktestTrade>,
    pub metrics: RunMetrics,
}

/// Runs the full simulation described in spec section 4.5: group BUY
/// signals by day, rank and allocate each day against capital available
/// that day (starting capital plus every closed simulated trade's P&L so
/// far), simulate each position, and compute run metrics from the
/// resulting trades.
///
/// Trades are returned and accounted for strictly in ascending entry-date
/// order, so `current_capital` bookkeeping stays causally consistent with
/// spec section 5's ordering guarantee.
pub fn run_backtest(
    signals: &[StoredSignal],
    bars: &dyn HistoricalBarsProvider,
    config: &BacktestConfig,
) -> Result<BacktestOutcome, AnalysisError> {
    let backtest_id = Uuid::new_v4();

    let filtered: Vec<StoredSignal> = signals
        .iter()
        .filter(|s| s.signal_type == StoredSignalType::Buy)
        .filter(|s| s.created_at.date_naive() >= config.start_date && s.created_at.date_naive() <= config.end_date)
        .filter(|s| {
            config
                .ticker_filter
                .as_ref()
                .map(|tickers| tickers.iter().any(|t| t == &s.ticker))
                .unwrap_or(true)
        })
        .cloned()
        .collect();

    let mut by_day: BTreeMap<NaiveDate, Vec<StoredSignal>> = BTreeMap::new();
    for signal in filtered {
        by_day.entry(signal.created_at.date_naive()).or_default().push(signal);
    }

    let mut trades: Vec<BacktestTrade> = Vec::new();
    let mut daily_equity: Vec<f64> = vec![config.starting_capital.to_f64().unwrap_or(0.0)];

    for (day, day_signals) in by_day {
        let current_capital = config.starting_capital + trades.iter().map(|t| t.pnl).sum::<Decimal>();

        let ranked = rank_signals(&day_signals);
        let allocations = allocate(&ranked, config.allocation_mode);

        for allocation in &allocations {
            let entry_f = allocation.signal.signal.entry_price.to_f64().unwrap_or(0.0);
            if entry_f <= 0.0 {
                continue;
            }
            let capital_allocated =
                current_capital.to_f64().unwrap_or(0.0) * allocation.allocation_pct;
            let capital_allocated = Decimal::from_f64(capital_allocated).unwrap_or(Decimal::ZERO);

            let signal_id = allocation.signal.signal.id.unwrap_or(0);
            let needed_days = config.hold_period_days.max(1) as usize;
            let raw_bars = bars.bars_from(&allocation.signal.signal.ticker, day, needed_days);
            let filled = fill_missing_bars(&raw_bars, needed_days, config.daily_vol, config.rng_seed);

            let input = SimulationInput {
                allocation,
                capital_allocated,
                bars: &filled,
                entry_date: day,
                max_hold_days: Some(config.hold_period_days),
            };

            if let Some(trade) = simulate_position(backtest_id, signal_id, &input) {
                trades.push(trade);
            }
        }

        let equity = (config.starting_capital + trades.iter().map(|t| t.pnl).sum::<Decimal>())
            .to_f64()
            .unwrap_or(0.0);
        daily_equity.push(equity);
    }

    let metrics = compute_metrics(&trades, config.starting_capital, &daily_equity);

    Ok(BacktestOutcome {
        backtest_id,
        trades,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{SignalStatus, StoredSignal, StoredSignalType};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    struct FlatBars(f64);
    impl HistoricalBarsProvider for FlatBars {
        fn bars_from(&self, _ticker: &str, entry_date: NaiveDate, max_days: usize) -> Vec<Bar> {
            (0..max_days)
                .map(|i| Bar {
                    timestamp: entry_date.and_hms_opt(0, 0, 0).unwrap().and_utc() + chrono::Duration::days(i as i64),
                    open: self.0,
                    high: self.0 * 1.01,
                    low: self.0 * 0.99,
                    close: self.0,
                    volume: 1_000_000.0,
                    vwap: None,
                })
                .collect()
        }
    }

    fn buy_signal(ticker: &str, confidence: i32, created_at: chrono::DateTime<Utc>) -> StoredSignal {
        StoredSignal {
            id: Some(1),
            ticker: ticker.to_string(),
            signal_type: StoredSignalType::Buy,
            confidence,
            entry_price: dec!(100),
            target_price: dec!(125),
            stop_loss: dec!(90),
            share_count: 0,
            status: SignalStatus::Pending,
            created_at,
            executed_at: None,
            closed_at: None,
            pnl: None,
            notes: None,
        }
    }

    #[test]
    fn core_focus_allocation_matches_spec_scenario_six() {
        let day = Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap();
        let signals: Vec<StoredSignal> = (0..5).map(|i| buy_signal(&format!("T{i}"), 5, day)).collect();
        let config = BacktestConfig {
            start_date: day.date_naive(),
            end_date: day.date_naive(),
            allocation_mode: AllocationMode::CoreFocus,
            starting_capital: dec!(50000),
            hold_period_days: 5,
            ticker_filter: None,
            rng_seed: 7,
            daily_vol: 0.0,
        };
        let outcome = run_backtest(&signals, &FlatBars(100.0), &config).unwrap();
        assert_eq!(outcome.trades.len(), 4);
        let core_trade = outcome.trades.iter().find(|t| t.allocation_pct == 0.60).unwrap();
        assert_eq!(core_trade.shares, 300);
        for satellite in outcome.trades.iter().filter(|t| t.allocation_pct == 0.10) {
            assert_eq!(satellite.shares, 50);
        }
    }

    #[test]
    fn sell_and_hold_signals_never_enter_the_simulation() {
        let day = Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap();
        let mut sell = buy_signal("AAPL", 5, day);
        sell.signal_type = StoredSignalType::Sell;
        let config = BacktestConfig {
            start_date: day.date_naive(),
            end_date: day.date_naive(),
            allocation_mode: AllocationMode::Diversified,
            starting_capital: dec!(10000),
            hold_period_days: 5,
            ticker_filter: None,
            rng_seed: 1,
            daily_vol: 0.0,
        };
        let outcome = run_backtest(&[sell], &FlatBars(100.0), &config).unwrap();
        assert!(outcome.trades.is_empty());
    }
}
