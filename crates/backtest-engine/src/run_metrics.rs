use analysis_core::{BacktestTrade, TradeResult};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;

/// Summary statistics for one backtest run, computed from its closed
/// trades plus the daily equity curve the simulator accumulated.
#[derive(Debug, Clone, PartialEq)]
pub struct RunMetrics {
    pub total_trades: usize,
    pub win_rate: f64,
    pub total_pnl: Decimal,
    pub total_return_pct: f64,
    pub avg_gain_pct: f64,
    pub avg_loss_pct: f64,
    pub largest_win: Decimal,
    pub largest_loss: Decimal,
    /// `sum(wins) / |sum(losses)|`; infinite if there are wins and no
    /// losses, zero if there are neither wins nor losses.
    pub profit_factor: f64,
    /// `mean(trade_returns) / stdev(trade_returns)`, unannualized; zero if
    /// stdev is zero.
    pub sharpe_ratio: f64,
    pub max_drawdown_pct: f64,
    pub avg_days_held: f64,
    pub final_equity: Decimal,
}

pub fn compute_metrics(trades: &[BacktestTrade], initial_capital: Decimal, daily_equity: &[f64]) -> RunMetrics {
    let total_trades = trades.len();
    let wins: Vec<&BacktestTrade> = trades.iter().filter(|t| t.result == TradeResult::Win).collect();
    let losses: Vec<&BacktestTrade> = trades.iter().filter(|t| t.result == TradeResult::Loss).collect();

    let win_rate = if total_trades > 0 { wins.len() as f64 / total_trades as f64 } else { 0.0 };
    let total_pnl: Decimal = trades.iter().map(|t| t.pnl).sum();
    let final_equity = initial_capital + total_pnl;
    let total_return_pct = if initial_capital > Decimal::ZERO {
        (total_pnl / initial_capital).to_f64().unwrap_or(0.0) * 100.0
    } else {
        0.0
    };

    let avg_gain_pct = average(wins.iter().map(|t| t.pnl_pct));
    let avg_loss_pct = average(losses.iter().map(|t| t.pnl_pct));

    let largest_win = wins.iter().map(|t| t.pnl).max().unwrap_or(Decimal::ZERO);
    let largest_loss = losses.iter().map(|t| t.pnl).min().unwrap_or(Decimal::ZERO);

    let gross_wins: Decimal = wins.iter().map(|t| t.pnl).sum();
    let gross_losses: Decimal = losses.iter().map(|t| t.pnl).sum();
    let profit_factor = if gross_losses == Decimal::ZERO {
        if gross_wins > Decimal::ZERO {
            f64::INFINITY
        } else {
            0.0
        }
    } else {
        (gross_wins / gross_losses.abs()).to_f64().unwrap_or(0.0)
    };

    let avg_days_held = average(trades.iter().map(|t| t.days_held as f64));

    RunMetrics {
        total_trades,
        win_rate,
        total_pnl,
        total_return_pct,
        avg_gain_pct,
        avg_loss_pct,
        largest_win,
        largest_loss,
        profit_factor,
        sharpe_ratio: trade_sharpe_ratio(trades),
        max_drawdown_pct: max_drawdown_pct(daily_equity),
        avg_days_held,
        final_equity,
    }
}

fn average(values: impl Iterator<Item = f64>) -> f64 {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// `mean(pnl_pct) / stdev(pnl_pct)` across trades, zero if stdev is zero
/// or there are fewer than two trades.
fn trade_sharpe_ratio(trades: &[BacktestTrade]) -> f64 {
    let returns: Vec<f64> = trades.iter().map(|t| t.pnl_pct).collect();
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    let std_dev = variance.sqrt();
    if std_dev < f64::EPSILON {
        0.0
    } else {
        mean / std_dev
    }
}

/// Largest peak-to-trough decline in the equity curve, as a percentage.
fn max_drawdown_pct(daily_equity: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0;
    for &equity in daily_equity {
        if equity > peak {
            peak = equity;
        }
        if peak > 0.0 {
            let dd = (peak - equity) / peak * 100.0;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{ExitReason, PositionType};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn trade(pnl: Decimal, pnl_pct: f64, result: TradeResult) -> BacktestTrade {
        BacktestTrade {
            id: None,
            backtest_id: Uuid::new_v4(),
            signal_id: 1,
            entry_date: Utc::now().date_naive(),
            exit_date: Utc::now().date_naive(),
            entry_price: dec!(100),
            exit_price: dec!(100) + pnl,
            shares: 1,
            pnl,
            pnl_pct,
            result,
            days_held: 5,
            exit_reason: ExitReason::TakeProfit,
            position_type: PositionType::Core,
            allocation_pct: 0.6,
        }
    }

    #[test]
    fn win_rate_counts_winning_trades() {
        let trades = vec![
            trade(dec!(100), 10.0, TradeResult::Win),
            trade(dec!(-50), -5.0, TradeResult::Loss),
            trade(dec!(50), 5.0, TradeResult::Win),
        ];
        let metrics = compute_metrics(&trades, dec!(10000), &[10000.0, 10100.0, 10050.0, 10100.0]);
        assert!((metrics.win_rate - (2.0 / 3.0)).abs() < 1e-9);
        assert_eq!(metrics.total_pnl, dec!(100));
        assert_eq!(metrics.largest_win, dec!(100));
        assert_eq!(metrics.largest_loss, dec!(-50));
    }

    #[test]
    fn profit_factor_is_infinite_with_wins_and_no_losses() {
        let trades = vec![trade(dec!(100), 10.0, TradeResult::Win)];
        let metrics = compute_metrics(&trades, dec!(10000), &[]);
        assert!(metrics.profit_factor.is_infinite());
    }

    #[test]
    fn profit_factor_is_zero_with_no_trades() {
        let metrics = compute_metrics(&[], dec!(10000), &[]);
        assert_eq!(metrics.profit_factor, 0.0);
    }

    #[test]
    fn max_drawdown_tracks_largest_peak_to_trough_decline() {
        let metrics = compute_metrics(&[], dec!(10000), &[10000.0, 11000.0, 9000.0, 9500.0]);
        let expected_dd = (11000.0 - 9000.0) / 11000.0 * 100.0;
        assert!((metrics.max_drawdown_pct - expected_dd).abs() < 1e-6);
    }

    #[test]
    fn flat_equity_curve_has_zero_drawdown() {
        let metrics = compute_metrics(&[], dec!(10000), &[10000.0, 10000.0, 10000.0]);
        assert_eq!(metrics.max_drawdown_pct, 0.0);
    }

    #[test]
    fn single_trade_has_zero_sharpe() {
        let trades = vec![trade(dec!(100), 10.0, TradeResult::Win)];
        let metrics = compute_metrics(&trades, dec!(10000), &[]);
        assert_eq!(metrics.sharpe_ratio, 0.0);
    }
}
