use analysis_core::{Bar, BacktestTrade, ExitReason, TradeResult};
use chrono::NaiveDate;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::allocation::Allocation;

const DEFAULT_MAX_HOLD_DAYS: i64 = 30;

/// Inputs for one simulated position: a ranked-and-allocated signal, the
/// capital assigned to it, and the bars to walk day by day. `bars` is
/// expected to start at entry and run forward; when the real market-data
/// history doesn't cover the full hold period, [`fill_missing_bars`]
/// extends it with a seeded random walk so a run is always reproducible
/// given the same seed.
pub struct SimulationInput<'a> {
    pub allocation: &'a Allocation,
    pub capital_allocated: Decimal,
    pub bars: &'a [Bar],
    pub entry_date: NaiveDate,
    pub max_hold_days: Option<i64>,
}

/// Extends `bars` with a seeded random walk until it covers `needed_days`
/// past the first bar. Each step multiplies the prior close by `1 +
/// N(0, daily_vol)`. Deterministic for a given seed, so a backtest run
/// that exhausts real history still produces a reproducible trade.
pub fn fill_missing_bars(bars: &[Bar], needed_days: usize, daily_vol: f64, seed: u64) -> Vec<Bar> {
    if bars.len() >= needed_days {
        return bars.to_vec();
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut out = bars.to_vec();
    let mut last = out.last().cloned().unwrap_or(Bar {
        timestamp: chrono::Utc::now(),
        open: 100.0,
        high: 100.0,
        low: 100.0,
        close: 100.0,
        volume: 0.0,
        vwap: None,
    });
    while out.len() < needed_days {
        let shock: f64 = rng.gen_range(-3.0..3.0) * daily_vol;
        let close = (last.close * (1.0 + shock)).max(0.01);
        let bar = Bar {
            timestamp: last.timestamp + chrono::Duration::days(1),
            open: last.close,
            high: close.max(last.close),
            low: close.min(last.close),
            close,
            volume: last.volume,
            vwap: None,
        };
        out.push(bar.clone());
        last = bar;
    }
    out
}

/// Walks `input.bars` day by day from entry, exiting on the first day the
/// low touches the stop, the high touches the target, or the hold period
/// ends, whichever comes first. Returns `None` if there are no bars to
/// simulate against.
pub fn simulate_position(backtest_id: Uuid, signal_id: i64, input: &SimulationInput) -> Option<BacktestTrade> {
    let stop = input.allocation.signal.signal.stop_loss;
    let target = input.allocation.signal.signal.target_price;
    let entry_price = input.allocation.signal.signal.entry_price;
    let max_hold = input.max_hold_days.unwrap_or(DEFAULT_MAX_HOLD_DAYS);

    let shares = {
        let entry_f = entry_price.to_f64().unwrap_or(1.0);
        if entry_f <= 0.0 {
            0
        } else {
            (input.capital_allocated.to_f64().unwrap_or(0.0) / entry_f).floor() as i64
        }
    };
    if shares <= 0 || input.bars.is_empty() {
        return None;
    }

    let stop_f = stop.to_f64().unwrap_or(0.0);
    let target_f = target.to_f64().unwrap_or(f64::MAX);

    let mut exit_price = input.bars.last().unwrap().close;
    let mut exit_reason = ExitReason::HoldPeriodEnd;
    let mut days_held = input.bars.len().min(max_hold as usize) as i64;

    for (day_index, bar) in input.bars.iter().take(max_hold as usize).enumerate() {
        if bar.low <= stop_f {
            exit_price = stop_f;
            exit_reason = ExitReason::StopLoss;
            days_held = day_index as i64 + 1;
            break;
        }
        if bar.high >= target_f {
            exit_price = target_f;
            exit_reason = ExitReason::TakeProfit;
            days_held = day_index as i64 + 1;
            break;
        }
    }

    let exit_price_dec = Decimal::from_f64(exit_price).unwrap_or(entry_price);
    let pnl = (exit_price_dec - entry_price) * Decimal::from(shares);
    let pnl_pct = if entry_price > Decimal::ZERO {
        ((exit_price_dec - entry_price) / entry_price).to_f64().unwrap_or(0.0) * 100.0
    } else {
        0.0
    };
    let result = if pnl >= Decimal::ZERO { TradeResult::Win } else { TradeResult::Loss };

    let exit_date = input.entry_date + chrono::Duration::days(days_held);

    Some(BacktestTrade {
        id: None,
        backtest_id,
        signal_id,
        entry_date: input.entry_date,
        exit_date,
        entry_price,
        exit_price: exit_price_dec,
        shares,
        pnl,
        pnl_pct,
        result,
        days_held,
        exit_reason,
        position_type: input.allocation.position_type,
        allocation_pct: input.allocation.allocation_pct,
    })
}
