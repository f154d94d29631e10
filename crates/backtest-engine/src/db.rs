use analysis_core::{AnalysisError, BacktestTrade, ExitReason, PositionType, TradeResult};
use chrono::NaiveDate;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use uuid::Uuid;

use crate::run_metrics::RunMetrics;

/// Persists `backtest_runs` and `backtest_trades` rows. Shares the same
/// SQLite pool the rest of the core writes through; callers own the pool
/// and pass it in rather than opening a second connection to the same
/// file.
pub struct BacktestDb {
    pool: SqlitePool,
}

impl BacktestDb {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Records the run summary and every simulated trade atomically.
    pub async fn save_run(
        &self,
        backtest_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
        allocation_mode: &str,
        rng_seed: u64,
        starting_capital: Decimal,
        metrics: &RunMetrics,
        trades: &[BacktestTrade],
    ) -> Result<(), AnalysisError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO backtest_runs
                (id, started_at, finished_at, start_date, end_date, initial_capital,
                 allocation_mode, rng_seed, final_equity, sharpe_ratio, max_drawdown_pct,
                 win_rate, total_trades)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(backtest_id.to_string())
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(start_date.to_string())
        .bind(end_date.to_string())
        .bind(starting_capital.to_f64().unwrap_or(0.0))
        .bind(allocation_mode)
        .bind(rng_seed as i64)
        .bind(metrics.final_equity.to_f64().unwrap_or(0.0))
        .bind(metrics.sharpe_ratio)
        .bind(metrics.max_drawdown_pct)
        .bind(metrics.win_rate)
        .bind(metrics.total_trades as i64)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        for trade in trades {
            sqlx::query(
                r#"
                INSERT INTO backtest_trades
                    (backtest_id, signal_id, entry_date, exit_date, entry_price, exit_price,
                     shares, pnl, pnl_pct, result, days_held, exit_reason, position_type, allocation_pct)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(trade.backtest_id.to_string())
            .bind(trade.signal_id)
            .bind(trade.entry_date.to_string())
            .bind(trade.exit_date.to_string())
            .bind(trade.entry_price.to_f64().unwrap_or(0.0))
            .bind(trade.exit_price.to_f64().unwrap_or(0.0))
            .bind(trade.shares)
            .bind(trade.pnl.to_f64().unwrap_or(0.0))
            .bind(trade.pnl_pct)
            .bind(result_str(trade.result))
            .bind(trade.days_held)
            .bind(exit_reason_str(trade.exit_reason))
            .bind(position_type_str(trade.position_type))
            .bind(trade.allocation_pct)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    pub async fn trades_for_run(&self, backtest_id: Uuid) -> Result<Vec<BacktestTrade>, AnalysisError> {
        let rows = sqlx::query("SELECT * FROM backtest_trades WHERE backtest_id = ? ORDER BY entry_date")
            .bind(backtest_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_trade).collect()
    }
}

fn db_err(e: sqlx::Error) -> AnalysisError {
    AnalysisError::DatabaseError(e.to_string())
}

fn result_str(r: TradeResult) -> &'static str {
    match r {
        TradeResult::Win => "Win",
        TradeResult::Loss => "Loss",
    }
}

fn exit_reason_str(r: ExitReason) -> &'static str {
    match r {
        ExitReason::StopLoss => "StopLoss",
        ExitReason::TakeProfit => "TakeProfit",
        ExitReason::HoldPeriodEnd => "HoldPeriodEnd",
    }
}

fn position_type_str(p: PositionType) -> &'static str {
    match p {
        PositionType::Core => "Core",
        PositionType::Satellite => "Satellite",
        PositionType::Equal => "Equal",
    }
}

fn row_to_trade(row: &sqlx::sqlite::SqliteRow) -> Result<BacktestTrade, AnalysisError> {
    let backtest_id: String = row.try_get("backtest_id").map_err(db_err)?;
    let result_str: String = row.try_get("result").map_err(db_err)?;
    let exit_reason_str: String = row.try_get("exit_reason").map_err(db_err)?;
    let position_type_str: String = row.try_get("position_type").map_err(db_err)?;
    let entry_date: String = row.try_get("entry_date").map_err(db_err)?;
    let exit_date: String = row.try_get("exit_date").map_err(db_err)?;

    Ok(BacktestTrade {
        id: Some(row.try_get("id").map_err(db_err)?),
        backtest_id: Uuid::parse_str(&backtest_id).map_err(|e| AnalysisError::DatabaseError(e.to_string()))?,
        signal_id: row.try_get("signal_id").map_err(db_err)?,
        entry_date: NaiveDate::parse_from_str(&entry_date, "%Y-%m-%d")
            .map_err(|e| AnalysisError::DatabaseError(e.to_string()))?,
        exit_date: NaiveDate::parse_from_str(&exit_date, "%Y-%m-%d")
            .map_err(|e| AnalysisError::DatabaseError(e.to_string()))?,
        entry_price: Decimal::from_f64(row.try_get::<f64, _>("entry_price").map_err(db_err)?).unwrap_or_default(),
        exit_price: Decimal::from_f64(row.try_get::<f64, _>("exit_price").map_err(db_err)?).unwrap_or_default(),
        shares: row.try_get("shares").map_err(db_err)?,
        pnl: Decimal::from_f64(row.try_get::<f64, _>("pnl").map_err(db_err)?).unwrap_or_default(),
        pnl_pct: row.try_get("pnl_pct").map_err(db_err)?,
        result: match result_str.as_str() {
            "Win" => TradeResult::Win,
            _ => TradeResult::Loss,
        },
        days_held: row.try_get("days_held").map_err(db_err)?,
        exit_reason: match exit_reason_str.as_str() {
            "StopLoss" => ExitReason::StopLoss,
            "TakeProfit" => ExitReason::TakeProfit,
            _ => ExitReason::HoldPeriodEnd,
        },
        position_type: match position_type_str.as_str() {
            "Core" => PositionType::Core,
            "Satellite" => PositionType::Satellite,
            _ => PositionType::Equal,
        },
        allocation_pct: row.try_get("allocation_pct").map_err(db_err)?,
    })
}
