use std::collections::HashMap;

use analysis_core::{AgentAnalysis, AnalysisError, SignalStatus, StoredSignal, StoredSignalType};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use sqlx::Row;

use crate::db::SignalDb;

/// One agent's attributed outcome on one closed signal: the join of
/// `agent_analyses` and `signals` that `learning-loop`'s rolling
/// performance calculation scores against.
#[derive(Debug, Clone)]
pub struct ClosedTradeRow {
    pub agent_name: String,
    pub closed_at: NaiveDate,
    pub recommendation: StoredSignalType,
    pub pnl: Decimal,
}

/// Persists decisions and their supporting agent analyses. Every write that
/// produces a new signal also enqueues a row in `alert_queue` in the same
/// transaction, so a crash between "signal committed" and "alert sent"
/// never silently drops the notification -- a separate dispatcher drains
/// the queue and marks rows sent.
pub struct SignalStore {
    db: SignalDb,
}

impl SignalStore {
    pub fn new(db: SignalDb) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &sqlx::sqlite::SqlitePool {
        self.db.pool()
    }

    /// Inserts a pending signal plus its supporting agent analyses and an
    /// `alert_queue` row, atomically.
    pub async fn store_signal(
        &self,
        signal: &StoredSignal,
        analyses: &[AgentAnalysis],
    ) -> Result<i64, AnalysisError> {
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| AnalysisError::DatabaseError(e.to_string()))?;

        let row = sqlx::query(
            r#"
            INSERT INTO signals
                (ticker, signal_type, confidence, entry_price, target_price, stop_loss,
                 share_count, status, created_at, notes)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&signal.ticker)
        .bind(signal.signal_type.as_str())
        .bind(signal.confidence)
        .bind(signal.entry_price.to_f64().unwrap_or(0.0))
        .bind(signal.target_price.to_f64().unwrap_or(0.0))
        .bind(signal.stop_loss.to_f64().unwrap_or(0.0))
        .bind(signal.share_count)
        .bind(signal.status.as_str())
        .bind(signal.created_at.to_rfc3339())
        .bind(&signal.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AnalysisError::DatabaseError(e.to_string()))?;

        let signal_id: i64 = row.try_get("id").map_err(|e| AnalysisError::DatabaseError(e.to_string()))?;

        for analysis in analyses {
            sqlx::query(
                r#"
                INSERT INTO agent_analyses
                    (signal_id, agent_name, recommendation, confidence, reasoning, factors_snapshot, timestamp)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(signal_id)
            .bind(&analysis.agent_name)
            .bind(analysis.recommendation.as_str())
            .bind(analysis.confidence)
            .bind(&analysis.reasoning)
            .bind(serde_json::to_string(&analysis.factors_snapshot).unwrap_or_default())
            .bind(analysis.timestamp.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| AnalysisError::DatabaseError(e.to_string()))?;
        }

        // Alert only fires for a confident, actionable decision: a stored
        // confidence of 4-5 stars on a BUY or SELL. A HOLD, or a low-star
        // BUY/SELL, is persisted silently.
        let alert_worthy = signal.confidence >= 4
            && matches!(signal.signal_type, StoredSignalType::Buy | StoredSignalType::Sell);
        if alert_worthy {
            sqlx::query(
                r#"
                INSERT INTO alert_queue (signal_id, subject, body, created_at, sent_at)
                VALUES (?, ?, ?, ?, NULL)
                "#,
            )
            .bind(signal_id)
            .bind(format!("New {} signal: {}", signal.signal_type.as_str(), signal.ticker))
            .bind(format!(
                "{} {} @ {} (confidence {}, {} shares, stop {}, target {})",
                signal.signal_type.as_str(),
                signal.ticker,
                signal.entry_price,
                signal.confidence,
                signal.share_count,
                signal.stop_loss,
                signal.target_price,
            ))
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| AnalysisError::DatabaseError(e.to_string()))?;
        }

        tx.commit().await.map_err(|e| AnalysisError::DatabaseError(e.to_string()))?;

        Ok(signal_id)
    }

    pub async fn get_signal(&self, id: i64) -> Result<Option<StoredSignal>, AnalysisError> {
        let row = sqlx::query("SELECT * FROM signals WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| AnalysisError::DatabaseError(e.to_string()))?;

        row.map(|r| row_to_signal(&r)).transpose()
    }

    pub async fn list_pending(&self) -> Result<Vec<StoredSignal>, AnalysisError> {
        let rows = sqlx::query("SELECT * FROM signals WHERE status = 'PENDING' ORDER BY created_at DESC")
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| AnalysisError::DatabaseError(e.to_string()))?;

        rows.iter().map(row_to_signal).collect()
    }

    /// All signals ever written, oldest first. Feeds the backtest simulator
    /// and performance analysis, both of which need the full history rather
    /// than only what's still pending.
    pub async fn list_all(&self) -> Result<Vec<StoredSignal>, AnalysisError> {
        let rows = sqlx::query("SELECT * FROM signals ORDER BY created_at ASC")
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| AnalysisError::DatabaseError(e.to_string()))?;

        rows.iter().map(row_to_signal).collect()
    }

    /// One row per `(agent_analyses, signals)` join for every closed
    /// signal, the shape `learning_loop::performance::rolling_performance`
    /// scores against.
    pub async fn closed_trade_rows(&self) -> Result<Vec<ClosedTradeRow>, AnalysisError> {
        let rows = sqlx::query(
            r#"
            SELECT a.agent_name, s.closed_at, a.recommendation, s.pnl
            FROM agent_analyses a
            JOIN signals s ON s.id = a.signal_id
            WHERE s.status = 'CLOSED' AND s.closed_at IS NOT NULL AND s.pnl IS NOT NULL
            "#,
        )
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| AnalysisError::DatabaseError(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let agent_name: String = row.try_get("agent_name").map_err(db_err)?;
                let closed_at: String = row.try_get("closed_at").map_err(db_err)?;
                let recommendation: String = row.try_get("recommendation").map_err(db_err)?;
                let pnl: f64 = row.try_get("pnl").map_err(db_err)?;
                Ok(ClosedTradeRow {
                    agent_name,
                    closed_at: parse_rfc3339(&closed_at)?.date_naive(),
                    recommendation: parse_stored_signal_type(&recommendation)?,
                    pnl: Decimal::from_f64(pnl).unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Staged alerts not yet marked sent, oldest first. A dispatcher reads
    /// these, delivers each through an `AlertSink`, and calls
    /// [`Self::mark_alert_sent`] -- a crash between delivery and the mark
    /// just means the alert goes out twice on the next pass, never zero
    /// times.
    pub async fn list_unsent_alerts(&self) -> Result<Vec<(i64, String, String)>, AnalysisError> {
        let rows = sqlx::query("SELECT id, subject, body FROM alert_queue WHERE sent_at IS NULL ORDER BY created_at ASC")
            .fetch_all(self.db.pool())
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|row| {
                Ok((
                    row.try_get("id").map_err(db_err)?,
                    row.try_get("subject").map_err(db_err)?,
                    row.try_get("body").map_err(db_err)?,
                ))
            })
            .collect()
    }

    pub async fn mark_alert_sent(&self, id: i64) -> Result<(), AnalysisError> {
        sqlx::query("UPDATE alert_queue SET sent_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(self.db.pool())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Advances a signal's lifecycle status, rejecting any transition that
    /// isn't forward-only per `SignalStatus::can_advance_to`.
    pub async fn advance_status(&self, id: i64, next: SignalStatus) -> Result<(), AnalysisError> {
        let current = self
            .get_signal(id)
            .await?
            .ok_or_else(|| AnalysisError::InvalidData(format!("signal {id} not found")))?;

        if !current.status.can_advance_to(next) {
            return Err(AnalysisError::StateTransitionError {
                from: current.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }

        let timestamp_column = match next {
            SignalStatus::Executed => Some("executed_at"),
            SignalStatus::Closed => Some("closed_at"),
            _ => None,
        };

        if let Some(column) = timestamp_column {
            let query = format!("UPDATE signals SET status = ?, {column} = ? WHERE id = ?");
            sqlx::query(&query)
                .bind(next.as_str())
                .bind(Utc::now().to_rfc3339())
                .bind(id)
                .execute(self.db.pool())
                .await
                .map_err(|e| AnalysisError::DatabaseError(e.to_string()))?;
        } else {
            sqlx::query("UPDATE signals SET status = ? WHERE id = ?")
                .bind(next.as_str())
                .bind(id)
                .execute(self.db.pool())
                .await
                .map_err(|e| AnalysisError::DatabaseError(e.to_string()))?;
        }

        Ok(())
    }

    pub async fn close_with_pnl(&self, id: i64, pnl: Decimal) -> Result<(), AnalysisError> {
        self.advance_status(id, SignalStatus::Closed).await?;
        sqlx::query("UPDATE signals SET pnl = ? WHERE id = ?")
            .bind(pnl.to_f64().unwrap_or(0.0))
            .bind(id)
            .execute(self.db.pool())
            .await
            .map_err(|e| AnalysisError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}

fn row_to_signal(row: &sqlx::sqlite::SqliteRow) -> Result<StoredSignal, AnalysisError> {
    let signal_type_str: String = row.try_get("signal_type").map_err(db_err)?;
    let status_str: String = row.try_get("status").map_err(db_err)?;
    let created_at: String = row.try_get("created_at").map_err(db_err)?;
    let executed_at: Option<String> = row.try_get("executed_at").map_err(db_err)?;
    let closed_at: Option<String> = row.try_get("closed_at").map_err(db_err)?;
    let pnl: Option<f64> = row.try_get("pnl").map_err(db_err)?;

    Ok(StoredSignal {
        id: Some(row.try_get("id").map_err(db_err)?),
        ticker: row.try_get("ticker").map_err(db_err)?,
        signal_type: parse_stored_signal_type(&signal_type_str)?,
        confidence: row.try_get("confidence").map_err(db_err)?,
        entry_price: Decimal::from_f64(row.try_get::<f64, _>("entry_price").map_err(db_err)?).unwrap_or_default(),
        target_price: Decimal::from_f64(row.try_get::<f64, _>("target_price").map_err(db_err)?).unwrap_or_default(),
        stop_loss: Decimal::from_f64(row.try_get::<f64, _>("stop_loss").map_err(db_err)?).unwrap_or_default(),
        share_count: row.try_get("share_count").map_err(db_err)?,
        status: parse_status(&status_str)?,
        created_at: parse_rfc3339(&created_at)?,
        executed_at: executed_at.map(|s| parse_rfc3339(&s)).transpose()?,
        closed_at: closed_at.map(|s| parse_rfc3339(&s)).transpose()?,
        pnl: pnl.and_then(Decimal::from_f64),
        notes: row.try_get("notes").map_err(db_err)?,
    })
}

fn db_err(e: sqlx::Error) -> AnalysisError {
    AnalysisError::DatabaseError(e.to_string())
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>, AnalysisError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AnalysisError::DatabaseError(format!("bad timestamp '{s}': {e}")))
}

fn parse_status(s: &str) -> Result<SignalStatus, AnalysisError> {
    match s {
        "PENDING" => Ok(SignalStatus::Pending),
        "APPROVED" => Ok(SignalStatus::Approved),
        "EXECUTED" => Ok(SignalStatus::Executed),
        "CLOSED" => Ok(SignalStatus::Closed),
        other => Err(AnalysisError::InvalidData(format!("unknown signal status '{other}'"))),
    }
}

fn parse_stored_signal_type(s: &str) -> Result<StoredSignalType, AnalysisError> {
    match s {
        "BUY" => Ok(StoredSignalType::Buy),
        "SELL" => Ok(StoredSignalType::Sell),
        "HOLD" => Ok(StoredSignalType::Hold),
        other => Err(AnalysisError::InvalidData(format!("unknown signal type '{other}'"))),
    }
}

#[allow(dead_code)]
fn factors_from_json(raw: &str) -> HashMap<String, f64> {
    serde_json::from_str(raw).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::SignalStatus;
    use rust_decimal_macros::dec;

    fn sample_signal() -> StoredSignal {
        StoredSignal {
            id: None,
            ticker: "AAPL".to_string(),
            signal_type: StoredSignalType::Buy,
            confidence: 4,
            entry_price: dec!(150.00),
            target_price: dec!(172.50),
            stop_loss: dec!(139.50),
            share_count: 10,
            status: SignalStatus::Pending,
            created_at: Utc::now(),
            executed_at: None,
            closed_at: None,
            pnl: None,
            notes: None,
        }
    }

    async fn store() -> SignalStore {
        let db = SignalDb::new("sqlite::memory:").await.unwrap();
        SignalStore::new(db)
    }

    #[tokio::test]
    async fn store_signal_persists_signal_and_alert_atomically() {
        let store = store().await;
        let id = store.store_signal(&sample_signal(), &[]).await.unwrap();
        let fetched = store.get_signal(id).await.unwrap().unwrap();
        assert_eq!(fetched.ticker, "AAPL");
        assert_eq!(fetched.status, SignalStatus::Pending);

        let row = sqlx::query("SELECT COUNT(*) as n FROM alert_queue WHERE signal_id = ?")
            .bind(id)
            .fetch_one(store.db.pool())
            .await
            .unwrap();
        let count: i64 = row.try_get("n").unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn advance_status_rejects_illegal_transitions() {
        let store = store().await;
        let id = store.store_signal(&sample_signal(), &[]).await.unwrap();
        let err = store.advance_status(id, SignalStatus::Executed).await.unwrap_err();
        assert!(matches!(err, AnalysisError::StateTransitionError { .. }));
        store.advance_status(id, SignalStatus::Approved).await.unwrap();
        store.advance_status(id, SignalStatus::Executed).await.unwrap();
        let fetched = store.get_signal(id).await.unwrap().unwrap();
        assert!(fetched.executed_at.is_some());
    }

    #[tokio::test]
    async fn close_with_pnl_records_pnl_and_closed_status() {
        let store = store().await;
        let id = store.store_signal(&sample_signal(), &[]).await.unwrap();
        store.advance_status(id, SignalStatus::Approved).await.unwrap();
        store.advance_status(id, SignalStatus::Executed).await.unwrap();
        store.close_with_pnl(id, dec!(225.00)).await.unwrap();
        let fetched = store.get_signal(id).await.unwrap().unwrap();
        assert_eq!(fetched.status, SignalStatus::Closed);
        assert_eq!(fetched.pnl, Some(dec!(225.00)));
    }
}
