//! Persists the outcome of a LearningLoop run: `agent_weights_history`
//! rows and the `learning_log` audit trail.
//!
//! `agent_weights_history` carries a `UNIQUE (date, agent_name)`
//! constraint, so a concurrent attempt to commit weights for a date
//! already written becomes a harmless no-op (the second insert fails and
//! is treated as "someone else already committed today").

use std::collections::HashMap;

use analysis_core::{AnalysisError, MarketRegime};
use chrono::NaiveDate;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::bias::BiasReport;
use crate::engine::LearningRunOutcome;
use crate::performance::AgentPerformance;

pub struct LearningStore {
    pool: SqlitePool,
}

impl LearningStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Commits the outcome of one run. For `Applied`, writes an
    /// `agent_weights_history` row per agent (a conflicting row for the
    /// same date means a concurrent run already committed; that's treated
    /// as a successful no-op, not an error) plus one WEIGHT_UPDATE event
    /// per agent and one CORRECTION_APPLIED event per bias actually
    /// corrected. For the other outcomes, writes the matching audit
    /// events and applies no weight changes.
    pub async fn record(
        &self,
        date: NaiveDate,
        perfs: &[AgentPerformance],
        outcome: &LearningRunOutcome,
    ) -> Result<(), AnalysisError> {
        match outcome {
            LearningRunOutcome::Applied { weights, report, confidence, .. } => {
                let mut tx = self.pool.begin().await.map_err(db_err)?;
                for (agent_name, weight) in weights {
                    let perf = perfs.iter().find(|p| &p.agent_name == agent_name);
                    let result = sqlx::query(
                        r#"
                        INSERT OR IGNORE INTO agent_weights_history
                            (date, agent_name, weight, win_rate_7d, win_rate_30d, win_rate_90d,
                             trades_count_7d, trades_count_30d, trades_count_90d, reasoning)
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(date.to_string())
                    .bind(agent_name)
                    .bind(weight)
                    .bind(perf.map(|p| p.win_rate_7))
                    .bind(perf.map(|p| p.win_rate_30))
                    .bind(perf.map(|p| p.win_rate_90))
                    .bind(perf.map(|p| p.trades_7).unwrap_or(0))
                    .bind(perf.map(|p| p.trades_30).unwrap_or(0))
                    .bind(perf.map(|p| p.trades_90).unwrap_or(0))
                    .bind("proposed weight applied by LearningLoop")
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;

                    if result.rows_affected() == 0 {
                        tx.rollback().await.map_err(db_err)?;
                        return Ok(());
                    }

                    insert_event(
                        &mut tx,
                        date,
                        "WEIGHT_UPDATE",
                        Some(agent_name),
                        None,
                        Some(*weight),
                        None,
                        None,
                        "weight committed by LearningLoop",
                        Some(*confidence),
                    )
                    .await?;
                }

                for finding in &report.findings {
                    insert_event(
                        &mut tx,
                        date,
                        "CORRECTION_APPLIED",
                        None,
                        None,
                        None,
                        Some(finding.bias_type.as_str()),
                        Some(&finding.correction_note),
                        &finding.correction_note,
                        Some(*confidence),
                    )
                    .await?;
                }

                tx.commit().await.map_err(db_err)?;
                Ok(())
            }
            LearningRunOutcome::PendingReview { confidence, .. } => {
                let mut tx = self.pool.begin().await.map_err(db_err)?;
                insert_event(
                    &mut tx,
                    date,
                    "ALERT",
                    None,
                    None,
                    None,
                    None,
                    None,
                    "pending review: confidence below auto-apply threshold or auto-learning disabled",
                    Some(*confidence),
                )
                .await?;
                tx.commit().await.map_err(db_err)?;
                Ok(())
            }
            LearningRunOutcome::GuardrailBlocked { violations } => {
                let mut tx = self.pool.begin().await.map_err(db_err)?;
                let reasoning = violations.iter().map(|v| v.0.clone()).collect::<Vec<_>>().join("; ");
                insert_event(&mut tx, date, "ALERT", None, None, None, None, None, &reasoning, None).await?;
                tx.commit().await.map_err(db_err)?;
                Ok(())
            }
            LearningRunOutcome::LearningFrozen { reason, .. } => {
                let mut tx = self.pool.begin().await.map_err(db_err)?;
                insert_event(&mut tx, date, "FREEZE", None, None, None, None, None, reason, None).await?;
                tx.commit().await.map_err(db_err)?;
                Ok(())
            }
        }
    }

    /// Records a regime transition. Callers compare the freshly detected
    /// regime against the last one on file and call this only when they
    /// differ.
    pub async fn record_regime_shift(&self, date: NaiveDate, from: MarketRegime, to: MarketRegime) -> Result<(), AnalysisError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        insert_event(
            &mut tx,
            date,
            "REGIME_SHIFT",
            None,
            None,
            None,
            None,
            None,
            &format!("{} -> {}", from.as_str(), to.as_str()),
            None,
        )
        .await?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    /// Records a manually-overridden weight, bypassing the proposal
    /// pipeline entirely.
    pub async fn record_manual_override(&self, date: NaiveDate, agent_name: &str, old_weight: f64, new_weight: f64) -> Result<(), AnalysisError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO agent_weights_history (date, agent_name, weight, reasoning)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(date.to_string())
        .bind(agent_name)
        .bind(new_weight)
        .bind("manual override")
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        insert_event(
            &mut tx,
            date,
            "WEIGHT_UPDATE",
            Some(agent_name),
            Some(old_weight),
            Some(new_weight),
            None,
            None,
            "manual operator override",
            Some(1.0),
        )
        .await?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    /// The weight on file for each agent as of `date`, or the most recent
    /// one on or before it if `date` itself has no row. Used to build the
    /// `weight_7d_ago` map the cumulative-change guardrail compares
    /// against.
    pub async fn weights_as_of(&self, date: NaiveDate) -> Result<HashMap<String, f64>, AnalysisError> {
        let rows = sqlx::query(
            r#"
            SELECT agent_name, weight FROM agent_weights_history w
            WHERE date = (
                SELECT MAX(date) FROM agent_weights_history
                WHERE agent_name = w.agent_name AND date <= ?
            )
            "#,
        )
        .bind(date.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter()
            .map(|row| {
                let agent_name: String = row.try_get("agent_name").map_err(db_err)?;
                let weight: f64 = row.try_get("weight").map_err(db_err)?;
                Ok((agent_name, weight))
            })
            .collect()
    }

    /// The market regime recorded by the previous run, tracked as a
    /// `system_config` row since it's a single scalar of process state
    /// rather than a history.
    pub async fn latest_regime(&self) -> Result<Option<MarketRegime>, AnalysisError> {
        let row = sqlx::query("SELECT value FROM system_config WHERE key = 'LAST_MARKET_REGIME'")
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.and_then(|r| r.try_get::<String, _>("value").ok()).and_then(|v| parse_regime(&v)))
    }

    pub async fn set_latest_regime(&self, regime: MarketRegime) -> Result<(), AnalysisError> {
        sqlx::query(
            r#"
            INSERT INTO system_config (key, value, updated_at) VALUES ('LAST_MARKET_REGIME', ?, ?)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(regime.as_str())
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Dates of every REGIME_SHIFT event on or after `since`, for the
    /// "3+ shifts in 7 days" freeze rule.
    pub async fn recent_regime_shift_dates(&self, since: NaiveDate) -> Result<Vec<NaiveDate>, AnalysisError> {
        let rows = sqlx::query("SELECT date FROM learning_log WHERE event_type = 'REGIME_SHIFT' AND date >= ?")
            .bind(since.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|row| {
                let date: String = row.try_get("date").map_err(db_err)?;
                NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| AnalysisError::DatabaseError(e.to_string()))
            })
            .collect()
    }

    /// Up to the last 7 daily weight deltas for one agent, oldest first,
    /// the THRASHING detector's input. A weight history shorter than two
    /// rows yields no deltas at all.
    pub async fn recent_weight_deltas(&self, agent_name: &str, as_of: NaiveDate) -> Result<Vec<f64>, AnalysisError> {
        let rows = sqlx::query(
            r#"
            SELECT weight FROM agent_weights_history
            WHERE agent_name = ? AND date <= ?
            ORDER BY date DESC
            LIMIT 8
            "#,
        )
        .bind(agent_name)
        .bind(as_of.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let weights: Vec<f64> = rows
            .iter()
            .map(|row| row.try_get::<f64, _>("weight").map_err(db_err))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(weights.windows(2).rev().map(|pair| pair[0] - pair[1]).collect())
    }

    /// The most recent weight on file for each agent, for building the
    /// next run's `weight_7d_ago` map and old-weight inputs.
    pub async fn latest_weights(&self) -> Result<Vec<(String, f64)>, AnalysisError> {
        let rows = sqlx::query(
            r#"
            SELECT agent_name, weight FROM agent_weights_history w
            WHERE date = (SELECT MAX(date) FROM agent_weights_history WHERE agent_name = w.agent_name)
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter()
            .map(|row| {
                let agent_name: String = row.try_get("agent_name").map_err(db_err)?;
                let weight: f64 = row.try_get("weight").map_err(db_err)?;
                Ok((agent_name, weight))
            })
            .collect()
    }
}

#[allow(clippy::too_many_arguments)]
async fn insert_event(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    date: NaiveDate,
    event_type: &str,
    agent_name: Option<&str>,
    old_value: Option<f64>,
    new_value: Option<f64>,
    bias_type: Option<&str>,
    correction_applied: Option<&str>,
    reasoning: &str,
    confidence_level: Option<f64>,
) -> Result<(), AnalysisError> {
    sqlx::query(
        r#"
        INSERT INTO learning_log
            (date, event_type, agent_name, old_value, new_value, bias_type, correction_applied, reasoning, confidence_level)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(date.to_string())
    .bind(event_type)
    .bind(agent_name)
    .bind(old_value)
    .bind(new_value)
    .bind(bias_type)
    .bind(correction_applied)
    .bind(reasoning)
    .bind(confidence_level)
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(())
}

fn db_err(e: sqlx::Error) -> AnalysisError {
    AnalysisError::DatabaseError(e.to_string())
}

fn parse_regime(s: &str) -> Option<MarketRegime> {
    match s {
        "NORMAL" => Some(MarketRegime::Normal),
        "HIGH_VOLATILITY" => Some(MarketRegime::HighVolatility),
        "BEAR_MARKET" => Some(MarketRegime::BearMarket),
        "DIVERGENCE" => Some(MarketRegime::Divergence),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bias::BiasReport;
    use crate::regime::RegimeDetection;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    async fn memory_store() -> LearningStore {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await.unwrap();
        let schema = include_str!("../../../schema.sql");
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&pool).await.unwrap();
            }
        }
        LearningStore::new(pool)
    }

    fn applied_outcome() -> LearningRunOutcome {
        LearningRunOutcome::Applied {
            weights: vec![("rsi_agent".to_string(), 1.1)],
            report: BiasReport::default(),
            regime: RegimeDetection { regime: MarketRegime::Normal, confidence: 0.9, reasoning: String::new() },
            confidence: 0.95,
        }
    }

    #[tokio::test]
    async fn applied_outcome_persists_weight_and_event() {
        let store = memory_store().await;
        let date = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        store.record(date, &[], &applied_outcome()).await.unwrap();

        let latest = store.latest_weights().await.unwrap();
        assert_eq!(latest, vec![("rsi_agent".to_string(), 1.1)]);
    }

    #[tokio::test]
    async fn a_second_commit_for_the_same_date_is_a_no_op() {
        let store = memory_store().await;
        let date = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        store.record(date, &[], &applied_outcome()).await.unwrap();

        let mut second = applied_outcome();
        if let LearningRunOutcome::Applied { weights, .. } = &mut second {
            weights[0].1 = 1.9;
        }
        store.record(date, &[], &second).await.unwrap();

        let latest = store.latest_weights().await.unwrap();
        assert_eq!(latest, vec![("rsi_agent".to_string(), 1.1)]);
    }

    #[tokio::test]
    async fn manual_override_is_recorded_with_full_confidence() {
        let store = memory_store().await;
        let date = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        store.record_manual_override(date, "rsi_agent", 1.0, 1.5).await.unwrap();
        let latest = store.latest_weights().await.unwrap();
        assert_eq!(latest, vec![("rsi_agent".to_string(), 1.5)]);
    }
}
