//! The seven scheduled jobs from the task surface. Each takes an
//! [`EngineContext`] and runs once; the scheduler decides when to call
//! them. A per-ticker failure inside a batch job is logged and skipped,
//! never aborts the rest of the batch.

use std::collections::HashMap;
use std::sync::Arc;

use analysis_core::{AlertSink, AnalyzerAgent, MarketRegime, QuoteSource, SentimentSource, SignalStatus, StoredSignalType};
use chrono::{NaiveDate, Utc};
use learning_loop::{
    regime::MarketSignalsSource, rolling_performance, run as run_learning_loop, AgentInput, AgentPerformance,
    LearningLoopConfig, LearningRunOutcome, LearningStore,
};
use risk_translator::SignalStore;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;

use crate::cache::{CachedQuote, DataCache};
use crate::pipeline::{run_pipeline, PipelineOutcome};

/// Everything a job needs: adapters, the shared cache, and the three
/// persistence handles. Built once in `main` and shared across every job.
pub struct EngineContext {
    pub watchlist: Vec<String>,
    pub portfolio_value: Decimal,
    pub agents: Vec<Box<dyn AnalyzerAgent>>,
    pub weights: ensemble::WeightTable,
    pub quote_source: Arc<dyn QuoteSource>,
    pub sentiment_source: Arc<dyn SentimentSource>,
    pub market_signals_source: Arc<dyn MarketSignalsSource>,
    pub alert_sink: Arc<dyn AlertSink>,
    pub cache: DataCache,
    pub signal_store: SignalStore,
    pub backtest_db: backtest_engine::BacktestDb,
    pub historical_bars: Arc<dyn backtest_engine::HistoricalBarsProvider>,
    pub learning_store: LearningStore,
    pub learning_config: LearningLoopConfig,
}

/// Runs the backtest simulator over every signal on file and persists the
/// resulting trades and metrics. Not on the wall-clock schedule; invoked
/// on demand by an operator or an external thin surface.
pub async fn run_backtest_now(
    ctx: &EngineContext,
    config: &backtest_engine::BacktestConfig,
) -> Result<backtest_engine::BacktestOutcome, analysis_core::AnalysisError> {
    let signals = ctx.signal_store.list_all().await?;
    let outcome = backtest_engine::run_backtest(&signals, ctx.historical_bars.as_ref(), config)?;
    ctx.backtest_db
        .save_run(
            outcome.backtest_id,
            config.start_date,
            config.end_date,
            config.allocation_mode.description(),
            config.rng_seed,
            config.starting_capital,
            &outcome.metrics,
            &outcome.trades,
        )
        .await?;
    Ok(outcome)
}

/// Refreshes the cached quote for every ticker in the watchlist.
pub async fn fetch_market_data(ctx: &EngineContext) {
    for ticker in &ctx.watchlist {
        match ctx.quote_source.latest_quote(ticker).await {
            Ok(quote) => {
                let mid = (quote.bid + quote.ask) / 2.0;
                ctx.cache.put_quote(
                    ticker,
                    CachedQuote { current_price: mid, change_percent: None, volume: None },
                    quote.timestamp,
                );
                tracing::debug!(job = "fetch_market_data", ticker = %ticker, price = mid, "quote refreshed");
            }
            Err(error) => {
                tracing::warn!(job = "fetch_market_data", ticker = %ticker, %error, "quote refresh failed");
            }
        }
    }
}

/// Refreshes the cached sentiment snapshot for every ticker in the
/// watchlist.
pub async fn fetch_sentiment(ctx: &EngineContext) {
    for ticker in &ctx.watchlist {
        match ctx.sentiment_source.sentiment(ticker).await {
            Ok(snapshot) => {
                ctx.cache.put_sentiment(ticker, snapshot, Utc::now());
                tracing::debug!(job = "fetch_sentiment", ticker = %ticker, "sentiment refreshed");
            }
            Err(error) => {
                tracing::warn!(job = "fetch_sentiment", ticker = %ticker, %error, "sentiment refresh failed");
            }
        }
    }
}

/// Runs the ensemble over every ticker and persists actionable signals.
/// `run_label` (e.g. `"0900"`, `"1200"`) is folded into the dedup key with
/// the ticker and today's date so a retried or doubly-scheduled run never
/// produces a second signal for the same slot.
pub async fn generate_daily_signals(ctx: &EngineContext, run_label: &str) {
    let today = Utc::now().date_naive();

    let already_run: Vec<String> = match ctx.signal_store.list_all().await {
        Ok(signals) => signals
            .iter()
            .filter(|s| s.created_at.date_naive() == today)
            .filter(|s| s.notes.as_deref().is_some_and(|n| n.contains(&format!("run={run_label}"))))
            .map(|s| s.ticker.clone())
            .collect(),
        Err(error) => {
            tracing::error!(job = "generate_daily_signals", %error, "could not check existing signals, proceeding without dedup");
            Vec::new()
        }
    };

    for ticker in &ctx.watchlist {
        if already_run.contains(ticker) {
            tracing::debug!(job = "generate_daily_signals", ticker = %ticker, run_label, "already produced today, skipping");
            continue;
        }

        let entry_price = match ctx.cache.latest_quote(ticker) {
            Some(cached) => Decimal::from_f64(cached.current_price).unwrap_or_default(),
            None => match ctx.quote_source.latest_quote(ticker).await {
                Ok(quote) => Decimal::from_f64((quote.bid + quote.ask) / 2.0).unwrap_or_default(),
                Err(error) => {
                    tracing::warn!(job = "generate_daily_signals", ticker = %ticker, %error, "no quote available, skipping");
                    continue;
                }
            },
        };

        match run_pipeline(ticker, &ctx.agents, &ctx.weights, entry_price, ctx.portfolio_value, &ctx.signal_store, run_label)
            .await
        {
            Ok(PipelineOutcome::Stored { signal_id, signal }) => {
                tracing::info!(
                    job = "generate_daily_signals",
                    ticker = %ticker,
                    signal_id,
                    class = ?signal.signal_class,
                    confidence = signal.confidence,
                    "signal stored"
                );
            }
            Ok(PipelineOutcome::NotActionable { ticker, .. }) => {
                tracing::debug!(job = "generate_daily_signals", ticker = %ticker, "not actionable, nothing stored");
            }
            Err(error) => {
                tracing::warn!(job = "generate_daily_signals", ticker = %ticker, %error, "pipeline run failed");
            }
        }
    }

    dispatch_pending_alerts(ctx).await;
}

/// The dedup label for a wall-clock-scheduled run, e.g. `09:00` -> `"0900"`.
pub fn run_label_for(hour: u32, minute: u32) -> String {
    format!("{hour:02}{minute:02}")
}

/// Sends every staged, undelivered alert through the configured sink and
/// marks each one sent. Delivery failures are logged and left in the
/// queue for the next pass.
pub async fn dispatch_pending_alerts(ctx: &EngineContext) {
    let pending = match ctx.signal_store.list_unsent_alerts().await {
        Ok(rows) => rows,
        Err(error) => {
            tracing::error!(job = "dispatch_pending_alerts", %error, "could not read alert queue");
            return;
        }
    };

    for (id, subject, body) in pending {
        match ctx.alert_sink.send(&subject, &body).await {
            Ok(()) => {
                if let Err(error) = ctx.signal_store.mark_alert_sent(id).await {
                    tracing::error!(job = "dispatch_pending_alerts", alert_id = id, %error, "failed to mark alert sent");
                }
            }
            Err(error) => {
                tracing::warn!(job = "dispatch_pending_alerts", alert_id = id, %error, "alert delivery failed, will retry");
            }
        }
    }
}

/// Compares every non-terminal signal to its current cached price and
/// advances the lifecycle when the stop loss or target is touched.
pub async fn analyze_signal_performance(ctx: &EngineContext) {
    let signals = match ctx.signal_store.list_all().await {
        Ok(signals) => signals,
        Err(error) => {
            tracing::error!(job = "analyze_signal_performance", %error, "could not load signals");
            return;
        }
    };

    for signal in signals {
        if matches!(signal.status, SignalStatus::Closed) {
            continue;
        }
        let Some(id) = signal.id else { continue };
        let Some(current) = ctx.cache.latest_quote(&signal.ticker) else { continue };
        let current_price = Decimal::from_f64(current.current_price).unwrap_or_default();

        let hit_target = match signal.signal_type {
            StoredSignalType::Buy => current_price >= signal.target_price,
            StoredSignalType::Sell => current_price <= signal.target_price,
            StoredSignalType::Hold => false,
        };
        let hit_stop = match signal.signal_type {
            StoredSignalType::Buy => current_price <= signal.stop_loss,
            StoredSignalType::Sell => current_price >= signal.stop_loss,
            StoredSignalType::Hold => false,
        };

        if !hit_target && !hit_stop {
            continue;
        }

        let pnl = match signal.signal_type {
            StoredSignalType::Buy => (current_price - signal.entry_price) * Decimal::from(signal.share_count),
            StoredSignalType::Sell => (signal.entry_price - current_price) * Decimal::from(signal.share_count),
            StoredSignalType::Hold => Decimal::ZERO,
        };

        if matches!(signal.status, SignalStatus::Pending) {
            if let Err(error) = ctx.signal_store.advance_status(id, SignalStatus::Approved).await {
                tracing::warn!(job = "analyze_signal_performance", signal_id = id, %error, "could not approve");
                continue;
            }
        }
        if let Err(error) = ctx.signal_store.advance_status(id, SignalStatus::Executed).await {
            tracing::warn!(job = "analyze_signal_performance", signal_id = id, %error, "could not mark executed");
            continue;
        }
        match ctx.signal_store.close_with_pnl(id, pnl).await {
            Ok(()) => {
                tracing::info!(job = "analyze_signal_performance", signal_id = id, ?pnl, hit_target, hit_stop, "signal closed");
            }
            Err(error) => {
                tracing::warn!(job = "analyze_signal_performance", signal_id = id, %error, "could not close with pnl");
            }
        }
    }
}

/// Builds the per-agent input the learning loop needs: closed-trade
/// history, old weight, and recent weight deltas for the thrashing
/// detector.
async fn build_agent_inputs(ctx: &EngineContext, as_of: NaiveDate) -> Vec<AgentInput> {
    let closed_rows = ctx.signal_store.closed_trade_rows().await.unwrap_or_default();
    let latest_weights: HashMap<String, f64> = ctx.learning_store.latest_weights().await.unwrap_or_default().into_iter().collect();

    let mut inputs = Vec::new();
    for agent in &ctx.agents {
        let name = agent.name().to_string();
        let history = closed_rows
            .iter()
            .filter(|row| row.agent_name == name)
            .map(|row| learning_loop::AgentTradeRecord {
                agent_name: row.agent_name.clone(),
                closed_at: row.closed_at,
                recommendation: row.recommendation,
                pnl: row.pnl,
            })
            .collect();
        let recent_weight_changes = ctx.learning_store.recent_weight_deltas(&name, as_of).await.unwrap_or_default();
        inputs.push(AgentInput {
            agent_name: name.clone(),
            old_weight: latest_weights.get(&name).copied().unwrap_or(1.0),
            closed_trade_history: history,
            recent_weight_changes,
        });
    }
    inputs
}

/// Runs one LearningLoop cycle: proposes weight changes from rolling
/// performance, applies bias corrections, checks guardrails, and gates on
/// the configured apply policy. Persists the outcome regardless of which
/// branch it took.
pub async fn optimize_agent_weights(ctx: &EngineContext) {
    let as_of = Utc::now().date_naive();

    let market_signals = match ctx.market_signals_source.current_signals().await {
        Ok(signals) => signals,
        Err(error) => {
            tracing::error!(job = "optimize_agent_weights", %error, "could not read market signals, skipping run");
            return;
        }
    };

    let agents = build_agent_inputs(ctx, as_of).await;
    let weight_7d_ago = ctx.learning_store.weights_as_of(as_of - chrono::Duration::days(7)).await.unwrap_or_default();
    let previous_regime = ctx.learning_store.latest_regime().await.unwrap_or(None);
    let shift_dates = ctx
        .learning_store
        .recent_regime_shift_dates(as_of - chrono::Duration::days(7))
        .await
        .unwrap_or_default();

    let outcome = run_learning_loop(
        &agents,
        &market_signals,
        previous_regime,
        &shift_dates,
        &weight_7d_ago,
        as_of,
        &ctx.learning_config,
    );

    let perfs: Vec<AgentPerformance> =
        agents.iter().map(|a| rolling_performance(&a.agent_name, &a.closed_trade_history, as_of)).collect();

    if let Err(error) = ctx.learning_store.record(as_of, &perfs, &outcome).await {
        tracing::error!(job = "optimize_agent_weights", %error, "failed to persist learning run outcome");
    }

    let regime = match &outcome {
        LearningRunOutcome::Applied { regime, .. }
        | LearningRunOutcome::PendingReview { regime, .. }
        | LearningRunOutcome::LearningFrozen { regime, .. } => Some(regime.regime),
        LearningRunOutcome::GuardrailBlocked { .. } => None,
    };
    if let Some(regime) = regime {
        if previous_regime.is_some_and(|previous| previous != regime) || previous_regime.is_none() {
            if let Some(previous) = previous_regime {
                let _ = ctx.learning_store.record_regime_shift(as_of, previous, regime).await;
            }
            let _ = ctx.learning_store.set_latest_regime(regime).await;
        }
    }

    match &outcome {
        LearningRunOutcome::Applied { weights, .. } => {
            tracing::info!(job = "optimize_agent_weights", updates = weights.len(), "weights applied");
        }
        LearningRunOutcome::PendingReview { confidence, .. } => {
            let _ = ctx
                .alert_sink
                .send("Learning update pending review", &format!("confidence {confidence:.2} below auto-apply threshold"))
                .await;
        }
        LearningRunOutcome::GuardrailBlocked { violations } => {
            let summary = violations.iter().map(|v| v.0.clone()).collect::<Vec<_>>().join("; ");
            let _ = ctx.alert_sink.send("Learning update blocked by guardrail", &summary).await;
        }
        LearningRunOutcome::LearningFrozen { reason, .. } => {
            tracing::warn!(job = "optimize_agent_weights", reason, "learning frozen this cycle");
        }
    }
}

/// Runs the bias detectors against current rolling performance without
/// touching weights, for an on-demand health check.
pub async fn check_critical_biases(ctx: &EngineContext) -> learning_loop::BiasReport {
    let as_of = Utc::now().date_naive();
    let agents = build_agent_inputs(ctx, as_of).await;
    let perfs: Vec<AgentPerformance> =
        agents.iter().map(|a| rolling_performance(&a.agent_name, &a.closed_trade_history, as_of)).collect();

    let mut report = learning_loop::BiasReport::default();
    if let Some(finding) = learning_loop::bias::detect_overfitting(&perfs) {
        report.findings.push(finding);
    }
    if let Some(finding) = learning_loop::bias::detect_recency(&perfs) {
        report.findings.push(finding);
    }
    let thrashing_input: Vec<(String, Vec<f64>)> =
        agents.iter().map(|a| (a.agent_name.clone(), a.recent_weight_changes.clone())).collect();
    if let Some(finding) = learning_loop::bias::detect_thrashing(&thrashing_input) {
        report.findings.push(finding);
    }

    if !report.findings.is_empty() {
        let summary = report.findings.iter().map(|f| f.bias_type.as_str()).collect::<Vec<_>>().join(", ");
        let _ = ctx.alert_sink.send("Critical bias check found issues", &summary).await;
    }

    report
}

/// Pushes a digest of today's new signals through the alert hook.
pub async fn send_daily_summary(ctx: &EngineContext) {
    let today = Utc::now().date_naive();
    let signals = match ctx.signal_store.list_all().await {
        Ok(signals) => signals,
        Err(error) => {
            tracing::error!(job = "send_daily_summary", %error, "could not load signals");
            return;
        }
    };

    let todays: Vec<_> = signals.into_iter().filter(|s| s.created_at.date_naive() == today).collect();
    if todays.is_empty() {
        tracing::debug!(job = "send_daily_summary", "no signals today, skipping digest");
        return;
    }

    let body = todays
        .iter()
        .map(|s| format!("{} {} x{} @ {}", s.signal_type.as_str(), s.ticker, s.share_count, s.entry_price))
        .collect::<Vec<_>>()
        .join("\n");

    if let Err(error) = ctx.alert_sink.send(&format!("Daily summary: {} signals", todays.len()), &body).await {
        tracing::warn!(job = "send_daily_summary", %error, "digest delivery failed");
    }
}
