use std::collections::HashMap;
use std::sync::Arc;

use agent_framework::{FactorSchema, LLMAgent, RuleBasedAgent};
use analysis_core::{AlertSink, AnalyzerAgent, LLMClient, QuoteSource, SentimentSource};
use anyhow::Result;
use backtest_engine::{BacktestDb, HistoricalBarsProvider};
use learning_loop::{regime::MarketSignalsSource, LearningStore};
use risk_translator::{SignalDb, SignalStore};
use signal_engine::adapters::mock::{DemoHistoricalBars, DemoLLMClient, DemoMarketData, DemoMarketSignals, DemoSentiment, LoggingAlertSink};
use signal_engine::cache::DataCache;
use signal_engine::{scheduler, EngineConfig, EngineContext};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let json_logging =
        std::env::var("RUST_LOG_FORMAT").map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("starting signal-engine");

    let config = EngineConfig::from_env()?;
    tracing::info!(
        watchlist = ?config.watchlist,
        portfolio_value = %config.portfolio_value,
        auto_learning_enabled = config.auto_learning_enabled,
        "configuration loaded"
    );

    let signal_db = SignalDb::new(&config.database_url).await?;
    let pool = signal_db.pool().clone();
    let signal_store = SignalStore::new(signal_db);
    let backtest_db = BacktestDb::new(pool.clone());
    let learning_store = LearningStore::new(pool);

    let market_data = Arc::new(DemoMarketData::default());
    let sentiment_source: Arc<dyn SentimentSource> = Arc::new(DemoSentiment);
    let quote_source: Arc<dyn QuoteSource> = market_data.clone();
    let indicator_source = market_data.clone();
    let llm_client: Arc<dyn LLMClient> = Arc::new(DemoLLMClient { bias: 0.2 });
    let alert_sink: Arc<dyn AlertSink> = Arc::new(LoggingAlertSink);
    let market_signals_source: Arc<dyn MarketSignalsSource> = Arc::new(DemoMarketSignals);
    let historical_bars: Arc<dyn HistoricalBarsProvider> = Arc::new(DemoHistoricalBars);

    let agents: Vec<Box<dyn AnalyzerAgent>> = vec![
        Box::new(RuleBasedAgent::new("rule_based_agent", indicator_source.clone(), sentiment_source.clone())),
        Box::new(LLMAgent::new(
            "llm_momentum_agent",
            "You are an equity analyst. Given a ticker, report a score in [-1, 1], a confidence in \
             [0, 1], a one-sentence reasoning, and the named factors that drove the score.",
            FactorSchema::new(["trend", "catalyst_risk"]),
            llm_client,
        )),
    ];

    let ctx = EngineContext {
        watchlist: config.watchlist.clone(),
        portfolio_value: config.portfolio_value,
        agents,
        weights: ensemble::WeightTable(HashMap::new()),
        quote_source,
        sentiment_source,
        market_signals_source,
        alert_sink,
        cache: DataCache::new(),
        signal_store,
        backtest_db,
        historical_bars,
        learning_store,
        learning_config: config.learning_config(),
    };

    scheduler::run(ctx, &config).await?;

    tracing::info!("signal-engine shut down");
    Ok(())
}
