//! Wires one ticker through the full decision pipeline: gather opinions,
//! fold them into a consensus, translate to risk parameters, and persist.
//! This is the seam `jobs::generate_daily_signals` drives over the whole
//! watchlist.

use std::sync::Arc;

use analysis_core::{AgentAnalysis, AnalysisError, ConsensusSignal, QuoteSource, StoredSignal, StoredSignalType};
use chrono::Utc;
use risk_translator::{confidence_to_stars, is_actionable, translate, SignalStore};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;

use crate::cache::{CachedQuote, DataCache};

/// The result of running one ticker through the pipeline once.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// A HOLD, or a sized BUY/SELL with no conviction -- nothing is stored.
    NotActionable { ticker: String, signal: ConsensusSignal },
    /// A new pending signal was written, with its id.
    Stored { signal_id: i64, signal: ConsensusSignal },
}

/// Derives a usable entry price from the bid/ask midpoint and caches it,
/// so later jobs (performance analysis, daily summaries) can read a quote
/// without another round trip to the quote source.
pub async fn refresh_quote_cache(
    ticker: &str,
    quotes: &dyn QuoteSource,
    cache: &DataCache,
) -> Result<Decimal, AnalysisError> {
    let quote = quotes.latest_quote(ticker).await?;
    let mid = (quote.bid + quote.ask) / 2.0;
    cache.put_quote(
        ticker,
        CachedQuote { current_price: mid, change_percent: None, volume: None },
        quote.timestamp,
    );
    Decimal::from_f64(mid).ok_or_else(|| AnalysisError::InvalidData(format!("non-finite quote for {ticker}")))
}

/// Runs the ensemble for `ticker`, translates an actionable result into
/// risk parameters, and persists signal + supporting analyses. Returns
/// `NotActionable` without writing anything for a HOLD or an unsized
/// BUY/SELL, matching [`risk_translator::is_actionable`].
pub async fn run_pipeline(
    ticker: &str,
    agents: &[Box<dyn analysis_core::AnalyzerAgent>],
    weights: &ensemble::WeightTable,
    entry_price: Decimal,
    portfolio_value: Decimal,
    store: &SignalStore,
    run_label: &str,
) -> Result<PipelineOutcome, AnalysisError> {
    let consensus = ensemble::run_ensemble(ticker, agents, weights).await;

    if !is_actionable(&consensus) {
        return Ok(PipelineOutcome::NotActionable { ticker: ticker.to_string(), signal: consensus });
    }

    let risk = translate(&consensus, entry_price, portfolio_value);
    let stars = confidence_to_stars(consensus.confidence);

    let signal = StoredSignal {
        id: None,
        ticker: ticker.to_string(),
        signal_type: consensus.signal_class.to_stored_type(),
        confidence: stars,
        entry_price: risk.entry_price,
        target_price: risk.target_price,
        stop_loss: risk.stop_loss,
        share_count: risk.share_count,
        status: analysis_core::SignalStatus::Pending,
        created_at: Utc::now(),
        executed_at: None,
        closed_at: None,
        pnl: None,
        notes: Some(format!(
            "run={run_label} agreement_ratio={:.2} raw_score={:.2}",
            consensus.agreement_ratio, consensus.raw_score
        )),
    };

    let analyses: Vec<AgentAnalysis> = consensus
        .opinions
        .iter()
        .map(|opinion| AgentAnalysis {
            id: None,
            signal_id: 0, // filled in by store_signal's insert
            agent_name: opinion.agent_name.clone(),
            recommendation: signal_type_from_class(opinion.signal_class),
            confidence: confidence_to_stars(opinion.confidence),
            reasoning: opinion.reasoning.clone(),
            factors_snapshot: opinion.factors.clone(),
            timestamp: opinion.timestamp,
        })
        .collect();

    let signal_id = store.store_signal(&signal, &analyses).await?;

    Ok(PipelineOutcome::Stored { signal_id, signal: consensus })
}

fn signal_type_from_class(class: analysis_core::SignalClass) -> StoredSignalType {
    class.to_stored_type()
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{AgentOpinion, Quote};
    use async_trait::async_trait;
    use chrono::Utc;

    struct FixedQuote(f64);

    #[async_trait]
    impl QuoteSource for FixedQuote {
        async fn latest_quote(&self, _ticker: &str) -> Result<Quote, AnalysisError> {
            Ok(Quote { timestamp: Utc::now(), bid: self.0 - 0.01, ask: self.0 + 0.01, bid_size: 1, ask_size: 1 })
        }
    }

    #[tokio::test]
    async fn refresh_quote_cache_stores_the_midpoint() {
        let cache = DataCache::new();
        let price = refresh_quote_cache("AAPL", &FixedQuote(190.0), &cache).await.unwrap();
        assert_eq!(price.round_dp(0), Decimal::from(190));
        assert!(cache.latest_quote("AAPL").is_some());
    }

    struct FixedAgent(AgentOpinion);

    #[async_trait]
    impl analysis_core::AnalyzerAgent for FixedAgent {
        fn name(&self) -> &str {
            &self.0.agent_name
        }
        async fn analyze(&self, _ticker: &str) -> AgentOpinion {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn unanimous_bullish_opinions_produce_a_stored_signal() {
        let db = risk_translator::SignalDb::new("sqlite::memory:").await.unwrap();
        let store = SignalStore::new(db);

        let agents: Vec<Box<dyn analysis_core::AnalyzerAgent>> = vec![
            Box::new(FixedAgent(AgentOpinion::from_score("a", "AAPL", 0.8, 0.9, "bullish", Default::default()))),
            Box::new(FixedAgent(AgentOpinion::from_score("b", "AAPL", 0.7, 0.85, "bullish", Default::default()))),
        ];
        let weights = ensemble::WeightTable(std::collections::HashMap::new());

        let outcome = run_pipeline("AAPL", &agents, &weights, Decimal::from(100), Decimal::from(100_000), &store, "0900")
            .await
            .unwrap();

        match outcome {
            PipelineOutcome::Stored { signal_id, .. } => assert!(signal_id > 0),
            PipelineOutcome::NotActionable { .. } => panic!("expected a stored signal"),
        }
    }

    #[tokio::test]
    async fn split_opinions_produce_no_write() {
        let db = risk_translator::SignalDb::new("sqlite::memory:").await.unwrap();
        let store = SignalStore::new(db);

        let agents: Vec<Box<dyn analysis_core::AnalyzerAgent>> = vec![
            Box::new(FixedAgent(AgentOpinion::from_score("a", "AAPL", 0.6, 0.8, "bullish", Default::default()))),
            Box::new(FixedAgent(AgentOpinion::from_score("b", "AAPL", -0.6, 0.8, "bearish", Default::default()))),
        ];
        let weights = ensemble::WeightTable(std::collections::HashMap::new());

        let outcome = run_pipeline("AAPL", &agents, &weights, Decimal::from(100), Decimal::from(100_000), &store, "0900")
            .await
            .unwrap();

        assert!(matches!(outcome, PipelineOutcome::NotActionable { .. }));
    }
}
