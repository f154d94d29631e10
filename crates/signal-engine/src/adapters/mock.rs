//! In-memory stand-ins for the six narrow adapter traits `analysis-core`
//! defines. Per spec section 1's explicit non-goals, concrete vendor
//! integrations (a real quote feed, a real LLM endpoint, Reddit/NewsAPI
//! scorers) are deliberately out of scope for this core; these types exist
//! only so `signal-engine` can be run end-to-end without one. A real
//! deployment swaps every one of these for a vendor-backed implementation
//! of the same trait -- nothing else in the pipeline changes.

use std::sync::atomic::{AtomicU64, Ordering};

use analysis_core::{
    AnalysisError, AlertSink, Bar, HistorySource, IndicatorSource, LLMClient, Quote, QuoteSource,
    SentimentSnapshot, SentimentSource, TechnicalIndicators, VolumeTrend,
};
use async_trait::async_trait;
use chrono::Utc;
use learning_loop::{MarketSignals, MarketSignalsSource};
use rand::Rng;

/// Deterministic-ish synthetic quote/history/indicator source: seeds a
/// per-ticker base price off its bytes so the same ticker always starts
/// near the same price, then walks it a little each call.
pub struct DemoMarketData {
    calls: AtomicU64,
}

impl Default for DemoMarketData {
    fn default() -> Self {
        Self { calls: AtomicU64::new(0) }
    }
}

fn base_price(ticker: &str) -> f64 {
    let sum: u32 = ticker.bytes().map(|b| b as u32).sum();
    50.0 + (sum % 400) as f64
}

#[async_trait]
impl QuoteSource for DemoMarketData {
    async fn latest_quote(&self, ticker: &str) -> Result<Quote, AnalysisError> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed);
        let base = base_price(ticker) + (n % 7) as f64 * 0.1;
        Ok(Quote {
            timestamp: Utc::now(),
            bid: base - 0.02,
            ask: base + 0.02,
            bid_size: 100,
            ask_size: 100,
        })
    }
}

#[async_trait]
impl HistorySource for DemoMarketData {
    async fn daily_bars(&self, ticker: &str, lookback_days: u32) -> Result<Vec<Bar>, AnalysisError> {
        let base = base_price(ticker);
        let mut rng = rand::thread_rng();
        let mut bars = Vec::with_capacity(lookback_days as usize);
        let mut price = base;
        for day in 0..lookback_days {
            let drift: f64 = rng.gen_range(-0.01..0.012);
            price *= 1.0 + drift;
            bars.push(Bar {
                timestamp: Utc::now() - chrono::Duration::days(day as i64),
                open: price * 0.995,
                high: price * 1.01,
                low: price * 0.99,
                close: price,
                volume: rng.gen_range(500_000.0..3_000_000.0),
                vwap: None,
            });
        }
        bars.reverse();
        Ok(bars)
    }
}

#[async_trait]
impl IndicatorSource for DemoMarketData {
    async fn indicators(&self, ticker: &str) -> Result<TechnicalIndicators, AnalysisError> {
        let bars = self.daily_bars(ticker, 60).await?;
        Ok(TechnicalIndicators {
            rsi_14: rsi_from_bars(&bars, 14),
            momentum_7d_pct: pct_change(&bars, 7),
            momentum_30d_pct: pct_change(&bars, 30),
            sma_50: sma(&bars, 50),
            sma_200: sma(&bars, bars.len().min(200)),
            volume_trend: volume_trend(&bars),
        })
    }
}

/// Computes RSI from a closing-price series, the fallback the spec
/// describes for when an indicators API is unavailable. Defaults to 50
/// (neutral) when there isn't enough history.
fn rsi_from_bars(bars: &[Bar], period: usize) -> f64 {
    if bars.len() <= period {
        return 50.0;
    }
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let mut gains = 0.0;
    let mut losses = 0.0;
    for window in closes.windows(2).rev().take(period) {
        let delta = window[1] - window[0];
        if delta >= 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }
    if losses == 0.0 {
        return 100.0;
    }
    let rs = (gains / period as f64) / (losses / period as f64);
    100.0 - (100.0 / (1.0 + rs))
}

fn pct_change(bars: &[Bar], days: usize) -> f64 {
    if bars.len() <= days {
        return 0.0;
    }
    let now = bars.last().unwrap().close;
    let then = bars[bars.len() - 1 - days].close;
    if then == 0.0 {
        0.0
    } else {
        (now - then) / then * 100.0
    }
}

fn sma(bars: &[Bar], window: usize) -> f64 {
    if bars.is_empty() {
        return 0.0;
    }
    let window = window.min(bars.len()).max(1);
    let slice = &bars[bars.len() - window..];
    slice.iter().map(|b| b.close).sum::<f64>() / slice.len() as f64
}

fn volume_trend(bars: &[Bar]) -> VolumeTrend {
    if bars.len() < 10 {
        return VolumeTrend::Neutral;
    }
    let recent: f64 = bars[bars.len() - 5..].iter().map(|b| b.volume).sum::<f64>() / 5.0;
    let prior: f64 = bars[bars.len() - 10..bars.len() - 5].iter().map(|b| b.volume).sum::<f64>() / 5.0;
    if prior == 0.0 {
        VolumeTrend::Neutral
    } else if recent > prior * 1.1 {
        VolumeTrend::Increasing
    } else if recent < prior * 0.9 {
        VolumeTrend::Decreasing
    } else {
        VolumeTrend::Neutral
    }
}

/// Synthesizes mildly-positive sentiment with enough mentions to exercise
/// the rule-based agent's sentiment factor, but with no real opinion --
/// `combined_sentiment` is a small, fixed, ticker-derived value.
pub struct DemoSentiment;

#[async_trait]
impl SentimentSource for DemoSentiment {
    async fn sentiment(&self, ticker: &str) -> Result<SentimentSnapshot, AnalysisError> {
        let sum: u32 = ticker.bytes().map(|b| b as u32).sum();
        let sentiment = ((sum % 21) as f64 - 10.0) / 20.0; // roughly [-0.5, 0.5]
        Ok(SentimentSnapshot {
            combined_sentiment: sentiment,
            news_mentions_7d: 20 + (sum % 30),
            social_mentions_7d: 40 + (sum % 60),
        })
    }
}

/// Stands in for an external model endpoint. Always returns a fixed,
/// mildly bullish structured reply so `LLMAgent` has something realistic
/// to parse; a real deployment points `LLMAgent` at an actual model
/// client instead.
pub struct DemoLLMClient {
    pub bias: f64,
}

#[async_trait]
impl LLMClient for DemoLLMClient {
    async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String, AnalysisError> {
        Ok(format!(
            r#"{{"score": {:.2}, "confidence": 0.65, "reasoning": "demo model output", "factors": {{"trend": {:.2}}}}}"#,
            self.bias, self.bias
        ))
    }
}

/// Logs alerts instead of delivering them anywhere; a real deployment
/// fans this out to Telegram/Discord/email.
pub struct LoggingAlertSink;

#[async_trait]
impl AlertSink for LoggingAlertSink {
    async fn send(&self, subject: &str, body: &str) -> Result<(), AnalysisError> {
        tracing::info!(subject, body, "alert (demo sink, not delivered externally)");
        Ok(())
    }
}

/// Synchronous bars provider for the backtest simulator: same synthetic
/// random walk as [`DemoMarketData`], generated directly since the
/// simulator's [`backtest_engine::HistoricalBarsProvider`] trait is
/// deliberately not async (bars are supplied up front, never fetched
/// mid-simulation).
pub struct DemoHistoricalBars;

impl backtest_engine::HistoricalBarsProvider for DemoHistoricalBars {
    fn bars_from(&self, ticker: &str, entry_date: chrono::NaiveDate, max_days: usize) -> Vec<Bar> {
        let mut rng = rand::thread_rng();
        let mut price = base_price(ticker);
        (0..max_days)
            .map(|i| {
                let drift: f64 = rng.gen_range(-0.01..0.012);
                price *= 1.0 + drift;
                Bar {
                    timestamp: entry_date.and_hms_opt(9, 30, 0).unwrap().and_utc() + chrono::Duration::days(i as i64),
                    open: price * 0.995,
                    high: price * 1.01,
                    low: price * 0.99,
                    close: price,
                    volume: rng.gen_range(500_000.0..3_000_000.0),
                    vwap: None,
                }
            })
            .collect()
    }
}

/// Fixed calm-market signals so the regime detector has something to
/// evaluate; a real deployment sources VIX/SPY/basket data from a macro
/// data provider.
pub struct DemoMarketSignals;

#[async_trait]
impl MarketSignalsSource for DemoMarketSignals {
    async fn current_signals(&self) -> Result<MarketSignals, AnalysisError> {
        Ok(MarketSignals {
            vix: 16.5,
            spy_price: 560.0,
            spy_sma_200: 540.0,
            ai_basket_spy_correlation_30d: 0.72,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn demo_market_data_produces_in_range_indicators() {
        let source = DemoMarketData::default();
        let indicators = source.indicators("AAPL").await.unwrap();
        assert!((0.0..=100.0).contains(&indicators.rsi_14));
    }

    #[tokio::test]
    async fn demo_sentiment_is_bounded() {
        let snapshot = DemoSentiment.sentiment("AAPL").await.unwrap();
        assert!(snapshot.combined_sentiment.abs() <= 1.0);
    }

    #[tokio::test]
    async fn demo_llm_client_returns_parseable_json() {
        let client = DemoLLMClient { bias: 0.4 };
        let raw = client.complete("role", "prompt").await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value.get("score").is_some());
    }
}
