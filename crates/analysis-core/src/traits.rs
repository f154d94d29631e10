use async_trait::async_trait;
use crate::{AgentOpinion, AnalysisError, AnalysisResult, Bar, Financials, NewsArticle, Quote};

/// Trait for technical analysis engines
#[async_trait]
pub trait TechnicalAnalyzer: Send + Sync {
    async fn analyze(&self, symbol: &str, bars: &[Bar]) -> Result<AnalysisResult, AnalysisError>;
}

/// Trait for fundamental analysis engines
#[async_trait]
pub trait FundamentalAnalyzer: Send + Sync {
    async fn analyze(&self, symbol: &str, financials: &Financials) -> Result<AnalysisResult, AnalysisError>;
}

/// Trait for quantitative analysis engines
#[async_trait]
pub trait QuantAnalyzer: Send + Sync {
    async fn analyze(&self, symbol: &str, bars: &[Bar]) -> Result<AnalysisResult, AnalysisError>;
}

/// Trait for sentiment analysis engines
#[async_trait]
pub trait SentimentAnalyzer: Send + Sync {
    async fn analyze(&self, symbol: &str, news: &[NewsArticle]) -> Result<AnalysisResult, AnalysisError>;
}

/// Current and recent quotes for a ticker. Implementations back this with a
/// live market-data API and a short-lived cache.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn latest_quote(&self, ticker: &str) -> Result<Quote, AnalysisError>;
}

/// Historical OHLCV bars, the raw material for technical factors and the
/// backtest simulator.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn daily_bars(&self, ticker: &str, lookback_days: u32) -> Result<Vec<Bar>, AnalysisError>;
}

/// Precomputed technical indicators (RSI, moving averages, momentum,
/// volume trend) for a ticker. Kept separate from `HistorySource` so an
/// implementation can delegate to a dedicated indicators API instead of
/// recomputing from bars.
#[async_trait]
pub trait IndicatorSource: Send + Sync {
    async fn indicators(&self, ticker: &str) -> Result<TechnicalIndicators, AnalysisError>;
}

/// News and social mentions feeding the sentiment factor.
#[async_trait]
pub trait SentimentSource: Send + Sync {
    async fn sentiment(&self, ticker: &str) -> Result<SentimentSnapshot, AnalysisError>;
}

/// A large language model invoked by `LLMAgent` with a role-specific prompt
/// and expected to return a structured opinion. Implementations own their
/// own reliability wrapping (retries, circuit breaking) against the
/// underlying API.
#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, AnalysisError>;
}

/// Destination for out-of-band notifications (a new signal, a freeze, a
/// bias correction). Implementations may fan out to multiple channels.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<(), AnalysisError>;
}

/// Categorical volume trend as reported by the indicator adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum VolumeTrend {
    Increasing,
    Decreasing,
    Neutral,
}

/// Snapshot of indicator values an agent scores against. Mirrors the
/// factors a rule-based agent reasons over. If the upstream indicator
/// source is unavailable, an adapter may compute RSI and moving averages
/// locally from the history series; RSI defaults to 50 when data is
/// insufficient.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TechnicalIndicators {
    pub rsi_14: f64,
    pub momentum_7d_pct: f64,
    pub momentum_30d_pct: f64,
    pub sma_50: f64,
    pub sma_200: f64,
    pub volume_trend: VolumeTrend,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SentimentSnapshot {
    pub combined_sentiment: f64,
    pub news_mentions_7d: u32,
    pub social_mentions_7d: u32,
}

/// Produces one opinion for one ticker. Implemented by rule-based and LLM
/// agents alike so the ensemble can treat them uniformly.
#[async_trait]
pub trait AnalyzerAgent: Send + Sync {
    fn name(&self) -> &str;
    async fn analyze(&self, ticker: &str) -> AgentOpinion;
}
