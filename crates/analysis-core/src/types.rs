use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub vwap: Option<f64>,
}

/// Quote data (bid/ask)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub timestamp: DateTime<Utc>,
    pub bid: f64,
    pub ask: f64,
    pub bid_size: i64,
    pub ask_size: i64,
}

/// Trade data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub size: i64,
}

/// Company financials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Financials {
    pub symbol: String,
    pub fiscal_period: String,
    pub fiscal_year: i32,
    pub revenue: Option<f64>,
    pub gross_profit: Option<f64>,
    pub operating_income: Option<f64>,
    pub net_income: Option<f64>,
    pub eps: Option<f64>,
    pub total_assets: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub shareholders_equity: Option<f64>,
    pub cash_flow_operating: Option<f64>,
    pub cash_flow_investing: Option<f64>,
    pub cash_flow_financing: Option<f64>,
}

/// Analyst consensus rating (aggregated from multiple analysts)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusRating {
    pub consensus_rating: Option<String>,
    pub consensus_price_target: Option<f64>,
    pub high_price_target: Option<f64>,
    pub low_price_target: Option<f64>,
    pub buy_count: Option<i32>,
    pub hold_count: Option<i32>,
    pub sell_count: Option<i32>,
    pub contributors: Option<i32>,
}

/// Individual analyst rating
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystRating {
    pub price_target: Option<f64>,
    pub rating: Option<String>,
    pub rating_action: Option<String>,
    pub analyst: Option<String>,
    pub firm: Option<String>,
    pub date: Option<String>,
}

/// Wrapper for analyst consensus data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalystConsensusData {
    pub consensus: Option<ConsensusRating>,
    pub recent_ratings: Vec<AnalystRating>,
}

/// News article
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub published_utc: DateTime<Utc>,
    pub article_url: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub tickers: Vec<String>,
}

/// Signal strength
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SignalStrength {
    StrongBuy,
    Buy,
    WeakBuy,
    Neutral,
    WeakSell,
    Sell,
    StrongSell,
}

impl SignalStrength {
    /// Convert to numeric score (-100 to 100)
    pub fn to_score(&self) -> i32 {
        match self {
            SignalStrength::StrongBuy => 100,
            SignalStrength::Buy => 60,
            SignalStrength::WeakBuy => 30,
            SignalStrength::Neutral => 0,
            SignalStrength::WeakSell => -30,
            SignalStrength::Sell => -60,
            SignalStrength::StrongSell => -100,
        }
    }

    pub fn from_score(score: i32) -> Self {
        match score {
            s if s >= 70 => SignalStrength::StrongBuy,
            s if s >= 30 => SignalStrength::Buy,
            s if s >= 5 => SignalStrength::WeakBuy,
            s if s >= -5 => SignalStrength::Neutral,
            s if s >= -30 => SignalStrength::WeakSell,
            s if s >= -70 => SignalStrength::Sell,
            _ => SignalStrength::StrongSell,
        }
    }

    /// Human-readable label for the signal
    pub fn to_label(&self) -> &'static str {
        match self {
            SignalStrength::StrongBuy => "Strong Buy",
            SignalStrength::Buy => "Buy",
            SignalStrength::WeakBuy => "Weak Buy",
            SignalStrength::Neutral => "Neutral",
            SignalStrength::WeakSell => "Weak Sell",
            SignalStrength::Sell => "Sell",
            SignalStrength::StrongSell => "Strong Sell",
        }
    }
}

/// Analysis result from any analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub signal: SignalStrength,
    pub confidence: f64, // 0.0 to 1.0
    pub reason: String,
    pub metrics: serde_json::Value,
}

/// Combined analysis from all engines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedAnalysis {
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub current_price: Option<f64>,
    pub technical: Option<AnalysisResult>,
    pub fundamental: Option<AnalysisResult>,
    pub quantitative: Option<AnalysisResult>,
    pub sentiment: Option<AnalysisResult>,
    pub overall_signal: SignalStrength,
    pub overall_confidence: f64,
    pub recommendation: String,
    #[serde(default)]
    pub market_regime: Option<String>,
    /// Conviction tier: HIGH, MODERATE, LOW based on engine alignment + confidence
    #[serde(default)]
    pub conviction_tier: Option<String>,
    /// Per-engine time horizon tags (short/medium/long-term signals)
    #[serde(default)]
    pub time_horizon_signals: Option<serde_json::Value>,
    /// Supplementary signals from options, insiders, dividends, etc.
    #[serde(default)]
    pub supplementary_signals: Option<serde_json::Value>,
}

/// Timeframe for analysis
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Timeframe {
    Minute1,
    Minute5,
    Minute15,
    Minute30,
    Hour1,
    Hour4,
    Day1,
    Week1,
    Month1,
}

impl Timeframe {
    pub fn to_minutes(&self) -> i64 {
        match self {
            Timeframe::Minute1 => 1,
            Timeframe::Minute5 => 5,
            Timeframe::Minute15 => 15,
            Timeframe::Minute30 => 30,
            Timeframe::Hour1 => 60,
            Timeframe::Hour4 => 240,
            Timeframe::Day1 => 1440,
            Timeframe::Week1 => 10080,
            Timeframe::Month1 => 43200,
        }
    }
}

use std::collections::HashMap;

/// One of an agent's possible signal classifications, derived from a raw
/// score by fixed cutpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalClass {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl SignalClass {
    /// Per-agent cutpoints: +-0.2 and +-0.6.
    pub fn from_agent_score(score: f64) -> Self {
        if score >= 0.6 {
            SignalClass::StrongBuy
        } else if score >= 0.2 {
            SignalClass::Buy
        } else if score >= -0.2 {
            SignalClass::Hold
        } else if score >= -0.6 {
            SignalClass::Sell
        } else {
            SignalClass::StrongSell
        }
    }

    /// Consensus cutpoints are tighter: +-0.1 and +-0.5, since aggregation
    /// has already dampened extremes.
    pub fn from_consensus_score(score: f64) -> Self {
        if score >= 0.5 {
            SignalClass::StrongBuy
        } else if score >= 0.1 {
            SignalClass::Buy
        } else if score >= -0.1 {
            SignalClass::Hold
        } else if score >= -0.5 {
            SignalClass::Sell
        } else {
            SignalClass::StrongSell
        }
    }

    pub fn is_bullish(&self) -> bool {
        matches!(self, SignalClass::StrongBuy | SignalClass::Buy)
    }

    pub fn is_bearish(&self) -> bool {
        matches!(self, SignalClass::StrongSell | SignalClass::Sell)
    }

    /// Coalesces STRONG_BUY/STRONG_SELL into BUY/SELL for persistence; HOLD
    /// stays HOLD.
    pub fn to_stored_type(self) -> StoredSignalType {
        match self {
            SignalClass::StrongBuy | SignalClass::Buy => StoredSignalType::Buy,
            SignalClass::Hold => StoredSignalType::Hold,
            SignalClass::StrongSell | SignalClass::Sell => StoredSignalType::Sell,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoredSignalType {
    Buy,
    Sell,
    Hold,
}

impl StoredSignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoredSignalType::Buy => "BUY",
            StoredSignalType::Sell => "SELL",
            StoredSignalType::Hold => "HOLD",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSizeClass {
    None,
    Small,
    Medium,
    Normal,
    Large,
}

impl PositionSizeClass {
    /// `share_count = floor(portfolio_value * 0.10 * multiplier / entry_price)`.
    pub fn multiplier(&self) -> f64 {
        match self {
            PositionSizeClass::None => 0.0,
            PositionSizeClass::Small => 0.25,
            PositionSizeClass::Medium => 0.50,
            PositionSizeClass::Normal => 1.00,
            PositionSizeClass::Large => 1.50,
        }
    }
}

/// Ephemeral opinion emitted by one agent for one ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOpinion {
    pub agent_name: String,
    pub ticker: String,
    pub signal_class: SignalClass,
    pub confidence: f64,
    pub raw_score: f64,
    pub reasoning: String,
    pub factors: HashMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

impl AgentOpinion {
    /// Builds an opinion from a raw score, clamping score to [-1, 1] and
    /// confidence to [0, 1], and deriving `signal_class` from the agent
    /// cutpoints.
    pub fn from_score(
        agent_name: impl Into<String>,
        ticker: impl Into<String>,
        score: f64,
        confidence: f64,
        reasoning: impl Into<String>,
        factors: HashMap<String, f64>,
    ) -> Self {
        let raw_score = score.clamp(-1.0, 1.0);
        let confidence = confidence.clamp(0.0, 1.0);
        Self {
            agent_name: agent_name.into(),
            ticker: ticker.into(),
            signal_class: SignalClass::from_agent_score(raw_score),
            confidence,
            raw_score,
            reasoning: reasoning.into(),
            factors,
            timestamp: Utc::now(),
        }
    }

    /// The neutral opinion substituted whenever an agent cannot form a real
    /// judgment: invalid input, an open circuit breaker, or retry
    /// exhaustion.
    pub fn neutral(agent_name: impl Into<String>, ticker: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            ticker: ticker.into(),
            signal_class: SignalClass::Hold,
            confidence: 0.0,
            raw_score: 0.0,
            reasoning: reason.into(),
            factors: HashMap::new(),
            timestamp: Utc::now(),
        }
    }
}

/// Ephemeral consensus emitted by the ensemble for one ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusSignal {
    pub ticker: String,
    pub signal_class: SignalClass,
    pub confidence: f64,
    pub raw_score: f64,
    pub position_size_class: PositionSizeClass,
    pub agreement_ratio: f64,
    pub opinions: Vec<AgentOpinion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalStatus {
    Pending,
    Approved,
    Executed,
    Closed,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Pending => "PENDING",
            SignalStatus::Approved => "APPROVED",
            SignalStatus::Executed => "EXECUTED",
            SignalStatus::Closed => "CLOSED",
        }
    }

    /// Whether `self -> next` is a legal, forward-only lifecycle step.
    pub fn can_advance_to(&self, next: SignalStatus) -> bool {
        matches!(
            (self, next),
            (SignalStatus::Pending, SignalStatus::Approved)
                | (SignalStatus::Approved, SignalStatus::Executed)
                | (SignalStatus::Executed, SignalStatus::Closed)
        )
    }
}

/// Persistent record; one per decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSignal {
    pub id: Option<i64>,
    pub ticker: String,
    pub signal_type: StoredSignalType,
    pub confidence: i32, // 1..5
    pub entry_price: rust_decimal::Decimal,
    pub target_price: rust_decimal::Decimal,
    pub stop_loss: rust_decimal::Decimal,
    pub share_count: i64,
    pub status: SignalStatus,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub pnl: Option<rust_decimal::Decimal>,
    pub notes: Option<String>,
}

/// Persistent record; N per StoredSignal, one per opinion that fed into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAnalysis {
    pub id: Option<i64>,
    pub signal_id: i64,
    pub agent_name: String,
    pub recommendation: StoredSignalType,
    pub confidence: i32, // 1..5
    pub reasoning: String,
    pub factors_snapshot: HashMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only history row; the "current" weight for an agent is the
/// latest row by date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentWeight {
    pub id: Option<i64>,
    pub date: chrono::NaiveDate,
    pub agent_name: String,
    pub weight: f64,
    pub win_rate_7d: Option<f64>,
    pub win_rate_30d: Option<f64>,
    pub win_rate_90d: Option<f64>,
    pub trades_count_7d: i32,
    pub trades_count_30d: i32,
    pub trades_count_90d: i32,
    pub reasoning: Option<String>,
}

pub const WEIGHT_MIN_BOUND: f64 = 0.30;
pub const WEIGHT_MAX_BOUND: f64 = 2.00;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeResult {
    Win,
    Loss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    HoldPeriodEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionType {
    Core,
    Satellite,
    Equal,
}

/// Persistent record; one per simulated trade in a backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestTrade {
    pub id: Option<i64>,
    pub backtest_id: uuid::Uuid,
    pub signal_id: i64,
    pub entry_date: chrono::NaiveDate,
    pub exit_date: chrono::NaiveDate,
    pub entry_price: rust_decimal::Decimal,
    pub exit_price: rust_decimal::Decimal,
    pub shares: i64,
    pub pnl: rust_decimal::Decimal,
    pub pnl_pct: f64,
    pub result: TradeResult,
    pub days_held: i64,
    pub exit_reason: ExitReason,
    pub position_type: PositionType,
    pub allocation_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LearningEventType {
    WeightUpdate,
    BiasDetected,
    CorrectionApplied,
    RegimeShift,
    Freeze,
    Alert,
}

impl LearningEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningEventType::WeightUpdate => "WEIGHT_UPDATE",
            LearningEventType::BiasDetected => "BIAS_DETECTED",
            LearningEventType::CorrectionApplied => "CORRECTION_APPLIED",
            LearningEventType::RegimeShift => "REGIME_SHIFT",
            LearningEventType::Freeze => "FREEZE",
            LearningEventType::Alert => "ALERT",
        }
    }
}

/// Append-only audit record for the learning loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningEvent {
    pub id: Option<i64>,
    pub date: chrono::NaiveDate,
    pub event_type: LearningEventType,
    pub agent_name: Option<String>,
    pub old_value: Option<f64>,
    pub new_value: Option<f64>,
    pub bias_type: Option<String>,
    pub correction_applied: Option<String>,
    pub reasoning: String,
    pub confidence_level: Option<f64>,
}

/// Market regime, derived from VIX, SPY vs its 200-day SMA, and AI-sector
/// correlation. Used by the learning loop to dampen weight changes during
/// transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketRegime {
    Normal,
    HighVolatility,
    BearMarket,
    Divergence,
}

impl MarketRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketRegime::Normal => "NORMAL",
            MarketRegime::HighVolatility => "HIGH_VOLATILITY",
            MarketRegime::BearMarket => "BEAR_MARKET",
            MarketRegime::Divergence => "DIVERGENCE",
        }
    }
}
