use std::collections::HashMap;
use std::sync::Arc;

use analysis_core::{AgentOpinion, AnalysisError, AnalyzerAgent, IndicatorSource, SentimentSource, VolumeTrend};
use async_trait::async_trait;

const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;
const RSI_NEUTRAL_LOW: f64 = 45.0;
const RSI_NEUTRAL_HIGH: f64 = 55.0;

/// Per-window strong/moderate momentum thresholds, in percent.
const MOMENTUM_7D_STRONG: f64 = 8.0;
const MOMENTUM_7D_MODERATE: f64 = 3.0;
const MOMENTUM_30D_STRONG: f64 = 15.0;
const MOMENTUM_30D_MODERATE: f64 = 5.0;

/// Per-factor weights summing to 1.0, used to blend the five scored
/// factors into a single raw score.
#[derive(Debug, Clone, Copy)]
pub struct RuleBasedWeights {
    pub rsi: f64,
    pub momentum_7d: f64,
    pub momentum_30d: f64,
    pub volume_trend: f64,
    pub sentiment: f64,
}

impl Default for RuleBasedWeights {
    fn default() -> Self {
        Self {
            rsi: 0.25,
            momentum_7d: 0.20,
            momentum_30d: 0.15,
            volume_trend: 0.10,
            sentiment: 0.30,
        }
    }
}

/// Deterministic technical-factor scorer: RSI, 7-day and 30-day momentum,
/// volume trend, and combined sentiment, blended by fixed weights into one
/// raw score in [-1, 1].
pub struct RuleBasedAgent {
    name: String,
    weights: RuleBasedWeights,
    indicators: Arc<dyn IndicatorSource>,
    sentiment: Arc<dyn SentimentSource>,
}

impl RuleBasedAgent {
    pub fn new(
        name: impl Into<String>,
        indicators: Arc<dyn IndicatorSource>,
        sentiment: Arc<dyn SentimentSource>,
    ) -> Self {
        Self {
            name: name.into(),
            weights: RuleBasedWeights::default(),
            indicators,
            sentiment,
        }
    }

    pub fn with_weights(mut self, weights: RuleBasedWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Scores RSI on a piecewise-linear ramp: at or past oversold/overbought
    /// the score ramps from 0.8/-0.8 up to the 1.0/-1.0 cap as RSI pushes
    /// further past the threshold; inside the neutral band it's zero;
    /// between a threshold and the neutral band it ramps linearly to ±0.5.
    fn score_rsi(rsi: f64) -> f64 {
        if rsi <= RSI_OVERSOLD {
            (0.8 + (RSI_OVERSOLD - rsi) / RSI_OVERSOLD * 0.2).min(1.0)
        } else if rsi >= RSI_OVERBOUGHT {
            (-0.8 - (rsi - RSI_OVERBOUGHT) / (100.0 - RSI_OVERBOUGHT) * 0.2).max(-1.0)
        } else if rsi <= RSI_NEUTRAL_HIGH && rsi >= RSI_NEUTRAL_LOW {
            0.0
        } else if rsi < RSI_NEUTRAL_LOW {
            let normalized = (RSI_NEUTRAL_LOW - rsi) / (RSI_NEUTRAL_LOW - RSI_OVERSOLD);
            normalized * 0.5
        } else {
            let normalized = (rsi - RSI_NEUTRAL_HIGH) / (RSI_OVERBOUGHT - RSI_NEUTRAL_HIGH);
            -normalized * 0.5
        }
    }

    fn score_momentum(pct: f64, strong: f64, moderate: f64) -> f64 {
        if pct >= strong {
            0.8
        } else if pct >= moderate {
            0.4
        } else if pct > 0.0 {
            0.1
        } else if pct <= -strong {
            -0.8
        } else if pct <= -moderate {
            -0.4
        } else if pct < 0.0 {
            -0.1
        } else {
            0.0
        }
    }

    /// Fixed mapping per the spec: increasing volume is mildly bullish,
    /// decreasing mildly bearish, neutral contributes nothing.
    fn score_volume_trend(trend: VolumeTrend) -> f64 {
        match trend {
            VolumeTrend::Increasing => 0.3,
            VolumeTrend::Decreasing => -0.2,
            VolumeTrend::Neutral => 0.0,
        }
    }

    /// Weights sentiment by mention volume so a single mention can't swing
    /// the score as much as a hundred. When the mention count is unknown
    /// (zero), fall back to half weight rather than dropping sentiment
    /// entirely.
    fn score_sentiment(combined_sentiment: f64, total_mentions: u32) -> f64 {
        let mention_weight = if total_mentions > 0 {
            (total_mentions as f64 / 100.0).min(1.0)
        } else {
            0.5
        };
        combined_sentiment * mention_weight
    }

    /// Confidence blends how much factor data was available with how much
    /// the scored factors agree in direction with each other. Only factors
    /// whose magnitude exceeds 0.1 count as having an opinion; if none do,
    /// there's nothing to be confident about.
    fn calculate_confidence(factors: &HashMap<String, f64>) -> f64 {
        let meaningful: Vec<f64> = factors.values().copied().filter(|s| s.abs() > 0.1).collect();
        if meaningful.is_empty() {
            return 0.0;
        }
        let data_availability = meaningful.len() as f64 / factors.len() as f64;
        let positive = meaningful.iter().filter(|s| **s > 0.0).count();
        let negative = meaningful.len() - positive;
        let agreement_ratio = positive.max(negative) as f64 / meaningful.len() as f64;
        (0.4 * data_availability + 0.6 * agreement_ratio).clamp(0.0, 1.0)
    }
}

#[async_trait]
impl AnalyzerAgent for RuleBasedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(&self, ticker: &str) -> AgentOpinion {
        if !crate::is_valid_ticker(ticker) {
            return AgentOpinion::neutral(&self.name, ticker, "invalid ticker: expected 1-5 uppercase letters");
        }
        let indicators = match self.indicators.indicators(ticker).await {
            Ok(v) => v,
            Err(err) => return AgentOpinion::neutral(&self.name, ticker, format!("indicators unavailable: {err}")),
        };
        let sentiment = match self.sentiment.sentiment(ticker).await {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(ticker, %err, "sentiment source failed, scoring without it");
                analysis_core::SentimentSnapshot {
                    combined_sentiment: 0.0,
                    news_mentions_7d: 0,
                    social_mentions_7d: 0,
                }
            }
        };

        let mut factors = HashMap::new();
        factors.insert("rsi".to_string(), Self::score_rsi(indicators.rsi_14));
        factors.insert(
            "momentum_7d".to_string(),
            Self::score_momentum(indicators.momentum_7d_pct, MOMENTUM_7D_STRONG, MOMENTUM_7D_MODERATE),
        );
        factors.insert(
            "momentum_30d".to_string(),
            Self::score_momentum(indicators.momentum_30d_pct, MOMENTUM_30D_STRONG, MOMENTUM_30D_MODERATE),
        );
        factors.insert(
            "volume_trend".to_string(),
            Self::score_volume_trend(indicators.volume_trend),
        );
        factors.insert(
            "sentiment".to_string(),
            Self::score_sentiment(
                sentiment.combined_sentiment,
                sentiment.news_mentions_7d + sentiment.social_mentions_7d,
            ),
        );

        let w = self.weights;
        let raw_score = factors["rsi"] * w.rsi
            + factors["momentum_7d"] * w.momentum_7d
            + factors["momentum_30d"] * w.momentum_30d
            + factors["volume_trend"] * w.volume_trend
            + factors["sentiment"] * w.sentiment;

        let confidence = Self::calculate_confidence(&factors);
        let reasoning = format!(
            "rsi={:.1} mom7d={:.1}% mom30d={:.1}% volume_trend={:?} sentiment={:.2}",
            indicators.rsi_14,
            indicators.momentum_7d_pct,
            indicators.momentum_30d_pct,
            indicators.volume_trend,
            sentiment.combined_sentiment,
        );

        AgentOpinion::from_score(&self.name, ticker, raw_score, confidence, reasoning, factors)
    }
}
