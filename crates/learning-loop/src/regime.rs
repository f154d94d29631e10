//! Classifies the current market regime from a handful of macro signals,
//! and decides whether the loop should refuse to adjust weights this run.

use analysis_core::{AnalysisError, MarketRegime};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Macro data feeding regime detection. Implementations live outside the
/// core, the same way the other adapter traits do.
#[async_trait]
pub trait MarketSignalsSource: Send + Sync {
    async fn current_signals(&self) -> Result<MarketSignals, AnalysisError>;
}

/// Inputs the regime rules are evaluated against. Sourced from the data
/// cache (VIX level, SPY price/200-day SMA, a representative AI-sector
/// basket's 30-day return correlation with SPY).
#[derive(Debug, Clone, Copy)]
pub struct MarketSignals {
    pub vix: f64,
    pub spy_price: f64,
    pub spy_sma_200: f64,
    pub ai_basket_spy_correlation_30d: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegimeDetection {
    pub regime: MarketRegime,
    pub confidence: f64,
    pub reasoning: String,
}

/// Evaluates the regime rules in the order the spec lists them: VIX
/// thresholds first, then SPY's distance below its 200-day SMA, then
/// AI-basket/SPY divergence, falling back to NORMAL.
pub fn detect_regime(signals: &MarketSignals) -> RegimeDetection {
    if signals.vix >= 35.0 {
        return RegimeDetection {
            regime: MarketRegime::HighVolatility,
            confidence: 0.95,
            reasoning: format!("VIX {:.1} >= 35", signals.vix),
        };
    }
    if signals.vix >= 25.0 {
        return RegimeDetection {
            regime: MarketRegime::HighVolatility,
            confidence: 0.85,
            reasoning: format!("VIX {:.1} >= 25", signals.vix),
        };
    }
    if signals.spy_sma_200 > 0.0 {
        let pct_below = (signals.spy_sma_200 - signals.spy_price) / signals.spy_sma_200;
        if pct_below >= 0.05 {
            return RegimeDetection {
                regime: MarketRegime::BearMarket,
                confidence: 0.80,
                reasoning: format!("SPY {:.1}% below 200d SMA", pct_below * 100.0),
            };
        }
    }
    if signals.ai_basket_spy_correlation_30d < 0.30 {
        return RegimeDetection {
            regime: MarketRegime::Divergence,
            confidence: 0.75,
            reasoning: format!("30d AI-basket/SPY correlation {:.2} < 0.30", signals.ai_basket_spy_correlation_30d),
        };
    }
    RegimeDetection {
        regime: MarketRegime::Normal,
        confidence: 0.90,
        reasoning: "no volatility, trend, or divergence signal fired".to_string(),
    }
}

/// Returns true once the loop must refuse to adjust weights this run:
/// three or more regime shifts within the trailing 7 days, or the
/// current regime is HIGH_VOLATILITY with VIX at or above 35.
pub fn should_freeze_learning(current: &RegimeDetection, vix: f64, shift_dates: &[NaiveDate], as_of: NaiveDate) -> bool {
    let since = as_of - chrono::Duration::days(7);
    let recent_shifts = shift_dates.iter().filter(|d| **d > since && **d <= as_of).count();
    if recent_shifts >= 3 {
        return true;
    }
    matches!(current.regime, MarketRegime::HighVolatility) && vix >= 35.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(vix: f64, spy_price: f64, spy_sma_200: f64, corr: f64) -> MarketSignals {
        MarketSignals { vix, spy_price, spy_sma_200, ai_basket_spy_correlation_30d: corr }
    }

    #[test]
    fn extreme_vix_is_high_volatility_with_highest_confidence() {
        let d = detect_regime(&signals(40.0, 500.0, 480.0, 0.5));
        assert_eq!(d.regime, MarketRegime::HighVolatility);
        assert_eq!(d.confidence, 0.95);
    }

    #[test]
    fn elevated_vix_is_high_volatility_with_lower_confidence() {
        let d = detect_regime(&signals(28.0, 500.0, 480.0, 0.5));
        assert_eq!(d.regime, MarketRegime::HighVolatility);
        assert_eq!(d.confidence, 0.85);
    }

    #[test]
    fn spy_well_below_sma_is_bear_market() {
        let d = detect_regime(&signals(18.0, 440.0, 480.0, 0.5));
        assert_eq!(d.regime, MarketRegime::BearMarket);
    }

    #[test]
    fn low_correlation_is_divergence() {
        let d = detect_regime(&signals(18.0, 490.0, 480.0, 0.1));
        assert_eq!(d.regime, MarketRegime::Divergence);
    }

    #[test]
    fn calm_markets_are_normal() {
        let d = detect_regime(&signals(15.0, 500.0, 480.0, 0.8));
        assert_eq!(d.regime, MarketRegime::Normal);
    }

    #[test]
    fn three_shifts_in_seven_days_freezes_learning() {
        let as_of = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let shifts = vec![
            as_of - chrono::Duration::days(1),
            as_of - chrono::Duration::days(3),
            as_of - chrono::Duration::days(6),
        ];
        let current = RegimeDetection { regime: MarketRegime::Normal, confidence: 0.9, reasoning: String::new() };
        assert!(should_freeze_learning(&current, 15.0, &shifts, as_of));
    }

    #[test]
    fn extreme_vix_high_volatility_freezes_learning_even_without_shift_history() {
        let as_of = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let current = RegimeDetection { regime: MarketRegime::HighVolatility, confidence: 0.95, reasoning: String::new() };
        assert!(should_freeze_learning(&current, 36.0, &[], as_of));
    }

    #[test]
    fn calm_regime_with_no_shift_history_does_not_freeze() {
        let as_of = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let current = RegimeDetection { regime: MarketRegime::Normal, confidence: 0.9, reasoning: String::new() };
        assert!(!should_freeze_learning(&current, 15.0, &[], as_of));
    }
}
