use analysis_core::{ConsensusSignal, PositionSizeClass, SignalClass};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;

/// Stop-loss distance from entry for a BUY-side signal.
pub const STOP_LOSS_PCT: f64 = 0.10;
/// Target distance from entry for a BUY-side signal.
pub const TARGET_PCT: f64 = 0.25;
/// Fraction of the portfolio a `Normal`-sized position consumes before the
/// position-size-class multiplier is applied.
pub const BASE_ALLOCATION_PCT: f64 = 0.10;

/// Concrete risk parameters derived from a consensus signal: stop, target,
/// and share count. Kept separate from `StoredSignal` so the translation
/// math can be unit tested without a database.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskParameters {
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub target_price: Decimal,
    pub share_count: i64,
}

/// Translates a consensus signal and a live entry price into concrete
/// stop/target/share-count risk parameters, fixed percentages off entry:
/// BUY/STRONG_BUY get a 10% stop and a 25% target above entry, SELL/
/// STRONG_SELL the mirror image below entry, HOLD gets entry on both.
/// Share count follows the position-size cascade:
/// `floor(portfolio_value * BASE_ALLOCATION_PCT * multiplier / entry_price)`,
/// zero whenever the entry price isn't positive or the size class is NONE.
pub fn translate(signal: &ConsensusSignal, entry_price: Decimal, portfolio_value: Decimal) -> RiskParameters {
    let (stop_loss, target_price) = match signal.signal_class {
        SignalClass::Buy | SignalClass::StrongBuy => (
            (entry_price * dec_from(1.0 - STOP_LOSS_PCT)).round_dp(2),
            (entry_price * dec_from(1.0 + TARGET_PCT)).round_dp(2),
        ),
        SignalClass::Sell | SignalClass::StrongSell => (
            (entry_price * dec_from(1.0 + STOP_LOSS_PCT)).round_dp(2),
            (entry_price * dec_from(1.0 - TARGET_PCT)).round_dp(2),
        ),
        SignalClass::Hold => (entry_price, entry_price),
    };

    let multiplier = signal.position_size_class.multiplier();
    let share_count = if multiplier <= 0.0 || entry_price <= Decimal::ZERO {
        0
    } else {
        let allocation = portfolio_value.to_f64().unwrap_or(0.0) * BASE_ALLOCATION_PCT * multiplier;
        (allocation / entry_price.to_f64().unwrap_or(1.0)).floor() as i64
    };

    RiskParameters {
        entry_price,
        stop_loss,
        target_price,
        share_count,
    }
}

fn dec_from(x: f64) -> Decimal {
    Decimal::from_f64(x).unwrap_or(Decimal::ONE)
}

/// Maps a 0..1 consensus confidence to the 1..5 star rating persisted on
/// `StoredSignal` and `AgentAnalysis` at cutpoints 0.2 / 0.4 / 0.6 / 0.8.
pub fn confidence_to_stars(confidence: f64) -> i32 {
    let c = confidence.clamp(0.0, 1.0);
    if c >= 0.8 {
        5
    } else if c >= 0.6 {
        4
    } else if c >= 0.4 {
        3
    } else if c >= 0.2 {
        2
    } else {
        1
    }
}

/// Whether a consensus signal is actionable at all: a HOLD, or a BUY/SELL
/// with no position size, never reaches the risk translator in practice,
/// but callers should still guard on this before writing a signal.
pub fn is_actionable(signal: &ConsensusSignal) -> bool {
    !matches!(signal.signal_class, SignalClass::Hold) && !matches!(signal.position_size_class, PositionSizeClass::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn signal(class: SignalClass, confidence: f64, size: PositionSizeClass) -> ConsensusSignal {
        ConsensusSignal {
            ticker: "AAPL".to_string(),
            signal_class: class,
            confidence,
            raw_score: 0.5,
            position_size_class: size,
            agreement_ratio: 1.0,
            opinions: vec![],
        }
    }

    #[test]
    fn buy_at_100_normal_size_matches_spec_scenario_4() {
        let risk = translate(
            &signal(SignalClass::Buy, 0.6, PositionSizeClass::Normal),
            dec!(100),
            dec!(100000),
        );
        assert_eq!(risk.stop_loss, dec!(90.00));
        assert_eq!(risk.target_price, dec!(125.00));
        assert_eq!(risk.share_count, 100);
    }

    #[test]
    fn sell_side_brackets_are_mirrored() {
        let risk = translate(
            &signal(SignalClass::StrongSell, 0.6, PositionSizeClass::Normal),
            dec!(100),
            dec!(100000),
        );
        assert_eq!(risk.stop_loss, dec!(110.00));
        assert_eq!(risk.target_price, dec!(75.00));
        assert!(risk.stop_loss > risk.entry_price && risk.entry_price > risk.target_price);
    }

    #[test]
    fn hold_brackets_collapse_to_entry() {
        let risk = translate(
            &signal(SignalClass::Hold, 0.1, PositionSizeClass::None),
            dec!(100),
            dec!(100000),
        );
        assert_eq!(risk.stop_loss, dec!(100));
        assert_eq!(risk.target_price, dec!(100));
    }

    #[test]
    fn share_count_scales_with_position_size_multiplier() {
        let normal = translate(&signal(SignalClass::Buy, 0.7, PositionSizeClass::Normal), dec!(50), dec!(100000));
        let large = translate(&signal(SignalClass::Buy, 0.7, PositionSizeClass::Large), dec!(50), dec!(100000));
        assert!(large.share_count > normal.share_count);
    }

    #[test]
    fn none_position_size_yields_zero_shares() {
        let none = translate(&signal(SignalClass::Hold, 0.1, PositionSizeClass::None), dec!(50), dec!(100000));
        assert_eq!(none.share_count, 0);
    }

    #[test]
    fn confidence_to_stars_matches_spec_cutpoints() {
        assert_eq!(confidence_to_stars(0.0), 1);
        assert_eq!(confidence_to_stars(0.19), 1);
        assert_eq!(confidence_to_stars(0.2), 2);
        assert_eq!(confidence_to_stars(0.4), 3);
        assert_eq!(confidence_to_stars(0.6), 4);
        assert_eq!(confidence_to_stars(0.8), 5);
        assert_eq!(confidence_to_stars(1.0), 5);
    }

    #[test]
    fn hold_or_unsized_signals_are_not_actionable() {
        assert!(!is_actionable(&signal(SignalClass::Hold, 0.9, PositionSizeClass::Normal)));
        assert!(!is_actionable(&signal(SignalClass::Buy, 0.9, PositionSizeClass::None)));
        assert!(is_actionable(&signal(SignalClass::Buy, 0.9, PositionSizeClass::Small)));
    }
}
