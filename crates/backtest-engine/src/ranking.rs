use analysis_core::{StoredSignal, StoredSignalType};
use rust_decimal::prelude::*;

const DEFAULT_EXPECTED_RETURN: f64 = 0.10;
const DEFAULT_RISK_FACTOR: f64 = 1.5;

/// A candidate ranked for allocation: the underlying signal plus the score
/// it was ranked by.
#[derive(Debug, Clone)]
pub struct RankedSignal {
    pub signal: StoredSignal,
    pub score: f64,
    pub expected_return: f64,
    pub risk_factor: f64,
}

fn expected_return(signal: &StoredSignal) -> f64 {
    let entry = signal.entry_price.to_f64().unwrap_or(0.0);
    let target = signal.target_price.to_f64().unwrap_or(0.0);
    if entry <= 0.0 {
        DEFAULT_EXPECTED_RETURN
    } else {
        (target - entry) / entry
    }
}

fn risk_factor(signal: &StoredSignal) -> f64 {
    let entry = signal.entry_price.to_f64().unwrap_or(0.0);
    let stop = signal.stop_loss.to_f64().unwrap_or(0.0);
    if entry <= 0.0 {
        DEFAULT_RISK_FACTOR
    } else {
        ((entry - stop) / entry * 10.0).max(1.0)
    }
}

/// Ranks only BUY signals by `score = confidence_norm * expected_return *
/// (1 / risk_factor)`, descending. SELL and HOLD signals never receive
/// capital in the simulator, so they're filtered out here rather than
/// carried through and ignored later.
pub fn rank_signals(signals: &[StoredSignal]) -> Vec<RankedSignal> {
    let mut ranked: Vec<RankedSignal> = signals
        .iter()
        .filter(|s| s.signal_type == StoredSignalType::Buy)
        .map(|signal| {
            let confidence_norm = signal.confidence as f64 / 5.0;
            let er = expected_return(signal);
            let rf = risk_factor(signal);
            let score = confidence_norm * er * (1.0 / rf);
            RankedSignal {
                signal: signal.clone(),
                score,
                expected_return: er,
                risk_factor: rf,
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    ranked
}
