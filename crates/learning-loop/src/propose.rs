//! Turns rolling performance into a proposed weight vector: blend the
//! trailing windows into a performance score, smooth against the old
//! weight, clamp, then normalize the whole vector back to `N_agents`.

use analysis_core::{WEIGHT_MAX_BOUND, WEIGHT_MIN_BOUND};

use crate::performance::AgentPerformance;

/// How much each trailing window counts toward the performance score.
/// The proposal default is `{7: 0.4, 30: 0.4, 90: 0.2}`; the RECENCY bias
/// correction substitutes `{7: 0.2, 30: 0.5, 90: 0.3}` for flagged agents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeframeWeights {
    pub w7: f64,
    pub w30: f64,
    pub w90: f64,
}

impl Default for TimeframeWeights {
    fn default() -> Self {
        Self { w7: 0.4, w30: 0.4, w90: 0.2 }
    }
}

impl TimeframeWeights {
    pub const RECENCY_CORRECTED: Self = Self { w7: 0.2, w30: 0.5, w90: 0.3 };
}

/// Default daily-change cap: a proposed weight may move at most 10% of
/// the prior weight in one day. OVERFITTING tightens this to 0.05 for
/// flagged agents.
pub const DEFAULT_DAILY_CHANGE_CAP: f64 = 0.10;

fn perf_score(perf: &AgentPerformance, tf: TimeframeWeights) -> f64 {
    tf.w7 * (perf.win_rate_7 / 100.0) + tf.w30 * (perf.win_rate_30 / 100.0) + tf.w90 * (perf.win_rate_90 / 100.0)
}

/// One agent's raw proposed weight, before cross-agent normalization.
/// `0.5` win-rate maps to perf_weight `1.0`; `1.0` win-rate maps to `2.0`.
pub fn propose_single(perf: &AgentPerformance, old_weight: f64, tf: TimeframeWeights, daily_change_cap: f64) -> f64 {
    let perf_weight = 2.0 * perf_score(perf, tf);
    let smoothed = 0.9 * old_weight + 0.1 * perf_weight;
    let clamped = smoothed.clamp(WEIGHT_MIN_BOUND, WEIGHT_MAX_BOUND);
    let max_delta = daily_change_cap * old_weight;
    let delta = (clamped - old_weight).clamp(-max_delta, max_delta);
    old_weight + delta
}

/// Rescales a vector of per-agent proposed weights so the sum equals the
/// number of agents (average weight 1.0). Scaling happens after each
/// agent's own clamp and cap, so a normalized vector can in principle
/// land a weight just outside `[0.30, 2.00]` or leave the sum outside the
/// guardrail's 10% tolerance; the guardrail check (not this function)
/// is what actually rejects the update in that case.
pub fn normalize_to_n_agents(weights: &[f64]) -> Vec<f64> {
    let n = weights.len() as f64;
    if n == 0.0 {
        return Vec::new();
    }
    let sum: f64 = weights.iter().sum();
    if sum.abs() < f64::EPSILON {
        return weights.to_vec();
    }
    let factor = n / sum;
    weights.iter().map(|w| w * factor).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::performance::AgentPerformance;

    fn perf(win_rate_7: f64, win_rate_30: f64, win_rate_90: f64) -> AgentPerformance {
        AgentPerformance {
            agent_name: "rsi_agent".to_string(),
            win_rate_7,
            win_rate_30,
            win_rate_90,
            trades_7: 20,
            trades_30: 60,
            trades_90: 120,
        }
    }

    #[test]
    fn fifty_percent_win_rate_holds_weight_at_one() {
        let p = perf(50.0, 50.0, 50.0);
        let proposed = propose_single(&p, 1.0, TimeframeWeights::default(), DEFAULT_DAILY_CHANGE_CAP);
        assert!((proposed - 1.0).abs() < 1e-9);
    }

    #[test]
    fn strong_performance_is_capped_by_the_daily_change_limit() {
        let p = perf(100.0, 100.0, 100.0);
        let proposed = propose_single(&p, 1.0, TimeframeWeights::default(), DEFAULT_DAILY_CHANGE_CAP);
        assert!((proposed - 1.10).abs() < 1e-9);
    }

    #[test]
    fn tighter_cap_limits_movement_further() {
        let p = perf(100.0, 100.0, 100.0);
        let proposed = propose_single(&p, 1.0, TimeframeWeights::default(), 0.05);
        assert!((proposed - 1.05).abs() < 1e-9);
    }

    #[test]
    fn clamp_keeps_weight_within_bounds_before_capping() {
        let p = perf(100.0, 100.0, 100.0);
        let proposed = propose_single(&p, 1.95, TimeframeWeights::default(), 1.0);
        assert!(proposed <= WEIGHT_MAX_BOUND);
    }

    #[test]
    fn normalize_rescales_sum_to_agent_count() {
        let normalized = normalize_to_n_agents(&[1.1, 0.9, 1.0, 1.2]);
        let sum: f64 = normalized.iter().sum();
        assert!((sum - 4.0).abs() < 1e-9);
    }

    #[test]
    fn normalize_of_empty_vector_is_empty() {
        assert!(normalize_to_n_agents(&[]).is_empty());
    }
}
