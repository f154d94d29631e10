//! Orchestrates one LearningLoop run: regime check, rolling performance,
//! weight proposal, bias detection and correction, guardrails, and the
//! apply-policy gate. Persistence is the caller's job (see [`crate::store`]);
//! this module only decides what *should* happen.

use std::collections::HashMap;

use analysis_core::MarketRegime;
use chrono::NaiveDate;

use crate::bias::{detect_overfitting, detect_recency, detect_regime_blindness, detect_thrashing, BiasReport, BiasType};
use crate::guardrails::{check_guardrails, GuardrailViolation};
use crate::performance::{rolling_performance, AgentTradeRecord};
use crate::propose::{normalize_to_n_agents, propose_single, TimeframeWeights, DEFAULT_DAILY_CHANGE_CAP};
use crate::regime::{detect_regime, should_freeze_learning, MarketSignals, RegimeDetection};

#[derive(Debug, Clone)]
pub struct AgentInput {
    pub agent_name: String,
    pub old_weight: f64,
    pub closed_trade_history: Vec<AgentTradeRecord>,
    /// Last up-to-7 per-day weight deltas, oldest first, for the
    /// THRASHING detector.
    pub recent_weight_changes: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct LearningLoopConfig {
    pub auto_learning_enabled: bool,
    pub human_review_required: bool,
    pub min_confidence_for_auto: f64,
    pub timeframe_weights: TimeframeWeights,
    pub daily_change_cap: f64,
}

impl Default for LearningLoopConfig {
    fn default() -> Self {
        Self {
            auto_learning_enabled: false,
            human_review_required: true,
            min_confidence_for_auto: 0.80,
            timeframe_weights: TimeframeWeights::default(),
            daily_change_cap: DEFAULT_DAILY_CHANGE_CAP,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LearningRunOutcome {
    /// Guardrails passed and the apply policy cleared; weights should be
    /// persisted along with a WEIGHT_UPDATE event per agent and a
    /// CORRECTION_APPLIED event per bias actually corrected.
    Applied { weights: Vec<(String, f64)>, report: BiasReport, regime: RegimeDetection, confidence: f64 },
    /// Guardrails passed but the apply policy withheld auto-apply; an
    /// ALERT event marked "pending review" should be written.
    PendingReview { proposed: Vec<(String, f64)>, report: BiasReport, regime: RegimeDetection, confidence: f64 },
    /// A guardrail failed; weights are left unchanged and an ALERT event
    /// should be written.
    GuardrailBlocked { violations: Vec<GuardrailViolation> },
    /// The regime rules refused to let the loop run at all this cycle.
    LearningFrozen { reason: String, regime: RegimeDetection },
}

/// Runs one full LearningLoop cycle. `weight_7d_ago` is each agent's
/// weight from 7 days before `as_of`, used by the guardrail's cumulative
/// change check. `previous_regime` and `regime_shift_dates` carry enough
/// history for REGIME_BLINDNESS and the regime freeze rule.
#[allow(clippy::too_many_arguments)]
pub fn run(
    agents: &[AgentInput],
    market_signals: &MarketSignals,
    previous_regime: Option<MarketRegime>,
    regime_shift_dates: &[NaiveDate],
    weight_7d_ago: &HashMap<String, f64>,
    as_of: NaiveDate,
    config: &LearningLoopConfig,
) -> LearningRunOutcome {
    let regime = detect_regime(market_signals);

    if should_freeze_learning(&regime, market_signals.vix, regime_shift_dates, as_of) {
        return LearningRunOutcome::LearningFrozen {
            reason: "3+ regime shifts in 7 days or HIGH_VOLATILITY at VIX >= 35".to_string(),
            regime,
        };
    }

    let perfs: Vec<_> = agents.iter().map(|a| rolling_performance(&a.agent_name, &a.closed_trade_history, as_of)).collect();

    let mut proposed: HashMap<String, f64> = agents
        .iter()
        .zip(perfs.iter())
        .map(|(agent, perf)| {
            let weight = propose_single(perf, agent.old_weight, config.timeframe_weights, config.daily_change_cap);
            (agent.agent_name.clone(), weight)
        })
        .collect();

    let mut report = BiasReport::default();

    if let Some(finding) = detect_overfitting(&perfs) {
        for agent_name in &finding.flagged_agents {
            if let (Some(agent), Some(perf)) = (
                agents.iter().find(|a| &a.agent_name == agent_name),
                perfs.iter().find(|p| &p.agent_name == agent_name),
            ) {
                let tightened = propose_single(perf, agent.old_weight, config.timeframe_weights, 0.05);
                proposed.insert(agent_name.clone(), tightened);
            }
        }
        report.findings.push(finding);
    }

    if let Some(finding) = detect_recency(&perfs) {
        for agent_name in &finding.flagged_agents {
            if let (Some(agent), Some(perf)) = (
                agents.iter().find(|a| &a.agent_name == agent_name),
                perfs.iter().find(|p| &p.agent_name == agent_name),
            ) {
                let reweighted =
                    propose_single(perf, agent.old_weight, TimeframeWeights::RECENCY_CORRECTED, config.daily_change_cap);
                proposed.insert(agent_name.clone(), reweighted);
            }
        }
        report.findings.push(finding);
    }

    let thrashing_input: Vec<(String, Vec<f64>)> =
        agents.iter().map(|a| (a.agent_name.clone(), a.recent_weight_changes.clone())).collect();
    if let Some(finding) = detect_thrashing(&thrashing_input) {
        for agent_name in &finding.flagged_agents {
            if let Some(agent) = agents.iter().find(|a| &a.agent_name == agent_name) {
                proposed.insert(agent_name.clone(), agent.old_weight);
            }
        }
        report.findings.push(finding);
    }

    let all_agent_names: Vec<String> = agents.iter().map(|a| a.agent_name.clone()).collect();
    if let Some(finding) = detect_regime_blindness(regime.regime, previous_regime, &all_agent_names) {
        for agent_name in &finding.flagged_agents {
            if let Some(agent) = agents.iter().find(|a| &a.agent_name == agent_name) {
                let blended = 0.7 * proposed.get(agent_name).copied().unwrap_or(agent.old_weight) + 0.3 * agent.old_weight;
                proposed.insert(agent_name.clone(), blended);
            }
        }
        report.findings.push(finding);
    }

    let ordered_weights: Vec<f64> = agents.iter().map(|a| proposed[&a.agent_name]).collect();
    let normalized = normalize_to_n_agents(&ordered_weights);
    let new_weights: Vec<(String, f64)> =
        agents.iter().map(|a| a.agent_name.clone()).zip(normalized.into_iter()).collect();

    if let Err(violations) = check_guardrails(&new_weights, weight_7d_ago) {
        return LearningRunOutcome::GuardrailBlocked { violations };
    }

    let confidence = report.confidence();

    if !config.auto_learning_enabled || (config.human_review_required && confidence < config.min_confidence_for_auto) {
        return LearningRunOutcome::PendingReview { proposed: new_weights, report, regime, confidence };
    }

    LearningRunOutcome::Applied { weights: new_weights, report, regime, confidence }
}

/// A single agent weight set directly by an operator, bypassing the
/// proposal pipeline. Still bound to `[0.30, 2.00]`.
pub fn manual_override(agent_name: &str, new_weight: f64) -> Result<(String, f64), String> {
    if !(analysis_core::WEIGHT_MIN_BOUND..=analysis_core::WEIGHT_MAX_BOUND).contains(&new_weight) {
        return Err(format!(
            "{new_weight} outside [{}, {}]",
            analysis_core::WEIGHT_MIN_BOUND,
            analysis_core::WEIGHT_MAX_BOUND
        ));
    }
    Ok((agent_name.to_string(), new_weight))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calm_signals() -> MarketSignals {
        MarketSignals { vix: 15.0, spy_price: 500.0, spy_sma_200: 480.0, ai_basket_spy_correlation_30d: 0.8 }
    }

    fn agent(name: &str, old_weight: f64) -> AgentInput {
        AgentInput {
            agent_name: name.to_string(),
            old_weight,
            closed_trade_history: vec![],
            recent_weight_changes: vec![],
        }
    }

    #[test]
    fn pending_review_when_auto_learning_disabled() {
        let agents = vec![agent("a", 1.0), agent("b", 1.0)];
        let outcome = run(
            &agents,
            &calm_signals(),
            Some(MarketRegime::Normal),
            &[],
            &HashMap::new(),
            NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
            &LearningLoopConfig::default(),
        );
        assert!(matches!(outcome, LearningRunOutcome::PendingReview { .. }));
    }

    #[test]
    fn learning_freezes_during_extreme_volatility() {
        let agents = vec![agent("a", 1.0)];
        let mut signals = calm_signals();
        signals.vix = 40.0;
        let outcome = run(
            &agents,
            &signals,
            Some(MarketRegime::HighVolatility),
            &[],
            &HashMap::new(),
            NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
            &LearningLoopConfig::default(),
        );
        assert!(matches!(outcome, LearningRunOutcome::LearningFrozen { .. }));
    }

    #[test]
    fn guardrail_blocks_a_large_single_agent_swing() {
        let mut history = vec![];
        for _ in 0..20 {
            history.push(AgentTradeRecord {
                agent_name: "a".to_string(),
                closed_at: NaiveDate::from_ymd_opt(2025, 6, 29).unwrap(),
                recommendation: analysis_core::StoredSignalType::Buy,
                pnl: rust_decimal::Decimal::from(100),
            });
        }
        let mut agents = vec![agent("a", 1.0), agent("b", 1.0), agent("c", 1.0), agent("d", 1.0)];
        agents[0].closed_trade_history = history;

        let mut weight_7d_ago = HashMap::new();
        weight_7d_ago.insert("a".to_string(), 1.0);

        let config = LearningLoopConfig { auto_learning_enabled: true, human_review_required: false, ..Default::default() };
        let outcome = run(
            &agents,
            &calm_signals(),
            Some(MarketRegime::Normal),
            &[],
            &weight_7d_ago,
            NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
            &config,
        );
        // a's perfect win rate pushes it up against the daily cap repeatedly;
        // this single-run test only exercises that the pipeline reaches a
        // guardrail-checked vector without panicking, not a specific verdict.
        assert!(matches!(outcome, LearningRunOutcome::Applied { .. } | LearningRunOutcome::GuardrailBlocked { .. }));
    }

    #[test]
    fn manual_override_rejects_out_of_bounds_weight() {
        assert!(manual_override("a", 2.5).is_err());
        assert!(manual_override("a", 1.5).is_ok());
    }

    #[test]
    fn regime_blindness_correction_blends_toward_old_weight_for_all_agents() {
        let agents = vec![agent("a", 1.0)];
        let config = LearningLoopConfig { auto_learning_enabled: true, human_review_required: false, ..Default::default() };
        let outcome = run(
            &agents,
            &calm_signals(),
            Some(MarketRegime::BearMarket),
            &[],
            &HashMap::new(),
            NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
            &config,
        );
        match outcome {
            LearningRunOutcome::Applied { report, .. } => {
                assert!(report.flagged_by(BiasType::RegimeBlindness).is_some());
            }
            other => panic!("expected Applied, got {other:?}"),
        }
    }
}
