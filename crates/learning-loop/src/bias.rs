//! The four bias detectors run against a proposed weight update and up to
//! 30 days of weight history. Each can flag agents and carries a fixed
//! severity; [`BiasReport::confidence`] folds the findings into the
//! overall confidence the apply policy gates on.

use analysis_core::MarketRegime;

use crate::performance::AgentPerformance;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    fn confidence_penalty(self) -> f64 {
        match self {
            Severity::Low => 0.05,
            Severity::Medium => 0.15,
            Severity::High => 0.30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiasType {
    Overfitting,
    Recency,
    Thrashing,
    RegimeBlindness,
}

impl BiasType {
    pub fn as_str(self) -> &'static str {
        match self {
            BiasType::Overfitting => "OVERFITTING",
            BiasType::Recency => "RECENCY",
            BiasType::Thrashing => "THRASHING",
            BiasType::RegimeBlindness => "REGIME_BLINDNESS",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BiasFinding {
    pub bias_type: BiasType,
    pub severity: Severity,
    pub flagged_agents: Vec<String>,
    pub correction_note: String,
}

#[derive(Debug, Clone, Default)]
pub struct BiasReport {
    pub findings: Vec<BiasFinding>,
}

impl BiasReport {
    pub fn confidence(&self) -> f64 {
        let penalty: f64 = self.findings.iter().map(|f| f.severity.confidence_penalty()).sum();
        (1.0 - penalty).clamp(0.0, 1.0)
    }

    pub fn flagged_by(&self, bias_type: BiasType) -> Option<&BiasFinding> {
        self.findings.iter().find(|f| f.bias_type == bias_type)
    }

    pub fn is_agent_flagged(&self, agent_name: &str, bias_type: BiasType) -> bool {
        self.flagged_by(bias_type).map(|f| f.flagged_agents.iter().any(|a| a == agent_name)).unwrap_or(false)
    }
}

/// `1.96 * sqrt(p(1-p)/n)`, the normal-approximation 95% CI half-width
/// for a win rate `p` (0..1) observed over `n` trades.
fn ci_half_width(p: f64, n: i32) -> f64 {
    if n <= 0 {
        return f64::INFINITY;
    }
    1.96 * (p * (1.0 - p) / n as f64).sqrt()
}

/// Flags any agent with too few trades, or too wide a confidence
/// interval, in any of its three windows.
pub fn detect_overfitting(perfs: &[AgentPerformance]) -> Option<BiasFinding> {
    let flagged: Vec<String> = perfs
        .iter()
        .filter(|p| {
            [(p.win_rate_7, p.trades_7), (p.win_rate_30, p.trades_30), (p.win_rate_90, p.trades_90)]
                .iter()
                .any(|(win_rate, trades)| *trades < 10 || ci_half_width(win_rate / 100.0, *trades) > 0.15)
        })
        .map(|p| p.agent_name.clone())
        .collect();

    if flagged.is_empty() {
        return None;
    }
    let severity = if flagged.len() >= 2 { Severity::High } else { Severity::Medium };
    Some(BiasFinding {
        bias_type: BiasType::Overfitting,
        severity,
        flagged_agents: flagged,
        correction_note: "daily-change cap tightened to 0.05 x old weight".to_string(),
    })
}

/// Flags agents whose 7-day and 30-day win rates have diverged by more
/// than 20 percentage points.
pub fn detect_recency(perfs: &[AgentPerformance]) -> Option<BiasFinding> {
    let flagged: Vec<String> = perfs
        .iter()
        .filter(|p| (p.win_rate_7 - p.win_rate_30).abs() / 100.0 > 0.20)
        .map(|p| p.agent_name.clone())
        .collect();

    if flagged.is_empty() {
        return None;
    }
    let severity = if flagged.len() >= 2 { Severity::High } else { Severity::Low };
    Some(BiasFinding {
        bias_type: BiasType::Recency,
        severity,
        flagged_agents: flagged,
        correction_note: "timeframe weights reweighted toward {7: 0.2, 30: 0.5, 90: 0.3}".to_string(),
    })
}

fn sign_reversals(changes: &[f64]) -> usize {
    changes
        .windows(2)
        .filter(|pair| pair[0] * pair[1] < 0.0)
        .count()
}

fn stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// `recent_changes` maps agent name to its last up-to-7 per-day weight
/// deltas, oldest first.
pub fn detect_thrashing(recent_changes: &[(String, Vec<f64>)]) -> Option<BiasFinding> {
    let flagged: Vec<String> = recent_changes
        .iter()
        .filter(|(_, changes)| stdev(changes) > 0.30 || sign_reversals(changes) > 3)
        .map(|(name, _)| name.clone())
        .collect();

    if flagged.is_empty() {
        return None;
    }
    Some(BiasFinding {
        bias_type: BiasType::Thrashing,
        severity: Severity::High,
        flagged_agents: flagged,
        correction_note: "frozen at old weight for 3 days".to_string(),
    })
}

/// Flags every agent when the regime has shifted since the last run.
pub fn detect_regime_blindness(
    current_regime: MarketRegime,
    previous_regime: Option<MarketRegime>,
    all_agent_names: &[String],
) -> Option<BiasFinding> {
    if previous_regime.map(|r| r == current_regime).unwrap_or(true) {
        return None;
    }
    Some(BiasFinding {
        bias_type: BiasType::RegimeBlindness,
        severity: Severity::Medium,
        flagged_agents: all_agent_names.to_vec(),
        correction_note: "new_weight = 0.7 x proposed + 0.3 x old".to_string(),
    })
}
