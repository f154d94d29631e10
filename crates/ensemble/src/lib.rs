//! Combines per-agent opinions into one [`ConsensusSignal`] per ticker.
//!
//! Aggregation is a confidence-and-weight-blended average of raw scores.
//! Each opinion's effective weight is `agent_weight * (0.5 + 0.5 * confidence)`,
//! so a confident agent counts for up to twice as much as a zero-confidence
//! one, but a low-confidence opinion is never discarded outright the way a
//! hard cutoff would.

use std::collections::HashMap;

use analysis_core::{AgentOpinion, AnalyzerAgent, ConsensusSignal, PositionSizeClass, SignalClass};

/// Per-agent weight used to scale its opinion in the consensus blend.
/// Defaults to 1.0 for any agent not present in the map, so a fresh agent
/// with no learned weight yet participates at parity.
#[derive(Debug, Clone, Default)]
pub struct WeightTable(pub HashMap<String, f64>);

impl WeightTable {
    pub fn weight_for(&self, agent_name: &str) -> f64 {
        self.0.get(agent_name).copied().unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

fn direction_of(raw_score: f64) -> Direction {
    if raw_score > 0.1 {
        Direction::Bullish
    } else if raw_score < -0.1 {
        Direction::Bearish
    } else {
        Direction::Neutral
    }
}

/// Blends `opinions` (including any neutral placeholders substituted for
/// failed agents) into a single consensus signal for `ticker`.
pub fn generate_signal(ticker: &str, opinions: Vec<AgentOpinion>, weights: &WeightTable) -> ConsensusSignal {
    if opinions.is_empty() {
        return ConsensusSignal {
            ticker: ticker.to_string(),
            signal_class: SignalClass::Hold,
            confidence: 0.0,
            raw_score: 0.0,
            position_size_class: PositionSizeClass::None,
            agreement_ratio: 0.0,
            opinions,
        };
    }

    let mut weighted_score_sum = 0.0;
    let mut weight_sum = 0.0;
    for opinion in &opinions {
        let effective_weight = weights.weight_for(&opinion.agent_name) * (0.5 + 0.5 * opinion.confidence);
        weighted_score_sum += opinion.raw_score * effective_weight;
        weight_sum += effective_weight;
    }

    if weight_sum <= 0.0 {
        return ConsensusSignal {
            ticker: ticker.to_string(),
            signal_class: SignalClass::Hold,
            confidence: 0.0,
            raw_score: 0.0,
            position_size_class: PositionSizeClass::None,
            agreement_ratio: 1.0 / opinions.len() as f64,
            opinions,
        };
    }

    let weighted_score = weighted_score_sum / weight_sum;
    let signal_class = SignalClass::from_consensus_score(weighted_score);
    let agreement_ratio = agreement_ratio(&opinions);

    let avg_confidence = opinions.iter().map(|o| o.confidence).sum::<f64>() / opinions.len() as f64;
    let breadth_term = (opinions.len() as f64 / 3.0).min(1.0);
    let consensus_confidence =
        (0.5 * avg_confidence + 0.3 * agreement_ratio + 0.2 * breadth_term).clamp(0.0, 1.0);

    let position_size_class = position_size_cascade(weighted_score, consensus_confidence, agreement_ratio);

    ConsensusSignal {
        ticker: ticker.to_string(),
        signal_class,
        confidence: consensus_confidence,
        raw_score: weighted_score,
        position_size_class,
        agreement_ratio,
        opinions,
    }
}

/// Runs every agent concurrently via [`agent_framework::collect_opinions`]
/// and folds the results into a consensus signal. The thin seam that
/// wires the agent pool to the aggregation math above.
pub async fn run_ensemble(
    ticker: &str,
    agents: &[Box<dyn AnalyzerAgent>],
    weights: &WeightTable,
) -> ConsensusSignal {
    let opinions = agent_framework::collect_opinions(ticker, agents).await;
    generate_signal(ticker, opinions, weights)
}

/// Fraction of opinions whose bullish/bearish/neutral direction (by
/// `raw_score`, not `signal_class`) matches the plurality direction. With a
/// single opinion the ratio is always 1.0.
fn agreement_ratio(opinions: &[AgentOpinion]) -> f64 {
    if opinions.len() == 1 {
        return 1.0;
    }
    let mut bullish = 0usize;
    let mut bearish = 0usize;
    let mut neutral = 0usize;
    for opinion in opinions {
        match direction_of(opinion.raw_score) {
            Direction::Bullish => bullish += 1,
            Direction::Bearish => bearish += 1,
            Direction::Neutral => neutral += 1,
        }
    }
    let max_direction_count = bullish.max(bearish).max(neutral);
    max_direction_count as f64 / opinions.len() as f64
}

/// First-match cascade: an unclear or low-confidence signal is sized NONE
/// regardless of the other inputs; only a confident, well-agreed, strongly
/// directional blend earns LARGE.
fn position_size_cascade(weighted_score: f64, confidence: f64, agreement_ratio: f64) -> PositionSizeClass {
    if weighted_score.abs() < 0.1 || confidence < 0.3 {
        PositionSizeClass::None
    } else if confidence >= 0.7 && agreement_ratio >= 0.8 && weighted_score.abs() >= 0.5 {
        PositionSizeClass::Large
    } else if confidence >= 0.5 && agreement_ratio >= 0.6 {
        PositionSizeClass::Normal
    } else if confidence >= 0.3 {
        PositionSizeClass::Medium
    } else {
        PositionSizeClass::Small
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn opinion(agent: &str, score: f64, confidence: f64) -> AgentOpinion {
        AgentOpinion::from_score(agent, "AAPL", score, confidence, "test", Map::new())
    }

    #[test]
    fn unanimous_bullish_yields_large_position() {
        let opinions = vec![
            opinion("rule-based", 0.8, 0.9),
            opinion("llm-a", 0.8, 0.9),
            opinion("llm-b", 0.8, 0.9),
        ];
        let consensus = generate_signal("AAPL", opinions, &WeightTable::default());
        assert!((consensus.raw_score - 0.8).abs() < 1e-9);
        assert_eq!(consensus.signal_class, SignalClass::StrongBuy);
        assert_eq!(consensus.agreement_ratio, 1.0);
        assert!(consensus.confidence >= 0.8);
        assert_eq!(consensus.position_size_class, PositionSizeClass::Large);
    }

    #[test]
    fn split_two_vs_two_cancels_to_hold() {
        let opinions = vec![
            opinion("a", 0.6, 0.8),
            opinion("b", 0.6, 0.8),
            opinion("c", -0.6, 0.8),
            opinion("d", -0.6, 0.8),
        ];
        let consensus = generate_signal("AAPL", opinions, &WeightTable::default());
        assert!(consensus.raw_score.abs() < 1e-9);
        assert_eq!(consensus.signal_class, SignalClass::Hold);
        assert_eq!(consensus.agreement_ratio, 0.5);
        assert!(matches!(
            consensus.position_size_class,
            PositionSizeClass::Small | PositionSizeClass::None
        ));
    }

    #[test]
    fn one_heavy_bull_outweighs_two_light_bears() {
        let mut weights = WeightTable::default();
        weights.0.insert("bull".to_string(), 2.0);
        weights.0.insert("bear1".to_string(), 0.5);
        weights.0.insert("bear2".to_string(), 0.5);
        let opinions = vec![
            opinion("bull", 0.5, 0.7),
            opinion("bear1", -0.5, 0.7),
            opinion("bear2", -0.5, 0.7),
        ];
        let consensus = generate_signal("AAPL", opinions, &weights);
        assert!(consensus.raw_score > 0.0);
        assert!(consensus.signal_class.is_bullish() || consensus.signal_class == SignalClass::Hold);
        assert!((consensus.agreement_ratio - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn all_neutral_fallback_opinions_produce_zero_confidence_hold() {
        let opinions = vec![
            AgentOpinion::neutral("rule-based", "AAPL", "circuit open"),
            AgentOpinion::neutral("llm-a", "AAPL", "circuit open"),
        ];
        let consensus = generate_signal("AAPL", opinions, &WeightTable::default());
        assert_eq!(consensus.signal_class, SignalClass::Hold);
        assert_eq!(consensus.confidence, 0.0);
        assert_eq!(consensus.position_size_class, PositionSizeClass::None);
    }

    #[test]
    fn empty_opinion_set_is_neutral_hold_none() {
        let consensus = generate_signal("AAPL", vec![], &WeightTable::default());
        assert_eq!(consensus.signal_class, SignalClass::Hold);
        assert_eq!(consensus.position_size_class, PositionSizeClass::None);
        assert_eq!(consensus.agreement_ratio, 0.0);
    }
}
